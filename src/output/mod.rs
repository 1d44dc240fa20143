//! Console reporting
//!
//! Plain and colored formatters for probe results, comparisons and sweeps,
//! plus the console [`ProgressObserver`](crate::probe::ProgressObserver).

mod colored;
mod formatter;
mod progress;

pub use self::colored::{level_color, ColorScheme, ColoredFormatter};
pub use formatter::{Alignment, Column, FormattingOptions, OutputFormatter, PlainFormatter, RowData};
pub use progress::ConsoleProgress;

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Colored formatter when color is enabled and the terminal supports it
    pub fn create_formatter(enable_color: bool, verbose: bool) -> Box<dyn OutputFormatter> {
        let enable_color = enable_color && ColoredFormatter::supports_color();
        let options = FormattingOptions {
            enable_color,
            verbose_mode: verbose,
            table_borders: true,
        };

        if enable_color {
            Box::new(ColoredFormatter::new(options))
        } else {
            Box::new(PlainFormatter::new(options))
        }
    }

    /// Plain text formatter for scripts/logs
    pub fn create_plain_formatter() -> Box<dyn OutputFormatter> {
        Self::create_formatter(false, true)
    }

    /// Progress observer matching the formatter's color choice
    pub fn create_progress(enable_color: bool, verbose: bool) -> ConsoleProgress {
        ConsoleProgress::new(enable_color && ColoredFormatter::supports_color(), verbose)
    }
}
