//! Colored console formatter
//!
//! Same layout as [`PlainFormatter`](super::PlainFormatter), with latency
//! values colored by [`LatencyLevel`].

use super::formatter::{
    anomaly_lines, fmt_err, instance_lines, ms, render_table, FormattingOptions, OutputFormatter, RowData,
    COMPARISON_COLUMNS,
};
use crate::{
    error::Result,
    models::{ComparisonReport, ProbeResult, SweepReport},
    types::LatencyLevel,
};
use colored::*;
use std::fmt::Write as _;

/// Terminal color for a latency class
pub fn level_color(level: LatencyLevel) -> Color {
    match level {
        LatencyLevel::Good => Color::Green,
        LatencyLevel::Moderate => Color::Yellow,
        LatencyLevel::Poor => Color::Red,
    }
}

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
    pub muted: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            muted: Color::BrightBlack,
        }
    }
}

pub struct ColoredFormatter {
    options: FormattingOptions,
    color_scheme: ColorScheme,
}

impl ColoredFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self {
            options,
            color_scheme: ColorScheme::default(),
        }
    }

    pub fn with_color_scheme(options: FormattingOptions, color_scheme: ColorScheme) -> Self {
        Self { options, color_scheme }
    }

    /// Check if terminal supports colors
    pub fn supports_color() -> bool {
        std::env::var("NO_COLOR").is_err() && std::env::var("TERM").map(|term| term != "dumb").unwrap_or(true)
    }

    fn colorize(&self, text: &str, color: Color) -> ColoredString {
        if self.options.enable_color {
            text.color(color)
        } else {
            text.normal()
        }
    }

    fn bold(&self, text: &str) -> ColoredString {
        if self.options.enable_color {
            text.bold()
        } else {
            text.normal()
        }
    }

    fn latency(&self, value: f64) -> ColoredString {
        self.colorize(&ms(value), level_color(LatencyLevel::from_millis(value)))
    }

    fn section(&self, title: &str) -> String {
        self.bold(title).color(self.color_scheme.header).to_string()
    }

    /// Color a rendered table: borders muted, header bold, data rows by level.
    /// Coloring whole lines keeps column alignment intact.
    fn colorize_table(&self, table: &str, levels: &[LatencyLevel]) -> String {
        let mut data_rows = levels.iter();
        let mut header_done = false;
        table
            .lines()
            .map(|line| {
                if line.starts_with('+') {
                    self.colorize(line, self.color_scheme.muted).to_string()
                } else if !header_done {
                    header_done = true;
                    self.bold(line).to_string()
                } else {
                    match data_rows.next() {
                        Some(level) => self.colorize(line, level_color(*level)).to_string(),
                        None => line.to_string(),
                    }
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl OutputFormatter for ColoredFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let border = "═".repeat(title.chars().count() + 4);
        let mut output = String::new();
        writeln!(output, "{}", self.colorize(&border, self.color_scheme.muted)).map_err(fmt_err)?;
        writeln!(output, "  {}", self.section(title)).map_err(fmt_err)?;
        write!(output, "{}", self.colorize(&border, self.color_scheme.muted)).map_err(fmt_err)?;
        Ok(output)
    }

    fn format_result(&self, result: &ProbeResult) -> Result<String> {
        let s = &result.statistics;
        let mut output = String::new();
        writeln!(
            output,
            "{} {}",
            self.section(result.kind.label()),
            self.colorize(&format!("-> {}", result.target), self.color_scheme.info)
        )
        .map_err(fmt_err)?;
        writeln!(output, "  Samples: {}", s.count).map_err(fmt_err)?;
        for (label, value) in [
            ("Min:    ", s.min),
            ("Max:    ", s.max),
            ("Mean:   ", s.mean),
            ("Median: ", s.median),
        ] {
            writeln!(output, "  {} {}", label, self.latency(value)).map_err(fmt_err)?;
        }
        writeln!(output, "  StdDev:  {}", ms(s.std_dev)).map_err(fmt_err)?;
        for (label, value) in [("P50:    ", s.p50), ("P90:    ", s.p90), ("P95:    ", s.p95)] {
            writeln!(output, "  {} {}", label, self.latency(value)).map_err(fmt_err)?;
        }
        write!(output, "  P99:     {}", self.latency(s.p99)).map_err(fmt_err)?;
        if let Some(p999) = s.p999 {
            write!(output, "\n  P99.9:   {}", self.latency(p999)).map_err(fmt_err)?;
        }
        for line in anomaly_lines(result) {
            write!(output, "\n  {} {}", self.colorize("!", self.color_scheme.warning), line).map_err(fmt_err)?;
        }
        Ok(output)
    }

    fn format_comparison(&self, report: &ComparisonReport) -> Result<String> {
        let mut output = String::new();
        writeln!(
            output,
            "{}",
            self.section(&format!("Latency comparison for {} (sorted by p99)", report.host))
        )
        .map_err(fmt_err)?;

        if report.is_empty() {
            write!(output, "{}", self.colorize("No probe produced results.", self.color_scheme.muted))
                .map_err(fmt_err)?;
        } else {
            let ranked = report.ranked();
            let rows: Vec<RowData> = ranked
                .iter()
                .map(|e| {
                    vec![
                        e.kind.label().to_string(),
                        e.count.to_string(),
                        ms(e.mean),
                        ms(e.p50),
                        ms(e.p99),
                        e.lost.to_string(),
                    ]
                })
                .collect();
            let levels: Vec<LatencyLevel> = ranked.iter().map(|e| LatencyLevel::from_millis(e.p99)).collect();
            let table = render_table(&COMPARISON_COLUMNS, &rows, self.options.table_borders);
            write!(output, "{}", self.colorize_table(&table, &levels)).map_err(fmt_err)?;
        }

        for failure in &report.failures {
            write!(
                output,
                "\n{} {}",
                self.colorize(&format!("{} failed [{}]:", failure.kind, failure.category), self.color_scheme.error),
                failure.message
            )
            .map_err(fmt_err)?;
        }
        Ok(output)
    }

    fn format_sweep(&self, report: &SweepReport) -> Result<String> {
        let mut output = String::new();

        if let Some(meta) = &report.instance {
            writeln!(output, "{}", self.section("Instance")).map_err(fmt_err)?;
            for (label, value) in instance_lines(meta) {
                writeln!(output, "  {:<18} {}", label, value).map_err(fmt_err)?;
            }
            writeln!(output).map_err(fmt_err)?;
        }

        for entry in &report.entries {
            writeln!(
                output,
                "{} {}",
                self.section(&entry.name),
                self.colorize(&format!("({})", entry.host), self.color_scheme.muted)
            )
            .map_err(fmt_err)?;
            if !entry.addresses.is_empty() {
                let addresses: Vec<String> = entry.addresses.iter().map(|a| a.to_string()).collect();
                writeln!(output, "  DNS:  {}", addresses.join(", ")).map_err(fmt_err)?;
            }
            if let Some(tcp) = &entry.tcp {
                writeln!(
                    output,
                    "  TCP:  avg {} min {} max {}",
                    self.latency(tcp.mean),
                    ms(tcp.min),
                    ms(tcp.max)
                )
                .map_err(fmt_err)?;
            }
            if let Some(http) = &entry.http {
                writeln!(output, "  HTTP: avg {} p99 {}", self.latency(http.mean), self.latency(http.p99))
                    .map_err(fmt_err)?;
            }
            for error in &entry.errors {
                writeln!(output, "  {}", self.colorize(&format!("Error: {}", error), self.color_scheme.error))
                    .map_err(fmt_err)?;
            }
            if self.options.verbose_mode {
                if let Some(path) = &entry.path_report {
                    writeln!(output, "{}", self.colorize(path.trim_end(), self.color_scheme.muted)).map_err(fmt_err)?;
                }
            }
        }

        write!(output, "\n{}", self.section("TCP latency (avg)")).map_err(fmt_err)?;
        let ranking = report.tcp_ranking();
        if ranking.is_empty() {
            write!(output, "\n  {}", self.colorize("no endpoint answered", self.color_scheme.muted)).map_err(fmt_err)?;
        }
        for (name, mean) in ranking {
            write!(output, "\n  {:<16} {}", name, self.latency(mean)).map_err(fmt_err)?;
        }
        Ok(output)
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("✗", self.color_scheme.error), self.colorize(error, self.color_scheme.error)))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("!", self.color_scheme.warning), self.colorize(warning, self.color_scheme.warning)))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("✓", self.color_scheme.success), self.colorize(message, self.color_scheme.success)))
    }
}
