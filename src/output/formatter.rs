//! Formatting trait and the plain-text implementation
//!
//! Formatters render probe results, the p99 comparison and sweep reports as
//! text. They never print; the caller decides where output goes.

use crate::{
    error::{AppError, Result},
    models::{ComparisonReport, InstanceMetadata, ProbeResult, SweepReport},
};
use std::fmt::Write as _;

/// Renders probe output for the console
pub trait OutputFormatter: Send + Sync {
    fn format_header(&self, title: &str) -> Result<String>;

    /// Full statistics block for one probe result
    fn format_result(&self, result: &ProbeResult) -> Result<String>;

    /// Probes ranked by p99, followed by any failures
    fn format_comparison(&self, report: &ComparisonReport) -> Result<String>;

    /// Per-endpoint sweep listing and the average TCP latency ranking
    fn format_sweep(&self, report: &SweepReport) -> Result<String>;

    fn format_error(&self, error: &str) -> Result<String>;

    fn format_warning(&self, warning: &str) -> Result<String>;

    fn format_success(&self, message: &str) -> Result<String>;
}

/// Formatting switches shared by all formatters
#[derive(Debug, Clone)]
pub struct FormattingOptions {
    pub enable_color: bool,
    /// Include path analysis output and per-entry errors in sweeps
    pub verbose_mode: bool,
    pub table_borders: bool,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            enable_color: true,
            verbose_mode: false,
            table_borders: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alignment {
    Left,
    Right,
}

/// Column of a text table
#[derive(Debug, Clone)]
pub struct Column {
    pub header: &'static str,
    pub alignment: Alignment,
    pub min_width: usize,
}

impl Column {
    pub const fn left(header: &'static str, min_width: usize) -> Self {
        Self { header, alignment: Alignment::Left, min_width }
    }

    pub const fn right(header: &'static str, min_width: usize) -> Self {
        Self { header, alignment: Alignment::Right, min_width }
    }
}

pub type RowData = Vec<String>;

/// Render `rows` under `columns`, widening columns to fit their content
pub(crate) fn render_table(columns: &[Column], rows: &[RowData], borders: bool) -> String {
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            rows.iter()
                .filter_map(|row| row.get(idx))
                .map(|cell| cell.chars().count())
                .chain([col.header.len(), col.min_width])
                .max()
                .unwrap_or(col.min_width)
        })
        .collect();

    let border = || {
        let mut line = String::from("+");
        for width in &widths {
            line.push_str(&"-".repeat(width + 2));
            line.push('+');
        }
        line
    };

    let render_row = |cells: &[String]| {
        let mut line = String::new();
        if borders {
            line.push('|');
        }
        for ((cell, col), width) in cells.iter().zip(columns).zip(&widths) {
            let pad = width.saturating_sub(cell.chars().count());
            let padded = match col.alignment {
                Alignment::Left => format!("{}{}", cell, " ".repeat(pad)),
                Alignment::Right => format!("{}{}", " ".repeat(pad), cell),
            };
            if borders {
                line.push_str(&format!(" {} |", padded));
            } else {
                line.push_str(&padded);
                line.push_str("  ");
            }
        }
        line.trim_end().to_string()
    };

    let mut out = String::new();
    let headers: Vec<String> = columns.iter().map(|c| c.header.to_string()).collect();
    if borders {
        out.push_str(&border());
        out.push('\n');
    }
    out.push_str(&render_row(&headers));
    out.push('\n');
    if borders {
        out.push_str(&border());
        out.push('\n');
    }
    for row in rows {
        out.push_str(&render_row(row));
        out.push('\n');
    }
    if borders {
        out.push_str(&border());
    }
    out.trim_end().to_string()
}

pub(crate) const COMPARISON_COLUMNS: [Column; 6] = [
    Column::left("Probe", 20),
    Column::right("Samples", 7),
    Column::right("Mean", 10),
    Column::right("P50", 10),
    Column::right("P99", 10),
    Column::right("Lost", 4),
];

pub(crate) fn ms(value: f64) -> String {
    format!("{:.3}ms", value)
}

pub(crate) fn fmt_err(e: std::fmt::Error) -> AppError {
    AppError::internal(format!("Failed to format output: {}", e))
}

/// Extra lines describing anomalies of one result
pub(crate) fn anomaly_lines(result: &ProbeResult) -> Vec<String> {
    let mut lines = Vec::new();
    if result.lost > 0 {
        lines.push(format!(
            "{} of {} attempts lost ({:.1}%)",
            result.lost,
            result.attempted,
            result.loss_rate()
        ));
    }
    if result.stray_pongs > 0 {
        lines.push(format!("{} unmatched pong(s) received", result.stray_pongs));
    }
    if result.malformed_messages > 0 {
        lines.push(format!("{} malformed message(s) dropped", result.malformed_messages));
    }
    if result.clock_skew_warning {
        lines.push("Large negative latencies seen; check clock synchronization (NTP/chrony)".to_string());
    }
    lines
}

pub(crate) fn instance_lines(meta: &InstanceMetadata) -> Vec<(&'static str, String)> {
    let na = |v: &Option<String>| v.clone().unwrap_or_else(|| "N/A".to_string());
    vec![
        ("Instance ID", na(&meta.instance_id)),
        ("Instance type", na(&meta.instance_type)),
        ("Availability zone", na(&meta.availability_zone)),
        ("Local IPv4", na(&meta.local_ipv4)),
        ("Public IPv4", na(&meta.public_ipv4)),
        ("VPC", na(&meta.vpc_id)),
        ("Subnet", na(&meta.subnet_id)),
    ]
}

/// Plain text formatter for logs, pipes and `--no-color`
pub struct PlainFormatter {
    options: FormattingOptions,
}

impl PlainFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }
}

impl OutputFormatter for PlainFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let border = "=".repeat(title.len() + 4);
        let mut output = String::new();
        writeln!(output, "{}", border).map_err(fmt_err)?;
        writeln!(output, "  {}", title).map_err(fmt_err)?;
        write!(output, "{}", border).map_err(fmt_err)?;
        Ok(output)
    }

    fn format_result(&self, result: &ProbeResult) -> Result<String> {
        let title = format!("{} -> {}", result.kind, result.target);
        let mut output = result.statistics.format_summary(&title);
        for line in anomaly_lines(result) {
            write!(output, "\n  ! {}", line).map_err(fmt_err)?;
        }
        Ok(output)
    }

    fn format_comparison(&self, report: &ComparisonReport) -> Result<String> {
        let mut output = String::new();
        writeln!(output, "Latency comparison for {} (sorted by p99)", report.host).map_err(fmt_err)?;

        if report.is_empty() {
            write!(output, "No probe produced results.").map_err(fmt_err)?;
        } else {
            let rows: Vec<RowData> = report
                .ranked()
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
            write!(output, "{}", render_table(&COMPARISON_COLUMNS, &rows, self.options.table_borders))
                .map_err(fmt_err)?;
        }

        for failure in &report.failures {
            write!(
                output,
                "\n{} failed [{}]: {}",
                failure.kind, failure.category, failure.message
            )
            .map_err(fmt_err)?;
        }
        Ok(output)
    }

    fn format_sweep(&self, report: &SweepReport) -> Result<String> {
        let mut output = String::new();

        if let Some(meta) = &report.instance {
            writeln!(output, "Instance").map_err(fmt_err)?;
            for (label, value) in instance_lines(meta) {
                writeln!(output, "  {:<18} {}", label, value).map_err(fmt_err)?;
            }
            writeln!(output).map_err(fmt_err)?;
        }

        for entry in &report.entries {
            writeln!(output, "{} ({})", entry.name, entry.host).map_err(fmt_err)?;
            let addresses: Vec<String> = entry.addresses.iter().map(|a| a.to_string()).collect();
            if !addresses.is_empty() {
                writeln!(output, "  DNS:  {}", addresses.join(", ")).map_err(fmt_err)?;
            }
            if let Some(tcp) = &entry.tcp {
                writeln!(output, "  TCP:  avg {} min {} max {}", ms(tcp.mean), ms(tcp.min), ms(tcp.max))
                    .map_err(fmt_err)?;
            }
            if let Some(http) = &entry.http {
                writeln!(output, "  HTTP: avg {} p99 {}", ms(http.mean), ms(http.p99)).map_err(fmt_err)?;
            }
            for error in &entry.errors {
                writeln!(output, "  Error: {}", error).map_err(fmt_err)?;
            }
            if self.options.verbose_mode {
                if let Some(path) = &entry.path_report {
                    writeln!(output, "{}", path.trim_end()).map_err(fmt_err)?;
                }
            }
        }

        writeln!(output, "\nTCP latency (avg)").map_err(fmt_err)?;
        let ranking = report.tcp_ranking();
        if ranking.is_empty() {
            write!(output, "  no endpoint answered").map_err(fmt_err)?;
        }
        for (idx, (name, mean)) in ranking.iter().enumerate() {
            if idx > 0 {
                writeln!(output).map_err(fmt_err)?;
            }
            write!(output, "  {:<16} {}", name, ms(*mean)).map_err(fmt_err)?;
        }
        Ok(output)
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("ERROR: {}", error))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("WARNING: {}", warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("OK: {}", message))
    }
}
