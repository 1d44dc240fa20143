//! Latency sample accumulation and summary statistics

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Minimum number of samples required before statistics are computed
pub const MIN_SAMPLES: usize = 2;

/// Sample count from which p99.9 is reported
pub const P999_MIN_SAMPLES: usize = 1000;

/// Ordered, append-only container of latency samples in milliseconds.
///
/// Samples may be negative for event-time probes when clocks are skewed.
/// Probes replace the whole accumulator at the warmup boundary rather than
/// clearing it, so warmup samples can never leak into a report.
#[derive(Debug, Clone, Default)]
pub struct StatisticsAccumulator {
    samples: Vec<f64>,
}

/// Summary statistics over a set of latency samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStatistics {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    /// Only reported once there are enough samples for it to mean something
    pub p999: Option<f64>,
}

impl StatisticsAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self { samples: Vec::new() }
    }

    /// Create an empty accumulator with room for `capacity` samples
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Append one sample
    pub fn add(&mut self, sample_ms: f64) {
        self.samples.push(sample_ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in insertion order
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Consume the accumulator, yielding the raw samples
    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }

    /// Compute summary statistics.
    ///
    /// Fails with a statistics error when fewer than two samples were recorded.
    /// Percentiles use the nearest-rank rule on the sorted samples with
    /// `index = floor(p / 100 * n)` clamped to the last element.
    pub fn compute(&self) -> Result<LatencyStatistics> {
        let n = self.samples.len();
        if n < MIN_SAMPLES {
            return Err(AppError::statistics(format!(
                "insufficient samples: got {}, need at least {}",
                n, MIN_SAMPLES
            )));
        }

        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        Ok(LatencyStatistics {
            count: n,
            min: sorted[0],
            max: sorted[n - 1],
            mean,
            median,
            std_dev: population_std_dev(&sorted, mean),
            p50: nearest_rank(&sorted, 50.0),
            p90: nearest_rank(&sorted, 90.0),
            p95: nearest_rank(&sorted, 95.0),
            p99: nearest_rank(&sorted, 99.0),
            p999: (n >= P999_MIN_SAMPLES).then(|| nearest_rank(&sorted, 99.9)),
        })
    }

    /// Render a titled summary block, or a short notice when there is not
    /// enough data
    pub fn format_summary(&self, title: &str) -> String {
        match self.compute() {
            Ok(stats) => stats.format_summary(title),
            Err(_) => format!("{}\n  Insufficient samples ({})", title, self.samples.len()),
        }
    }
}

impl LatencyStatistics {
    /// Render the statistics as an indented text block
    pub fn format_summary(&self, title: &str) -> String {
        let mut out = String::new();
        out.push_str(title);
        out.push('\n');
        out.push_str(&format!("  Samples: {}\n", self.count));
        out.push_str(&format!("  Min:     {:.3} ms\n", self.min));
        out.push_str(&format!("  Max:     {:.3} ms\n", self.max));
        out.push_str(&format!("  Mean:    {:.3} ms\n", self.mean));
        out.push_str(&format!("  Median:  {:.3} ms\n", self.median));
        out.push_str(&format!("  StdDev:  {:.3} ms\n", self.std_dev));
        out.push_str(&format!("  P50:     {:.3} ms\n", self.p50));
        out.push_str(&format!("  P90:     {:.3} ms\n", self.p90));
        out.push_str(&format!("  P95:     {:.3} ms\n", self.p95));
        out.push_str(&format!("  P99:     {:.3} ms", self.p99));
        if let Some(p999) = self.p999 {
            out.push_str(&format!("\n  P99.9:   {:.3} ms", p999));
        }
        out
    }
}

/// Nearest-rank percentile over an already sorted, non-empty slice
pub(crate) fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    let n = sorted.len();
    let index = ((percentile / 100.0) * n as f64).floor() as usize;
    sorted[index.min(n - 1)]
}

fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
