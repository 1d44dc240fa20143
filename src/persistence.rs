//! JSON records of probe results

use crate::error::{AppError, Result};
use crate::models::{ProbeResult, SweepReport};
use crate::stats::LatencyStatistics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk shape of one probe run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub timestamp: DateTime<Utc>,
    pub probe: String,
    pub target: String,
    pub statistics: LatencyStatistics,
    pub raw_samples: Vec<f64>,
    pub attempted: usize,
    pub lost: usize,
    pub stray_pongs: usize,
    pub malformed_messages: usize,
    pub clock_skew_warning: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl From<&ProbeResult> for ProbeRecord {
    fn from(result: &ProbeResult) -> Self {
        Self {
            timestamp: Utc::now(),
            probe: result.kind.slug().to_string(),
            target: result.target.clone(),
            statistics: result.statistics.clone(),
            raw_samples: result.samples.clone(),
            attempted: result.attempted,
            lost: result.lost,
            stray_pongs: result.stray_pongs,
            malformed_messages: result.malformed_messages,
            clock_skew_warning: result.clock_skew_warning,
            started_at: result.started_at,
            completed_at: result.completed_at,
        }
    }
}

/// Writes timestamped JSON files into one directory
#[derive(Debug, Clone)]
pub struct ResultWriter {
    dir: PathBuf,
}

impl ResultWriter {
    /// Writer for `dir`, created on first write if missing
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `result` to `<dir>/<name>_<unix_ts>.json` and return the path
    pub fn write(&self, result: &ProbeResult, name: &str) -> Result<PathBuf> {
        self.write_json(&ProbeRecord::from(result), name)
    }

    /// Write a sweep report to `<dir>/<name>_<unix_ts>.json`
    pub fn write_sweep(&self, report: &SweepReport, name: &str) -> Result<PathBuf> {
        self.write_json(report, name)
    }

    fn write_json<T: Serialize>(&self, value: &T, name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::io(format!("Failed to create output directory {}: {}", self.dir.display(), e))
        })?;

        let path = self.unique_path(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).map_err(|e| AppError::io(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(path)
    }

    /// Same-second writes of the same name get a numeric suffix
    fn unique_path(&self, name: &str) -> PathBuf {
        let stem = format!("{}_{}", sanitize(name), Utc::now().timestamp());
        let mut path = self.dir.join(format!("{}.json", stem));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{}_{}.json", stem, n));
            n += 1;
        }
        path
    }
}

/// Load a record written by [`ResultWriter::write`]
pub fn read_record(path: &Path) -> Result<ProbeRecord> {
    let text = fs::read_to_string(path).map_err(|e| AppError::io(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(serde_json::from_str(&text)?)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatisticsAccumulator;
    use crate::types::ProbeKind;
    use tempfile::TempDir;

    fn sample_result() -> ProbeResult {
        let mut acc = StatisticsAccumulator::new();
        for v in [1.5, 2.5, 3.5] {
            acc.add(v);
        }
        ProbeResult::from_accumulator(ProbeKind::WsPingPong, "wss://stream.binance.com:9443/ws", acc, Utc::now())
            .unwrap()
            .with_lost(1)
    }

    #[test]
    fn test_write_probe_record() {
        let dir = TempDir::new().unwrap();
        let writer = ResultWriter::new(dir.path().join("results"));

        let path = writer.write(&sample_result(), "ws_ping").unwrap();
        let file_name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with("ws_ping_"));
        assert!(file_name.ends_with(".json"));

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value.get("timestamp").is_some());
        assert_eq!(value["probe"], "ws_ping");
        assert_eq!(value["statistics"]["count"], 3);
        assert_eq!(value["raw_samples"].as_array().unwrap().len(), 3);
        assert_eq!(value["lost"], 1);
    }

    #[test]
    fn test_same_second_writes_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let writer = ResultWriter::new(dir.path());

        let first = writer.write(&sample_result(), "tcp").unwrap();
        let second = writer.write(&sample_result(), "tcp").unwrap();
        assert_ne!(first, second);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_read_record_round_trip() {
        let dir = TempDir::new().unwrap();
        let writer = ResultWriter::new(dir.path());
        let path = writer.write(&sample_result(), "ws ping/eu").unwrap();

        assert!(path.file_name().unwrap().to_string_lossy().starts_with("ws_ping_eu_"));
        let record = read_record(&path).unwrap();
        assert_eq!(record.raw_samples, vec![1.5, 2.5, 3.5]);
        assert_eq!(record.target, "wss://stream.binance.com:9443/ws");
    }

    #[test]
    fn test_write_sweep_report() {
        let dir = TempDir::new().unwrap();
        let writer = ResultWriter::new(dir.path());
        let path = writer.write_sweep(&SweepReport::new(), "sweep").unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert!(value["entries"].as_array().unwrap().is_empty());
    }
}
