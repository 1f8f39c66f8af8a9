//! Diagnostic records for offline analysis.
//!
//! Every rank may write a [`RankReport`] to its own file; the root prints one
//! [`Summary`] after assembly. Nothing in the library reads these back.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What one rank did during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankReport {
    /// Rank that wrote the record.
    pub rank: i32,
    /// Group size.
    pub size: i32,
    /// Work units this rank computed.
    pub units: u64,
    /// Local elapsed time in seconds.
    pub elapsed: f64,
    /// Rank-local estimate, when the workload has one (e.g. a local pi).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_value: Option<f64>,
}

impl RankReport {
    /// File name of `rank`'s record.
    pub fn file_name(rank: i32) -> String {
        format!("rank_{rank:05}.json")
    }

    /// Write the record into `dir` and return its path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(Self::file_name(self.rank));
        fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        debug!(rank = self.rank, path = %path.display(), "rank report written");
        Ok(path)
    }

    /// Read a record written by [`write_to`](Self::write_to).
    pub fn read_from(path: &Path) -> Result<Self> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }
}

/// Root-only summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Name of the workload.
    pub workload: String,
    /// Final aggregate value (estimate, checksum, …).
    pub value: f64,
    /// Work units in the domain.
    pub units: u64,
    /// Ranks that took part.
    pub ranks: i32,
    /// Slowest rank's elapsed time in seconds.
    pub elapsed: f64,
    /// Millions of kernel operations per second of `elapsed`.
    pub throughput_mops: f64,
}

impl Summary {
    /// Build a summary; `ops_per_unit` scales units into kernel operations.
    pub fn new(
        workload: impl Into<String>,
        value: f64,
        units: u64,
        ranks: i32,
        elapsed: f64,
        ops_per_unit: f64,
    ) -> Self {
        Summary {
            workload: workload.into(),
            value,
            units,
            ranks,
            elapsed,
            throughput_mops: throughput_mops(units, ops_per_unit, elapsed),
        }
    }
}

/// `ops_per_unit * units / elapsed / 1e6`, or 0 for a zero-length run.
pub fn throughput_mops(units: u64, ops_per_unit: f64, elapsed: f64) -> f64 {
    if elapsed > 0.0 {
        ops_per_unit * units as f64 / elapsed / 1e6
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_rank_indexed() {
        assert_eq!(RankReport::file_name(0), "rank_00000.json");
        assert_eq!(RankReport::file_name(123), "rank_00123.json");
    }

    #[test]
    fn report_survives_a_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let report = RankReport {
            rank: 7,
            size: 8,
            units: 1250,
            elapsed: 0.125,
            local_value: Some(3.1408),
        };
        let path = report.write_to(dir.path()).unwrap();
        assert!(path.ends_with("rank_00007.json"));
        assert_eq!(RankReport::read_from(&path).unwrap(), report);
    }

    #[test]
    fn absent_local_value_is_omitted() {
        let report = RankReport {
            rank: 0,
            size: 1,
            units: 0,
            elapsed: 0.0,
            local_value: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("local_value"));
    }

    #[test]
    fn throughput_counts_operations() {
        // 2 ops per sample, 1e6 samples in 0.5 s -> 4 Mop/s.
        let summary = Summary::new("pi", 3.14, 1_000_000, 4, 0.5, 2.0);
        assert!((summary.throughput_mops - 4.0).abs() < 1e-12);
        assert_eq!(throughput_mops(10, 1.0, 0.0), 0.0);
    }
}
