//! Launcher environment detection.
//!
//! Rank and size are assigned by whatever started the processes. These helpers
//! read the variables common launchers export so a binary can tell whether it
//! was started as one rank of a multi-process job. They return `None` when the
//! variables are absent (e.g. when run directly from a shell).
//!
//! # Environment Variables
//!
//! | Launcher | Rank variable          | Size variable          |
//! |----------|------------------------|------------------------|
//! | Open MPI | `OMPI_COMM_WORLD_RANK` | `OMPI_COMM_WORLD_SIZE` |
//! | Hydra/PMI| `PMI_RANK`             | `PMI_SIZE`             |
//! | SLURM    | `SLURM_PROCID`         | `SLURM_NTASKS`         |

use crate::error::Result;
use crate::topology::Topology;
use std::env;
use std::fmt;

/// Which launcher exported the rank variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launcher {
    /// `mpirun`/`mpiexec` from Open MPI
    OpenMpi,
    /// MPICH's Hydra or another PMI-based launcher
    Pmi,
    /// `srun`
    Slurm,
}

impl fmt::Display for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Launcher::OpenMpi => f.write_str("Open MPI"),
            Launcher::Pmi => f.write_str("PMI"),
            Launcher::Slurm => f.write_str("SLURM"),
        }
    }
}

/// Rank and size as reported by a launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchInfo {
    /// Launcher that provided the values.
    pub launcher: Launcher,
    /// This process's rank.
    pub rank: i32,
    /// Number of processes in the job.
    pub size: i32,
}

impl LaunchInfo {
    /// Validated topology for this process.
    pub fn topology(&self) -> Result<Topology> {
        Topology::new(self.rank, self.size)
    }
}

// MPI launchers are checked first: they may run inside a SLURM allocation.
const PROBES: [(Launcher, &str, &str); 3] = [
    (Launcher::OpenMpi, "OMPI_COMM_WORLD_RANK", "OMPI_COMM_WORLD_SIZE"),
    (Launcher::Pmi, "PMI_RANK", "PMI_SIZE"),
    (Launcher::Slurm, "SLURM_PROCID", "SLURM_NTASKS"),
];

/// Detect a launcher from the process environment.
pub fn detect() -> Option<LaunchInfo> {
    detect_with(|key| env::var(key).ok())
}

/// Detect a launcher using `lookup` in place of the environment.
pub fn detect_with(lookup: impl Fn(&str) -> Option<String>) -> Option<LaunchInfo> {
    PROBES.iter().find_map(|&(launcher, rank_var, size_var)| {
        let rank = lookup(rank_var)?.trim().parse().ok()?;
        let size = lookup(size_var)?.trim().parse().ok()?;
        Some(LaunchInfo {
            launcher,
            rank,
            size,
        })
    })
}

/// Get the SLURM job ID.
pub fn job_id() -> Option<String> {
    env::var("SLURM_JOB_ID").ok()
}

/// Get the name of the compute node this process is running on.
pub fn node_name() -> Option<String> {
    env::var("SLURMD_NODENAME")
        .or_else(|_| env::var("HOSTNAME"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn nothing_set_means_no_launcher() {
        assert_eq!(detect_with(lookup(&[])), None);
    }

    #[test]
    fn open_mpi_variables_are_read() {
        let info = detect_with(lookup(&[
            ("OMPI_COMM_WORLD_RANK", "3"),
            ("OMPI_COMM_WORLD_SIZE", "8"),
        ]))
        .unwrap();
        assert_eq!(info.launcher, Launcher::OpenMpi);
        assert_eq!(info.topology().unwrap(), Topology::new(3, 8).unwrap());
    }

    #[test]
    fn mpi_launcher_wins_inside_slurm_allocation() {
        let info = detect_with(lookup(&[
            ("SLURM_PROCID", "0"),
            ("SLURM_NTASKS", "1"),
            ("PMI_RANK", "5"),
            ("PMI_SIZE", "6"),
        ]))
        .unwrap();
        assert_eq!(info.launcher, Launcher::Pmi);
        assert_eq!((info.rank, info.size), (5, 6));
    }

    #[test]
    fn half_set_or_garbage_is_skipped() {
        assert_eq!(detect_with(lookup(&[("PMI_RANK", "1")])), None);
        let info = detect_with(lookup(&[
            ("OMPI_COMM_WORLD_RANK", "x"),
            ("OMPI_COMM_WORLD_SIZE", "2"),
            ("SLURM_PROCID", " 1 "),
            ("SLURM_NTASKS", "4"),
        ]))
        .unwrap();
        assert_eq!(info.launcher, Launcher::Slurm);
        assert_eq!(info.rank, 1);
    }

    #[test]
    fn inconsistent_values_fail_validation() {
        let info = detect_with(lookup(&[("PMI_RANK", "4"), ("PMI_SIZE", "4")])).unwrap();
        assert!(info.topology().is_err());
    }
}
