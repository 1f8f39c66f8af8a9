//! Process topology and per-rank roles.

use crate::error::{Error, Result};
use std::fmt;

/// A rank's position in a fixed-size group: `(rank, size)`.
///
/// Created once when a rank starts and passed explicitly to every component
/// that needs it. Always satisfies `0 <= rank < size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topology {
    rank: i32,
    size: i32,
}

impl Topology {
    /// Build a topology, rejecting non-positive sizes and out-of-range ranks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopology`] if `size <= 0` or `rank` is not in `[0, size)`.
    pub fn new(rank: i32, size: i32) -> Result<Self> {
        if size <= 0 {
            return Err(Error::InvalidTopology(format!(
                "rank count must be positive, got {size}"
            )));
        }
        if !(0..size).contains(&rank) {
            return Err(Error::InvalidTopology(format!(
                "rank {rank} outside [0, {size})"
            )));
        }
        Ok(Topology { rank, size })
    }

    /// Zero-based rank of this process.
    pub fn rank(&self) -> i32 {
        self.rank
    }

    /// Number of ranks in the group.
    pub fn size(&self) -> i32 {
        self.size
    }

    /// `true` if this rank is `root`.
    pub fn is_root(&self, root: i32) -> bool {
        self.rank == root
    }

    /// Validate that `rank` names a member of this group.
    pub fn check_rank(&self, rank: i32) -> Result<()> {
        if (0..self.size).contains(&rank) {
            Ok(())
        } else {
            Err(Error::InvalidRank {
                rank,
                size: self.size,
            })
        }
    }

    /// Role of this rank in coordinator/worker scheduling.
    pub fn role(&self, coordinator: i32) -> Role {
        if self.rank == coordinator {
            Role::Coordinator
        } else {
            Role::Worker
        }
    }

    /// Ranks other than `coordinator`, in ascending order.
    pub fn workers(&self, coordinator: i32) -> impl Iterator<Item = i32> {
        (0..self.size).filter(move |&r| r != coordinator)
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.rank, self.size)
    }
}

/// Role a rank plays in dynamic scheduling, chosen once from its [`Topology`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Owns the task queue and collects results.
    Coordinator,
    /// Computes whatever units the coordinator hands it.
    Worker,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_size() {
        assert!(matches!(
            Topology::new(0, 0),
            Err(Error::InvalidTopology(_))
        ));
        assert!(matches!(
            Topology::new(0, -3),
            Err(Error::InvalidTopology(_))
        ));
    }

    #[test]
    fn rejects_rank_outside_group() {
        assert!(Topology::new(3, 3).is_err());
        assert!(Topology::new(-1, 3).is_err());
        assert!(Topology::new(2, 3).is_ok());
    }

    #[test]
    fn role_is_selected_from_rank() {
        let topo = Topology::new(0, 4).unwrap();
        assert_eq!(topo.role(0), Role::Coordinator);
        let topo = Topology::new(3, 4).unwrap();
        assert_eq!(topo.role(0), Role::Worker);
        assert_eq!(topo.role(3), Role::Coordinator);
    }

    #[test]
    fn workers_skip_the_coordinator() {
        let topo = Topology::new(1, 4).unwrap();
        assert_eq!(topo.workers(0).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(topo.workers(2).collect::<Vec<_>>(), vec![0, 1, 3]);
    }

    #[test]
    fn check_rank_reports_size() {
        let topo = Topology::new(0, 2).unwrap();
        match topo.check_rank(5) {
            Err(Error::InvalidRank { rank: 5, size: 2 }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn display_is_rank_over_size() {
        assert_eq!(Topology::new(2, 8).unwrap().to_string(), "2/8");
    }
}
