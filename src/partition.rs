//! Static assignment of work units to ranks.
//!
//! Both strategies are pure functions of `(strategy, N, rank, size)`: every rank
//! computes its own share without communicating, and any rank can compute any
//! other rank's share (the result assembler relies on this to put gathered
//! buffers back in unit order).
//!
//! | Strategy | Rank `r` owns                                   | Layout        |
//! |----------|-------------------------------------------------|---------------|
//! | Block    | `[r*base + min(r, rem), …)`, `base` or `base+1` | contiguous    |
//! | Cyclic   | `{r, r+size, r+2*size, …} ∩ [0, N)`             | strided       |
//!
//! with `base = N / size` and `rem = N % size`. In both cases the first `rem`
//! ranks own one extra unit, so per-rank counts never differ by more than one.

use crate::error::{Error, Result};
use crate::topology::Topology;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Index of one independently computable piece of the domain.
pub type WorkUnit = u64;

/// Rule mapping work units to ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// Contiguous ranges, remainder spread over the lowest ranks.
    #[default]
    Block,
    /// Round-robin: unit `u` belongs to rank `u % size`.
    Cyclic,
}

impl Strategy {
    /// Number of units rank `rank` owns. `size` must be positive.
    pub(crate) fn count(self, domain: u64, rank: u64, size: u64) -> u64 {
        // Block and cyclic hand the remainder to the same ranks.
        domain / size + u64::from(rank < domain % size)
    }

    /// Rank that owns `unit`. Requires `unit < domain` and a positive `size`.
    pub(crate) fn owner(self, unit: WorkUnit, domain: u64, size: u64) -> u64 {
        match self {
            Strategy::Cyclic => unit % size,
            Strategy::Block => {
                let base = domain / size;
                let rem = domain % size;
                let wide = (base + 1) * rem;
                if unit < wide {
                    unit / (base + 1)
                } else {
                    rem + (unit - wide) / base
                }
            }
        }
    }

    /// Offset of `unit` inside its owner's local sequence. Same requirements
    /// as [`owner`](Self::owner).
    pub(crate) fn local_offset(self, unit: WorkUnit, domain: u64, size: u64) -> u64 {
        match self {
            Strategy::Cyclic => unit / size,
            Strategy::Block => unit - block_start(domain, self.owner(unit, domain, size), size),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Block => f.pad("block"),
            Strategy::Cyclic => f.pad("cyclic"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" | "contiguous" => Ok(Strategy::Block),
            "cyclic" | "round-robin" => Ok(Strategy::Cyclic),
            other => Err(format!("unknown partition strategy '{other}'")),
        }
    }
}

fn block_start(domain: u64, rank: u64, size: u64) -> u64 {
    rank * (domain / size) + rank.min(domain % size)
}

/// The work units one rank owns under a strategy.
///
/// # Example
///
/// ```
/// use ferrodist::{Partition, Strategy, Topology};
///
/// let topo = Topology::new(1, 3).unwrap();
/// let part = Partition::new(Strategy::Block, 10, &topo).unwrap();
/// assert_eq!(part.units().collect::<Vec<_>>(), vec![4, 5, 6]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    strategy: Strategy,
    domain: u64,
    rank: u64,
    size: u64,
}

impl Partition {
    /// Partition a domain of `domain` units for the rank described by `topology`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopology`] if `domain` is negative.
    pub fn new(strategy: Strategy, domain: i64, topology: &Topology) -> Result<Self> {
        let domain = u64::try_from(domain).map_err(|_| {
            Error::InvalidTopology(format!("domain size must be non-negative, got {domain}"))
        })?;
        Ok(Partition::with_domain(strategy, domain, topology))
    }

    /// Partition an unsigned domain; cannot fail.
    pub fn with_domain(strategy: Strategy, domain: u64, topology: &Topology) -> Self {
        Partition {
            strategy,
            domain,
            rank: topology.rank() as u64,
            size: topology.size() as u64,
        }
    }

    /// Strategy this partition was built with.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Total number of units in the domain.
    pub fn domain(&self) -> u64 {
        self.domain
    }

    /// Number of units this rank owns.
    pub fn len(&self) -> u64 {
        self.strategy.count(self.domain, self.rank, self.size)
    }

    /// `true` if this rank owns nothing (legal when `N < size`).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owned units in ascending order.
    pub fn units(&self) -> Units {
        let (next, step) = match self.strategy {
            Strategy::Block => (block_start(self.domain, self.rank, self.size), 1),
            Strategy::Cyclic => (self.rank, self.size),
        };
        Units {
            next,
            step,
            remaining: self.len(),
        }
    }

    /// Rank that owns `unit`, or `None` if `unit` is outside the domain.
    pub fn owner(&self, unit: WorkUnit) -> Option<i32> {
        (unit < self.domain).then(|| self.strategy.owner(unit, self.domain, self.size) as i32)
    }

    /// Position of `unit` in its owner's [`units`](Self::units), or `None`
    /// if `unit` is outside the domain.
    pub fn local_offset(&self, unit: WorkUnit) -> Option<u64> {
        (unit < self.domain).then(|| self.strategy.local_offset(unit, self.domain, self.size))
    }

    /// `true` if `unit` belongs to this rank.
    pub fn contains(&self, unit: WorkUnit) -> bool {
        unit < self.domain && self.strategy.owner(unit, self.domain, self.size) == self.rank
    }

    /// Contiguous range owned by this rank, for block partitions only.
    pub fn block_range(&self) -> Option<Range<u64>> {
        match self.strategy {
            Strategy::Block => {
                let start = block_start(self.domain, self.rank, self.size);
                Some(start..start + self.len())
            }
            Strategy::Cyclic => None,
        }
    }

    /// Unit counts of every rank, in rank order.
    pub fn counts(&self) -> Vec<u64> {
        (0..self.size)
            .map(|r| self.strategy.count(self.domain, r, self.size))
            .collect()
    }

    /// The same partitioning seen from another rank.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRank`] if `rank` is not in `[0, size)`.
    pub fn for_rank(&self, rank: i32) -> Result<Partition> {
        if !(0..self.size as i64).contains(&i64::from(rank)) {
            return Err(Error::InvalidRank {
                rank,
                size: self.size as i32,
            });
        }
        Ok(Partition {
            rank: rank as u64,
            ..*self
        })
    }
}

/// Iterator over a [`Partition`]'s units.
#[derive(Debug, Clone)]
pub struct Units {
    next: u64,
    step: u64,
    remaining: u64,
}

impl Iterator for Units {
    type Item = WorkUnit;

    fn next(&mut self) -> Option<WorkUnit> {
        if self.remaining == 0 {
            return None;
        }
        let unit = self.next;
        self.remaining -= 1;
        self.next += self.step;
        Some(unit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Units {}

/// Units owned by `rank` in a group of `size` ranks.
///
/// # Errors
///
/// Returns [`Error::InvalidTopology`] if `size <= 0`, `rank` is outside
/// `[0, size)` or `domain < 0`. These are checked before any communication.
pub fn partition(strategy: Strategy, domain: i64, rank: i32, size: i32) -> Result<Vec<WorkUnit>> {
    let topology = Topology::new(rank, size)?;
    Ok(Partition::new(strategy, domain, &topology)?.units().collect())
}
