//! Folding partial results into one dense, unit-ordered result.
//!
//! The assembler lives on the root (static path) or the coordinator (dynamic
//! path). It accepts rows in any order and refuses anything that would break
//! the "every unit in `[0, N)` exactly once" invariant.

use crate::datatype::Datatype;
use crate::error::{Error, Result};
use crate::partition::{Strategy, WorkUnit};

/// Dense `units × row_len` result ordered by work-unit index.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate<T> {
    units: u64,
    row_len: usize,
    data: Vec<T>,
}

impl<T: Datatype> Aggregate<T> {
    /// Wrap an already-ordered buffer of `units` rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBuffer`] if `data.len()` is not `units * row_len`.
    pub fn from_dense(units: u64, row_len: usize, data: Vec<T>) -> Result<Self> {
        if data.len() as u64 != units * row_len as u64 {
            return Err(Error::InvalidBuffer(format!(
                "{} values cannot form {units} rows of {row_len}",
                data.len()
            )));
        }
        Ok(Aggregate {
            units,
            row_len,
            data,
        })
    }

    /// Number of work units (rows).
    pub fn units(&self) -> u64 {
        self.units
    }

    /// Values per work unit.
    pub fn row_len(&self) -> usize {
        self.row_len
    }

    /// Row produced for `unit`.
    pub fn row(&self, unit: WorkUnit) -> Option<&[T]> {
        if unit >= self.units {
            return None;
        }
        let start = unit as usize * self.row_len;
        Some(&self.data[start..start + self.row_len])
    }

    /// Rows in unit order.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        let len = self.row_len;
        (0..self.units as usize).map(move |i| &self.data[i * len..(i + 1) * len])
    }

    /// All values, row-major.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Take the row-major buffer.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

/// Incremental assembler for rows arriving in arbitrary order.
///
/// # Example
///
/// ```
/// use ferrodist::Assembler;
///
/// let mut asm = Assembler::<f64>::new(3);
/// asm.insert(2, vec![2.0]).unwrap();
/// asm.insert(0, vec![0.0]).unwrap();
/// assert!(asm.insert(2, vec![9.0]).is_err());
/// asm.insert(1, vec![1.0]).unwrap();
/// assert_eq!(asm.finish().unwrap().into_vec(), vec![0.0, 1.0, 2.0]);
/// ```
#[derive(Debug, Clone)]
pub struct Assembler<T> {
    domain: u64,
    row_len: Option<usize>,
    data: Vec<T>,
    filled: Vec<bool>,
    received: u64,
}

impl<T: Datatype> Assembler<T> {
    /// Assembler for a domain of `domain` units.
    pub fn new(domain: u64) -> Self {
        Assembler {
            domain,
            row_len: None,
            data: Vec::new(),
            filled: vec![false; domain as usize],
            received: 0,
        }
    }

    /// Domain size.
    pub fn domain(&self) -> u64 {
        self.domain
    }

    /// Number of distinct units recorded so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// `true` once every unit has been recorded.
    pub fn is_complete(&self) -> bool {
        self.received == self.domain
    }

    /// Record the row for `unit`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnitOutOfRange`] if `unit >= domain`
    /// - [`Error::DuplicateUnit`] if `unit` was already recorded
    /// - [`Error::RowLengthMismatch`] if the row length differs from earlier rows
    pub fn insert(&mut self, unit: WorkUnit, row: Vec<T>) -> Result<()> {
        if unit >= self.domain {
            return Err(Error::UnitOutOfRange {
                unit,
                domain: self.domain,
            });
        }
        if self.filled[unit as usize] {
            return Err(Error::DuplicateUnit(unit));
        }
        let row_len = match self.row_len {
            Some(len) if len != row.len() => {
                return Err(Error::RowLengthMismatch {
                    unit,
                    expected: len,
                    got: row.len(),
                })
            }
            Some(len) => len,
            None => {
                self.row_len = Some(row.len());
                self.data = vec![T::default(); self.domain as usize * row.len()];
                row.len()
            }
        };
        let start = unit as usize * row_len;
        self.data[start..start + row_len].copy_from_slice(&row);
        self.filled[unit as usize] = true;
        self.received += 1;
        Ok(())
    }

    /// Produce the dense result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingUnits`] unless every unit was recorded.
    pub fn finish(self) -> Result<Aggregate<T>> {
        if !self.is_complete() {
            return Err(Error::MissingUnits {
                missing: self.domain - self.received,
                domain: self.domain,
            });
        }
        Ok(Aggregate {
            units: self.domain,
            row_len: self.row_len.unwrap_or(0),
            data: self.data,
        })
    }
}

/// Assemble `(unit, row)` pairs for a domain of `domain` units.
///
/// The key set must be exactly `[0, domain)` and every row the same length.
pub fn assemble<T: Datatype>(
    results: impl IntoIterator<Item = (WorkUnit, Vec<T>)>,
    domain: u64,
) -> Result<Aggregate<T>> {
    let mut assembler = Assembler::new(domain);
    for (unit, row) in results {
        assembler.insert(unit, row)?;
    }
    assembler.finish()
}

/// Restore unit order from a rank-ordered gather of a static partition.
///
/// `gathered` is the concatenation of every rank's rows, each rank listing its
/// units in ascending order, exactly what [`Communicator::gather`] returns when
/// every rank contributes the rows of its [`Partition`](crate::Partition).
///
/// [`Communicator::gather`]: crate::Communicator::gather
pub fn assemble_gathered<T: Datatype>(
    gathered: &[T],
    strategy: Strategy,
    domain: u64,
    size: i32,
    row_len: usize,
) -> Result<Aggregate<T>> {
    if size <= 0 {
        return Err(Error::InvalidTopology(format!(
            "rank count must be positive, got {size}"
        )));
    }
    let expected = domain as usize * row_len;
    if gathered.len() != expected {
        return Err(Error::InvalidBuffer(format!(
            "gathered {} values, expected {expected} ({domain} units of {row_len})",
            gathered.len()
        )));
    }
    if strategy == Strategy::Block {
        // Rank order is already unit order.
        return Aggregate::from_dense(domain, row_len, gathered.to_vec());
    }

    let size = size as u64;
    let mut offsets = Vec::with_capacity(size as usize);
    let mut acc = 0u64;
    for rank in 0..size {
        offsets.push(acc);
        acc += strategy.count(domain, rank, size);
    }
    let mut data = vec![T::default(); expected];
    for unit in 0..domain {
        let owner = strategy.owner(unit, domain, size);
        let src_row = offsets[owner as usize] + strategy.local_offset(unit, domain, size);
        let src = src_row as usize * row_len;
        let dst = unit as usize * row_len;
        data[dst..dst + row_len].copy_from_slice(&gathered[src..src + row_len]);
    }
    Aggregate::from_dense(domain, row_len, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_of_arrival_does_not_matter() {
        let forward = assemble((0..5u64).map(|u| (u, vec![u as f64, -(u as f64)])), 5).unwrap();
        let backward =
            assemble((0..5u64).rev().map(|u| (u, vec![u as f64, -(u as f64)])), 5).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward.row(3), Some(&[3.0, -3.0][..]));
        assert_eq!(forward.row(5), None);
    }

    #[test]
    fn missing_units_are_counted() {
        match assemble(vec![(0u64, vec![1u32]), (2, vec![3])], 4) {
            Err(Error::MissingUnits {
                missing: 2,
                domain: 4,
            }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn duplicates_and_strays_are_rejected() {
        let mut asm = Assembler::<u8>::new(2);
        asm.insert(1, vec![1]).unwrap();
        assert!(matches!(asm.insert(1, vec![1]), Err(Error::DuplicateUnit(1))));
        assert!(matches!(
            asm.insert(2, vec![1]),
            Err(Error::UnitOutOfRange { unit: 2, domain: 2 })
        ));
        assert!(matches!(
            asm.insert(0, vec![1, 2]),
            Err(Error::RowLengthMismatch {
                unit: 0,
                expected: 1,
                got: 2
            })
        ));
        assert_eq!(asm.received(), 1);
    }

    #[test]
    fn empty_domain_assembles_to_nothing() {
        let agg = assemble(Vec::<(u64, Vec<f32>)>::new(), 0).unwrap();
        assert_eq!(agg.units(), 0);
        assert!(agg.as_slice().is_empty());
        assert_eq!(agg.rows().count(), 0);
    }

    #[test]
    fn zero_length_rows_are_allowed() {
        let agg = assemble((0..3u64).map(|u| (u, Vec::<i64>::new())), 3).unwrap();
        assert_eq!(agg.row_len(), 0);
        assert_eq!(agg.rows().count(), 3);
        assert!(agg.rows().all(<[i64]>::is_empty));
    }

    #[test]
    fn cyclic_gather_is_reordered() {
        // N=7 over 3 ranks, cyclic: rank0 {0,3,6}, rank1 {1,4}, rank2 {2,5}.
        let gathered = [0.0, 3.0, 6.0, 1.0, 4.0, 2.0, 5.0];
        let agg = assemble_gathered(&gathered, Strategy::Cyclic, 7, 3, 1).unwrap();
        assert_eq!(agg.into_vec(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn block_gather_is_already_ordered() {
        let gathered: Vec<u32> = (0..12).collect();
        let agg = assemble_gathered(&gathered, Strategy::Block, 6, 4, 2).unwrap();
        assert_eq!(agg.row(5), Some(&[10, 11][..]));
    }

    #[test]
    fn gathered_length_is_checked() {
        assert!(matches!(
            assemble_gathered(&[1.0f64; 5], Strategy::Cyclic, 3, 2, 2),
            Err(Error::InvalidBuffer(_))
        ));
    }
}
