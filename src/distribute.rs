//! Static path: partition, compute locally, gather, assemble.

use crate::assemble::{assemble_gathered, Aggregate};
use crate::comm::Communicator;
use crate::datatype::Datatype;
use crate::error::{Error, Result};
use crate::kernel::Kernel;
use crate::partition::{Partition, Strategy};
use crate::transport::Transport;
use tracing::{debug, info, warn};

/// What one rank did during a static run.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticOutcome<T> {
    /// This rank's share of the domain.
    pub partition: Partition,
    /// Time this rank spent in its kernel calls, in seconds.
    pub elapsed: f64,
    /// The assembled result; `Some` only where it was delivered.
    pub aggregate: Option<Aggregate<T>>,
}

/// Rows of one rank's partition, concatenated, and their common length.
struct LocalRows<T> {
    values: Vec<T>,
    row_len: Option<usize>,
}

fn compute_partition<T: Datatype, K: Kernel<T>>(
    partition: &Partition,
    kernel: &mut K,
) -> Result<LocalRows<T>> {
    let mut values = Vec::new();
    let mut row_len = None;
    for unit in partition.units() {
        let row = kernel.compute(unit);
        match row_len {
            None => row_len = Some(row.len()),
            Some(expected) if expected != row.len() => {
                return Err(Error::RowLengthMismatch {
                    unit,
                    expected,
                    got: row.len(),
                })
            }
            Some(_) => {}
        }
        values.extend(row);
    }
    Ok(LocalRows { values, row_len })
}

/// Settle the global row length from every rank's local one.
///
/// Ranks with an empty partition report `u64::MAX`.
fn agreed_row_len(lens: &[u64]) -> Result<usize> {
    let mut known = lens.iter().copied().filter(|&l| l != u64::MAX);
    let first = known.next().unwrap_or(0);
    if let Some(other) = known.find(|&l| l != first) {
        return Err(Error::InvalidBuffer(format!(
            "ranks disagree on row length: {first} vs {other}"
        )));
    }
    Ok(first as usize)
}

fn prepare<X: Transport>(
    comm: &Communicator<X>,
    strategy: Strategy,
    domain: u64,
) -> Partition {
    let partition = Partition::with_domain(strategy, domain, &comm.topology());
    if partition.is_empty() && domain > 0 {
        warn!(
            rank = comm.rank(),
            domain,
            size = comm.size(),
            "rank owns no work units"
        );
    }
    debug!(
        rank = comm.rank(),
        %strategy,
        units = partition.len(),
        "static partition"
    );
    partition
}

/// Compute `domain` units split by `strategy` and assemble them at `root`.
///
/// Collective: every rank must call it with the same arguments. The root
/// receives the dense result in unit order regardless of strategy.
///
/// # Example
///
/// ```
/// use ferrodist::{run_static, LocalUniverse, Strategy};
///
/// let out = LocalUniverse::new(3).unwrap().run(|world| {
///     let mut square = |u: u64| vec![(u * u) as f64];
///     run_static(&world, Strategy::Cyclic, 5, &mut square, 0)
/// });
/// let root = out[0].as_ref().unwrap().aggregate.as_ref().unwrap();
/// assert_eq!(root.as_slice(), &[0.0, 1.0, 4.0, 9.0, 16.0]);
/// ```
pub fn run_static<T, K, X>(
    comm: &Communicator<X>,
    strategy: Strategy,
    domain: u64,
    kernel: &mut K,
    root: i32,
) -> Result<StaticOutcome<T>>
where
    T: Datatype,
    K: Kernel<T>,
    X: Transport,
{
    comm.topology().check_rank(root)?;
    let partition = prepare(comm, strategy, domain);

    let (local, elapsed) = comm.timed(|| compute_partition(&partition, kernel))?;
    let local = local?;

    let row_lens = comm.gather(&[local.row_len.map_or(u64::MAX, |l| l as u64)], root)?;
    let gathered = comm.gather(&local.values, root)?;

    let aggregate = match (row_lens, gathered) {
        (Some(lens), Some(values)) => {
            let row_len = agreed_row_len(&lens)?;
            let aggregate = assemble_gathered(&values, strategy, domain, comm.size(), row_len)?;
            info!(units = domain, row_len, "static result assembled");
            Some(aggregate)
        }
        _ => None,
    };

    Ok(StaticOutcome {
        partition,
        elapsed,
        aggregate,
    })
}

/// Like [`run_static`], but every rank receives the assembled result.
///
/// Use when the combined result feeds a further local computation on every
/// rank, e.g. a vector reused in the next product.
pub fn run_static_all<T, K, X>(
    comm: &Communicator<X>,
    strategy: Strategy,
    domain: u64,
    kernel: &mut K,
) -> Result<StaticOutcome<T>>
where
    T: Datatype,
    K: Kernel<T>,
    X: Transport,
{
    let partition = prepare(comm, strategy, domain);

    let (local, elapsed) = comm.timed(|| compute_partition(&partition, kernel))?;
    let local = local?;

    let lens = comm.all_gather(&[local.row_len.map_or(u64::MAX, |l| l as u64)])?;
    let values = comm.all_gather(&local.values)?;
    let row_len = agreed_row_len(&lens)?;
    let aggregate = assemble_gathered(&values, strategy, domain, comm.size(), row_len)?;

    Ok(StaticOutcome {
        partition,
        elapsed,
        aggregate: Some(aggregate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_length_agreement_ignores_idle_ranks() {
        assert_eq!(agreed_row_len(&[3, u64::MAX, 3]).unwrap(), 3);
        assert_eq!(agreed_row_len(&[u64::MAX, u64::MAX]).unwrap(), 0);
        assert!(agreed_row_len(&[3, 4]).is_err());
    }

    #[test]
    fn local_rows_reject_ragged_kernels() {
        let topo = crate::Topology::new(0, 1).unwrap();
        let part = Partition::with_domain(Strategy::Block, 3, &topo);
        let mut ragged = |u: u64| vec![0u8; u as usize + 1];
        assert!(matches!(
            compute_partition(&part, &mut ragged),
            Err(Error::RowLengthMismatch { unit: 1, .. })
        ));
    }
}
