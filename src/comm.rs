//! Typed point-to-point and collective operations over a [`Transport`].

use crate::datatype::Datatype;
use crate::error::{Error, Result};
use crate::local::LocalTransport;
use crate::message;
use crate::partition::WorkUnit;
use crate::status::Status;
use crate::topology::Topology;
use crate::transport::{Envelope, Source, Transport};
use crate::{wtime, ReduceOp};
use std::marker::PhantomData;
use tracing::{debug, trace};

/// Upper bound (exclusive) on tags available to applications.
///
/// Tags from this value up to 32767 (the smallest `MPI_TAG_UB` an MPI
/// implementation may report) are reserved for collectives and the
/// coordinator/worker protocol.
pub const TAG_UB: i32 = 30_000;

pub(crate) mod tags {
    pub const BROADCAST: i32 = 30_001;
    pub const REDUCE: i32 = 30_002;
    pub const GATHER: i32 = 30_003;
    pub const SCATTER: i32 = 30_004;
    pub const ALL_TO_ALL: i32 = 30_005;
    pub const ASSIGN: i32 = 30_010;
    pub const RESULT: i32 = 30_011;
}

/// A rank's handle on the group it belongs to.
///
/// Wraps a [`Transport`] and provides typed point-to-point messaging and the
/// blocking collectives.
///
/// # Collective contract
///
/// Every collective ([`barrier`](Self::barrier), [`broadcast`](Self::broadcast),
/// [`reduce`](Self::reduce), [`gather`](Self::gather),
/// [`all_gather`](Self::all_gather), [`scatter`](Self::scatter),
/// [`all_to_all`](Self::all_to_all) and the
/// conveniences built on them) must be called by **all** ranks, in the same
/// order, with the same `root`. This is not checked at runtime; ranks that
/// disagree exchange mismatched messages or block forever.
///
/// # Example
///
/// ```
/// use ferrodist::{LocalUniverse, ReduceOp};
///
/// let out = LocalUniverse::new(4).unwrap().run(|world| {
///     world.reduce_scalar(world.rank() as u64, ReduceOp::Sum, 0)
/// });
/// assert_eq!(out[0].as_ref().unwrap(), &Some(6));
/// assert_eq!(out[3].as_ref().unwrap(), &None);
/// ```
pub struct Communicator<T: Transport = LocalTransport> {
    transport: T,
    topology: Topology,
    /// Marker to prevent Send/Sync (one rank, one thread of control)
    _marker: PhantomData<*mut ()>,
}

impl<T: Transport> Communicator<T> {
    /// Wrap a transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopology`] if the transport reports an
    /// impossible rank or size.
    pub fn new(transport: T) -> Result<Self> {
        let topology = Topology::new(transport.rank(), transport.size())?;
        Ok(Communicator {
            transport,
            topology,
            _marker: PhantomData,
        })
    }

    /// The rank of the calling process.
    pub fn rank(&self) -> i32 {
        self.topology.rank()
    }

    /// The number of ranks in the group.
    pub fn size(&self) -> i32 {
        self.topology.size()
    }

    /// `(rank, size)` of the calling process.
    pub fn topology(&self) -> Topology {
        self.topology
    }

    // ========================================================================
    // Synchronization
    // ========================================================================

    /// Barrier synchronization.
    ///
    /// All ranks must call this function. No rank returns until all ranks
    /// have entered the barrier.
    pub fn barrier(&self) -> Result<()> {
        trace!(rank = self.rank(), "barrier");
        self.transport.barrier()
    }

    /// Run `f` inside a barrier-aligned timing window.
    ///
    /// Ranks enter together, so per-rank timings start from the same moment and
    /// are comparable. The returned elapsed time covers `f` only, not the wait
    /// for slower ranks at the closing barrier.
    pub fn timed<R>(&self, f: impl FnOnce() -> R) -> Result<(R, f64)> {
        self.barrier()?;
        let start = wtime();
        let value = f();
        let elapsed = wtime() - start;
        self.barrier()?;
        Ok((value, elapsed))
    }

    // ========================================================================
    // Point-to-Point Communication
    // ========================================================================

    /// Send a buffer to another rank.
    ///
    /// `tag` must be in `[0, TAG_UB)`.
    pub fn send<D: Datatype>(&self, data: &[D], dest: i32, tag: i32) -> Result<()> {
        check_user_tag(tag)?;
        self.send_raw(dest, tag, message::encode(data))
    }

    /// Receive a buffer with `tag` from `source`.
    ///
    /// Use [`Source::Any`] to take the first matching message from any rank;
    /// the returned [`Status`] tells which rank sent it.
    pub fn recv<D: Datatype>(&self, source: Source, tag: i32) -> Result<(Vec<D>, Status)> {
        check_user_tag(tag)?;
        let envelope = self.recv_raw(source, tag)?;
        let data = message::decode::<D>(&envelope)?;
        let status = Status {
            source: envelope.source,
            tag: envelope.tag,
            count: data.len(),
        };
        Ok((data, status))
    }

    pub(crate) fn send_raw(&self, dest: i32, tag: i32, payload: Vec<u8>) -> Result<()> {
        self.topology.check_rank(dest)?;
        trace!(
            rank = self.rank(),
            dest,
            tag,
            bytes = payload.len(),
            "send"
        );
        self.transport.send(dest, tag, payload)
    }

    pub(crate) fn recv_raw(&self, source: Source, tag: i32) -> Result<Envelope> {
        if let Source::Rank(r) = source {
            self.topology.check_rank(r)?;
        }
        let envelope = self.transport.recv(source, tag)?;
        trace!(
            rank = self.rank(),
            source = envelope.source,
            tag,
            bytes = envelope.payload.len(),
            "recv"
        );
        Ok(envelope)
    }

    /// Send a kernel row tagged with the unit it answers.
    pub(crate) fn send_indexed<D: Datatype>(
        &self,
        unit: WorkUnit,
        row: &[D],
        dest: i32,
        tag: i32,
    ) -> Result<()> {
        self.send_raw(dest, tag, message::encode_indexed(unit, row))
    }

    /// Receive a kernel row and the unit it answers.
    pub(crate) fn recv_indexed<D: Datatype>(
        &self,
        source: Source,
        tag: i32,
    ) -> Result<(WorkUnit, Vec<D>, Status)> {
        let envelope = self.recv_raw(source, tag)?;
        let (unit, row) = message::decode_indexed::<D>(&envelope)?;
        let status = Status {
            source: envelope.source,
            tag: envelope.tag,
            count: row.len(),
        };
        Ok((unit, row, status))
    }

    // ========================================================================
    // Blocking Collectives
    // ========================================================================

    /// Broadcast a buffer from `root` to all ranks.
    ///
    /// On non-root ranks the contents of `data` are replaced, including its
    /// length. The buffer travels down a binomial tree rooted at `root`, so
    /// the root sends at most `ceil(log2(size))` messages and every rank is
    /// reached after that many rounds.
    pub fn broadcast<D: Datatype>(&self, data: &mut Vec<D>, root: i32) -> Result<()> {
        self.topology.check_rank(root)?;
        debug!(rank = self.rank(), root, len = data.len(), "broadcast");
        let size = self.size();
        // Ranks renumbered so that the root is 0.
        let vrank = (self.rank() - root).rem_euclid(size);
        let real = |v: i32| (v + root) % size;

        // Receive from the parent: vrank with its lowest set bit cleared.
        let mut mask = 1;
        while mask < size {
            if vrank & mask != 0 {
                let envelope = self.recv_raw(Source::Rank(real(vrank - mask)), tags::BROADCAST)?;
                *data = message::decode(&envelope)?;
                break;
            }
            mask <<= 1;
        }

        // Forward to the children below that bit.
        let payload = message::encode(data.as_slice());
        mask >>= 1;
        while mask > 0 {
            if vrank + mask < size {
                self.send_raw(real(vrank + mask), tags::BROADCAST, payload.clone())?;
            }
            mask >>= 1;
        }
        Ok(())
    }

    /// Element-wise reduction of one buffer per rank, delivered to `root`.
    ///
    /// Contributions are folded in rank order, so the result for a given
    /// group size is deterministic even for floating-point sums. Returns
    /// `Some` at `root` and `None` everywhere else.
    ///
    /// # Errors
    ///
    /// At `root`, [`Error::InvalidBuffer`] if the ranks' buffers differ in length.
    pub fn reduce<D: Datatype>(&self, send: &[D], op: ReduceOp, root: i32) -> Result<Option<Vec<D>>> {
        self.topology.check_rank(root)?;
        debug!(rank = self.rank(), root, ?op, len = send.len(), "reduce");
        if self.rank() != root {
            self.send_raw(root, tags::REDUCE, message::encode(send))?;
            return Ok(None);
        }

        let mut acc: Option<Vec<D>> = None;
        let mut mismatch = None;
        for source in 0..self.size() {
            let contribution = if source == root {
                send.to_vec()
            } else {
                let envelope = self.recv_raw(Source::Rank(source), tags::REDUCE)?;
                message::decode::<D>(&envelope)?
            };
            match acc.as_mut() {
                None => acc = Some(contribution),
                Some(acc) if acc.len() == contribution.len() => {
                    for (a, b) in acc.iter_mut().zip(contribution) {
                        *a = D::combine(op, *a, b);
                    }
                }
                // Keep draining so no stale message is left behind.
                Some(acc) => mismatch = Some((source, acc.len(), contribution.len())),
            }
        }
        if let Some((source, expected, got)) = mismatch {
            return Err(Error::InvalidBuffer(format!(
                "reduce: rank {source} contributed {got} elements, expected {expected}"
            )));
        }
        Ok(acc)
    }

    /// Reduce a single value to `root`.
    pub fn reduce_scalar<D: Datatype>(&self, value: D, op: ReduceOp, root: i32) -> Result<Option<D>> {
        Ok(self
            .reduce(&[value], op, root)?
            .and_then(|v| v.first().copied()))
    }

    /// Element-wise reduction delivered to every rank.
    pub fn all_reduce<D: Datatype>(&self, send: &[D], op: ReduceOp) -> Result<Vec<D>> {
        let mut result = self.reduce(send, op, 0)?.unwrap_or_default();
        self.broadcast(&mut result, 0)?;
        Ok(result)
    }

    /// Reduce a single value and deliver it to every rank.
    pub fn all_reduce_scalar<D: Datatype>(&self, value: D, op: ReduceOp) -> Result<D> {
        self.all_reduce(&[value], op)?
            .first()
            .copied()
            .ok_or_else(|| Error::Internal("all_reduce returned an empty buffer".into()))
    }

    /// Gather every rank's buffer at `root`, concatenated in rank order.
    ///
    /// Buffers may differ in length from rank to rank. Returns `Some` at
    /// `root` and `None` everywhere else.
    pub fn gather<D: Datatype>(&self, send: &[D], root: i32) -> Result<Option<Vec<D>>> {
        self.topology.check_rank(root)?;
        debug!(rank = self.rank(), root, len = send.len(), "gather");
        if self.rank() != root {
            self.send_raw(root, tags::GATHER, message::encode(send))?;
            return Ok(None);
        }
        let mut out = Vec::new();
        for source in 0..self.size() {
            if source == root {
                out.extend_from_slice(send);
            } else {
                let envelope = self.recv_raw(Source::Rank(source), tags::GATHER)?;
                out.extend(message::decode::<D>(&envelope)?);
            }
        }
        Ok(Some(out))
    }

    /// Gather every rank's buffer on every rank, concatenated in rank order.
    pub fn all_gather<D: Datatype>(&self, send: &[D]) -> Result<Vec<D>> {
        let mut out = self.gather(send, 0)?.unwrap_or_default();
        self.broadcast(&mut out, 0)?;
        Ok(out)
    }

    /// Distribute one chunk per rank from `root`.
    ///
    /// `chunks` is only read at `root`, where it must hold exactly `size`
    /// buffers; chunk `r` is delivered to rank `r`.
    pub fn scatter<D: Datatype>(&self, chunks: Option<&[Vec<D>]>, root: i32) -> Result<Vec<D>> {
        self.topology.check_rank(root)?;
        debug!(rank = self.rank(), root, "scatter");
        if self.rank() != root {
            let envelope = self.recv_raw(Source::Rank(root), tags::SCATTER)?;
            return message::decode(&envelope);
        }
        let chunks = chunks
            .ok_or_else(|| Error::InvalidBuffer("scatter: root supplied no chunks".into()))?;
        if chunks.len() != self.size() as usize {
            return Err(Error::InvalidBuffer(format!(
                "scatter: {} chunks for {} ranks",
                chunks.len(),
                self.size()
            )));
        }
        for (dest, chunk) in chunks.iter().enumerate() {
            if dest as i32 != root {
                self.send_raw(dest as i32, tags::SCATTER, message::encode(chunk))?;
            }
        }
        Ok(chunks[root as usize].clone())
    }

    /// Personalized exchange: chunk `r` of every rank's `send` goes to rank
    /// `r`.
    ///
    /// `send` must hold exactly `size` buffers, which may differ in length.
    /// The result holds one buffer per source rank, in rank order, with the
    /// caller's own chunk at its own index.
    ///
    /// Ranks take turns as the sender in rank order, so every send meets a
    /// receive that is already waiting for it.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBuffer`] if `send` does not hold `size` buffers.
    ///
    /// # Example
    ///
    /// ```
    /// use ferrodist::LocalUniverse;
    ///
    /// let out = LocalUniverse::new(3).unwrap().run(|world| {
    ///     let me = world.rank() as u32;
    ///     let send: Vec<Vec<u32>> = (0..3).map(|dest| vec![10 * me + dest]).collect();
    ///     world.all_to_all(&send)
    /// });
    /// assert_eq!(out[1].as_ref().unwrap(), &vec![vec![1], vec![11], vec![21]]);
    /// ```
    pub fn all_to_all<D: Datatype>(&self, send: &[Vec<D>]) -> Result<Vec<Vec<D>>> {
        let size = self.size();
        let me = self.rank();
        if send.len() != size as usize {
            return Err(Error::InvalidBuffer(format!(
                "all_to_all: {} chunks for {size} ranks",
                send.len()
            )));
        }
        debug!(
            rank = me,
            len = send.iter().map(Vec::len).sum::<usize>(),
            "all_to_all"
        );
        let mut out = Vec::with_capacity(size as usize);
        for sender in 0..size {
            if sender == me {
                for (dest, chunk) in send.iter().enumerate() {
                    if dest as i32 != me {
                        self.send_raw(dest as i32, tags::ALL_TO_ALL, message::encode(chunk))?;
                    }
                }
                out.push(send[me as usize].clone());
            } else {
                let envelope = self.recv_raw(Source::Rank(sender), tags::ALL_TO_ALL)?;
                out.push(message::decode(&envelope)?);
            }
        }
        Ok(out)
    }
}

fn check_user_tag(tag: i32) -> Result<()> {
    if (0..TAG_UB).contains(&tag) {
        Ok(())
    } else {
        Err(Error::InvalidTag(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_tags_are_bounded() {
        assert!(check_user_tag(0).is_ok());
        assert!(check_user_tag(TAG_UB - 1).is_ok());
        assert!(matches!(check_user_tag(-1), Err(Error::InvalidTag(-1))));
        assert!(check_user_tag(tags::GATHER).is_err());
    }

    #[test]
    fn reserved_tags_fit_the_mpi_minimum() {
        for tag in [
            tags::BROADCAST,
            tags::REDUCE,
            tags::GATHER,
            tags::SCATTER,
            tags::ALL_TO_ALL,
            tags::ASSIGN,
            tags::RESULT,
        ] {
            assert!((TAG_UB..=32767).contains(&tag));
        }
    }
}
