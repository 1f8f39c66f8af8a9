//! In-process backend: every rank is a thread.
//!
//! [`LocalUniverse`] runs the same closure once per rank, each with its own
//! [`Communicator`]. It needs no launcher and no MPI installation, which makes
//! it the backend of choice for tests and single-node runs.
//!
//! Each rank owns a mailbox; a send appends to the destination's mailbox and
//! never blocks. A receive scans its own mailbox for the oldest message that
//! matches `(source, tag)`, which gives per-sender FIFO delivery.
//!
//! When a rank returns an error or panics, the universe is marked aborted and
//! every rank blocked in a receive or barrier wakes up with
//! [`Error::Aborted`], so a failure never leaves the run hanging.

use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::transport::{Envelope, Source, Transport};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

const NOT_ABORTED: i32 = -1;

/// A fixed-size group of thread ranks.
///
/// # Example
///
/// ```
/// use ferrodist::LocalUniverse;
///
/// let universe = LocalUniverse::new(3).unwrap();
/// let ranks = universe.run(|world| Ok(world.rank()));
/// let ranks: Vec<i32> = ranks.into_iter().map(|r| r.unwrap()).collect();
/// assert_eq!(ranks, vec![0, 1, 2]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LocalUniverse {
    size: i32,
}

impl LocalUniverse {
    /// Create a universe of `size` ranks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopology`] if `size <= 0`.
    pub fn new(size: i32) -> Result<Self> {
        if size <= 0 {
            return Err(Error::InvalidTopology(format!(
                "rank count must be positive, got {size}"
            )));
        }
        Ok(LocalUniverse { size })
    }

    /// Number of ranks.
    pub fn size(&self) -> i32 {
        self.size
    }

    /// Run `f` on every rank and collect the per-rank results in rank order.
    ///
    /// Blocks until every rank has returned. If a rank panics, the panic is
    /// resumed on the calling thread once all ranks have stopped.
    pub fn run<F, R>(&self, f: F) -> Vec<Result<R>>
    where
        F: Fn(Communicator<LocalTransport>) -> Result<R> + Sync,
        R: Send,
    {
        let shared = Arc::new(Shared::new(self.size));
        debug!(size = self.size, "starting local universe");

        thread::scope(|scope| {
            let handles: Vec<_> = (0..self.size)
                .map(|rank| {
                    let transport = LocalTransport {
                        rank,
                        size: self.size,
                        shared: Arc::clone(&shared),
                    };
                    let f = &f;
                    scope.spawn(move || {
                        let _span = tracing::debug_span!("rank", rank).entered();
                        let guard = AbortOnPanic {
                            rank,
                            shared: Arc::clone(&transport.shared),
                        };
                        let result = Communicator::new(transport).and_then(f);
                        if let Err(err) = &result {
                            if !matches!(err, Error::Aborted(_)) {
                                warn!(rank, error = %err, "rank failed, aborting run");
                            }
                            guard.shared.abort(rank);
                        }
                        result
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        })
    }
}

/// Wakes every blocked rank if the owning rank unwinds.
struct AbortOnPanic {
    rank: i32,
    shared: Arc<Shared>,
}

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.abort(self.rank);
        }
    }
}

struct Mailbox {
    queue: Mutex<VecDeque<Envelope>>,
    arrived: Condvar,
}

struct BarrierState {
    waiting: i32,
    generation: u64,
}

struct Shared {
    mailboxes: Vec<Mailbox>,
    barrier: Mutex<BarrierState>,
    released: Condvar,
    aborted_by: AtomicI32,
}

impl Shared {
    fn new(size: i32) -> Self {
        Shared {
            mailboxes: (0..size)
                .map(|_| Mailbox {
                    queue: Mutex::new(VecDeque::new()),
                    arrived: Condvar::new(),
                })
                .collect(),
            barrier: Mutex::new(BarrierState {
                waiting: 0,
                generation: 0,
            }),
            released: Condvar::new(),
            aborted_by: AtomicI32::new(NOT_ABORTED),
        }
    }

    fn aborted_by(&self) -> Option<i32> {
        match self.aborted_by.load(Ordering::SeqCst) {
            NOT_ABORTED => None,
            rank => Some(rank),
        }
    }

    fn abort(&self, rank: i32) {
        // First failure wins.
        let _ = self.aborted_by.compare_exchange(
            NOT_ABORTED,
            rank,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        // Taking each lock before notifying means a waiter either sees the flag
        // or is already parked and gets the notification.
        for mailbox in &self.mailboxes {
            let _queue = mailbox.queue.lock();
            mailbox.arrived.notify_all();
        }
        let _state = self.barrier.lock();
        self.released.notify_all();
    }
}

/// [`Transport`] endpoint of one thread rank.
pub struct LocalTransport {
    rank: i32,
    size: i32,
    shared: Arc<Shared>,
}

impl Transport for LocalTransport {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn size(&self) -> i32 {
        self.size
    }

    fn send(&self, dest: i32, tag: i32, payload: Vec<u8>) -> Result<()> {
        let mailbox = self
            .shared
            .mailboxes
            .get(dest as usize)
            .ok_or(Error::InvalidRank {
                rank: dest,
                size: self.size,
            })?;
        mailbox.queue.lock().push_back(Envelope {
            source: self.rank,
            tag,
            payload,
        });
        mailbox.arrived.notify_all();
        Ok(())
    }

    fn recv(&self, source: Source, tag: i32) -> Result<Envelope> {
        let mailbox = &self.shared.mailboxes[self.rank as usize];
        let mut queue = mailbox.queue.lock();
        loop {
            let found = queue
                .iter()
                .position(|e| e.tag == tag && source.matches(e.source));
            if let Some(envelope) = found.and_then(|pos| queue.remove(pos)) {
                return Ok(envelope);
            }
            if let Some(by) = self.shared.aborted_by() {
                return Err(Error::Aborted(by));
            }
            mailbox.arrived.wait(&mut queue);
        }
    }

    fn barrier(&self) -> Result<()> {
        let mut state = self.shared.barrier.lock();
        if let Some(by) = self.shared.aborted_by() {
            return Err(Error::Aborted(by));
        }
        let generation = state.generation;
        state.waiting += 1;
        if state.waiting == self.size {
            state.waiting = 0;
            state.generation += 1;
            self.shared.released.notify_all();
            return Ok(());
        }
        while state.generation == generation {
            if let Some(by) = self.shared.aborted_by() {
                return Err(Error::Aborted(by));
            }
            self.shared.released.wait(&mut state);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_universe() {
        assert!(matches!(
            LocalUniverse::new(0),
            Err(Error::InvalidTopology(_))
        ));
    }

    #[test]
    fn messages_from_one_sender_stay_in_order() {
        let out = LocalUniverse::new(2).unwrap().run(|world| {
            if world.rank() == 0 {
                for i in 0..50u32 {
                    world.send(&[i], 1, 4)?;
                }
                Ok(Vec::new())
            } else {
                (0..50)
                    .map(|_| world.recv::<u32>(Source::Rank(0), 4).map(|(v, _)| v[0]))
                    .collect()
            }
        });
        let received = out[1].as_ref().unwrap();
        assert_eq!(*received, (0..50).collect::<Vec<u32>>());
    }

    #[test]
    fn receive_matches_on_tag_not_arrival() {
        let out = LocalUniverse::new(2).unwrap().run(|world| {
            if world.rank() == 0 {
                world.send(&[1u8], 1, 1)?;
                world.send(&[2u8], 1, 2)?;
                Ok(Vec::new())
            } else {
                let (second, _) = world.recv::<u8>(Source::Rank(0), 2)?;
                let (first, _) = world.recv::<u8>(Source::Rank(0), 1)?;
                Ok(vec![second[0], first[0]])
            }
        });
        assert_eq!(out[1].as_ref().unwrap(), &vec![2, 1]);
    }

    #[test]
    fn barrier_can_be_reused() {
        let out = LocalUniverse::new(4).unwrap().run(|world| {
            for _ in 0..20 {
                world.barrier()?;
            }
            Ok(())
        });
        assert!(out.iter().all(Result::is_ok));
    }

    #[test]
    fn failing_rank_releases_blocked_peers() {
        let out = LocalUniverse::new(3).unwrap().run(|world| {
            if world.rank() == 2 {
                return Err(Error::Internal("kernel failed".into()));
            }
            // Would wait forever for rank 2 without the abort.
            world.barrier()
        });
        assert!(matches!(out[0], Err(Error::Aborted(2))));
        assert!(matches!(out[1], Err(Error::Aborted(2))));
        assert!(matches!(out[2], Err(Error::Internal(_))));
    }

    #[test]
    fn panicking_rank_releases_receivers_and_resurfaces() {
        let result = std::panic::catch_unwind(|| {
            LocalUniverse::new(2).unwrap().run(|world| {
                if world.rank() == 1 {
                    panic!("rank 1 exploded");
                }
                world.recv::<f64>(Source::Rank(1), 0).map(|_| ())
            })
        });
        assert!(result.is_err());
    }
}
