//! Dynamic path: coordinator/worker scheduling over point-to-point messages.
//!
//! One rank (the coordinator) owns a [`TaskQueue`] over `[0, N)`. Every other
//! rank is a worker that waits for either a unit to compute or the
//! termination sentinel:
//!
//! ```text
//! coordinator                                   worker w
//! ───────────                                   ────────
//! fan-out: Task(u) or Stop to every worker ───▶ recv from coordinator
//! loop until N results:                         Stop    → exit
//!   recv (unit, row) from ANY worker     ◀───── Task(u) → compute, send (u, row)
//!   record row
//!   send Task(next) or Stop to that worker ───▶
//! ```
//!
//! Workers that finish early are handed more units, so uneven per-unit cost
//! evens out without any knowledge of the cost in advance. Which worker's
//! result is taken first when several are ready is up to the transport.

use crate::assemble::{Aggregate, Assembler};
use crate::comm::{tags, Communicator};
use crate::datatype::Datatype;
use crate::error::{Error, Result};
use crate::kernel::Kernel;
use crate::partition::WorkUnit;
use crate::topology::Role;
use crate::transport::{Source, Transport};
use crate::wtime;
use serde::Serialize;
use tracing::{debug, info, trace};

/// Rank that coordinates unless told otherwise.
pub const DEFAULT_COORDINATOR: i32 = 0;

/// Coordinator-side cursor over the units still to be dispatched.
///
/// Yields every unit of `[0, N)` exactly once, in ascending order.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    next: WorkUnit,
    end: WorkUnit,
}

impl TaskQueue {
    /// Queue over `[0, domain)`.
    pub fn new(domain: u64) -> Self {
        TaskQueue {
            next: 0,
            end: domain,
        }
    }

    /// Units not yet dispatched.
    pub fn remaining(&self) -> u64 {
        self.end - self.next
    }

    /// `true` once every unit has been dispatched.
    pub fn is_empty(&self) -> bool {
        self.next == self.end
    }
}

impl Iterator for TaskQueue {
    type Item = WorkUnit;

    fn next(&mut self) -> Option<WorkUnit> {
        if self.is_empty() {
            return None;
        }
        let unit = self.next;
        self.next += 1;
        Some(unit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining() as usize;
        (n, Some(n))
    }
}

/// A coordinator → worker message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assignment {
    Task(WorkUnit),
    /// Termination sentinel; encoded as an empty buffer.
    Stop,
}

fn send_assignment<X: Transport>(
    comm: &Communicator<X>,
    worker: i32,
    assignment: Assignment,
) -> Result<()> {
    let units: &[u64] = match &assignment {
        Assignment::Task(unit) => std::slice::from_ref(unit),
        Assignment::Stop => &[],
    };
    trace!(worker, ?assignment, "assign");
    comm.send_raw(worker, tags::ASSIGN, crate::message::encode(units))
}

fn recv_assignment<X: Transport>(comm: &Communicator<X>, coordinator: i32) -> Result<Assignment> {
    let envelope = comm.recv_raw(Source::Rank(coordinator), tags::ASSIGN)?;
    let units = crate::message::decode::<u64>(&envelope)?;
    match units.as_slice() {
        [] => Ok(Assignment::Stop),
        [unit] => Ok(Assignment::Task(*unit)),
        _ => Err(Error::unexpected(
            envelope.source,
            envelope.tag,
            format!("assignment carries {} units", units.len()),
        )),
    }
}

/// Message counts observed by the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    /// Task messages sent (one per unit).
    pub tasks_sent: u64,
    /// Termination sentinels sent (one per worker).
    pub sentinels_sent: u64,
    /// Result messages received (one per unit).
    pub results_received: u64,
    /// Units completed by each rank, indexed by rank; the coordinator's entry is 0.
    pub units_per_rank: Vec<u64>,
}

/// What a worker did before it was released.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStats {
    /// Units this worker computed.
    pub units: u64,
    /// Seconds from start until the sentinel arrived.
    pub elapsed: f64,
}

/// Per-rank result of [`run_dynamic`].
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicOutcome<T> {
    /// The coordinator's assembled result and message counts.
    Coordinator {
        /// Dense result in unit order.
        aggregate: Aggregate<T>,
        /// Protocol counters.
        stats: CoordinatorStats,
        /// Seconds from fan-out until the last result.
        elapsed: f64,
    },
    /// A worker's counters.
    Worker(WorkerStats),
}

/// Coordinator state: the queue, the assembler, and who is computing what.
pub struct Coordinator<'a, T, X: Transport> {
    comm: &'a Communicator<X>,
    queue: TaskQueue,
    assembler: Assembler<T>,
    /// Unit each rank is currently computing.
    in_flight: Vec<Option<WorkUnit>>,
    stats: CoordinatorStats,
}

impl<'a, T: Datatype, X: Transport> Coordinator<'a, T, X> {
    /// Coordinator for a domain of `domain` units.
    pub fn new(comm: &'a Communicator<X>, domain: u64) -> Self {
        let size = comm.size() as usize;
        Coordinator {
            comm,
            queue: TaskQueue::new(domain),
            assembler: Assembler::new(domain),
            in_flight: vec![None; size],
            stats: CoordinatorStats {
                units_per_rank: vec![0; size],
                ..CoordinatorStats::default()
            },
        }
    }

    /// Run the protocol to completion.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTopology`] if there are units to compute but the group
    /// has no worker. Nothing is sent or received in that case.
    pub fn run(mut self) -> Result<(Aggregate<T>, CoordinatorStats)> {
        if !self.queue.is_empty() && self.comm.size() < 2 {
            return Err(Error::InvalidTopology(
                "dynamic scheduling needs at least one worker besides the coordinator".into(),
            ));
        }
        self.fan_out()?;
        while !self.assembler.is_complete() {
            self.collect_one()?;
        }
        info!(
            units = self.assembler.domain(),
            tasks = self.stats.tasks_sent,
            sentinels = self.stats.sentinels_sent,
            "dynamic schedule complete"
        );
        Ok((self.assembler.finish()?, self.stats))
    }

    /// Give every worker its first unit, or the sentinel if none are left.
    fn fan_out(&mut self) -> Result<()> {
        let me = self.comm.rank();
        for worker in self.comm.topology().workers(me) {
            self.dispatch(worker)?;
        }
        Ok(())
    }

    /// Take one result from whichever worker answers first and reassign it.
    fn collect_one(&mut self) -> Result<()> {
        let (unit, row, status) = self.comm.recv_indexed::<T>(Source::Any, tags::RESULT)?;
        let worker = status.source;
        if self.in_flight[worker as usize] != Some(unit) {
            return Err(Error::unexpected(
                worker,
                status.tag,
                format!("result for unit {unit} was not assigned to this rank"),
            ));
        }
        self.in_flight[worker as usize] = None;
        self.assembler.insert(unit, row)?;
        self.stats.results_received += 1;
        self.stats.units_per_rank[worker as usize] += 1;
        self.dispatch(worker)
    }

    /// Send `worker` the next unit, or the sentinel once the queue is empty.
    fn dispatch(&mut self, worker: i32) -> Result<()> {
        match self.queue.next() {
            Some(unit) => {
                debug!(worker, unit, remaining = self.queue.remaining(), "dispatch");
                send_assignment(self.comm, worker, Assignment::Task(unit))?;
                self.in_flight[worker as usize] = Some(unit);
                self.stats.tasks_sent += 1;
            }
            None => {
                debug!(worker, "release");
                send_assignment(self.comm, worker, Assignment::Stop)?;
                self.stats.sentinels_sent += 1;
            }
        }
        Ok(())
    }
}

/// Worker loop: compute whatever the coordinator assigns until released.
pub fn run_worker<T, K, X>(
    comm: &Communicator<X>,
    coordinator: i32,
    kernel: &mut K,
) -> Result<WorkerStats>
where
    T: Datatype,
    K: Kernel<T>,
    X: Transport,
{
    let start = wtime();
    let mut units = 0;
    loop {
        match recv_assignment(comm, coordinator)? {
            Assignment::Stop => break,
            Assignment::Task(unit) => {
                let row = kernel.compute(unit);
                comm.send_indexed(unit, &row, coordinator, tags::RESULT)?;
                units += 1;
            }
        }
    }
    let elapsed = wtime() - start;
    debug!(rank = comm.rank(), units, elapsed, "worker released");
    Ok(WorkerStats { units, elapsed })
}

/// Schedule `domain` units dynamically, each rank playing the role its
/// topology assigns.
///
/// Not a collective in the lock-step sense, but every rank must call it with
/// the same `domain` and `coordinator`.
///
/// # Errors
///
/// [`Error::InvalidTopology`] if there are units to compute but no worker
/// (a group of one rank), detected before any message is sent.
///
/// # Example
///
/// ```
/// use ferrodist::{run_dynamic, DynamicOutcome, LocalUniverse};
///
/// let out = LocalUniverse::new(3).unwrap().run(|world| {
///     let mut double = |u: u64| vec![2 * u];
///     run_dynamic(&world, 10, 0, &mut double)
/// });
/// match out[0].as_ref().unwrap() {
///     DynamicOutcome::Coordinator { aggregate, stats, .. } => {
///         assert_eq!(aggregate.as_slice(), &[0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);
///         assert_eq!(stats.tasks_sent, 10);
///         assert_eq!(stats.sentinels_sent, 2);
///     }
///     DynamicOutcome::Worker(_) => unreachable!(),
/// }
/// ```
pub fn run_dynamic<T, K, X>(
    comm: &Communicator<X>,
    domain: u64,
    coordinator: i32,
    kernel: &mut K,
) -> Result<DynamicOutcome<T>>
where
    T: Datatype,
    K: Kernel<T>,
    X: Transport,
{
    let topology = comm.topology();
    topology.check_rank(coordinator)?;

    match topology.role(coordinator) {
        Role::Coordinator => {
            let start = wtime();
            let (aggregate, stats) = Coordinator::new(comm, domain).run()?;
            Ok(DynamicOutcome::Coordinator {
                aggregate,
                stats,
                elapsed: wtime() - start,
            })
        }
        Role::Worker => run_worker(comm, coordinator, kernel).map(DynamicOutcome::Worker),
    }
}
