//! # ferrodist
//!
//! Distribute an embarrassingly-parallel numeric computation over a fixed group
//! of ranks and combine the partial results into one answer.
//!
//! A domain of `N` independent work units is split among `P` ranks, each unit
//! is handed to a [`Kernel`], and the rows it produces are combined at a root.
//! Two ways of deciding who computes what are provided:
//!
//! - **Static**: a deterministic [`Strategy`] (block or cyclic) fixes every
//!   rank's [`Partition`] up front. Results travel back through collectives
//!   (reduce, gather, all-gather). See [`run_static`].
//! - **Dynamic**: a coordinator hands out one unit at a time to idle workers
//!   and releases them with a sentinel once the queue is empty. See
//!   [`run_dynamic`].
//!
//! ## Quick Start
//!
//! ```
//! use ferrodist::{LocalUniverse, Partition, ReduceOp, Strategy};
//!
//! // Count multiples of 3 in [0, 1000) on four thread ranks.
//! let out = LocalUniverse::new(4).unwrap().run(|world| {
//!     let part = Partition::new(Strategy::Block, 1000, &world.topology())?;
//!     let local = part.units().filter(|u| u % 3 == 0).count() as u64;
//!     world.reduce_scalar(local, ReduceOp::Sum, 0)
//! });
//! assert_eq!(out[0].as_ref().unwrap(), &Some(334));
//! ```
//!
//! ## Backends
//!
//! | Backend | Ranks are | Availability |
//! |---------|-----------|--------------|
//! | [`LocalUniverse`] | threads of one process | always |
//! | `mpi_backend::MpiRuntime` | MPI processes | `mpi` feature |
//!
//! Both implement [`Transport`]; everything above it is shared.
//!
//! ## Supported Types
//!
//! Messages are generic over [`Datatype`]:
//! `f32`, `f64`, `i32`, `i64`, `u8`, `u32`, `u64`

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

mod assemble;
mod comm;
mod datatype;
mod distribute;
mod dynamic;
mod error;
mod kernel;
pub mod launcher;
mod local;
mod message;
#[cfg(feature = "mpi")]
pub mod mpi_backend;
mod partition;
mod report;
mod seed;
mod status;
mod topology;
mod transport;

pub use assemble::{assemble, assemble_gathered, Aggregate, Assembler};
pub use comm::{Communicator, TAG_UB};
pub use datatype::{Datatype, DatatypeTag};
pub use distribute::{run_static, run_static_all, StaticOutcome};
pub use dynamic::{
    run_dynamic, run_worker, Coordinator, CoordinatorStats, DynamicOutcome, TaskQueue,
    WorkerStats, DEFAULT_COORDINATOR,
};
pub use error::{Error, Result};
pub use kernel::Kernel;
pub use local::{LocalTransport, LocalUniverse};
pub use partition::{partition, Partition, Strategy, Units, WorkUnit};
pub use report::{throughput_mops, RankReport, Summary};
pub use seed::{clock_nanos, rank_rng, rank_seed, RankRng};
pub use status::Status;
pub use topology::{Role, Topology};
pub use transport::{Envelope, Source, Transport};

use std::sync::OnceLock;
use std::time::Instant;

/// Reduction operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    /// Sum of values
    Sum,
    /// Maximum value
    Max,
    /// Minimum value
    Min,
    /// Product of values
    Prod,
}

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Wall-clock seconds since the first call in this process.
///
/// Monotonic and high-resolution; only differences are meaningful.
pub fn wtime() -> f64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}

/// Resolve the domain size from an optional command-line argument.
///
/// A missing, zero or unparsable argument falls back to `default`.
///
/// ```
/// use ferrodist::resolve_domain_size;
///
/// assert_eq!(resolve_domain_size(Some("500"), 100), 500);
/// assert_eq!(resolve_domain_size(Some("0"), 100), 100);
/// assert_eq!(resolve_domain_size(Some("lots"), 100), 100);
/// assert_eq!(resolve_domain_size(None, 100), 100);
/// ```
pub fn resolve_domain_size(arg: Option<&str>, default: u64) -> u64 {
    match arg.and_then(|s| s.trim().parse::<u64>().ok()) {
        Some(n) if n > 0 => n,
        _ => default,
    }
}
