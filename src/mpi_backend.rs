//! MPI backend (with `mpi` feature).
//!
//! Ranks are separate processes started by `mpiexec`/`srun`. The runtime is
//! initialized once per process; dropping [`MpiRuntime`] finalizes it.
//!
//! ```no_run
//! use ferrodist::mpi_backend::MpiRuntime;
//!
//! let runtime = MpiRuntime::init().unwrap();
//! let world = runtime.world().unwrap();
//! println!("rank {} of {}", world.rank(), world.size());
//! ```

use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::transport::{Envelope, Source, Transport};
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator as MpiCommunicator, CommunicatorCollectives, Destination};
use tracing::debug;

/// Initialized MPI environment.
pub struct MpiRuntime {
    universe: Universe,
}

impl MpiRuntime {
    /// Initialize MPI.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyInitialized`] if MPI was initialized before in
    /// this process.
    pub fn init() -> Result<Self> {
        let universe = mpi::initialize().ok_or(Error::AlreadyInitialized)?;
        debug!("MPI initialized");
        Ok(MpiRuntime { universe })
    }

    /// Handle on `MPI_COMM_WORLD`.
    pub fn world(&self) -> Result<Communicator<MpiTransport>> {
        Communicator::new(MpiTransport {
            world: self.universe.world(),
        })
    }
}

/// [`Transport`] over an MPI communicator.
pub struct MpiTransport {
    world: SimpleCommunicator,
}

impl Transport for MpiTransport {
    fn rank(&self) -> i32 {
        self.world.rank()
    }

    fn size(&self) -> i32 {
        self.world.size()
    }

    fn send(&self, dest: i32, tag: i32, payload: Vec<u8>) -> Result<()> {
        self.world
            .process_at_rank(dest)
            .send_with_tag(&payload[..], tag);
        Ok(())
    }

    fn recv(&self, source: Source, tag: i32) -> Result<Envelope> {
        use mpi::traits::Source as _;

        let (payload, status) = match source {
            Source::Rank(rank) => self
                .world
                .process_at_rank(rank)
                .receive_vec_with_tag::<u8>(tag),
            Source::Any => self.world.any_process().receive_vec_with_tag::<u8>(tag),
        };
        Ok(Envelope {
            source: status.source_rank(),
            tag: status.tag(),
            payload,
        })
    }

    fn barrier(&self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }
}
