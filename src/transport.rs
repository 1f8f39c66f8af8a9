//! Message layer underneath [`Communicator`](crate::Communicator).
//!
//! A [`Transport`] moves opaque byte payloads between ranks. Everything typed
//! (datatype tags, collectives, the coordinator/worker protocol) is built on
//! top of these few primitives, so a new backend only has to provide them.
//!
//! Backends must guarantee that messages from one sender to one receiver with
//! the same tag are received in the order they were sent. Nothing is promised
//! about the relative order of messages from different senders.

use crate::error::Result;

/// Where a receive may take its message from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Only from this rank.
    Rank(i32),
    /// From whichever rank's message is available first.
    Any,
}

impl Source {
    /// `true` if a message sent by `rank` satisfies this source.
    pub fn matches(self, rank: i32) -> bool {
        match self {
            Source::Rank(r) => r == rank,
            Source::Any => true,
        }
    }
}

/// A received message before it is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Rank that sent the message.
    pub source: i32,
    /// Tag the message was sent with.
    pub tag: i32,
    /// Encoded contents.
    pub payload: Vec<u8>,
}

/// Blocking point-to-point byte transport between the ranks of one run.
pub trait Transport {
    /// Rank of the calling process.
    fn rank(&self) -> i32;

    /// Number of ranks in the run.
    fn size(&self) -> i32;

    /// Send `payload` to `dest` with `tag`.
    fn send(&self, dest: i32, tag: i32, payload: Vec<u8>) -> Result<()>;

    /// Block until a message with `tag` from `source` arrives and return it.
    fn recv(&self, source: Source, tag: i32) -> Result<Envelope>;

    /// Block until every rank has entered the barrier.
    fn barrier(&self) -> Result<()>;
}
