//! Message status information.
//!
//! This module provides the [`Status`] struct returned alongside every
//! point-to-point receive. It is the only way to learn which rank answered a
//! [`Source::Any`](crate::Source::Any) receive.

/// Information about a received message.
///
/// # Example
///
/// ```
/// use ferrodist::{LocalUniverse, Source};
///
/// let out = LocalUniverse::new(2).unwrap().run(|world| {
///     if world.rank() == 1 {
///         world.send(&[1.0f64, 2.0], 0, 7)?;
///         Ok(None)
///     } else {
///         let (data, status) = world.recv::<f64>(Source::Any, 7)?;
///         Ok(Some((data, status.source, status.count)))
///     }
/// });
/// assert_eq!(out[0].as_ref().unwrap(), &Some((vec![1.0, 2.0], 1, 2)));
/// assert_eq!(out[1].as_ref().unwrap(), &None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Source rank of the message.
    pub source: i32,
    /// Tag of the message.
    pub tag: i32,
    /// Number of elements in the message.
    pub count: usize,
}
