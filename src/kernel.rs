//! The per-unit computation the library distributes.

use crate::datatype::Datatype;
use crate::partition::WorkUnit;

/// Computes the result row of one work unit.
///
/// Kernels are opaque to the library: a Monte-Carlo classifier, a matrix row
/// product or a fractal scanline all look the same from here. A kernel must be
/// deterministic for a given unit (apart from an explicitly seeded random
/// stream) and share no state with other ranks.
///
/// Any `FnMut(WorkUnit) -> Vec<T>` is a kernel.
///
/// ```
/// use ferrodist::Kernel;
///
/// let mut square = |u: u64| vec![(u * u) as f64];
/// assert_eq!(square.compute(4), vec![16.0]);
/// ```
pub trait Kernel<T: Datatype> {
    /// Result row for `unit`.
    fn compute(&mut self, unit: WorkUnit) -> Vec<T>;
}

impl<T, F> Kernel<T> for F
where
    T: Datatype,
    F: FnMut(WorkUnit) -> Vec<T>,
{
    fn compute(&mut self, unit: WorkUnit) -> Vec<T> {
        self(unit)
    }
}
