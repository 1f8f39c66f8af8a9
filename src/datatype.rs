//! Element datatype trait and wire tag mapping.
//!
//! This module provides the [`Datatype`] trait, a sealed trait that maps Rust
//! primitive types to the tag written in front of every buffer on the wire and
//! to the element-wise combiners used by reductions. Elements themselves are
//! plain old data and travel as their in-memory bytes.
//!
//! # Supported Types
//!
//! | Rust Type | Tag Value | Reduction semantics        |
//! |-----------|-----------|----------------------------|
//! | `f32`     | 0         | IEEE arithmetic            |
//! | `f64`     | 1         | IEEE arithmetic            |
//! | `i32`     | 2         | wrapping sum/product       |
//! | `i64`     | 3         | wrapping sum/product       |
//! | `u8`      | 4         | wrapping sum/product       |
//! | `u32`     | 5         | wrapping sum/product       |
//! | `u64`     | 6         | wrapping sum/product       |

use crate::ReduceOp;
use bytemuck::Pod;
use std::fmt::Debug;

/// Seals [`Datatype`] against outside implementations.
mod sealed {
    pub trait Sealed {}
}

/// Tag values written in the first byte of an encoded buffer.
///
/// Discriminants are part of the wire format shared by every rank of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DatatypeTag {
    /// 32-bit floating point
    F32 = 0,
    /// 64-bit floating point
    F64 = 1,
    /// 32-bit signed integer
    I32 = 2,
    /// 64-bit signed integer
    I64 = 3,
    /// 8-bit unsigned integer
    U8 = 4,
    /// 32-bit unsigned integer
    U32 = 5,
    /// 64-bit unsigned integer
    U64 = 6,
}

impl DatatypeTag {
    /// Decode a tag byte read from the wire.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => DatatypeTag::F32,
            1 => DatatypeTag::F64,
            2 => DatatypeTag::I32,
            3 => DatatypeTag::I64,
            4 => DatatypeTag::U8,
            5 => DatatypeTag::U32,
            6 => DatatypeTag::U64,
            _ => return None,
        })
    }
}

/// Trait for element types that can travel in messages and be reduced.
///
/// This is a **sealed trait**: it cannot be implemented outside this crate.
/// Supported types: [`f32`], [`f64`], [`i32`], [`i64`], [`u8`], [`u32`], [`u64`].
///
/// # Example
///
/// ```
/// use ferrodist::{Datatype, ReduceOp};
///
/// assert_eq!(f64::combine(ReduceOp::Max, 1.5, 2.5), 2.5);
/// assert_eq!(u64::combine(ReduceOp::Sum, 40, 2), 42);
/// ```
pub trait Datatype:
    sealed::Sealed + Pod + Default + PartialOrd + Debug + Send + Sync + 'static
{
    /// The tag identifying this element type on the wire.
    const TAG: DatatypeTag;

    /// Combine two values under a reduction operator.
    fn combine(op: ReduceOp, a: Self, b: Self) -> Self;
}

macro_rules! impl_float_datatype {
    ($ty:ty, $tag:expr) => {
        impl sealed::Sealed for $ty {}

        impl Datatype for $ty {
            const TAG: DatatypeTag = $tag;

            fn combine(op: ReduceOp, a: Self, b: Self) -> Self {
                match op {
                    ReduceOp::Sum => a + b,
                    ReduceOp::Prod => a * b,
                    ReduceOp::Max => a.max(b),
                    ReduceOp::Min => a.min(b),
                }
            }
        }
    };
}

macro_rules! impl_int_datatype {
    ($ty:ty, $tag:expr) => {
        impl sealed::Sealed for $ty {}

        impl Datatype for $ty {
            const TAG: DatatypeTag = $tag;

            fn combine(op: ReduceOp, a: Self, b: Self) -> Self {
                match op {
                    ReduceOp::Sum => a.wrapping_add(b),
                    ReduceOp::Prod => a.wrapping_mul(b),
                    ReduceOp::Max => a.max(b),
                    ReduceOp::Min => a.min(b),
                }
            }
        }
    };
}

impl_float_datatype!(f32, DatatypeTag::F32);
impl_float_datatype!(f64, DatatypeTag::F64);
impl_int_datatype!(i32, DatatypeTag::I32);
impl_int_datatype!(i64, DatatypeTag::I64);
impl_int_datatype!(u8, DatatypeTag::U8);
impl_int_datatype!(u32, DatatypeTag::U32);
impl_int_datatype!(u64, DatatypeTag::U64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datatype_tag_values_are_sequential() {
        let tags = [
            DatatypeTag::F32,
            DatatypeTag::F64,
            DatatypeTag::I32,
            DatatypeTag::I64,
            DatatypeTag::U8,
            DatatypeTag::U32,
            DatatypeTag::U64,
        ];
        for (i, tag) in tags.iter().enumerate() {
            assert_eq!(*tag as u8, i as u8, "Tag {tag:?} should have value {i}");
            assert_eq!(DatatypeTag::from_u8(i as u8), Some(*tag));
        }
        assert_eq!(DatatypeTag::from_u8(7), None);
    }

    #[test]
    fn float_bytes_are_bit_exact() {
        let values = [0.0f64, -0.0, 1.0 / 3.0, f64::MIN_POSITIVE, f64::NAN, f64::INFINITY];
        let bytes: &[u8] = bytemuck::cast_slice(&values);
        assert_eq!(bytes.len(), values.len() * std::mem::size_of::<f64>());
        let back: Vec<f64> = bytemuck::pod_collect_to_vec(bytes);
        for (a, b) in back.iter().zip(&values) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn integer_sum_wraps_instead_of_panicking() {
        assert_eq!(u8::combine(ReduceOp::Sum, 250, 10), 4);
        assert_eq!(i32::combine(ReduceOp::Prod, i32::MAX, 2), -2);
    }

    #[test]
    fn max_and_min_pick_an_operand() {
        assert_eq!(f32::combine(ReduceOp::Max, -1.0, 3.0), 3.0);
        assert_eq!(f32::combine(ReduceOp::Min, -1.0, 3.0), -1.0);
        assert_eq!(i64::combine(ReduceOp::Max, -7, -9), -7);
        assert_eq!(u32::combine(ReduceOp::Min, 7, 9), 7);
    }

    #[test]
    fn trait_is_implemented() {
        fn assert_datatype<T: Datatype>() {}
        assert_datatype::<f32>();
        assert_datatype::<f64>();
        assert_datatype::<i32>();
        assert_datatype::<i64>();
        assert_datatype::<u8>();
        assert_datatype::<u32>();
        assert_datatype::<u64>();
    }
}
