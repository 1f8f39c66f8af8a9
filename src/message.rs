//! Wire encoding of typed buffers.
//!
//! Every payload starts with the [`DatatypeTag`] byte of its element type,
//! followed by the elements' in-memory bytes. Ranks of one run share a byte
//! order, as MPI's homogeneous mode assumes.
//!
//! ```text
//! plain buffer:    [tag: u8][elem 0]..[elem n-1]
//! indexed buffer:  [tag: u8][unit: u64][elem 0]..[elem n-1]
//! ```
//!
//! The body after the header is unaligned, so decoding copies it into a
//! freshly allocated vector instead of casting in place.
//!
//! Indexed buffers carry a work-unit index with a kernel's row so results can
//! arrive in any order and still be placed correctly.

use crate::datatype::{Datatype, DatatypeTag};
use crate::error::{Error, Result};
use crate::partition::WorkUnit;
use crate::transport::Envelope;
use std::mem::size_of;

const UNIT_BYTES: usize = size_of::<WorkUnit>();

/// Encode `data` as a plain buffer.
pub(crate) fn encode<T: Datatype>(data: &[T]) -> Vec<u8> {
    let body: &[u8] = bytemuck::cast_slice(data);
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(T::TAG as u8);
    out.extend_from_slice(body);
    out
}

/// Encode a kernel row together with the unit it answers.
pub(crate) fn encode_indexed<T: Datatype>(unit: WorkUnit, row: &[T]) -> Vec<u8> {
    let body: &[u8] = bytemuck::cast_slice(row);
    let mut out = Vec::with_capacity(1 + UNIT_BYTES + body.len());
    out.push(T::TAG as u8);
    out.extend_from_slice(bytemuck::bytes_of(&unit));
    out.extend_from_slice(body);
    out
}

/// Decode a plain buffer of `T`.
pub(crate) fn decode<T: Datatype>(envelope: &Envelope) -> Result<Vec<T>> {
    let body = check_header::<T>(envelope)?;
    decode_elements(envelope, body)
}

/// Decode an indexed buffer of `T`.
pub(crate) fn decode_indexed<T: Datatype>(envelope: &Envelope) -> Result<(WorkUnit, Vec<T>)> {
    let body = check_header::<T>(envelope)?;
    if body.len() < UNIT_BYTES {
        return Err(Error::unexpected(
            envelope.source,
            envelope.tag,
            "indexed buffer shorter than its unit header",
        ));
    }
    let (head, rest) = body.split_at(UNIT_BYTES);
    let unit: WorkUnit = bytemuck::pod_read_unaligned(head);
    Ok((unit, decode_elements(envelope, rest)?))
}

fn check_header<T: Datatype>(envelope: &Envelope) -> Result<&[u8]> {
    let (&first, body) = envelope
        .payload
        .split_first()
        .ok_or_else(|| Error::unexpected(envelope.source, envelope.tag, "empty payload"))?;
    let received = DatatypeTag::from_u8(first).ok_or_else(|| {
        Error::unexpected(
            envelope.source,
            envelope.tag,
            format!("unknown datatype tag {first}"),
        )
    })?;
    if received != T::TAG {
        return Err(Error::DatatypeMismatch {
            expected: T::TAG,
            received,
        });
    }
    Ok(body)
}

fn decode_elements<T: Datatype>(envelope: &Envelope, body: &[u8]) -> Result<Vec<T>> {
    if body.len() % size_of::<T>() != 0 {
        return Err(Error::unexpected(
            envelope.source,
            envelope.tag,
            format!(
                "{} payload bytes do not divide into {:?} elements",
                body.len(),
                T::TAG
            ),
        ));
    }
    Ok(bytemuck::pod_collect_to_vec(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(payload: Vec<u8>) -> Envelope {
        Envelope {
            source: 3,
            tag: 9,
            payload,
        }
    }

    #[test]
    fn plain_buffer_layout() {
        let bytes = encode(&[1u32, 2]);
        let mut expected = vec![DatatypeTag::U32 as u8];
        expected.extend_from_slice(&1u32.to_ne_bytes());
        expected.extend_from_slice(&2u32.to_ne_bytes());
        assert_eq!(bytes, expected);
        assert_eq!(decode::<u32>(&envelope(bytes)).unwrap(), vec![1, 2]);
    }

    #[test]
    fn empty_buffer_still_carries_its_tag() {
        let bytes = encode::<f64>(&[]);
        assert_eq!(bytes, vec![DatatypeTag::F64 as u8]);
        assert!(decode::<f64>(&envelope(bytes)).unwrap().is_empty());
    }

    #[test]
    fn indexed_buffer_keeps_the_unit() {
        let row = [0.5f64, -2.25, 1e300];
        let bytes = encode_indexed(41, &row);
        let (unit, back) = decode_indexed::<f64>(&envelope(bytes)).unwrap();
        assert_eq!(unit, 41);
        assert_eq!(back, row);
    }

    #[test]
    fn wrong_element_type_is_reported() {
        let bytes = encode(&[1.0f32]);
        match decode::<i32>(&envelope(bytes)) {
            Err(Error::DatatypeMismatch {
                expected: DatatypeTag::I32,
                received: DatatypeTag::F32,
            }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn truncated_payloads_are_rejected() {
        let mut bytes = encode(&[7u64]);
        bytes.pop();
        assert!(matches!(
            decode::<u64>(&envelope(bytes)),
            Err(Error::UnexpectedMessage { rank: 3, tag: 9, .. })
        ));
        assert!(decode::<u64>(&envelope(Vec::new())).is_err());
        assert!(decode_indexed::<u64>(&envelope(vec![DatatypeTag::U64 as u8, 1])).is_err());
        assert!(decode::<u8>(&envelope(vec![200])).is_err());
    }
}
