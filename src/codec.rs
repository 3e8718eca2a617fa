//! Byte-exact filter serialization.
//!
//! Fixed-order little-endian layout with no magic number or version tag:
//! seed, num_keys, plaintext_modulo, label, segment_length, segment_count,
//! segment_count_length, array_length, then the fingerprint table. The
//! segment length mask is recomputed on load.

use crate::filter::Filter;
use crate::geometry::Geometry;
use thiserror::Error;

pub const SEED_SIZE: usize = 32;
pub const HEADER_SIZE: usize = 68;

const NUM_KEYS_OFFSET: usize = 32;
const MODULO_OFFSET: usize = 36;
const LABEL_OFFSET: usize = 44;
const SEGMENT_LENGTH_OFFSET: usize = 52;
const SEGMENT_COUNT_OFFSET: usize = 56;
const SEGMENT_COUNT_LENGTH_OFFSET: usize = 60;
const ARRAY_LENGTH_OFFSET: usize = 64;

/// Errors raised while decoding a serialized filter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer too short for filter header")]
    TruncatedHeader,
    #[error("buffer length does not match the fingerprint table size")]
    LengthMismatch,
    #[error("header geometry is inconsistent")]
    InvalidGeometry,
}

impl Filter {
    /// Exact byte length `serialize` requires.
    pub fn serialized_num_bytes(&self) -> usize {
        HEADER_SIZE + self.fingerprints.len() * 4
    }

    /// Writes the filter into `out`.
    ///
    /// Returns false iff `out.len()` differs from `serialized_num_bytes`.
    pub fn serialize(&self, out: &mut [u8]) -> bool {
        if out.len() != self.serialized_num_bytes() {
            return false;
        }

        out[..SEED_SIZE].copy_from_slice(&self.seed);
        out[NUM_KEYS_OFFSET..MODULO_OFFSET].copy_from_slice(&self.num_keys.to_le_bytes());
        out[MODULO_OFFSET..LABEL_OFFSET].copy_from_slice(&self.plaintext_modulo.to_le_bytes());
        out[LABEL_OFFSET..SEGMENT_LENGTH_OFFSET].copy_from_slice(&self.label.to_le_bytes());
        out[SEGMENT_LENGTH_OFFSET..SEGMENT_COUNT_OFFSET]
            .copy_from_slice(&self.geometry.segment_length.to_le_bytes());
        out[SEGMENT_COUNT_OFFSET..SEGMENT_COUNT_LENGTH_OFFSET]
            .copy_from_slice(&self.geometry.segment_count.to_le_bytes());
        out[SEGMENT_COUNT_LENGTH_OFFSET..ARRAY_LENGTH_OFFSET]
            .copy_from_slice(&self.geometry.segment_count_length.to_le_bytes());
        out[ARRAY_LENGTH_OFFSET..HEADER_SIZE]
            .copy_from_slice(&self.geometry.array_length.to_le_bytes());

        for (chunk, fingerprint) in out[HEADER_SIZE..]
            .chunks_exact_mut(4)
            .zip(&self.fingerprints)
        {
            chunk.copy_from_slice(&fingerprint.to_le_bytes());
        }
        true
    }

    /// Convenience wrapper allocating the exact serialization buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.serialized_num_bytes()];
        let ok = self.serialize(&mut out);
        debug_assert!(ok);
        out
    }

    /// Decodes a filter previously written by `serialize`.
    ///
    /// The header is trusted apart from length and geometry consistency
    /// checks; no peeling state is revalidated.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(DecodeError::TruncatedHeader);
        }

        let mut seed = [0u8; SEED_SIZE];
        seed.copy_from_slice(&bytes[..SEED_SIZE]);

        let num_keys = read_u32(bytes, NUM_KEYS_OFFSET);
        let plaintext_modulo = read_u64(bytes, MODULO_OFFSET);
        let label = read_u64(bytes, LABEL_OFFSET);
        let segment_length = read_u32(bytes, SEGMENT_LENGTH_OFFSET);
        let segment_count = read_u32(bytes, SEGMENT_COUNT_OFFSET);
        let segment_count_length = read_u32(bytes, SEGMENT_COUNT_LENGTH_OFFSET);
        let array_length = read_u32(bytes, ARRAY_LENGTH_OFFSET);

        if segment_length == 0
            || u64::from(array_length) != (u64::from(segment_count) + 2) * u64::from(segment_length)
            || u64::from(segment_count_length)
                != u64::from(segment_count) * u64::from(segment_length)
        {
            return Err(DecodeError::InvalidGeometry);
        }
        if bytes.len() != HEADER_SIZE + array_length as usize * 4 {
            return Err(DecodeError::LengthMismatch);
        }

        let fingerprints = bytes[HEADER_SIZE..]
            .chunks_exact(4)
            .map(|chunk| {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(chunk);
                u32::from_le_bytes(buf)
            })
            .collect();

        Ok(Self {
            seed,
            num_keys,
            plaintext_modulo,
            label,
            geometry: Geometry::from_header(
                segment_length,
                segment_count,
                segment_count_length,
                array_length,
            ),
            fingerprints,
        })
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}
