//! 256-bit map keys.

use sha3::{Digest, Sha3_256};
use std::collections::HashSet;

pub const KEY_SIZE: usize = 32;

/// A 256-bit key, stored as four little-endian 64-bit words.
///
/// Keys are opaque to the filter: it never inspects their structure, only
/// digests the words under the construction seed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub words: [u64; 4],
}

impl Key {
    pub fn new(words: [u64; 4]) -> Self {
        Self { words }
    }

    /// Decodes a key from 32 raw bytes, little-endian word order.
    pub fn from_bytes(bytes: &[u8; KEY_SIZE]) -> Self {
        let mut words = [0u64; 4];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *word = u64::from_le_bytes(buf);
        }
        Self { words }
    }

    /// Derives a key from an arbitrary-length keyword by hashing it down to
    /// 32 bytes with SHA3-256.
    ///
    /// This is how variable-length lookup keys (addresses, names, URLs) are
    /// mapped onto the fixed-width key space the filter indexes.
    pub fn from_keyword(keyword: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(keyword);
        let digest = hasher.finalize();
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&digest);
        Self::from_bytes(&bytes)
    }

    /// Re-encodes the key as 32 little-endian bytes.
    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        let mut bytes = [0u8; KEY_SIZE];
        for (chunk, word) in bytes.chunks_exact_mut(8).zip(self.words.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }
}

/// Returns true when no two keys compare equal.
pub fn all_distinct(keys: &[Key]) -> bool {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter().all(|key| seen.insert(*key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_little_endian_words() {
        let mut bytes = [0u8; KEY_SIZE];
        bytes[0] = 1; // word 0 = 1
        bytes[15] = 2; // word 1 = 2 << 56
        let key = Key::from_bytes(&bytes);
        assert_eq!(key.words[0], 1);
        assert_eq!(key.words[1], 2u64 << 56);
        assert_eq!(key.words[2], 0);
        assert_eq!(key.words[3], 0);
    }

    #[test]
    fn test_bytes_round_trip() {
        let key = Key::new([u64::MAX, 0x0102030405060708, 0, 42]);
        assert_eq!(Key::from_bytes(&key.to_bytes()), key);
    }

    #[test]
    fn test_from_keyword_deterministic_and_distinct() {
        let a = Key::from_keyword(b"alice");
        assert_eq!(a, Key::from_keyword(b"alice"));
        assert_ne!(a, Key::from_keyword(b"bob"));
    }

    #[test]
    fn test_ordering_is_word_lexicographic() {
        let low = Key::new([0, 0, 0, 1]);
        let high = Key::new([1, 0, 0, 0]);
        assert!(low < high);
    }

    #[test]
    fn test_all_distinct() {
        let keys = vec![Key::new([1, 0, 0, 0]), Key::new([2, 0, 0, 0])];
        assert!(all_distinct(&keys));

        let dupes = vec![Key::new([1, 0, 0, 0]), Key::new([1, 0, 0, 0])];
        assert!(!all_distinct(&dupes));
        assert!(all_distinct(&[]));
    }
}
