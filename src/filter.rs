//! Filter construction and value recovery.
//!
//! `build` assigns a `u32` fingerprint table over a 3-uniform hypergraph:
//! each key taps three slots in consecutive segments, and hypergraph peeling
//! orders the keys so every key owns one slot written after the other two.
//! `recover` then sums the three taps plus a per-key mask modulo the
//! plaintext modulus.

use crate::geometry::Geometry;
use crate::hashing::{mix, mix256, mod3, mulhi};
use crate::key::{all_distinct, Key};
use std::collections::HashMap;
use thiserror::Error;

/// Peeling rounds before construction gives up for the supplied seed.
///
/// Rounds are deterministic for a fixed seed; callers retry with a fresh
/// seed on `ConstructionFailed`.
pub const MAX_BUILD_ATTEMPTS: usize = 100;

/// Smallest accepted plaintext modulus.
pub const MIN_PLAINTEXT_MODULO: u64 = 256;

/// Errors raised while building a filter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("number of keys and values must be equal")]
    MismatchedSizes,
    #[error("all keys must be distinct")]
    DuplicateKey,
    #[error("plaintext modulo must be >= {MIN_PLAINTEXT_MODULO}")]
    ModuloTooSmall,
    #[error("failed to construct filter within {MAX_BUILD_ATTEMPTS} attempts")]
    ConstructionFailed,
}

/// A built filter: immutable, shareable, and serializable.
#[derive(Debug)]
pub struct Filter {
    pub(crate) seed: [u8; 32],
    pub(crate) num_keys: u32,
    pub(crate) plaintext_modulo: u64,
    pub(crate) label: u64,
    pub(crate) geometry: Geometry,
    pub(crate) fingerprints: Vec<u32>,
}

impl Filter {
    /// Builds a filter mapping `keys[i]` to `values[i]` modulo
    /// `plaintext_modulo`.
    ///
    /// Keys and values are borrowed for the duration of the call only. The
    /// seed is frozen into the filter and reproduced on deserialization;
    /// `label` is folded into every per-key mask so the same map yields
    /// unrelated tables under different labels.
    pub fn build(
        seed: &[u8; 32],
        keys: &[Key],
        values: &[u32],
        plaintext_modulo: u64,
        label: u64,
    ) -> Result<Self, BuildError> {
        if keys.len() != values.len() {
            return Err(BuildError::MismatchedSizes);
        }
        if !all_distinct(keys) {
            return Err(BuildError::DuplicateKey);
        }
        if plaintext_modulo < MIN_PLAINTEXT_MODULO {
            return Err(BuildError::ModuloTooSmall);
        }

        let n = keys.len();
        let num_keys = n as u32;
        let geometry = Geometry::for_keys(num_keys);
        let array_length = geometry.array_length as usize;

        let mut filter = Self {
            seed: *seed,
            num_keys,
            plaintext_modulo,
            label,
            geometry,
            fingerprints: vec![0u32; array_length],
        };

        // Digests are fixed for a given seed, so compute them once, along
        // with the digest -> value map the reverse sweep reads.
        let mut digests = Vec::with_capacity(n);
        let mut value_of_digest = HashMap::with_capacity(n);
        for (key, &value) in keys.iter().zip(values) {
            let hash = mix256(&key.words, seed);
            digests.push(hash);
            value_of_digest.insert(hash, value);
        }

        // reverse_order doubles as the bucket-sort scratch during placement
        // and as the peel stack afterwards; the trailing sentinel bounds the
        // linear probe.
        let mut reverse_order = vec![0u64; n + 1];
        reverse_order[n] = 1;
        let mut reverse_h = vec![0u8; n];
        let mut t2count = vec![0u8; array_length];
        let mut t2hash = vec![0u64; array_length];
        let mut alone: Vec<u32> = Vec::with_capacity(array_length);

        let mut block_bits = 1u32;
        while (1u32 << block_bits) < geometry.segment_count {
            block_bits += 1;
        }
        let block_size = 1usize << block_bits;
        let block_mask = block_size - 1;
        let mut start_pos = vec![0u32; block_size];

        for attempt in 0.. {
            if attempt >= MAX_BUILD_ATTEMPTS {
                return Err(BuildError::ConstructionFailed);
            }

            // Bucket-sort the digests by their top block_bits so slots fill
            // in roughly segment order.
            for (i, pos) in start_pos.iter_mut().enumerate() {
                *pos = ((i as u64 * n as u64) >> block_bits) as u32;
            }
            for &hash in &digests {
                let mut block = (hash >> (64 - block_bits)) as usize;
                while reverse_order[start_pos[block] as usize] != 0 {
                    block = (block + 1) & block_mask;
                }
                reverse_order[start_pos[block] as usize] = hash;
                start_pos[block] += 1;
            }

            // Packed per-slot state: high 6 bits count keys x4, low 2 bits
            // XOR-accumulate the tap role, and t2hash XORs every digest
            // touching the slot.
            let mut overflowed = false;
            for i in 0..n {
                let hash = reverse_order[i];
                let (h0, h1, h2) = filter.hash_batch(hash);
                let (h0, h1, h2) = (h0 as usize, h1 as usize, h2 as usize);

                t2count[h0] = t2count[h0].wrapping_add(4);
                t2hash[h0] ^= hash;

                t2count[h1] = t2count[h1].wrapping_add(4);
                t2count[h1] ^= 1;
                t2hash[h1] ^= hash;

                t2count[h2] = t2count[h2].wrapping_add(4);
                t2count[h2] ^= 2;
                t2hash[h2] ^= hash;

                // 64 keys on one slot wraps the packed counter.
                overflowed |= t2count[h0] < 4 || t2count[h1] < 4 || t2count[h2] < 4;
            }

            if overflowed {
                log::debug!("slot counter overflow in attempt {attempt}");
                reverse_order[..n].fill(0);
                t2count.fill(0);
                t2hash.fill(0);
                continue;
            }

            alone.clear();
            for (slot, &count) in t2count.iter().enumerate() {
                if count >> 2 == 1 {
                    alone.push(slot as u32);
                }
            }

            // Peel degree-1 slots. When a slot holds exactly one key, the
            // XOR accumulators collapse to that key's digest and tap role.
            let mut stack_size = 0usize;
            while let Some(index) = alone.pop() {
                let index = index as usize;
                if t2count[index] >> 2 != 1 {
                    continue;
                }
                let hash = t2hash[index];
                let found = t2count[index] & 3;
                reverse_h[stack_size] = found;
                reverse_order[stack_size] = hash;
                stack_size += 1;

                let (h0, h1, h2) = filter.hash_batch(hash);
                let h012 = [0, h1, h2, h0, h1];
                for step in 1..=2u8 {
                    let other = h012[usize::from(found + step)] as usize;
                    if t2count[other] >> 2 == 2 {
                        alone.push(other as u32);
                    }
                    t2count[other] = t2count[other].wrapping_sub(4);
                    t2count[other] ^= mod3(found + step);
                    t2hash[other] ^= hash;
                }
            }

            if stack_size == n {
                break;
            }

            log::debug!("peeling stalled at {stack_size}/{n} keys in attempt {attempt}");
            reverse_order[..n].fill(0);
            t2count.fill(0);
            t2hash.fill(0);
        }

        // Reverse peel order: each key's own slot is written after both of
        // its other taps hold their final values, so the three-tap sum plus
        // mask telescopes back to the stored value.
        let modulo = plaintext_modulo;
        for i in (0..n).rev() {
            let hash = reverse_order[i];
            let value = value_of_digest.get(&hash).copied().unwrap_or(0);
            let found = usize::from(reverse_h[i]);

            let (h0, h1, h2) = filter.hash_batch(hash);
            let h012 = [h0, h1, h2, h0, h1];

            let entry = ((u64::from(value) % modulo)
                .wrapping_sub(u64::from(filter.fingerprints[h012[found + 1] as usize]))
                .wrapping_sub(u64::from(filter.fingerprints[h012[found + 2] as usize]))
                % modulo) as u32;
            let mask = (mix(hash, label) % modulo) as u32;
            filter.fingerprints[h012[found] as usize] =
                (u64::from(entry.wrapping_sub(mask)) % modulo) as u32;
        }

        Ok(filter)
    }

    /// Recovers the value stored for `key`.
    ///
    /// Total: a key absent at build time yields an arbitrary value in
    /// `[0, plaintext_modulo)`.
    pub fn recover(&self, key: &Key) -> u32 {
        let hash = mix256(&key.words, &self.seed);
        let (h0, h1, h2) = self.hash_batch(hash);
        let data = self.fingerprints[h0 as usize]
            .wrapping_add(self.fingerprints[h1 as usize])
            .wrapping_add(self.fingerprints[h2 as usize]);
        let mask = (mix(hash, self.label) % self.plaintext_modulo) as u32;
        (u64::from(data.wrapping_add(mask)) % self.plaintext_modulo) as u32
    }

    /// The three table slots `key` taps.
    pub fn hash_taps(&self, key: &Key) -> (u32, u32, u32) {
        self.hash_batch(mix256(&key.words, &self.seed))
    }

    /// The unreduced per-key mask source `mix(H(key), label)`.
    pub fn key_fingerprint(&self, key: &Key) -> u64 {
        mix(mix256(&key.words, &self.seed), self.label)
    }

    /// The fingerprint table reduced modulo the plaintext modulus, for
    /// protocols that consume fingerprints directly.
    pub fn fingerprints_mod_p(&self) -> Vec<u32> {
        let modulo = self.plaintext_modulo as u32;
        self.fingerprints.iter().map(|&f| f % modulo).collect()
    }

    /// Table bits spent per stored key, for diagnostics.
    pub fn bits_per_entry(&self) -> usize {
        if self.num_keys == 0 {
            return 0;
        }
        self.fingerprints.len() * self.plaintext_modulo.ilog2() as usize / self.num_keys as usize
    }

    pub fn num_keys(&self) -> u32 {
        self.num_keys
    }

    pub fn plaintext_modulo(&self) -> u64 {
        self.plaintext_modulo
    }

    pub fn label(&self) -> u64 {
        self.label
    }

    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    pub fn segment_length(&self) -> u32 {
        self.geometry.segment_length
    }

    pub fn segment_count(&self) -> u32 {
        self.geometry.segment_count
    }

    pub fn array_length(&self) -> u32 {
        self.geometry.array_length
    }

    /// Derives h0 in the first-tap window and h1, h2 in the two following
    /// segments, with low digest bits XORed into the in-segment offsets.
    fn hash_batch(&self, hash: u64) -> (u32, u32, u32) {
        let g = &self.geometry;
        let h0 = mulhi(hash, u64::from(g.segment_count_length)) as u32;
        let mut h1 = h0 + g.segment_length;
        let mut h2 = h1 + g.segment_length;
        h1 ^= ((hash >> 18) as u32) & g.segment_length_mask;
        h2 ^= (hash as u32) & g.segment_length_mask;
        (h0, h1, h2)
    }
}
