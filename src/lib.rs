//! Binary fuse filter for key-value maps over Z_p.
//!
//! Compresses a static mapping from 256-bit keys to values in
//! `[0, plaintext_modulo)` into a flat `u32` fingerprint table. Recovering a
//! key inserted at build time sums its three table taps plus a per-key mask
//! modulo p; absent keys yield arbitrary values and there is no membership
//! test.
//!
//! Binary fuse filters: https://arxiv.org/abs/2201.01174. The Z_p value
//! reconstruction follows the bff-modp construction of
//! https://github.com/claucece/chalamet.

pub mod codec;
pub mod filter;
pub mod geometry;
pub mod hashing;
pub mod key;
pub mod timing;

pub use codec::DecodeError;
pub use filter::{BuildError, Filter};
pub use key::Key;
