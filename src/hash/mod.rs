//! Extensible Hash Index Module
//!
//! Unordered index from a two-part key to the byte offset of a record.
//! Used for the relationship table, where only exact and per-component
//! lookups are needed.
//!
//! ## Structure
//! A directory of `2^global_depth` slots points into a smaller arena of
//! buckets. The low `global_depth` bits of a key's hash pick the slot. A
//! bucket with `local_depth < global_depth` is shared by
//! `2^(global_depth - local_depth)` slots. When an insert would overflow a
//! bucket, the bucket splits on one more hash bit; the directory doubles
//! first only when the bucket's local depth already equals the global depth.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ GlobalDepth: u32 | BucketSize: u32 | UniqueBucketCount: u32  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ per unique bucket:                                           │
//! │   LocalDepth: u32 | EntryCount: u32                          │
//! │   [KeyA: u64][KeyB: u64][Offset: u64] ... EntryCount ...     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ DirectoryBucketIndex: u32 × 2^GlobalDepth                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ CRC32 of everything above: u32                               │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod bucket;
mod index;
mod persist;

pub use bucket::HashEntry;
pub use index::{ExtensibleHashIndex, MAX_GLOBAL_DEPTH};

/// Deterministic, order-sensitive 64-bit hash of a composite key
///
/// The two components are mixed asymmetrically, so `(a, b)` and `(b, a)`
/// are hashed as distinct keys rather than folded together.
pub fn hash_pair(first: u64, second: u64) -> u64 {
    let h = mix64(first ^ 0x9e37_79b9_7f4a_7c15);
    mix64(h.rotate_left(23) ^ second.wrapping_mul(0xc2b2_ae3d_27d4_eb4f))
}

/// SplitMix64 finalizer
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
