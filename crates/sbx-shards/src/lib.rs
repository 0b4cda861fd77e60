//! sbx-shards: ciphertext dispersal
//!
//! A ciphertext buffer is split into 1–10 contiguous ranges whose lengths
//! are drawn from a randomized proportional-allocation plan, each range is
//! uploaded under a fresh unguessable object name, and reassembly fetches
//! the named objects back and concatenates them in the original order.
//!
//! The ciphertext has no internal boundaries, so correctness is purely
//! positional: chunk order in the manifest is the only ordering metadata
//! anywhere in the system.

pub mod disperse;
pub mod names;
pub mod plan;

pub use disperse::{delete_chunks, reassemble, shard_and_upload};
pub use names::chunk_name;
pub use plan::plan_sizes;

/// Upper bound on chunks per file (the weight budget of the size plan).
pub const MAX_CHUNKS: usize = 10;
