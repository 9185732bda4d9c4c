//! # Hasher Module
//!
//! Computes the content hash used to look files up remotely.
//!
//! ## ed2k
//! AniDB identifies files by size plus their eDonkey2000 hash:
//! 1. Split the file into 9,728,000 byte chunks
//! 2. MD4 each chunk
//! 3. A single-chunk file hashes to that chunk's digest, larger files
//!    to the MD4 of the concatenated chunk digests
//!
//! ## Example
//! ```rust,ignore
//! use anime_identifier::core::hasher::{ContentHasher, Ed2kHasher};
//!
//! let hash = Ed2kHasher::new().hash_file(&path)?;
//! println!("{} bytes, ed2k {}", hash.size, hash.hash);
//! ```

mod ed2k;
mod traits;

pub use ed2k::{Ed2kHasher, ED2K_CHUNK_SIZE};
pub use traits::{ContentHash, ContentHasher};
