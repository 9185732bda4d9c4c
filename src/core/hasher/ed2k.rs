//! eDonkey2000 (ed2k) file hashing.

use super::{ContentHash, ContentHasher};
use crate::error::HashError;
use md4::{Digest, Md4};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Size of one ed2k chunk in bytes
pub const ED2K_CHUNK_SIZE: u64 = 9_728_000;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// ed2k hasher backed by RustCrypto's MD4
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed2kHasher;

impl Ed2kHasher {
    /// Create a new ed2k hasher
    pub fn new() -> Self {
        Self
    }

    /// Hash everything `reader` yields.
    ///
    /// Returns the number of bytes read and the hex digest.
    pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<(u64, String)> {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut chunk_digests: Vec<u8> = Vec::new();
        let mut chunk_count = 0usize;
        let mut total = 0u64;

        loop {
            let mut hasher = Md4::new();
            let mut in_chunk = 0u64;

            while in_chunk < ED2K_CHUNK_SIZE {
                let want = (ED2K_CHUNK_SIZE - in_chunk).min(buffer.len() as u64) as usize;
                let read = reader.read(&mut buffer[..want])?;
                if read == 0 {
                    break;
                }
                hasher.update(&buffer[..read]);
                in_chunk += read as u64;
            }

            // An empty trailing chunk only counts for empty files
            if in_chunk == 0 && chunk_count > 0 {
                break;
            }

            chunk_digests.extend_from_slice(&hasher.finalize());
            chunk_count += 1;
            total += in_chunk;

            if in_chunk < ED2K_CHUNK_SIZE {
                break;
            }
        }

        let digest = if chunk_count == 1 {
            chunk_digests
        } else {
            Md4::digest(&chunk_digests).to_vec()
        };

        Ok((total, to_hex(&digest)))
    }
}

impl ContentHasher for Ed2kHasher {
    fn hash_file(&self, path: &Path) -> Result<ContentHash, HashError> {
        let io_error = |source| HashError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(io_error)?;
        let (size, hash) = Self::hash_reader(BufReader::new(file)).map_err(io_error)?;

        Ok(ContentHash { size, hash })
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
