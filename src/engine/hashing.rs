//! Content checksums: the values the decision table compares across the
//! local, database, and server views.

use anyhow::Result;
use blake3::Hasher;
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::utils::config::HashingConsts;

/// Blake3 checksum of a local file. Files up to the mmap threshold go
/// through a buffered reader; larger ones are mapped so a multi-gigabyte
/// transfer candidate never lands on the heap.
pub fn hash_file(path: &Path, size: u64) -> Result<Option<[u8; 32]>> {
    let file = File::open(path)?;
    let mut hasher = Hasher::new();

    if size <= HashingConsts::HASH_MMAP_THRESHOLD {
        let mut reader = BufReader::with_capacity(HashingConsts::HASH_READ_CHUNK_SIZE, file);
        let mut chunk = vec![0u8; HashingConsts::HASH_READ_CHUNK_SIZE];
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            hasher.update(&chunk[..n]);
        }
    } else {
        // blake3 walks the mapped pages with its own SIMD loop.
        let mmap = unsafe { Mmap::map(&file)? };
        hasher.update(&mmap);
    }

    Ok(Some(*hasher.finalize().as_bytes()))
}

/// Hash an in-memory buffer with blake3.
pub fn hash_bytes(content: &[u8]) -> [u8; 32] {
    *blake3::hash(content).as_bytes()
}

/// Compare a computed hash against a stored checksum.
pub fn checksum_equals(hash: &Option<[u8; 32]>, stored: &Option<Vec<u8>>) -> bool {
    match (hash, stored) {
        (None, None) => true,
        (Some(a), Some(b)) => a.as_slice() == b.as_slice(),
        _ => false,
    }
}

/// Compare two stored checksums.
pub fn stored_checksum_equals(a: &Option<Vec<u8>>, b: &Option<Vec<u8>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
