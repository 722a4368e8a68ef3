// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Segmented hashing for large objects
//!
//! Cloud Files stores objects above 5 GiB as a manifest over fixed-size
//! segments. Its ETag for such an object is the MD5 of the concatenated
//! lowercase hex MD5s of the segments, so the local file is hashed the same
//! way. Segment boundaries depend only on byte offsets.

use crate::digest::verify_digest;
use crate::io::read_chunk;
use crate::{Result, VaultError};
use md5::{Digest, Md5};
use remote::ObjectEntry;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const GIB: u64 = 1024 * 1024 * 1024;

/// Segment size used when large objects are uploaded
pub const SEGMENT_SIZE: u64 = 512 * 1024 * 1024;

/// Largest object the store accepts in a single PUT
pub const LARGE_OBJECT_THRESHOLD: u64 = 5 * GIB;

/// Cloud Files limits a manifest to this many segments
pub const MAX_SEGMENTS: u64 = 1000;

pub const SPLIT_BLOCK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentConfig {
    pub segment_size: u64,
    /// Objects strictly larger than this are segmented
    pub threshold: u64,
    pub block_size: usize,
    /// Objects larger than this are refused outright
    pub max_object_size: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            segment_size: SEGMENT_SIZE,
            threshold: LARGE_OBJECT_THRESHOLD,
            block_size: SPLIT_BLOCK_SIZE,
            max_object_size: MAX_SEGMENTS * LARGE_OBJECT_THRESHOLD,
        }
    }
}

/// Whether an object of `size` bytes is stored segmented.
/// The threshold itself still fits in one segment.
#[must_use]
pub fn needs_segmenting(size: u64, threshold: u64) -> bool {
    size > threshold
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentedDigest {
    /// Lowercase hex MD5 of each segment, in order
    pub segment_digests: Vec<String>,
    /// MD5 over the concatenated segment digest strings
    pub composite_digest: String,
    pub bytes: u64,
}

impl SegmentedDigest {
    /// Compare the composite digest with the store's manifest ETag
    pub fn verify(&self, remote_etag: &str) -> Result<()> {
        verify_digest("large object composite digest", remote_etag, &self.composite_digest)
    }

    /// Compare each segment with the store's listing of the manifest's segments
    pub fn verify_segments(&self, listing: &[ObjectEntry]) -> Result<()> {
        if listing.len() != self.segment_digests.len() {
            return Err(VaultError::mismatch(
                "large object segment count",
                listing.len().to_string(),
                self.segment_digests.len().to_string(),
            ));
        }
        for (entry, local) in listing.iter().zip(&self.segment_digests) {
            verify_digest(&format!("segment {}", entry.name), &entry.hash, local)?;
        }
        Ok(())
    }
}

/// Hash `reader` as consecutive `segment_size` segments, reading
/// `block_size` bytes at a time. A block that straddles a boundary is split
/// across the two segments.
pub fn split_digest<R: Read>(mut reader: R, segment_size: u64, block_size: usize) -> Result<SegmentedDigest> {
    let segment_size = segment_size.max(1);
    let mut buf = vec![0u8; block_size.max(1)];
    let mut segment_digests = Vec::new();
    let mut current = Md5::new();
    let mut in_segment = 0u64;
    let mut bytes = 0u64;

    loop {
        let n = read_chunk(&mut reader, &mut buf)?;
        if n == 0 {
            break;
        }
        bytes += n as u64;

        let mut block = &buf[..n];
        while !block.is_empty() {
            let room = segment_size - in_segment;
            let take = block.len().min(usize::try_from(room).unwrap_or(usize::MAX));
            current.update(&block[..take]);
            in_segment += take as u64;
            block = &block[take..];

            if in_segment == segment_size {
                segment_digests.push(hex::encode(current.finalize_reset()));
                in_segment = 0;
            }
        }
    }
    if in_segment > 0 {
        segment_digests.push(hex::encode(current.finalize()));
    }

    let mut composite = Md5::new();
    for digest in &segment_digests {
        composite.update(digest.as_bytes());
    }

    Ok(SegmentedDigest {
        segment_digests,
        composite_digest: hex::encode(composite.finalize()),
        bytes,
    })
}

pub fn split_file(path: &Path, config: &SegmentConfig) -> Result<SegmentedDigest> {
    split_digest(File::open(path)?, config.segment_size, config.block_size)
}
