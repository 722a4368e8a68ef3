// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Incremental MD5/SHA-1 computation over streamed chunks
//!
//! Digests are carried as uppercase hex. Every comparison goes through
//! [`normalize_digest`], so quoting, surrounding whitespace and case never
//! matter.

use crate::{Result, VaultError};
use md5::{Digest, Md5};
use sha1::Sha1;

/// Running MD5 and SHA-1 over the same byte stream
#[derive(Clone, Default)]
pub struct HashingAccumulator {
    md5: Md5,
    sha1: Sha1,
    bytes: u64,
}

impl HashingAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.md5.update(chunk);
        self.sha1.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Digests of everything seen so far. The accumulator can keep going.
    #[must_use]
    pub fn snapshot(&self) -> Digests {
        self.clone().finish()
    }

    #[must_use]
    pub fn finish(self) -> Digests {
        Digests {
            md5: hex::encode_upper(self.md5.finalize()),
            sha1: hex::encode_upper(self.sha1.finalize()),
            bytes: self.bytes,
        }
    }
}

/// Final digests of one byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digests {
    pub md5: String,
    pub sha1: String,
    pub bytes: u64,
}

impl Digests {
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        let mut acc = HashingAccumulator::new();
        acc.update(data);
        acc.finish()
    }

    /// Compare against a declared digest, choosing the algorithm by its
    /// length: 32 hex characters is MD5, 40 is SHA-1. Anything else never
    /// matches.
    #[must_use]
    pub fn matches(&self, expected: &str) -> bool {
        match normalize_digest(expected).len() {
            32 => digests_match(expected, &self.md5),
            40 => digests_match(expected, &self.sha1),
            _ => false,
        }
    }

    /// The digest of the same algorithm as `expected`, for error messages
    #[must_use]
    pub fn counterpart(&self, expected: &str) -> &str {
        if normalize_digest(expected).len() == 40 {
            &self.sha1
        } else {
            &self.md5
        }
    }
}

/// Uppercase, trimmed and unquoted form of a digest
#[must_use]
pub fn normalize_digest(digest: &str) -> String {
    digest.trim().trim_matches('"').trim().to_ascii_uppercase()
}

#[must_use]
pub fn digests_match(a: &str, b: &str) -> bool {
    normalize_digest(a) == normalize_digest(b)
}

/// Fail with [`VaultError::IntegrityMismatch`] unless the digests agree
pub fn verify_digest(what: &str, expected: &str, actual: &str) -> Result<()> {
    if digests_match(expected, actual) {
        Ok(())
    } else {
        Err(VaultError::mismatch(
            what,
            normalize_digest(expected),
            normalize_digest(actual),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_MD5: &str = "5D41402ABC4B2A76B9719D911017C592";
    const HELLO_SHA1: &str = "AAF4C61DDCC5E8A2DABEDE0F3B482CD9AEA9434D";

    #[test]
    fn test_known_digests() {
        let d = Digests::of(b"hello");
        assert_eq!(d.md5, HELLO_MD5);
        assert_eq!(d.sha1, HELLO_SHA1);
        assert_eq!(d.bytes, 5);
    }

    #[test]
    fn test_chunking_does_not_change_digest() {
        let mut acc = HashingAccumulator::new();
        for chunk in [&b"he"[..], b"", b"ll", b"o"] {
            acc.update(chunk);
        }
        assert_eq!(acc.finish(), Digests::of(b"hello"));
    }

    #[test]
    fn test_snapshot_leaves_accumulator_usable() {
        let mut acc = HashingAccumulator::new();
        acc.update(b"hel");
        let partial = acc.snapshot();
        acc.update(b"lo");
        assert_eq!(partial, Digests::of(b"hel"));
        assert_eq!(acc.finish().md5, HELLO_MD5);
    }

    #[test]
    fn test_normalization() {
        assert!(digests_match(
            "\"5d41402abc4b2a76b9719d911017c592\"",
            " 5D41402ABC4B2A76B9719D911017C592\n"
        ));
        assert!(!digests_match(HELLO_MD5, HELLO_SHA1));
    }

    #[test]
    fn test_matches_picks_algorithm_by_length() {
        let d = Digests::of(b"hello");
        assert!(d.matches(&HELLO_MD5.to_lowercase()));
        assert!(d.matches(&HELLO_SHA1.to_lowercase()));
        assert!(!d.matches("5D41402ABC4B2A76"));
        assert!(!d.matches(""));
        assert_eq!(d.counterpart(HELLO_SHA1), HELLO_SHA1);
    }

    #[test]
    fn test_verify_digest_mismatch() {
        let err = verify_digest("bundle", HELLO_MD5, HELLO_SHA1).expect_err("mismatch");
        assert!(matches!(err, VaultError::IntegrityMismatch { .. }));
        assert!(verify_digest("bundle", &HELLO_MD5.to_lowercase(), HELLO_MD5).is_ok());
    }
}
