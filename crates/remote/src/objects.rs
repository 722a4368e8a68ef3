// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Blob service interfaces
//!
//! The transfer pipeline only sees these traits. [`crate::CloudFilesClient`]
//! implements them over HTTP and [`crate::MemoryObjectStore`] in memory.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

/// One entry of a container listing (Swift JSON listing format)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
    /// Content hash reported by the store (MD5, lowercase hex)
    pub hash: String,
    /// Stored size in bytes
    pub bytes: u64,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Address of one object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub container: String,
    pub name: String,
}

impl ObjectRef {
    #[must_use]
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.name)
    }
}

/// Object headers returned by HEAD and GET
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    pub content_length: Option<u64>,
    /// Store digest, possibly quoted for large-object manifests
    pub etag: Option<String>,
    /// `X-Object-Manifest` value (`container/prefix`) when the object is segmented
    pub manifest: Option<String>,
}

/// Streaming body of a GET
pub struct ObjectBody {
    pub reader: Box<dyn Read + Send>,
    pub meta: ObjectMeta,
}

/// Streaming body and integrity headers for a PUT
pub struct ObjectUpload {
    pub reader: Box<dyn Read + Send>,
    pub content_length: u64,
    /// Expected digest sent as the `ETag` request header
    pub etag: Option<String>,
    pub content_type: String,
}

/// What the store acknowledged after a PUT
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutReceipt {
    pub etag: Option<String>,
}

pub trait ObjectLister: Send + Sync {
    /// List a container, optionally restricted to names starting with `prefix`.
    /// An empty container is an empty vector, never an error.
    fn list_objects(&self, container: &str, prefix: Option<&str>) -> Result<Vec<ObjectEntry>>;
}

pub trait ObjectReader: Send + Sync {
    fn get_object(&self, object: &ObjectRef) -> Result<ObjectBody>;

    fn head_object(&self, object: &ObjectRef) -> Result<ObjectMeta>;
}

pub trait ObjectWriter: Send + Sync {
    fn put_object(&self, object: &ObjectRef, upload: ObjectUpload) -> Result<PutReceipt>;
}

/// Everything the transfer pipeline needs from a blob store
pub trait BlobStore: ObjectLister + ObjectReader + ObjectWriter {}

impl<T: ObjectLister + ObjectReader + ObjectWriter> BlobStore for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_entry_parses_swift_json() {
        let json = r#"[
            {"name": "vault/DB/7", "hash": "9e107d9d372bb6826bd81d3542a419d6",
             "bytes": 1024, "content_type": "application/x-gzip",
             "last_modified": "2025-03-01T12:00:00.000000"},
            {"name": "vault/DB/8", "hash": "e4d909c290d0fb1ca068ffaddf22cbd0", "bytes": 0}
        ]"#;
        let entries: Vec<ObjectEntry> = serde_json::from_str(json).expect("parse");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "vault/DB/7");
        assert_eq!(entries[0].bytes, 1024);
        assert_eq!(
            entries[0].last_modified.as_deref(),
            Some("2025-03-01T12:00:00.000000")
        );
        assert_eq!(entries[1].content_type, None);
    }

    #[test]
    fn test_object_ref_display() {
        let r = ObjectRef::new("backups", "vault/BUNDLES/0000000042");
        assert_eq!(r.to_string(), "backups/vault/BUNDLES/0000000042");
    }
}
