// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Clients for the Rackspace services behind Cloud Backup
//!
//! - **Identity**: API-key authentication with a cached token and service catalog
//! - **Cloud Files**: the Swift object store holding vault databases and bundles
//! - **Cloud Backup**: account-level agent actions
//!
//! Object access goes through the [`ObjectLister`], [`ObjectReader`] and
//! [`ObjectWriter`] traits so the transfer pipeline can run against
//! [`MemoryObjectStore`] in tests.
//!
//! # Usage
//!
//! ```no_run
//! # fn example() -> Result<(), remote::RemoteError> {
//! use remote::{ApiKeyCredentials, CloudFilesClient, IdentityClient, ObjectLister};
//! use std::sync::Arc;
//!
//! let identity = Arc::new(IdentityClient::new(
//!     remote::DEFAULT_IDENTITY_URL,
//!     ApiKeyCredentials {
//!         username: "user".to_string(),
//!         api_key: "key".to_string(),
//!     },
//! )?);
//! let storage = identity.session()?.catalog.endpoint("object-store", "DFW", false)?;
//! let files = CloudFilesClient::new(&storage, identity)?;
//! for entry in files.list_objects("cloudbackup", Some("vault/DB/"))? {
//!     println!("{} {}", entry.name, entry.bytes);
//! }
//! # Ok(())
//! # }
//! ```

mod auth;
mod backup_api;
mod cloudfiles;
mod error;
mod memory;
mod objects;

pub use auth::{
    ApiKeyCredentials, CatalogEndpoint, CatalogService, DEFAULT_IDENTITY_URL, IdentityClient,
    ServiceCatalog, Session, StaticToken, TokenProvider,
};
pub use backup_api::BackupApiClient;
pub use cloudfiles::{CloudFilesClient, LISTING_PAGE_SIZE};
pub use error::RemoteError;
pub use memory::{MemoryObjectStore, md5_hex};
pub use objects::{
    BlobStore, ObjectBody, ObjectEntry, ObjectLister, ObjectMeta, ObjectReader, ObjectRef,
    ObjectUpload, ObjectWriter, PutReceipt,
};

/// Service type of Cloud Files in the identity catalog
pub const OBJECT_STORE_SERVICE: &str = "object-store";
/// Service type of Cloud Backup in the identity catalog
pub const BACKUP_SERVICE: &str = "rax:backup";

pub type Result<T> = std::result::Result<T, RemoteError>;
