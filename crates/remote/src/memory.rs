// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! In-memory blob store for tests and dry runs
//!
//! Behaves like Cloud Files where the pipeline can observe it: ordered
//! listings, lowercase MD5 ETags, and a 422 when a PUT's declared ETag does
//! not match the received bytes.

use crate::objects::{
    ObjectBody, ObjectEntry, ObjectLister, ObjectMeta, ObjectReader, ObjectRef, ObjectUpload,
    ObjectWriter, PutReceipt,
};
use crate::{RemoteError, Result};
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    etag: String,
    manifest: Option<String>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<(String, String), StoredObject>,
    put_etag_override: Option<Option<String>>,
    fail_status: Option<u16>,
    put_count: usize,
    last_put_etag: Option<String>,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    state: Mutex<State>,
}

/// Lowercase hex MD5, the form Swift reports in listings and ETags
#[must_use]
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_failure(state: &State, object: &str) -> Result<()> {
        match state.fail_status {
            Some(status) => Err(RemoteError::Status {
                status,
                url: format!("memory://{object}"),
                body: "injected failure".to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Store an object with the ETag the real service would compute
    pub fn insert(&self, container: &str, name: &str, data: impl Into<Vec<u8>>) {
        let data = data.into();
        let etag = md5_hex(&data);
        self.insert_with_etag(container, name, data, &etag);
    }

    /// Store an object with an arbitrary ETag, e.g. a quoted large-object digest
    pub fn insert_with_etag(&self, container: &str, name: &str, data: impl Into<Vec<u8>>, etag: &str) {
        let _ = self.lock().objects.insert(
            (container.to_string(), name.to_string()),
            StoredObject {
                data: data.into(),
                etag: etag.to_string(),
                manifest: None,
            },
        );
    }

    /// Mark an object as a large-object manifest
    pub fn set_manifest(&self, container: &str, name: &str, manifest: &str) {
        if let Some(obj) = self
            .lock()
            .objects
            .get_mut(&(container.to_string(), name.to_string()))
        {
            obj.manifest = Some(manifest.to_string());
        }
    }

    #[must_use]
    pub fn object_data(&self, container: &str, name: &str) -> Option<Vec<u8>> {
        self.lock()
            .objects
            .get(&(container.to_string(), name.to_string()))
            .map(|o| o.data.clone())
    }

    /// Make every following PUT acknowledge with `etag` instead of the real digest
    pub fn override_put_etag(&self, etag: Option<&str>) {
        self.lock().put_etag_override = Some(etag.map(str::to_string));
    }

    /// Make every following call fail with the given HTTP status
    pub fn fail_with_status(&self, status: Option<u16>) {
        self.lock().fail_status = status;
    }

    #[must_use]
    pub fn put_count(&self) -> usize {
        self.lock().put_count
    }

    /// ETag header sent with the most recent PUT
    #[must_use]
    pub fn last_put_etag(&self) -> Option<String> {
        self.lock().last_put_etag.clone()
    }
}

impl ObjectLister for MemoryObjectStore {
    fn list_objects(&self, container: &str, prefix: Option<&str>) -> Result<Vec<ObjectEntry>> {
        let state = self.lock();
        Self::check_failure(&state, container)?;
        Ok(state
            .objects
            .iter()
            .filter(|((c, name), _)| c == container && prefix.is_none_or(|p| name.starts_with(p)))
            .map(|((_, name), obj)| ObjectEntry {
                name: name.clone(),
                hash: obj.etag.trim_matches('"').to_string(),
                bytes: obj.data.len() as u64,
                last_modified: None,
                content_type: None,
            })
            .collect())
    }
}

impl ObjectReader for MemoryObjectStore {
    fn get_object(&self, object: &ObjectRef) -> Result<ObjectBody> {
        let meta = self.head_object(object)?;
        let data = self
            .object_data(&object.container, &object.name)
            .unwrap_or_default();
        Ok(ObjectBody {
            reader: Box::new(Cursor::new(data)),
            meta,
        })
    }

    fn head_object(&self, object: &ObjectRef) -> Result<ObjectMeta> {
        let state = self.lock();
        Self::check_failure(&state, &object.to_string())?;
        let obj = state
            .objects
            .get(&(object.container.clone(), object.name.clone()))
            .ok_or_else(|| RemoteError::ObjectNotFound {
                container: object.container.clone(),
                name: object.name.clone(),
            })?;
        Ok(ObjectMeta {
            content_length: Some(obj.data.len() as u64),
            etag: Some(obj.etag.clone()),
            manifest: obj.manifest.clone(),
        })
    }
}

impl ObjectWriter for MemoryObjectStore {
    fn put_object(&self, object: &ObjectRef, mut upload: ObjectUpload) -> Result<PutReceipt> {
        Self::check_failure(&self.lock(), &object.to_string())?;

        let mut data = Vec::new();
        let _ = upload.reader.read_to_end(&mut data)?;
        let actual = md5_hex(&data);

        let mut state = self.lock();
        state.put_count += 1;
        state.last_put_etag.clone_from(&upload.etag);

        if let Some(declared) = &upload.etag {
            if !declared.eq_ignore_ascii_case(&actual) {
                return Err(RemoteError::Status {
                    status: 422,
                    url: format!("memory://{object}"),
                    body: "Unprocessable Entity".to_string(),
                });
            }
        }

        let acknowledged = match &state.put_etag_override {
            Some(forced) => forced.clone(),
            None => Some(actual.clone()),
        };
        let _ = state.objects.insert(
            (object.container.clone(), object.name.clone()),
            StoredObject {
                data,
                etag: actual,
                manifest: None,
            },
        );
        Ok(PutReceipt { etag: acknowledged })
    }
}
