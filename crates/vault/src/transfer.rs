// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Chunked streaming between local files and blob objects
//!
//! Memory use is bounded by one block. Downloads flush and sync after every
//! block. Nothing here retries: a non-success status from the store ends the
//! transfer with [`VaultError::TransferFailed`].

use crate::digest::{Digests, HashingAccumulator, verify_digest};
use crate::io::read_chunk;
use crate::progress::{DEFAULT_BAR_COUNT, Meter, NoProgress, ProgressSink, TransferProgress};
use crate::{Result, VaultError};
use diagnostics::*;
use remote::{ObjectReader, ObjectRef, ObjectUpload, ObjectWriter};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

const OCTET_STREAM: &str = "application/octet-stream";

/// How a transfer is metered
#[derive(Clone)]
pub struct TransferOptions {
    pub bar_count: u32,
    /// Fixed block size; by default one progress bar's worth, capped at 4 MiB
    pub chunk_size: Option<usize>,
    pub sink: Arc<dyn ProgressSink>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            bar_count: DEFAULT_BAR_COUNT,
            chunk_size: None,
            sink: Arc::new(NoProgress),
        }
    }
}

impl TransferOptions {
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_bar_count(mut self, bar_count: u32) -> Self {
        self.bar_count = bar_count;
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size.max(1));
        self
    }

    fn meter(&self, label: String, total: u64) -> (Meter, usize) {
        let progress = TransferProgress::new(total, self.bar_count);
        let block = self.chunk_size.unwrap_or_else(|| progress.io_block_size());
        (Meter::new(label, progress, self.sink.clone()), block)
    }
}

/// Outcome of one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub bytes: u64,
    /// Digests of the bytes as they crossed the wire
    pub digests: Digests,
    /// ETag returned by the store
    pub remote_etag: Option<String>,
    /// Large-object manifest (`container/prefix`) of a downloaded object
    pub manifest: Option<String>,
}

/// Stream `object` into `dest`, replacing any existing file.
///
/// # Errors
/// `TransferFailed` on a non-success status, `IntegrityMismatch` when the
/// byte count disagrees with the declared `Content-Length`, `Io` on local
/// write failures.
pub fn download<S: ObjectReader + ?Sized>(
    store: &S,
    object: &ObjectRef,
    dest: &Path,
    options: &TransferOptions,
) -> Result<TransferResult> {
    let mut body = store.get_object(object)?;
    let declared = body.meta.content_length;
    let (mut meter, block) = options.meter(format!("download {object}"), declared.unwrap_or(0));

    let dest_name = dest.display().to_string();
    debug!("Downloading {object} to {dest} in {block} byte blocks",
        object: object.to_string(), dest: dest_name, block: block);

    let _ = File::create(dest)?;
    let mut file = OpenOptions::new().append(true).open(dest)?;
    let mut hasher = HashingAccumulator::new();
    let mut buf = vec![0u8; block];

    loop {
        let n = read_chunk(&mut body.reader, &mut buf)?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        file.write_all(chunk)?;
        file.flush()?;
        file.sync_data()?;
        hasher.update(chunk);
        meter.record(n as u64);
    }

    let digests = hasher.finish();
    if let Some(expected) = declared {
        if expected != digests.bytes {
            return Err(VaultError::mismatch(
                format!("content length of {object}"),
                expected.to_string(),
                digests.bytes.to_string(),
            ));
        }
    }
    meter.complete();

    Ok(TransferResult {
        bytes: digests.bytes,
        digests,
        remote_etag: body.meta.etag,
        manifest: body.meta.manifest,
    })
}

/// Hash a local file without transferring it
pub fn hash_file(path: &Path, block: usize) -> Result<Digests> {
    let mut file = File::open(path)?;
    let mut hasher = HashingAccumulator::new();
    let mut buf = vec![0u8; block.max(1)];
    loop {
        let n = read_chunk(&mut file, &mut buf)?;
        if n == 0 {
            return Ok(hasher.finish());
        }
        hasher.update(&buf[..n]);
    }
}

struct Tap {
    hasher: HashingAccumulator,
    meter: Meter,
}

/// Request body that hashes and meters bytes as the HTTP client pulls them
struct MeteredReader {
    inner: BufReader<File>,
    tap: Arc<Mutex<Tap>>,
}

impl Read for MeteredReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        let mut tap = self.tap.lock().unwrap_or_else(PoisonError::into_inner);
        tap.hasher.update(&buf[..n]);
        tap.meter.record(n as u64);
        Ok(n)
    }
}

/// Stream `source` to `object`, sending the MD5 as the `ETag` integrity token.
///
/// `declared_md5` is the digest the caller already computed (e.g. while
/// compressing). Without it the file is hashed in a first pass.
///
/// # Errors
/// `TransferFailed` when the store rejects the body (a 422 means it saw a
/// different MD5), `IntegrityMismatch` when the streamed bytes disagree with
/// the declared digest or the acknowledged `ETag` disagrees with the streamed
/// bytes.
pub fn upload<S: ObjectWriter + ?Sized>(
    store: &S,
    source: &Path,
    object: &ObjectRef,
    options: &TransferOptions,
    declared_md5: Option<&str>,
) -> Result<TransferResult> {
    let size = std::fs::metadata(source)?.len();
    let (meter, block) = options.meter(format!("upload {object}"), size);

    let expected = match declared_md5 {
        Some(md5) => md5.to_string(),
        None => hash_file(source, block)?.md5,
    };

    let tap = Arc::new(Mutex::new(Tap {
        hasher: HashingAccumulator::new(),
        meter,
    }));
    let reader = MeteredReader {
        inner: BufReader::with_capacity(block, File::open(source)?),
        tap: tap.clone(),
    };

    debug!("Uploading {object} ({size} bytes)", object: object.to_string(), size: size);
    let receipt = store.put_object(
        object,
        ObjectUpload {
            reader: Box::new(reader),
            content_length: size,
            etag: Some(expected.clone()),
            content_type: OCTET_STREAM.to_string(),
        },
    )?;

    let mut tap = tap.lock().unwrap_or_else(PoisonError::into_inner);
    let digests = tap.hasher.clone().finish();
    if digests.bytes != size {
        return Err(VaultError::mismatch(
            format!("bytes sent for {object}"),
            size.to_string(),
            digests.bytes.to_string(),
        ));
    }
    verify_digest(&format!("declared MD5 of {}", source.display()), &expected, &digests.md5)?;

    let acknowledged = receipt.etag.as_deref().unwrap_or("<none>");
    verify_digest(&format!("ETag acknowledged for {object}"), &digests.md5, acknowledged)?;
    tap.meter.complete();

    Ok(TransferResult {
        bytes: digests.bytes,
        digests,
        remote_etag: receipt.etag,
        manifest: None,
    })
}
