// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Resolve snapshot requests against a container listing
//!
//! VaultDB snapshots live at `<vault-path>/DB/<snapshot-id>`. The id is the
//! last path segment parsed as an integer; entries under the prefix that do
//! not parse are ignored.

use crate::vaultdb::VaultDbDescriptor;
use crate::{Result, VaultError};
use diagnostics::*;
use remote::ObjectEntry;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Listing prefix holding a vault's snapshots
#[must_use]
pub fn db_prefix(vault_path: &str) -> String {
    format!("{}/DB/", vault_path.trim_end_matches('/'))
}

/// Reject the `-1` "no snapshot" sentinel (and any other negative id)
pub fn validate_snapshot_id(snapshot_id: i64) -> Result<u64> {
    u64::try_from(snapshot_id).map_err(|_| VaultError::InvalidSnapshotId(snapshot_id))
}

fn snapshot_ordinal(name: &str, prefix: &str) -> Option<u64> {
    let rest = name.strip_prefix(prefix)?;
    if rest.contains('/') {
        return None;
    }
    rest.parse().ok()
}

fn snapshots<'a>(
    listing: &'a [ObjectEntry],
    vault_path: &str,
) -> impl Iterator<Item = (u64, &'a ObjectEntry)> {
    let prefix = db_prefix(vault_path);
    listing
        .iter()
        .filter_map(move |entry| snapshot_ordinal(&entry.name, &prefix).map(|id| (id, entry)))
}

pub fn resolve_exact(listing: &[ObjectEntry], vault_path: &str, snapshot_id: u64) -> Result<VaultDbDescriptor> {
    snapshots(listing, vault_path)
        .find(|(id, _)| *id == snapshot_id)
        .map(|(id, entry)| VaultDbDescriptor::from_entry(entry, id))
        .ok_or_else(|| VaultError::SnapshotNotFound {
            vault_path: vault_path.to_string(),
            snapshot_id,
        })
}

pub fn resolve_latest(listing: &[ObjectEntry], vault_path: &str) -> Result<VaultDbDescriptor> {
    snapshots(listing, vault_path)
        .max_by_key(|(id, _)| *id)
        .map(|(id, entry)| VaultDbDescriptor::from_entry(entry, id))
        .ok_or_else(|| VaultError::NoSnapshotsAvailable {
            vault_path: vault_path.to_string(),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    Exact,
    FellBackToLatest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub descriptor: VaultDbDescriptor,
    pub kind: ResolutionKind,
}

/// Best effort: the requested snapshot if listed, otherwise the latest.
/// Callers that need the exact snapshot use [`wait_for_snapshot`].
pub fn resolve_with_fallback(listing: &[ObjectEntry], vault_path: &str, snapshot_id: u64) -> Result<Resolution> {
    match resolve_exact(listing, vault_path, snapshot_id) {
        Ok(descriptor) => Ok(Resolution {
            descriptor,
            kind: ResolutionKind::Exact,
        }),
        Err(_) => Ok(Resolution {
            descriptor: resolve_latest(listing, vault_path)?,
            kind: ResolutionKind::FellBackToLatest,
        }),
    }
}

/// Time source for polling, injectable so tests need not sleep
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when slept or advanced
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    elapsed: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner) += duration;
    }

    /// Total time slept or advanced
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Poll `fetch` until the exact snapshot is listed or `timeout` passes.
///
/// Each attempt fetches a fresh listing. Between attempts the clock sleeps
/// `poll_interval`, cut short so the last attempt lands on the deadline.
/// Listing failures end the wait immediately.
pub fn wait_for_snapshot<F>(
    mut fetch: F,
    vault_path: &str,
    snapshot_id: u64,
    timeout: Duration,
    poll_interval: Duration,
    clock: &dyn Clock,
) -> Result<VaultDbDescriptor>
where
    F: FnMut() -> Result<Vec<ObjectEntry>>,
{
    let started = clock.now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let listing = fetch()?;
        match resolve_exact(&listing, vault_path, snapshot_id) {
            Ok(descriptor) => {
                debug!("Snapshot {snapshot_id} of {vault_path} found after {attempts} attempts",
                    snapshot_id: snapshot_id, vault_path: vault_path, attempts: attempts);
                return Ok(descriptor);
            }
            Err(VaultError::SnapshotNotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let waited = clock.now().saturating_duration_since(started);
        if waited >= timeout {
            return Err(VaultError::Timeout {
                vault_path: vault_path.to_string(),
                snapshot_id,
                waited,
            });
        }
        clock.sleep(poll_interval.min(timeout - waited));
    }
}
