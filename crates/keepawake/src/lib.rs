// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Keep Cloud Backup agents awake while a client works with them
//!
//! Agents go idle between jobs. [`KeepAwake`] runs one background poller per
//! agent that periodically asks the service to wake it, and stops every
//! poller (cancel, then join) when asked or when dropped.

mod cancel;
mod poller;

pub use cancel::CancellationToken;
pub use poller::{
    AgentWaker, DEFAULT_INTERVAL, KeepAwake, PollerReport, SLEEP_SLICE, WAKE_MAX_RETRY_DELAY,
    WAKE_RETRIES, poller_client,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeepAwakeError {
    #[error("Agent {0} already has a keep-awake poller")]
    AlreadyRunning(u64),

    #[error("Agent {0} has no keep-awake poller")]
    NotRunning(u64),

    #[error("Keep-awake interval must be greater than zero")]
    ZeroInterval,

    #[error("Keep-awake poller for agent {0} panicked")]
    PollerPanicked(u64),

    #[error("Failed to spawn poller thread: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, KeepAwakeError>;
