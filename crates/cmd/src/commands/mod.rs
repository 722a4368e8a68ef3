// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

pub mod bundle;
pub mod init;
pub mod keep_awake;
pub mod vaultdb;

pub use bundle::{BundleCommands, bundle_check_command, bundle_download_command};
pub use init::init_command;
pub use keep_awake::{KeepAwakeArgs, keep_awake_command};
pub use vaultdb::{DownloadArgs, UploadArgs, VaultDbCommands, download_command, upload_command};

use std::time::Duration;

/// Parse human durations such as `30s`, `5m` or `1h 30m`
pub fn parse_wait(text: &str) -> Result<Duration, String> {
    parse_duration::parse(text).map_err(|e| format!("invalid duration '{text}': {e}"))
}
