// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use super::parse_wait;
use crate::config::CloudBackupConfig;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use remote::BlobStore;
use std::path::PathBuf;
use std::time::Duration;
use vault::{SnapshotRequest, VaultDbDescriptor, VaultDbPipeline};

/// VaultDB snapshot transfers
#[derive(Subcommand, Debug)]
pub enum VaultDbCommands {
    /// Download a VaultDB snapshot (the latest unless --snapshot is given)
    Download(DownloadArgs),
    /// Compress and upload a VaultDB as a new snapshot
    Upload(UploadArgs),
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Vault path inside the container
    pub vault_path: String,

    /// Snapshot id to download
    #[arg(long, allow_negative_numbers = true, conflicts_with = "latest")]
    pub snapshot: Option<i64>,

    /// Download the highest-numbered snapshot
    #[arg(long)]
    pub latest: bool,

    /// Poll for the snapshot until it appears or this much time passes
    #[arg(long, value_parser = parse_wait, requires = "snapshot")]
    pub wait: Option<Duration>,

    /// Use the latest snapshot when the requested one is not listed
    #[arg(long, requires = "snapshot", conflicts_with = "wait")]
    pub fallback: bool,

    /// Keep the gzip stream instead of decompressing
    #[arg(long)]
    pub keep_compressed: bool,

    /// Destination file
    #[arg(short, long)]
    pub output: PathBuf,
}

impl DownloadArgs {
    #[must_use]
    pub fn request(&self) -> SnapshotRequest {
        match (self.snapshot, self.wait) {
            (None, _) => SnapshotRequest::Latest,
            (Some(snapshot_id), Some(timeout)) => SnapshotRequest::WaitFor {
                snapshot_id,
                timeout,
            },
            (Some(id), None) if self.fallback => SnapshotRequest::ExactOrLatest(id),
            (Some(id), None) => SnapshotRequest::Exact(id),
        }
    }
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Vault path inside the container
    pub vault_path: String,

    /// Snapshot id to store the VaultDB under
    #[arg(long, allow_negative_numbers = true)]
    pub snapshot: i64,

    /// Uncompressed VaultDB file
    pub db_file: PathBuf,
}

pub fn download_command(
    store: &dyn BlobStore,
    config: &CloudBackupConfig,
    args: &DownloadArgs,
) -> Result<VaultDbDescriptor> {
    let pipeline = VaultDbPipeline::new(store, config.container.as_str())
        .with_options(config.pipeline_options(!args.keep_compressed));
    pipeline
        .download_vaultdb(&args.vault_path, args.request(), &args.output)
        .with_context(|| format!("Failed to download VaultDB of {}", args.vault_path))
}

pub fn upload_command(
    store: &dyn BlobStore,
    config: &CloudBackupConfig,
    args: &UploadArgs,
) -> Result<VaultDbDescriptor> {
    let pipeline = VaultDbPipeline::new(store, config.container.as_str())
        .with_options(config.pipeline_options(true));
    pipeline
        .upload_vaultdb(&args.vault_path, args.snapshot, &args.db_file)
        .with_context(|| format!("Failed to upload VaultDB of {}", args.vault_path))
}
