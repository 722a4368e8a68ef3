// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::config::CloudBackupConfig;
use anyhow::{Context, Result};
use clap::Subcommand;
use remote::BlobStore;
use std::path::PathBuf;
use vault::{BundleDescriptor, Digests, VaultDbPipeline};

/// Data bundle checks and transfers
#[derive(Subcommand, Debug)]
pub enum BundleCommands {
    /// Verify a stored bundle against its catalog digest
    Check {
        vault_path: String,
        bundle_id: u64,
        /// MD5 or SHA-1, hex
        digest: String,
    },
    /// Download a bundle and verify its digest
    Download {
        vault_path: String,
        bundle_id: u64,
        /// MD5 or SHA-1, hex
        digest: String,
        #[arg(short, long)]
        output: PathBuf,
    },
}

pub fn bundle_check_command(
    store: &dyn BlobStore,
    config: &CloudBackupConfig,
    vault_path: &str,
    bundle: &BundleDescriptor,
) -> Result<()> {
    VaultDbPipeline::new(store, config.container.as_str())
        .with_options(config.pipeline_options(false))
        .check_bundle_digest(vault_path, bundle)
        .with_context(|| format!("Bundle {} failed verification", bundle.bundle_id))
}

pub fn bundle_download_command(
    store: &dyn BlobStore,
    config: &CloudBackupConfig,
    vault_path: &str,
    bundle: &BundleDescriptor,
    output: &std::path::Path,
) -> Result<Digests> {
    VaultDbPipeline::new(store, config.container.as_str())
        .with_options(config.pipeline_options(false))
        .download_bundle(vault_path, bundle, output)
        .with_context(|| format!("Failed to download bundle {}", bundle.bundle_id))
}
