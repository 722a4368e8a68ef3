// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use vault::{LogProgress, PipelineOptions, TransferOptions};

/// Written by `cloudbackup init`
pub const EXAMPLE_CONFIG: &str = r#"# cloudbackup configuration
username: example-user
api_key: 0123456789abcdef0123456789abcdef
identity_url: https://identity.api.rackspacecloud.com/v2.0
region: DFW
# Cloud Files container holding the vaults
container: cloudbackup_example
# Use the ServiceNet (internal) storage endpoint
use_internal_url: false
# Progress is reported in this many steps per transfer
bar_count: 50
keep_awake_interval: 30s
# Scratch space for compressing uploads
work_dir: /tmp
"#;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloudBackupConfig {
    pub username: String,
    pub api_key: String,
    #[serde(default = "default_identity_url")]
    pub identity_url: String,
    pub region: String,
    pub container: String,
    #[serde(default)]
    pub use_internal_url: bool,
    #[serde(default = "default_bar_count")]
    pub bar_count: u32,
    #[serde(default = "default_keep_awake_interval")]
    pub keep_awake_interval: String,
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

fn default_identity_url() -> String {
    remote::DEFAULT_IDENTITY_URL.to_string()
}

fn default_bar_count() -> u32 {
    vault::DEFAULT_BAR_COUNT
}

fn default_keep_awake_interval() -> String {
    "30s".to_string()
}

impl std::fmt::Debug for CloudBackupConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudBackupConfig")
            .field("username", &self.username)
            .field("api_key", &"<redacted>")
            .field("identity_url", &self.identity_url)
            .field("region", &self.region)
            .field("container", &self.container)
            .field("use_internal_url", &self.use_internal_url)
            .field("bar_count", &self.bar_count)
            .field("keep_awake_interval", &self.keep_awake_interval)
            .field("work_dir", &self.work_dir)
            .finish()
    }
}

impl CloudBackupConfig {
    pub fn keep_awake_interval(&self) -> Result<Duration> {
        parse_duration::parse(&self.keep_awake_interval)
            .with_context(|| format!("Invalid keep_awake_interval '{}'", self.keep_awake_interval))
    }

    /// Pipeline settings for transfers driven by this config
    #[must_use]
    pub fn pipeline_options(&self, decompress: bool) -> PipelineOptions {
        let defaults = PipelineOptions::default();
        PipelineOptions {
            transfer: TransferOptions::default()
                .with_bar_count(self.bar_count)
                .with_sink(Arc::new(LogProgress)),
            decompress,
            work_dir: self.work_dir.clone().unwrap_or(defaults.work_dir.clone()),
            ..defaults
        }
    }
}

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CloudBackupConfig> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<CloudBackupConfig> {
    let config: CloudBackupConfig =
        serde_yaml_ng::from_str(content).with_context(|| "Failed to parse YAML configuration")?;
    validate_config(&config)?;
    Ok(config)
}

pub(crate) fn validate_config(config: &CloudBackupConfig) -> Result<()> {
    for (field, value) in [
        ("username", &config.username),
        ("api_key", &config.api_key),
        ("region", &config.region),
        ("container", &config.container),
    ] {
        if value.trim().is_empty() {
            anyhow::bail!("{field} cannot be empty");
        }
    }

    if config.bar_count == 0 {
        anyhow::bail!("bar_count must be greater than 0");
    }

    if config.keep_awake_interval()?.is_zero() {
        anyhow::bail!("keep_awake_interval must be greater than 0");
    }
    Ok(())
}
