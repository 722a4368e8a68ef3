// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::config::EXAMPLE_CONFIG;
use anyhow::{Context, Result, anyhow};
use diagnostics::*;
use std::path::Path;

/// Write an example configuration, refusing to overwrite unless forced
pub fn init_command(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!("{} already exists (use --force to overwrite)", path.display()));
    }
    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    let path = path.display().to_string();
    info!("Wrote example configuration to {path}", path: path);
    Ok(())
}
