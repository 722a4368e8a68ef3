// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::config::CloudBackupConfig;
use anyhow::{Context, Result};
use diagnostics::*;
use remote::{
    ApiKeyCredentials, BACKUP_SERVICE, BackupApiClient, CloudFilesClient, IdentityClient,
    OBJECT_STORE_SERVICE,
};
use std::sync::Arc;

/// Authenticated clients for one account and region
pub struct Services {
    pub identity: Arc<IdentityClient>,
    pub files: CloudFilesClient,
    backup_url: String,
}

impl Services {
    /// Authenticate and resolve the storage and backup endpoints
    pub fn connect(config: &CloudBackupConfig) -> Result<Self> {
        let identity = Arc::new(IdentityClient::new(
            &config.identity_url,
            ApiKeyCredentials {
                username: config.username.clone(),
                api_key: config.api_key.clone(),
            },
        )?);
        let session = identity
            .session()
            .with_context(|| format!("Failed to authenticate as {}", config.username))?;

        let storage_url = session.catalog.endpoint(
            OBJECT_STORE_SERVICE,
            &config.region,
            config.use_internal_url,
        )?;
        let backup_url = session.catalog.endpoint(BACKUP_SERVICE, &config.region, false)?;
        debug!("Cloud Files endpoint {storage_url}", storage_url: storage_url.as_str());

        let files = CloudFilesClient::new(&storage_url, identity.clone())?;
        Ok(Self {
            identity,
            files,
            backup_url,
        })
    }

    pub fn backup_api(&self) -> Result<BackupApiClient> {
        Ok(BackupApiClient::new(&self.backup_url, self.identity.clone())?)
    }
}
