// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Authentication against Rackspace Identity (v2.0 API key credentials)
//!
//! Every request to Cloud Files or Cloud Backup carries a token obtained
//! from a [`TokenProvider`]. [`IdentityClient`] caches the token together
//! with the service catalog and refreshes it shortly before expiry.

use crate::{RemoteError, Result};
use backon::{BlockingRetryable, ExponentialBuilder};
use chrono::{DateTime, Utc};
use diagnostics::*;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Public Rackspace Identity endpoint
pub const DEFAULT_IDENTITY_URL: &str = "https://identity.api.rackspacecloud.com/v2.0";

/// Tokens are refreshed when they expire within this margin
const REFRESH_MARGIN_SECONDS: i64 = 60;
const TIMEOUT_SECONDS: u64 = 60;
const MAX_RETRIES: usize = 3;

/// Supplies the token attached to every request.
///
/// Implementations own their refresh policy; callers treat the token as opaque.
pub trait TokenProvider: Send + Sync {
    fn current_token(&self) -> Result<String>;

    /// Drop any cached token so the next call re-authenticates
    fn invalidate(&self) {}
}

/// A fixed token, for tests and for callers that authenticate elsewhere
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn current_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// One entry of the identity service catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogService {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEndpoint {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(rename = "tenantId", default)]
    pub tenant_id: Option<String>,
    #[serde(rename = "publicURL")]
    pub public_url: String,
    #[serde(rename = "internalURL", default)]
    pub internal_url: Option<String>,
}

/// Service catalog returned with a token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCatalog {
    pub services: Vec<CatalogService>,
}

impl ServiceCatalog {
    /// Find the base URL of `service_type` in `region`.
    ///
    /// Region matching ignores case; endpoints without a region are global
    /// and match any region. `internal` selects the ServiceNet URL.
    pub fn endpoint(&self, service_type: &str, region: &str, internal: bool) -> Result<String> {
        self.services
            .iter()
            .filter(|s| s.service_type == service_type)
            .flat_map(|s| s.endpoints.iter())
            .find(|e| {
                e.region
                    .as_deref()
                    .is_none_or(|r| r.eq_ignore_ascii_case(region))
            })
            .and_then(|e| {
                if internal {
                    e.internal_url.clone()
                } else {
                    Some(e.public_url.clone())
                }
            })
            .ok_or_else(|| RemoteError::EndpointNotFound {
                service_type: service_type.to_string(),
                region: region.to_string(),
            })
    }
}

/// An authenticated identity session
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub expires: DateTime<Utc>,
    pub tenant_id: Option<String>,
    pub catalog: ServiceCatalog,
}

impl Session {
    /// Whether the token is still usable at `now`, keeping a refresh margin
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires - chrono::Duration::seconds(REFRESH_MARGIN_SECONDS) > now
    }
}

#[derive(Deserialize)]
struct AuthResponse {
    access: Access,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Access {
    token: TokenInfo,
    #[serde(default)]
    service_catalog: Vec<CatalogService>,
}

#[derive(Deserialize)]
struct TokenInfo {
    id: String,
    expires: String,
    #[serde(default)]
    tenant: Option<TenantInfo>,
}

#[derive(Deserialize)]
struct TenantInfo {
    id: String,
}

/// Username and API key credentials
#[derive(Clone)]
pub struct ApiKeyCredentials {
    pub username: String,
    pub api_key: String,
}

impl std::fmt::Debug for ApiKeyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyCredentials")
            .field("username", &self.username)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Blocking Rackspace Identity client with a token cache
pub struct IdentityClient {
    http: reqwest::blocking::Client,
    tokens_url: String,
    credentials: ApiKeyCredentials,
    cached: Mutex<Option<Session>>,
}

impl IdentityClient {
    pub fn new(identity_url: &str, credentials: ApiKeyCredentials) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECONDS))
            .build()?;
        Ok(Self {
            http,
            tokens_url: Self::tokens_url(identity_url)?,
            credentials,
            cached: Mutex::new(None),
        })
    }

    fn tokens_url(identity_url: &str) -> Result<String> {
        let url = format!("{}/tokens", identity_url.trim_end_matches('/'));
        // Validate early so a bad config fails at construction
        let _ = url::Url::parse(&url)?;
        Ok(url)
    }

    /// Return the cached session, authenticating when it is missing or stale
    pub fn session(&self) -> Result<Session> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = cached.as_ref() {
            if session.is_fresh(Utc::now()) {
                return Ok(session.clone());
            }
            debug!("Identity token near expiry, refreshing");
        }

        let session = (|| self.request_session())
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(500))
                    .with_max_times(MAX_RETRIES),
            )
            .when(RemoteError::is_transient)
            .notify(|err: &RemoteError, delay: Duration| {
                let delay_ms = delay.as_millis() as u64;
                warn!(
                    "Identity request failed, retrying in {delay_ms}ms: {e}",
                    delay_ms: delay_ms,
                    e: err.to_string()
                );
            })
            .call()?;

        *cached = Some(session.clone());
        Ok(session)
    }

    fn request_session(&self) -> Result<Session> {
        let body = serde_json::json!({
            "auth": {
                "RAX-KSKEY:apiKeyCredentials": {
                    "username": self.credentials.username,
                    "apiKey": self.credentials.api_key,
                }
            }
        });

        let response = self
            .http
            .post(&self.tokens_url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(serde_json::to_vec(&body)?)
            .send()?;

        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                url: self.tokens_url.clone(),
                body: text,
            });
        }

        let session = parse_session(&text)?;
        let user = self.credentials.username.as_str();
        info!("Authenticated {user} with identity service", user: user);
        Ok(session)
    }
}

impl TokenProvider for IdentityClient {
    fn current_token(&self) -> Result<String> {
        Ok(self.session()?.token)
    }

    fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

fn parse_session(text: &str) -> Result<Session> {
    let parsed: AuthResponse = serde_json::from_str(text)?;
    let expires = DateTime::parse_from_rfc3339(&parsed.access.token.expires)
        .map_err(|e| {
            RemoteError::Auth(format!(
                "invalid token expiry {:?}: {}",
                parsed.access.token.expires, e
            ))
        })?
        .with_timezone(&Utc);

    Ok(Session {
        token: parsed.access.token.id,
        expires,
        tenant_id: parsed.access.token.tenant.map(|t| t.id),
        catalog: ServiceCatalog {
            services: parsed.access.service_catalog,
        },
    })
}
