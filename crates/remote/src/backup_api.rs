// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Cloud Backup API actions used around transfers

use crate::auth::TokenProvider;
use crate::{RemoteError, Result};
use backon::{BlockingRetryable, ExponentialBuilder};
use diagnostics::*;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT_SECONDS: u64 = 60;
const MAX_RETRIES: usize = 4;
const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(8);

/// Client for the `rax:backup` service endpoint
pub struct BackupApiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    max_retries: usize,
    max_retry_delay: Duration,
}

impl BackupApiClient {
    /// `base_url` is the catalog publicURL, which already ends in `/v1.0/{tenant}`
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let _ = url::Url::parse(&base_url)?;
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECONDS))
            .build()?;
        Ok(Self {
            http,
            base_url,
            tokens,
            max_retries: MAX_RETRIES,
            max_retry_delay: MAX_RETRY_DELAY,
        })
    }

    /// Limit retries of action calls to `max_retries`, each waiting at most `max_delay`
    #[must_use]
    pub fn with_retries(mut self, max_retries: usize, max_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.max_retry_delay = max_delay.max(MIN_RETRY_DELAY);
        self
    }

    /// Longest time one action call can spend sleeping between attempts
    #[must_use]
    pub fn retry_delay_bound(&self) -> Duration {
        (0..self.max_retries)
            .map(|attempt| {
                let doubled = MIN_RETRY_DELAY.saturating_mul(1u32 << attempt.min(16));
                doubled.min(self.max_retry_delay)
            })
            .sum()
    }

    #[must_use]
    pub fn wake_agents_url(&self) -> String {
        format!("{}/user/wakeupagents", self.base_url)
    }

    /// Ask the service to wake every agent registered to this account.
    ///
    /// Action endpoints answer 403 while an agent is still connecting, so
    /// 403 is retried along with transient failures.
    pub fn wake_agents(&self) -> Result<()> {
        (|| self.post_action(&self.wake_agents_url()))
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(MIN_RETRY_DELAY)
                    .with_max_delay(self.max_retry_delay)
                    .with_max_times(self.max_retries),
            )
            .when(|err: &RemoteError| err.status_code() == Some(403) || err.is_transient())
            .notify(|err: &RemoteError, delay: Duration| {
                let delay_ms = delay.as_millis() as u64;
                warn!(
                    "Wake agents failed, retrying in {delay_ms}ms: {e}",
                    delay_ms: delay_ms,
                    e: err.to_string()
                );
            })
            .call()
    }

    fn post_action(&self, url: &str) -> Result<()> {
        let token = self.tokens.current_token()?;
        let response = self
            .http
            .post(url)
            .header("X-Auth-Token", token)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .send()?;

        let status = response.status();
        if status.is_success() {
            debug!("POST {url} succeeded", url: url);
            return Ok(());
        }
        if status.as_u16() == 401 {
            self.tokens.invalidate();
        }
        Err(RemoteError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            body: response.text().unwrap_or_default(),
        })
    }
}
