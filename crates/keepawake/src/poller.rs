// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! One background thread per agent, each waking its agent on an interval
//!
//! A poller sleeps in slices of at most one second and checks its
//! cancellation token between slices and before every wake. Stopping a
//! poller cancels it and joins the thread, so no poller outlives its
//! [`KeepAwake`] controller.

use crate::cancel::CancellationToken;
use crate::{KeepAwakeError, Result};
use diagnostics::*;
use remote::BackupApiClient;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest uninterrupted sleep of a poller
pub const SLEEP_SLICE: Duration = Duration::from_secs(1);

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Something that can nudge an agent into contacting the service
pub trait AgentWaker: Send + Sync {
    fn wake(&self, agent_id: u64) -> remote::Result<()>;
}

/// Retries a poller allows one wake call, so a stop never waits long on backoff
pub const WAKE_RETRIES: usize = 2;
pub const WAKE_MAX_RETRY_DELAY: Duration = Duration::from_secs(2);

/// `client` with its retry budget cut down for polling
#[must_use]
pub fn poller_client(client: BackupApiClient) -> BackupApiClient {
    client.with_retries(WAKE_RETRIES, WAKE_MAX_RETRY_DELAY)
}

impl AgentWaker for BackupApiClient {
    /// The service only offers an account-wide wake
    fn wake(&self, _agent_id: u64) -> remote::Result<()> {
        self.wake_agents()
    }
}

/// What a poller did before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerReport {
    pub agent_id: u64,
    pub wakes: u64,
    pub failures: u64,
}

struct Poller {
    token: CancellationToken,
    handle: JoinHandle<PollerReport>,
}

/// Owns the pollers; dropping it stops and joins all of them
pub struct KeepAwake {
    waker: Arc<dyn AgentWaker>,
    interval: Duration,
    pollers: HashMap<u64, Poller>,
}

impl KeepAwake {
    /// A zero interval is refused: the pollers would never sleep.
    pub fn new(waker: Arc<dyn AgentWaker>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(KeepAwakeError::ZeroInterval);
        }
        Ok(Self {
            waker,
            interval,
            pollers: HashMap::new(),
        })
    }

    /// Start keeping `agent_id` awake. At most one poller runs per agent.
    pub fn start(&mut self, agent_id: u64) -> Result<()> {
        if self.pollers.contains_key(&agent_id) {
            return Err(KeepAwakeError::AlreadyRunning(agent_id));
        }

        let token = CancellationToken::new();
        let poll_token = token.clone();
        let waker = self.waker.clone();
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name(format!("keepawake-{agent_id}"))
            .spawn(move || poll(waker.as_ref(), agent_id, interval, &poll_token))
            .map_err(KeepAwakeError::Spawn)?;

        let _ = self.pollers.insert(agent_id, Poller { token, handle });
        info!("Keeping agent {agent_id} awake", agent_id: agent_id);
        Ok(())
    }

    #[must_use]
    pub fn is_running(&self, agent_id: u64) -> bool {
        self.pollers.contains_key(&agent_id)
    }

    #[must_use]
    pub fn agents(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.pollers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Cancel one poller and wait for its thread to finish
    pub fn stop(&mut self, agent_id: u64) -> Result<PollerReport> {
        let poller = self
            .pollers
            .remove(&agent_id)
            .ok_or(KeepAwakeError::NotRunning(agent_id))?;
        poller.token.cancel();
        poller
            .handle
            .join()
            .map_err(|_| KeepAwakeError::PollerPanicked(agent_id))
    }

    /// Cancel every poller first, then join them all
    pub fn stop_all(&mut self) -> Vec<Result<PollerReport>> {
        for poller in self.pollers.values() {
            poller.token.cancel();
        }
        let mut pollers: Vec<(u64, Poller)> = self.pollers.drain().collect();
        pollers.sort_unstable_by_key(|(id, _)| *id);
        pollers
            .into_iter()
            .map(|(agent_id, poller)| {
                poller
                    .handle
                    .join()
                    .map_err(|_| KeepAwakeError::PollerPanicked(agent_id))
            })
            .collect()
    }
}

impl Drop for KeepAwake {
    fn drop(&mut self) {
        for result in self.stop_all() {
            if let Err(e) = result {
                error!("Keep-awake poller did not stop cleanly: {e}", e: e.to_string());
            }
        }
    }
}

fn poll(waker: &dyn AgentWaker, agent_id: u64, interval: Duration, token: &CancellationToken) -> PollerReport {
    let mut report = PollerReport {
        agent_id,
        ..PollerReport::default()
    };

    while !token.is_cancelled() {
        match waker.wake(agent_id) {
            Ok(()) => report.wakes += 1,
            Err(e) => {
                report.failures += 1;
                warn!("Waking agent {agent_id} failed: {e}", agent_id: agent_id, e: e.to_string());
            }
        }
        if sleep_unless_cancelled(token, interval) {
            break;
        }
    }

    let wakes = report.wakes;
    debug!("Keep-awake poller for agent {agent_id} stopped after {wakes} wakes",
        agent_id: agent_id, wakes: wakes);
    report
}

/// Sleep `total` in slices; true when cancelled along the way
fn sleep_unless_cancelled(token: &CancellationToken, total: Duration) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        let slice = remaining.min(SLEEP_SLICE);
        if token.wait_timeout(slice) {
            return true;
        }
        remaining -= slice;
    }
    token.is_cancelled()
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote::RemoteError;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    struct CountingWaker {
        calls: Mutex<Vec<u64>>,
        fail: bool,
    }

    impl AgentWaker for CountingWaker {
        fn wake(&self, agent_id: u64) -> remote::Result<()> {
            self.calls.lock().unwrap().push(agent_id);
            if self.fail {
                Err(RemoteError::Auth("forbidden".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn wait_for_calls(waker: &CountingWaker, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while waker.calls.lock().unwrap().len() < n && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_one_poller_per_agent() {
        let waker = Arc::new(CountingWaker::default());
        let mut keep = KeepAwake::new(waker.clone(), Duration::from_millis(10)).unwrap();
        keep.start(7).unwrap();
        assert!(matches!(keep.start(7), Err(KeepAwakeError::AlreadyRunning(7))));
        keep.start(8).unwrap();
        assert_eq!(keep.agents(), vec![7, 8]);

        wait_for_calls(&waker, 4);
        let report = keep.stop(7).unwrap();
        assert_eq!(report.agent_id, 7);
        assert!(report.wakes >= 1);
        assert!(!keep.is_running(7));
        assert!(keep.is_running(8));
        assert!(matches!(keep.stop(7), Err(KeepAwakeError::NotRunning(7))));
    }

    #[test]
    fn test_poller_client_bounds_backoff() {
        let client = BackupApiClient::new(
            "https://dfw.backup.api.rackspacecloud.com/v1.0/123456",
            Arc::new(remote::StaticToken("t".to_string())),
        )
        .unwrap();
        let bounded = poller_client(client);
        assert!(bounded.retry_delay_bound() <= Duration::from_secs(3));
    }

    #[test]
    fn test_zero_interval_is_refused() {
        let waker = Arc::new(CountingWaker::default());
        assert!(matches!(
            KeepAwake::new(waker.clone(), Duration::ZERO),
            Err(KeepAwakeError::ZeroInterval)
        ));
        assert!(waker.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stop_interrupts_long_interval() {
        let waker = Arc::new(CountingWaker::default());
        let mut keep = KeepAwake::new(waker.clone(), Duration::from_secs(3600)).unwrap();
        keep.start(1).unwrap();
        wait_for_calls(&waker, 1);

        let start = Instant::now();
        let report = keep.stop(1).unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(report.wakes, 1);
    }

    #[test]
    fn test_failures_do_not_stop_poller() {
        let waker = Arc::new(CountingWaker {
            fail: true,
            ..CountingWaker::default()
        });
        let mut keep = KeepAwake::new(waker.clone(), Duration::from_millis(5)).unwrap();
        keep.start(3).unwrap();
        wait_for_calls(&waker, 3);

        let report = keep.stop(3).unwrap();
        assert_eq!(report.wakes, 0);
        assert!(report.failures >= 3);
    }

    #[test]
    fn test_drop_joins_pollers() {
        let waker = Arc::new(CountingWaker::default());
        {
            let mut keep = KeepAwake::new(waker.clone(), Duration::from_millis(5)).unwrap();
            keep.start(1).unwrap();
            keep.start(2).unwrap();
            wait_for_calls(&waker, 2);
        }
        // Every thread held a clone of the waker; after the join only ours remains
        assert_eq!(Arc::strong_count(&waker), 1);
        let calls = waker.calls.lock().unwrap().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(waker.calls.lock().unwrap().len(), calls);
    }

    #[test]
    fn test_stop_all_reports_every_agent() {
        let waker = Arc::new(CountingWaker::default());
        let mut keep = KeepAwake::new(waker.clone(), Duration::from_millis(5)).unwrap();
        for id in [3, 1, 2] {
            keep.start(id).unwrap();
        }
        let reports: Vec<u64> = keep
            .stop_all()
            .into_iter()
            .map(|r| r.unwrap().agent_id)
            .collect();
        assert_eq!(reports, vec![1, 2, 3]);
        assert!(keep.agents().is_empty());
    }
}
