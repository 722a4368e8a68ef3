// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use super::parse_wait;
use anyhow::Result;
use clap::Args;
use diagnostics::*;
use keepawake::{AgentWaker, KeepAwake, PollerReport};
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct KeepAwakeArgs {
    /// Agent ids to keep awake
    #[arg(required = true)]
    pub agents: Vec<u64>,

    /// How long to keep them awake
    #[arg(long = "for", value_parser = parse_wait)]
    pub duration: Duration,
}

/// Poll every agent for the requested duration, then stop all pollers
pub fn keep_awake_command(
    waker: Arc<dyn AgentWaker>,
    interval: Duration,
    args: &KeepAwakeArgs,
) -> Result<Vec<PollerReport>> {
    let mut keep = KeepAwake::new(waker, interval)?;
    for agent_id in &args.agents {
        if keep.is_running(*agent_id) {
            debug!("Agent {agent_id} listed twice", agent_id: *agent_id);
            continue;
        }
        keep.start(*agent_id)?;
    }

    std::thread::sleep(args.duration);

    let mut reports = Vec::new();
    for report in keep.stop_all() {
        reports.push(report?);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingWaker {
        calls: Mutex<Vec<u64>>,
    }

    impl AgentWaker for RecordingWaker {
        fn wake(&self, agent_id: u64) -> remote::Result<()> {
            self.calls.lock().unwrap().push(agent_id);
            Ok(())
        }
    }

    #[test]
    fn test_keep_awake_reports_each_agent() {
        let waker = Arc::new(RecordingWaker::default());
        let args = KeepAwakeArgs {
            agents: vec![12, 5, 12],
            duration: Duration::from_millis(100),
        };

        let reports = keep_awake_command(waker.clone(), Duration::from_millis(10), &args).unwrap();
        let ids: Vec<u64> = reports.iter().map(|r| r.agent_id).collect();
        assert_eq!(ids, vec![5, 12]);
        assert!(reports.iter().all(|r| r.wakes >= 1 && r.failures == 0));

        let calls = waker.calls.lock().unwrap();
        assert!(calls.contains(&5));
        assert!(calls.contains(&12));
    }

    #[test]
    fn test_zero_interval_fails_before_waking() {
        let waker = Arc::new(RecordingWaker::default());
        let args = KeepAwakeArgs {
            agents: vec![1],
            duration: Duration::from_millis(10),
        };
        assert!(keep_awake_command(waker.clone(), Duration::ZERO, &args).is_err());
        assert!(waker.calls.lock().unwrap().is_empty());
    }
}
