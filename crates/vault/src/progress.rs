// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Progress metering for streamed transfers
//!
//! A transfer is drawn as a fixed number of bars. Progress is reported to an
//! injected [`ProgressSink`] only when a bar completes, so the sink sees at
//! most `bar_count` updates per transfer.

use diagnostics::*;
use std::sync::Arc;

pub const DEFAULT_BAR_COUNT: u32 = 50;

/// Upper bound on a single read or write
pub const MAX_IO_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Byte counters of one transfer
///
/// `bytes_transferred <= bytes_total` always holds: when the total is
/// unknown (zero) or understated, it grows with the transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    bytes_total: u64,
    bytes_transferred: u64,
    bar_count: u32,
    bars_completed: u32,
}

impl TransferProgress {
    #[must_use]
    pub fn new(bytes_total: u64, bar_count: u32) -> Self {
        Self {
            bytes_total,
            bytes_transferred: 0,
            bar_count: bar_count.max(1),
            bars_completed: 0,
        }
    }

    #[must_use]
    pub fn bytes_total(&self) -> u64 {
        self.bytes_total
    }

    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    #[must_use]
    pub fn bytes_remaining(&self) -> u64 {
        self.bytes_total - self.bytes_transferred
    }

    #[must_use]
    pub fn bar_count(&self) -> u32 {
        self.bar_count
    }

    #[must_use]
    pub fn bars_completed(&self) -> u32 {
        self.bars_completed
    }

    #[must_use]
    pub fn bytes_per_bar(&self) -> u64 {
        (self.bytes_total / u64::from(self.bar_count)).max(1)
    }

    /// Read/write block size: one bar's worth of bytes, capped at 4 MiB.
    /// An unknown (zero) total uses the cap.
    #[must_use]
    pub fn io_block_size(&self) -> usize {
        if self.bytes_total == 0 {
            return MAX_IO_BLOCK_SIZE as usize;
        }
        // Bounded by MAX_IO_BLOCK_SIZE, so the cast cannot truncate
        self.bytes_per_bar().min(MAX_IO_BLOCK_SIZE) as usize
    }

    /// Record `n` more bytes. Returns how many bars this completed.
    pub fn advance(&mut self, n: u64) -> u32 {
        self.bytes_transferred += n;
        if self.bytes_transferred > self.bytes_total {
            self.bytes_total = self.bytes_transferred;
        }
        self.raise_bars(self.bars_for_bytes())
    }

    /// Mark the transfer complete: whatever was moved is the total
    pub fn finish(&mut self) -> u32 {
        self.bytes_total = self.bytes_transferred;
        self.raise_bars(self.bar_count)
    }

    fn bars_for_bytes(&self) -> u32 {
        if self.bytes_total == 0 {
            return 0;
        }
        let bars = u128::from(self.bytes_transferred) * u128::from(self.bar_count)
            / u128::from(self.bytes_total);
        // bytes_transferred <= bytes_total, so bars <= bar_count
        bars as u32
    }

    fn raise_bars(&mut self, bars: u32) -> u32 {
        if bars > self.bars_completed {
            let gained = bars - self.bars_completed;
            self.bars_completed = bars;
            gained
        } else {
            0
        }
    }
}

/// Receives progress of named transfers
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, label: &str, progress: &TransferProgress);

    fn on_complete(&self, label: &str, progress: &TransferProgress);
}

/// Reports progress through the log at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_progress(&self, label: &str, progress: &TransferProgress) {
        let bars = progress.bars_completed();
        let of = progress.bar_count();
        let bytes = progress.bytes_transferred();
        info!("{label}: [{bars}/{of}] {bytes} bytes", label: label, bars: bars, of: of, bytes: bytes);
    }

    fn on_complete(&self, label: &str, progress: &TransferProgress) {
        let bytes = progress.bytes_transferred();
        info!("{label}: complete, {bytes} bytes", label: label, bytes: bytes);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _label: &str, _progress: &TransferProgress) {}

    fn on_complete(&self, _label: &str, _progress: &TransferProgress) {}
}

/// Progress of one transfer bound to its sink
pub struct Meter {
    label: String,
    progress: TransferProgress,
    sink: Arc<dyn ProgressSink>,
}

impl Meter {
    pub fn new(label: impl Into<String>, progress: TransferProgress, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            label: label.into(),
            progress,
            sink,
        }
    }

    #[must_use]
    pub fn progress(&self) -> &TransferProgress {
        &self.progress
    }

    pub fn record(&mut self, n: u64) {
        if self.progress.advance(n) > 0 {
            self.sink.on_progress(&self.label, &self.progress);
        }
    }

    pub fn complete(&mut self) {
        let _ = self.progress.finish();
        self.sink.on_complete(&self.label, &self.progress);
    }
}
