//! Run metrics derived from placement timestamps.
//!
//! Owned by the controller, reset at the start of every run, never
//! persisted. Rates come from a 60-second sliding window of cell
//! completions; the monotonic clock is `tokio::time::Instant` so paused-time
//! test harnesses drive it deterministically.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Point-in-time metrics view published with every status event.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub placements_per_minute: f64,
    pub blocks_per_hour: f64,
    /// Projected time to finish at the current rate; absent until the
    /// window has data.
    pub eta_ms: Option<u64>,
    pub total_placed: u64,
    pub estimated_total_cells: u64,
    pub remaining_cells: u64,
    /// Wall-clock millis.
    pub last_placement_at: Option<i64>,
    /// Wall-clock millis.
    pub last_checkpoint_at: Option<i64>,
}

pub struct BuildMetrics {
    total_placed: u64,
    estimated_total_cells: u64,
    remaining_cells: u64,
    window: VecDeque<Instant>,
    last_placement_at: Option<i64>,
    last_checkpoint_at: Option<i64>,
}

impl BuildMetrics {
    pub fn new() -> Self {
        BuildMetrics {
            total_placed: 0,
            estimated_total_cells: 0,
            remaining_cells: 0,
            window: VecDeque::new(),
            last_placement_at: None,
            last_checkpoint_at: None,
        }
    }

    /// Start-of-run reset.
    pub fn reset(&mut self, estimated_total_cells: u64) {
        self.total_placed = 0;
        self.estimated_total_cells = estimated_total_cells;
        self.remaining_cells = estimated_total_cells;
        self.window.clear();
        self.last_placement_at = None;
        self.last_checkpoint_at = None;
    }

    pub fn set_remaining(&mut self, remaining: u64) {
        self.remaining_cells = remaining;
    }

    pub fn record_placement(&mut self) {
        let now = Instant::now();
        self.total_placed += 1;
        self.remaining_cells = self.remaining_cells.saturating_sub(1);
        self.window.push_back(now);
        self.prune(now);
        self.last_placement_at = Some(chrono::Utc::now().timestamp_millis());
    }

    pub fn record_checkpoint(&mut self) {
        self.last_checkpoint_at = Some(chrono::Utc::now().timestamp_millis());
    }

    pub fn snapshot(&mut self) -> MetricsSnapshot {
        self.prune(Instant::now());
        let placements_per_minute = self.window.len() as f64;
        let eta_ms = if placements_per_minute > 0.0 {
            Some((self.remaining_cells as f64 / placements_per_minute * 60_000.0) as u64)
        } else {
            None
        };

        MetricsSnapshot {
            placements_per_minute,
            blocks_per_hour: placements_per_minute * 60.0,
            eta_ms,
            total_placed: self.total_placed,
            estimated_total_cells: self.estimated_total_cells,
            remaining_cells: self.remaining_cells,
            last_placement_at: self.last_placement_at,
            last_checkpoint_at: self.last_checkpoint_at,
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&front) = self.window.front() {
            if now.duration_since(front) > RATE_WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for BuildMetrics {
    fn default() -> Self {
        Self::new()
    }
}
