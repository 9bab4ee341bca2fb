//! Typed event fan-out for status and log subscribers.
//!
//! Push-only: subscribers receive a `broadcast` receiver and unsubscribe by
//! dropping it. Log events are dual-written through the `log` facade so the
//! process log and the subscriber stream carry the same lines. A slow
//! subscriber lags and loses old events; it never blocks the build loop.

use crate::inventory::InventorySnapshot;
use crate::models::{LogEvent, LogLevel};
use crate::orchestrator::metrics::MetricsSnapshot;
use crate::orchestrator::state::ControllerState;
use serde::Serialize;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Full status snapshot published on every state or progress change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildStatus {
    pub state: String,
    /// 1-based layer currently being built; 0 before the first layer.
    pub layer: u32,
    pub layers_total: u32,
    pub cell: u32,
    pub cells_total: u32,
    /// Human-readable status line ("layer 3/18, cell 48/256", "completed", …).
    pub status: String,
    pub stop_requested: bool,
    pub pause_reason: Option<String>,
    pub metrics: MetricsSnapshot,
    /// Per-material counts and low-water flags at snapshot time.
    pub materials: InventorySnapshot,
}

impl BuildStatus {
    pub fn is_state(&self, state: ControllerState) -> bool {
        self.state == state.as_str()
    }
}

/// Events published by the build controller.
#[derive(Debug, Clone)]
pub enum BuildEvent {
    /// Controller state changed.
    State(BuildStatus),
    /// Cell/layer progress advanced.
    Progress(BuildStatus),
    /// Operator-facing log line.
    Log(LogEvent),
    /// Run finished all layers and cleared the checkpoint.
    Completed(BuildStatus),
    /// Run settled after a deliberate stop.
    Stopped(BuildStatus),
    /// Run aborted with the given error message.
    Failed(String),
}

/// Cloneable handle to the broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BuildEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EventBus { tx }
    }

    /// New subscription; drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: BuildEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.tx.send(event);
    }

    /// Dual-write a log line to the `log` facade and the event stream.
    pub fn emit_log(&self, level: LogLevel, message: impl Into<String>) {
        let event = LogEvent::new(level, message);
        match level {
            LogLevel::Info => log::info!("{}", event.message),
            LogLevel::Warn => log::warn!("{}", event.message),
            LogLevel::Error => log::error!("{}", event.message),
        }
        self.emit(BuildEvent::Log(event));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
