//! Unattended build orchestration core for a grid-based cactus farm.
//!
//! This crate plans, executes, checkpoints, and supervises a long-running
//! block-placement job against an abstract world actuator supplied by the
//! session layer. It owns everything between "start building" and the
//! actuator calls: traversal order, material sufficiency, opportunistic
//! refill, durable resume pointers, and the pause/stop/recovery lifecycle.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Core data structures and types
//! - **config**: Configuration loading, defaults, and clamping
//! - **actuator**: The world actuation trait the session layer implements
//! - **planner**: Pure grid traversal planning
//! - **inventory**: Material sufficiency checks with safety buffer
//! - **refill**: Opportunistic container replenishment
//! - **orchestrator**: The build controller, checkpointing, and events

// Core foundational modules
pub mod error;
pub mod models;

// Configuration management
pub mod config;

// World actuation seam implemented by the session layer
pub mod actuator;

// Pure planning, sufficiency, and replenishment components
pub mod inventory;
pub mod planner;
pub mod refill;

// Build coordination and async state management
pub mod orchestrator;

// Re-export the log crate for macro usage
pub use log;

pub use actuator::{ContainerHandle, WorldActuator};
pub use config::{BotConfig, MaterialCounts, RefillConfig};
pub use error::{ActuatorError, BuildError, ConfigError, Result, Shortfall};
pub use inventory::{InventorySnapshot, InventoryTracker};
pub use models::{BlockKind, BlockView, CellTask, Checkpoint, Material, Vec3i};
pub use orchestrator::checkpoint::CheckpointStore;
pub use orchestrator::events::{BuildEvent, BuildStatus, EventBus};
pub use orchestrator::metrics::MetricsSnapshot;
pub use orchestrator::state::{ControllerState, RunOutcome};
pub use orchestrator::BuildController;

/// Crate version, surfaced in session-layer status output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
