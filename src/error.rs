//! Unified error type hierarchy for the build core.
//!
//! Provides structured error handling with ActuatorError (typed actuation
//! failures), BuildError (run-level outcomes), and ConfigError.

use crate::models::{Material, Vec3i};
use std::io;
use thiserror::Error;

/// World actuation failures, reported as a closed set of variants so callers
/// classify them structurally instead of matching message text.
#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("could not reach {goal}: {detail}")]
    Unreachable { goal: Vec3i, detail: String },

    #[error("area blocked too long at {pos}")]
    Obstructed { pos: Vec3i },

    #[error("unsafe footing at {pos}")]
    UnsafeFooting { pos: Vec3i },

    #[error("chunk not loaded at {pos}")]
    ChunkUnloaded { pos: Vec3i },

    #[error("placement of {material} rejected at {pos}")]
    PlacementRejected { pos: Vec3i, material: Material },

    #[error("missing inventory item: {material}")]
    MissingItem { material: Material },

    #[error("container interaction failed at {pos}: {detail}")]
    Container { pos: Vec3i, detail: String },

    #[error("world state diverged from model: {detail}")]
    Desynced { detail: String },

    #[error("timed out waiting for {what}")]
    Timeout { what: String },
}

impl ActuatorError {
    /// Travel/pathing-class failures, eligible for the mirrored-support
    /// retry during cell placement.
    pub fn is_travel_class(&self) -> bool {
        matches!(
            self,
            ActuatorError::Unreachable { .. }
                | ActuatorError::Obstructed { .. }
                | ActuatorError::UnsafeFooting { .. }
                | ActuatorError::Timeout { .. }
        )
    }
}

/// A single deficient material and how far short it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortfall {
    pub material: Material,
    pub have: u32,
    pub need: u32,
}

impl std::fmt::Display for Shortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}={} (need {}, short {})",
            self.material,
            self.have,
            self.need,
            self.need.saturating_sub(self.have)
        )
    }
}

pub(crate) fn format_shortfalls(shortfalls: &[Shortfall]) -> String {
    shortfalls
        .iter()
        .map(Shortfall::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Run-level build failures.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Layer height would exceed the world build ceiling. Fatal and
    /// non-retryable: no amount of retrying changes the world height limit.
    #[error("height limit exceeded at layer {layer} (target_y={target_y}, ceiling={ceiling})")]
    LimitExceeded {
        layer: u32,
        target_y: i32,
        ceiling: i32,
    },

    /// Materials still below the buffered requirement after a forced refill.
    #[error("insufficient materials for {remaining} remaining cells (+{buffer} buffer): {}", format_shortfalls(.shortfalls))]
    InsufficientMaterial {
        remaining: u32,
        buffer: u32,
        shortfalls: Vec<Shortfall>,
    },

    /// A cell did not verify after the full retry budget. The world has
    /// diverged from the job's model of it.
    #[error("cell verification failed at layer {layer}, cell {cell} ({pos})")]
    VerificationFailed { layer: u32, cell: u32, pos: Vec3i },

    #[error("build stopped by request")]
    Stopped,

    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Top-level result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;
