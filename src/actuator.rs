//! World actuation seam.
//!
//! The build core never talks to the network or the physics engine; it
//! drives a `WorldActuator` implementation supplied by the session layer.
//! Every method that moves the bot or mutates the world is async and may
//! take seconds to resolve. Failures come back as typed `ActuatorError`
//! variants so the orchestrator can classify them structurally.

use crate::error::ActuatorError;
use crate::models::{BlockView, Material, Vec3i};
use async_trait::async_trait;
use std::time::Duration;

/// Handle to an opened storage container. Dropping without `close` is
/// allowed but leaves the container window open on some servers, so the
/// refill path always closes explicitly.
#[async_trait]
pub trait ContainerHandle: Send {
    /// Items of the given material currently inside the container.
    fn available(&self, material: Material) -> u32;

    /// Move `count` items from the container into the bot inventory.
    async fn withdraw(&mut self, material: Material, count: u32)
        -> Result<(), ActuatorError>;

    async fn close(&mut self);
}

/// The bot's body: movement, placement, digging, block reads, inventory.
#[async_trait]
pub trait WorldActuator: Send + Sync {
    /// Path to within `radius` blocks of `goal`.
    async fn travel_near(&self, goal: Vec3i, radius: i32) -> Result<(), ActuatorError>;

    /// Path onto the block at `pos` and confirm solid, safe footing there.
    /// Implementations must refuse to stand on sand.
    async fn stand_at(&self, pos: Vec3i) -> Result<(), ActuatorError>;

    /// Place `material` against the block at `reference` on the given face.
    /// The implementation equips the material; the caller paces placements.
    async fn place_block(
        &self,
        reference: Vec3i,
        face: Vec3i,
        material: Material,
    ) -> Result<(), ActuatorError>;

    /// Dig out the block at `pos`.
    async fn dig_block(&self, pos: Vec3i) -> Result<(), ActuatorError>;

    /// Read the block at `pos` without side effects.
    fn block_at(&self, pos: Vec3i) -> BlockView;

    /// Wait up to `timeout` for entities to leave the placement area.
    /// Times out as `ActuatorError::Obstructed`.
    async fn await_clear(&self, pos: Vec3i, timeout: Duration) -> Result<(), ActuatorError>;

    /// Total items of `material` across the bot inventory.
    fn item_count(&self, material: Material) -> u32;

    /// Items of `material` the inventory could still accept.
    fn free_capacity(&self, material: Material) -> u32;

    /// Bot's current block coordinate.
    fn position(&self) -> Vec3i;

    /// Solid, non-sand footing and not falling.
    fn is_stable(&self) -> bool;

    /// A pathfinding goal is currently active.
    fn is_traveling(&self) -> bool;

    /// Open the container block at `pos`.
    async fn open_container(
        &self,
        pos: Vec3i,
    ) -> Result<Box<dyn ContainerHandle>, ActuatorError>;
}
