//! Cell execution and verification against the world actuator.
//!
//! A cell is three placements from a support block: sand at the target,
//! cactus above it, string beside the cactus. Every step is idempotent
//! against a world read, so replaying a checkpointed cell is a no-op. The
//! executor holds the placement in-flight flag for the duration of a cell
//! so refill attempts can never race the equipped item.

use crate::actuator::WorldActuator;
use crate::config::BotConfig;
use crate::error::{ActuatorError, BuildError};
use crate::models::{BlockKind, CellTask, LogLevel, Material, Vec3i};
use crate::orchestrator::events::EventBus;
use crate::orchestrator::{ControlProbe, Interrupt};
use crate::planner::layer_height;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One game tick.
const TICK: Duration = Duration::from_millis(50);

/// Bounded wait for entities to leave a placement area.
const CLEAR_TIMEOUT: Duration = Duration::from_secs(5);

/// Block-confirmation polling attempts, one tick apart.
const CONFIRM_ATTEMPTS: u32 = 6;

/// Horizontal offset of the climbing spine from the grid origin.
const SPINE_OFFSET_X: i32 = -2;

/// Failure of a single execution step inside the per-cell path.
pub(crate) enum StepError {
    /// Stop or recovery was requested at a yield point.
    Interrupted(Interrupt),
    Actuator(ActuatorError),
}

impl From<ActuatorError> for StepError {
    fn from(err: ActuatorError) -> Self {
        StepError::Actuator(err)
    }
}

/// Outcome of executing one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellOutcome {
    /// Verified complete before any actuation; restart-safe skip.
    AlreadyComplete,
    Placed,
}

/// Result of the full per-cell retry budget.
pub(crate) enum CellError {
    Interrupted(Interrupt),
    Fatal(BuildError),
}

/// RAII holder of the placement in-flight flag.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn hold(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        InFlightGuard(flag)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) struct CellExecutor {
    actuator: Arc<dyn WorldActuator>,
    cfg: Arc<BotConfig>,
    events: EventBus,
    control: ControlProbe,
    placement_in_flight: Arc<AtomicBool>,
}

impl CellExecutor {
    pub(crate) fn new(
        actuator: Arc<dyn WorldActuator>,
        cfg: Arc<BotConfig>,
        events: EventBus,
        control: ControlProbe,
        placement_in_flight: Arc<AtomicBool>,
    ) -> Self {
        CellExecutor {
            actuator,
            cfg,
            events,
            control,
            placement_in_flight,
        }
    }

    /// Idempotent completeness read: sand at the target, cactus above, and
    /// tripwire on either adjacent side. Either side counts because earlier
    /// layers (or a mirrored retry) may have used the opposite support
    /// convention. Unloaded chunks read as incomplete.
    pub(crate) fn is_cell_complete(&self, task: &CellTask) -> bool {
        let sand = self.actuator.block_at(task.target);
        if !sand.is_kind(BlockKind::Sand) {
            return false;
        }

        let cactus_pos = task.target.offset(0, 1, 0);
        if !self.actuator.block_at(cactus_pos).is_kind(BlockKind::Cactus) {
            return false;
        }

        let preferred = cactus_pos.offset(task.support_offset, 0, 0);
        if self.actuator.block_at(preferred).is_kind(BlockKind::Tripwire) {
            return true;
        }
        let opposite = cactus_pos.offset(-task.support_offset, 0, 0);
        self.actuator.block_at(opposite).is_kind(BlockKind::Tripwire)
    }

    /// Execute one cell under the full retry budget: a first attempt (with a
    /// mirrored-support retry on travel-class failures), a verification, one
    /// full retry, and a final verification. Still incomplete after that is
    /// a run-fatal verification failure, since the world no longer matches
    /// the job's model of it.
    pub(crate) async fn execute_cell(
        &self,
        layer: u32,
        cell: u32,
        task: &CellTask,
    ) -> Result<CellOutcome, CellError> {
        if self.is_cell_complete(task) {
            return Ok(CellOutcome::AlreadyComplete);
        }

        let _guard = InFlightGuard::hold(&self.placement_in_flight);

        match self.place_cell(task, task.support_offset).await {
            Ok(()) => {}
            Err(StepError::Interrupted(i)) => return Err(CellError::Interrupted(i)),
            Err(StepError::Actuator(err)) if err.is_travel_class() => {
                self.events.emit_log(
                    LogLevel::Warn,
                    format!(
                        "travel failure at cell {} ({}), retrying from mirrored side: {}",
                        cell, task.target, err
                    ),
                );
                match self.place_cell(task, -task.support_offset).await {
                    Ok(()) | Err(StepError::Actuator(_)) => {}
                    Err(StepError::Interrupted(i)) => return Err(CellError::Interrupted(i)),
                }
            }
            Err(StepError::Actuator(err)) => {
                self.events.emit_log(
                    LogLevel::Warn,
                    format!("placement attempt failed at {}: {}", task.target, err),
                );
            }
        }

        if self.is_cell_complete(task) {
            return Ok(CellOutcome::Placed);
        }

        match self.place_cell(task, task.support_offset).await {
            Ok(()) | Err(StepError::Actuator(_)) => {}
            Err(StepError::Interrupted(i)) => return Err(CellError::Interrupted(i)),
        }

        if self.is_cell_complete(task) {
            return Ok(CellOutcome::Placed);
        }

        Err(CellError::Fatal(BuildError::VerificationFailed {
            layer,
            cell,
            pos: task.target,
        }))
    }

    /// One placement attempt from the given support side.
    async fn place_cell(&self, task: &CellTask, support_offset: i32) -> Result<(), StepError> {
        let target = task.target;
        let support_pos = target.offset(support_offset, 0, 0);

        self.probe()?;
        self.ensure_support_block(support_pos).await?;
        self.probe()?;
        self.actuator.stand_at(support_pos).await?;

        self.probe()?;
        self.actuator.await_clear(target, CLEAR_TIMEOUT).await?;

        let base = target.offset(0, -1, 0);
        if !self.actuator.block_at(base).is_solid() {
            return Err(ActuatorError::Desynced {
                detail: format!("no solid base below sand target {}", target),
            }
            .into());
        }

        self.probe()?;
        self.place_and_confirm(base, Vec3i::new(0, 1, 0), Material::Sand, target)
            .await?;

        let cactus_pos = target.offset(0, 1, 0);
        self.probe()?;
        self.actuator.await_clear(cactus_pos, CLEAR_TIMEOUT).await?;
        self.place_and_confirm(target, Vec3i::new(0, 1, 0), Material::Cactus, cactus_pos)
            .await?;

        let string_pos = cactus_pos.offset(support_offset, 0, 0);
        self.probe()?;
        self.actuator.await_clear(string_pos, CLEAR_TIMEOUT).await?;
        self.place_and_confirm(
            cactus_pos,
            Vec3i::new(support_offset, 0, 0),
            Material::String,
            string_pos,
        )
        .await?;

        if self.cfg.remove_support {
            self.remove_support_block(task, support_pos, support_offset)
                .await;
        }

        Ok(())
    }

    /// Make sure the stand block beside the target exists, placing a
    /// cobblestone on the block below it when missing.
    async fn ensure_support_block(&self, support_pos: Vec3i) -> Result<(), StepError> {
        if self.actuator.block_at(support_pos).is_solid() {
            return Ok(());
        }

        let below = support_pos.offset(0, -1, 0);
        if !self.actuator.block_at(below).is_solid() {
            return Err(ActuatorError::Desynced {
                detail: format!("cannot support at {}; nothing solid below", support_pos),
            }
            .into());
        }

        self.place_and_confirm(below, Vec3i::new(0, 1, 0), Material::Cobblestone, support_pos)
            .await?;
        Ok(())
    }

    /// Place a material and poll until the expected block reads back.
    async fn place_and_confirm(
        &self,
        reference: Vec3i,
        face: Vec3i,
        material: Material,
        expect_at: Vec3i,
    ) -> Result<(), StepError> {
        let expected = material.placed_block();
        if self.actuator.block_at(expect_at).is_kind(expected) {
            return Ok(());
        }

        if self.actuator.item_count(material) == 0 {
            return Err(ActuatorError::MissingItem { material }.into());
        }

        self.actuator.place_block(reference, face, material).await?;
        self.pace().await;

        if self.wait_for_block(expect_at, expected).await {
            return Ok(());
        }
        Err(ActuatorError::PlacementRejected {
            pos: expect_at,
            material,
        }
        .into())
    }

    async fn wait_for_block(&self, pos: Vec3i, expected: BlockKind) -> bool {
        for _ in 0..CONFIRM_ATTEMPTS {
            if self.actuator.block_at(pos).is_kind(expected) {
                return true;
            }
            tokio::time::sleep(TICK).await;
        }
        self.actuator.block_at(pos).is_kind(expected)
    }

    /// Placement pacing delay.
    async fn pace(&self) {
        tokio::time::sleep(TICK * self.cfg.build_delay_ticks).await;
    }

    /// Best-effort support cleanup: step off the block, then dig it if it is
    /// still our cobblestone. Never fails the cell.
    async fn remove_support_block(&self, task: &CellTask, support_pos: Vec3i, offset: i32) {
        let candidates = [
            task.target.offset(-offset, 0, 0),
            support_pos.offset(0, 0, 1),
            support_pos.offset(0, 0, -1),
        ];
        let mut moved = false;
        for candidate in candidates {
            if !self.actuator.block_at(candidate).is_solid() {
                continue;
            }
            if self.actuator.stand_at(candidate).await.is_ok() {
                moved = true;
                break;
            }
        }
        if !moved {
            return;
        }

        if self
            .actuator
            .block_at(support_pos)
            .is_kind(BlockKind::Cobblestone)
        {
            if let Err(err) = self.actuator.dig_block(support_pos).await {
                self.events.emit_log(
                    LogLevel::Warn,
                    format!("failed to remove support at {}: {}", support_pos, err),
                );
            }
            tokio::time::sleep(TICK).await;
        }
    }

    /// Build the climbing spine up to the given layer's height: a cobblestone
    /// column two blocks west of the origin, grown block by block from a
    /// pre-placed base.
    pub(crate) async fn ensure_vertical_spine(
        &self,
        origin: Vec3i,
        layer: u32,
    ) -> Result<(), StepError> {
        let spine_x = origin.x + SPINE_OFFSET_X;
        let spine_z = origin.z;
        let base_y = origin.y - 1;
        let target_y = layer_height(origin, layer) - 1;

        let base = Vec3i::new(spine_x, base_y, spine_z);
        if !self.actuator.block_at(base).is_solid() {
            return Err(ActuatorError::Desynced {
                detail: format!(
                    "spine base missing at {}. Place a starter cobblestone there before running.",
                    base
                ),
            }
            .into());
        }

        let _guard = InFlightGuard::hold(&self.placement_in_flight);

        let mut highest_confirmed = base_y;
        for y in (base_y + 1)..=target_y {
            self.probe()?;

            let current = Vec3i::new(spine_x, y, spine_z);
            if self.actuator.block_at(current).is_solid() {
                highest_confirmed = y;
                continue;
            }

            let stand = Vec3i::new(spine_x, highest_confirmed, spine_z);
            self.actuator.stand_at(stand).await?;
            self.place_and_confirm(stand, Vec3i::new(0, 1, 0), Material::Cobblestone, current)
                .await?;
            highest_confirmed = y;
        }

        self.probe()?;
        self.actuator
            .stand_at(Vec3i::new(spine_x, highest_confirmed, spine_z))
            .await?;
        Ok(())
    }

    fn probe(&self) -> Result<(), StepError> {
        match self.control.interrupt() {
            Some(i) => Err(StepError::Interrupted(i)),
            None => Ok(()),
        }
    }
}
