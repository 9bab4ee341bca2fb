//! Opportunistic material replenishment from nearby storage containers.
//!
//! The coordinator runs synchronously between cell tasks; there is no
//! background refill thread. Non-forced attempts are gated on enablement,
//! the placement in-flight flag, a stable stance, a material below its
//! threshold, and the attempt cooldown. Forced attempts skip the threshold
//! and cooldown gates only. A failed attempt is never allowed to abort the
//! build: it cools the container down, logs a warning, and returns.

use crate::actuator::{ContainerHandle, WorldActuator};
use crate::config::BotConfig;
use crate::error::{ActuatorError, Result};
use crate::inventory::InventoryTracker;
use crate::models::{BlockView, LogLevel, Material, Vec3i};
use crate::orchestrator::events::EventBus;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Errored containers come off the ignore list sooner than empty ones.
const ERROR_IGNORE: Duration = Duration::from_secs(15);

/// Minimum gap between low-material operator warnings.
const LOW_WARN_THROTTLE: Duration = Duration::from_secs(45);

/// Maximum bot-to-container distance for interaction.
const INTERACTION_REACH: f64 = 4.5;

/// Travel goal radii tried in order before giving up on a container.
const APPROACH_RADII: [i32; 2] = [1, 2];

/// Ignore map entries are pruned once the map grows past this.
const IGNORE_PRUNE_SIZE: usize = 200;

/// Transient refill state snapshot for the status surface.
#[derive(Debug, Clone, Default)]
pub struct RefillStatus {
    pub enabled: bool,
    pub needs_refill: bool,
    pub last_container: Option<Vec3i>,
    pub attempted: bool,
    pub succeeded: bool,
}

pub struct RefillCoordinator {
    actuator: Arc<dyn WorldActuator>,
    inventory: Arc<InventoryTracker>,
    cfg: Arc<BotConfig>,
    events: EventBus,
    /// Held by the placement path; refill and placement are mutually
    /// exclusive because both manipulate the equipped item.
    placement_in_flight: Arc<AtomicBool>,
    last_attempt_at: Option<Instant>,
    last_success_at: Option<Instant>,
    last_container: Option<Vec3i>,
    last_low_warn_at: Option<Instant>,
    ignored_until: HashMap<Vec3i, Instant>,
}

impl RefillCoordinator {
    pub fn new(
        actuator: Arc<dyn WorldActuator>,
        inventory: Arc<InventoryTracker>,
        cfg: Arc<BotConfig>,
        events: EventBus,
        placement_in_flight: Arc<AtomicBool>,
    ) -> Self {
        RefillCoordinator {
            actuator,
            inventory,
            cfg,
            events,
            placement_in_flight,
            last_attempt_at: None,
            last_success_at: None,
            last_container: None,
            last_low_warn_at: None,
            ignored_until: HashMap::new(),
        }
    }

    /// Drop all transient state. Called when the session reconnects: stale
    /// cooldowns and ignore windows refer to a world we may have drifted
    /// from.
    pub fn reset(&mut self) {
        self.last_attempt_at = None;
        self.last_success_at = None;
        self.last_container = None;
        self.last_low_warn_at = None;
        self.ignored_until.clear();
    }

    pub fn status(&self) -> RefillStatus {
        RefillStatus {
            enabled: self.cfg.refill.enabled,
            needs_refill: self.inventory.any_below_threshold(),
            last_container: self.last_container,
            attempted: self.last_attempt_at.is_some(),
            succeeded: self.last_success_at.is_some(),
        }
    }

    /// One replenishment attempt, gated as described in the module docs.
    /// Returns true iff anything was withdrawn.
    pub async fn try_replenish(&mut self, force: bool) -> bool {
        if !self.cfg.refill.enabled {
            return false;
        }
        if self.placement_in_flight.load(Ordering::Acquire) {
            return false;
        }
        if !self.actuator.is_stable() || self.actuator.is_traveling() {
            return false;
        }
        if !force && !self.inventory.any_below_threshold() {
            return false;
        }

        let now = Instant::now();
        if !force {
            if let Some(last) = self.last_attempt_at {
                if now.duration_since(last) < Duration::from_millis(self.cfg.refill.cooldown_ms)
                {
                    return false;
                }
            }
        }
        self.last_attempt_at = Some(now);

        self.warn_low_materials(now);
        let Some(container_pos) = self.find_nearest_container(now) else {
            return false;
        };
        self.last_container = Some(container_pos);

        match self.attempt(container_pos).await {
            Ok(0) => {
                self.ignored_until.insert(
                    container_pos,
                    Instant::now() + Duration::from_millis(self.cfg.refill.ignore_empty_ms),
                );
                false
            }
            Ok(total) => {
                self.last_success_at = Some(Instant::now());
                self.events.emit_log(
                    LogLevel::Info,
                    format!("Refill complete from {}: +{} items", container_pos, total),
                );
                true
            }
            Err(err) => {
                self.ignored_until
                    .insert(container_pos, Instant::now() + ERROR_IGNORE);
                self.events.emit_log(
                    LogLevel::Warn,
                    format!("Refill attempt failed: {}", err),
                );
                false
            }
        }
    }

    /// No-op when already sufficient; otherwise one forced attempt, then the
    /// hard gate. This is the fatal path once replenishment is exhausted.
    pub async fn ensure_sufficient_for(&mut self, remaining: u32) -> Result<()> {
        if self.inventory.has_sufficient_for(remaining) {
            return Ok(());
        }

        let refilled = self.try_replenish(true).await;
        if refilled && self.inventory.has_sufficient_for(remaining) {
            return Ok(());
        }

        self.inventory.require_sufficient_for(remaining)
    }

    fn warn_low_materials(&mut self, now: Instant) {
        if let Some(last) = self.last_low_warn_at {
            if now.duration_since(last) < LOW_WARN_THROTTLE {
                return;
            }
        }
        self.last_low_warn_at = Some(now);

        let counts: Vec<String> = Material::ALL
            .iter()
            .map(|&m| format!("{}={}", m, self.inventory.count(m)))
            .collect();
        self.events.emit_log(
            LogLevel::Warn,
            format!(
                "Materials low. Place a chest/barrel nearby to refill. {}",
                counts.join(", ")
            ),
        );
    }

    /// Scan a cube around the bot for the nearest container not on the
    /// ignore list. Vertical reach is limited to two blocks either way.
    fn find_nearest_container(&mut self, now: Instant) -> Option<Vec3i> {
        self.prune_ignored(now);

        let base = self.actuator.position();
        let radius = self.cfg.refill.radius;
        let mut best: Option<(f64, Vec3i)> = None;

        for dx in -radius..=radius {
            for dy in -2..=2 {
                for dz in -radius..=radius {
                    let pos = base.offset(dx, dy, dz);
                    if self.ignored_until.get(&pos).is_some_and(|&until| until > now) {
                        continue;
                    }
                    let BlockView::Solid(kind) = self.actuator.block_at(pos) else {
                        continue;
                    };
                    if !kind.is_container() {
                        continue;
                    }

                    let dist = base.distance_to(pos);
                    if best.is_none_or(|(d, _)| dist < d) {
                        best = Some((dist, pos));
                    }
                }
            }
        }

        best.map(|(_, pos)| pos)
    }

    fn prune_ignored(&mut self, now: Instant) {
        if self.ignored_until.len() < IGNORE_PRUNE_SIZE {
            return;
        }
        self.ignored_until.retain(|_, &mut until| until > now);
    }

    /// Travel to the container, open it, and withdraw every tracked material
    /// up to its target-stack goal. Returns total items withdrawn.
    async fn attempt(&mut self, pos: Vec3i) -> std::result::Result<u32, ActuatorError> {
        self.approach(pos).await?;

        let mut container = self.actuator.open_container(pos).await?;
        let result = self.withdraw_targets(container.as_mut()).await;
        container.close().await;
        result
    }

    /// Two-tier approach: a tight goal first, then a loose one, accepting
    /// whichever lands within interaction reach.
    async fn approach(&self, pos: Vec3i) -> std::result::Result<(), ActuatorError> {
        let mut last_err: Option<ActuatorError> = None;

        for radius in APPROACH_RADII {
            match self.actuator.travel_near(pos, radius).await {
                Ok(()) => {
                    if self.actuator.position().distance_to(pos) <= INTERACTION_REACH {
                        return Ok(());
                    }
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(ActuatorError::Unreachable {
            goal: pos,
            detail: match last_err {
                Some(err) => format!("could not get within reach: {}", err),
                None => "stopped short of interaction reach".to_string(),
            },
        })
    }

    async fn withdraw_targets(
        &self,
        container: &mut dyn ContainerHandle,
    ) -> std::result::Result<u32, ActuatorError> {
        let mut total = 0;

        for &material in Material::ALL.iter() {
            let target = self.cfg.refill.target_count(material);
            let current = self.inventory.count(material);
            if current >= target {
                continue;
            }

            let available = container.available(material);
            let free = self.actuator.free_capacity(material);
            let want = (target - current).min(available).min(free);
            if want == 0 {
                continue;
            }

            container.withdraw(material, want).await?;
            total += want;
        }

        Ok(total)
    }
}
