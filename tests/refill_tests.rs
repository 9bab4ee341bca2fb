//! Integration tests for the refill coordinator's gates and withdrawal
//! behavior, driven on the paused tokio clock so cooldown and ignore
//! windows advance deterministically.

mod common;

use cactusbot::actuator::WorldActuator;
use cactusbot::config::BotConfig;
use cactusbot::error::BuildError;
use cactusbot::inventory::InventoryTracker;
use cactusbot::models::{BlockKind, Material, Vec3i};
use cactusbot::orchestrator::events::EventBus;
use cactusbot::refill::RefillCoordinator;
use common::MockWorld;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Rig {
    world: MockWorld,
    refill: RefillCoordinator,
    in_flight: Arc<AtomicBool>,
}

fn rig(cfg: BotConfig) -> Rig {
    let cfg = Arc::new(cfg.validated());
    let world = MockWorld::new();
    let actuator = world.as_actuator();
    let inventory = Arc::new(InventoryTracker::new(actuator.clone(), cfg.clone()));
    let in_flight = Arc::new(AtomicBool::new(false));
    let refill = RefillCoordinator::new(
        actuator,
        inventory,
        cfg,
        EventBus::new(),
        in_flight.clone(),
    );
    Rig {
        world,
        refill,
        in_flight,
    }
}

/// Stock everything except string comfortably above thresholds and targets.
fn stock_except_string(world: &MockWorld, string: u32) {
    world.set_inventory(Material::Sand, 600);
    world.set_inventory(Material::Cactus, 600);
    world.set_inventory(Material::Cobblestone, 600);
    world.set_inventory(Material::String, string);
}

const CHEST: Vec3i = Vec3i::new(2, 64, 0);

#[tokio::test(start_paused = true)]
async fn test_fully_stocked_inventory_skips_attempt() {
    let mut r = rig(BotConfig::default());
    stock_except_string(&r.world, 600);
    r.world
        .add_container(CHEST, BlockKind::Chest, &[(Material::String, 500)]);

    assert!(!r.refill.try_replenish(false).await);
    assert_eq!(r.world.open_container_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_low_material_withdraws_up_to_target() {
    let mut r = rig(BotConfig::default());
    stock_except_string(&r.world, 40);
    r.world
        .add_container(CHEST, BlockKind::Chest, &[(Material::String, 500)]);

    assert!(r.refill.try_replenish(false).await);
    assert_eq!(r.world.open_container_calls(), 1);
    // Topped up to the target of six stacks, not drained dry.
    assert_eq!(r.world.as_actuator().item_count(Material::String), 384);
    assert_eq!(r.refill.status().last_container, Some(CHEST));
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_blocks_back_to_back_attempts() {
    let mut r = rig(BotConfig::default());
    stock_except_string(&r.world, 40);
    // Only ten string available: still low after a successful withdrawal.
    r.world
        .add_container(CHEST, BlockKind::Chest, &[(Material::String, 10)]);

    assert!(r.refill.try_replenish(false).await);
    assert_eq!(r.world.open_container_calls(), 1);

    // Immediately after, the cooldown gate holds even though still low.
    assert!(!r.refill.try_replenish(false).await);
    assert_eq!(r.world.open_container_calls(), 1);

    tokio::time::advance(Duration::from_secs(31)).await;
    r.refill.try_replenish(false).await;
    assert_eq!(r.world.open_container_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_forced_attempt_skips_threshold_and_cooldown() {
    let mut r = rig(BotConfig::default());
    // At threshold, so not low; still short of the six-stack target.
    stock_except_string(&r.world, 64);
    r.world
        .add_container(CHEST, BlockKind::Chest, &[(Material::String, 500)]);

    assert!(!r.refill.try_replenish(false).await);
    assert_eq!(r.world.open_container_calls(), 0);

    assert!(r.refill.try_replenish(true).await);
    assert_eq!(r.world.open_container_calls(), 1);

    // A second force right away also skips the cooldown gate.
    r.refill.try_replenish(true).await;
    assert_eq!(r.world.open_container_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_gates_respect_in_flight_and_stability() {
    let mut r = rig(BotConfig::default());
    stock_except_string(&r.world, 0);
    r.world
        .add_container(CHEST, BlockKind::Chest, &[(Material::String, 500)]);

    r.in_flight.store(true, Ordering::Release);
    assert!(!r.refill.try_replenish(true).await);
    r.in_flight.store(false, Ordering::Release);

    r.world.set_stable(false);
    assert!(!r.refill.try_replenish(true).await);
    r.world.set_stable(true);

    r.world.set_traveling(true);
    assert!(!r.refill.try_replenish(true).await);
    r.world.set_traveling(false);

    assert_eq!(r.world.open_container_calls(), 0);
    assert!(r.refill.try_replenish(true).await);
}

#[tokio::test(start_paused = true)]
async fn test_forced_refill_covers_shortfall_before_hard_gate() {
    let mut r = rig(BotConfig::default());
    // 16 remaining cells need 17 string with the buffer; 10 falls short.
    stock_except_string(&r.world, 10);
    r.world
        .add_container(CHEST, BlockKind::Chest, &[(Material::String, 500)]);

    r.refill.ensure_sufficient_for(16).await.unwrap();
    assert_eq!(r.world.open_container_calls(), 1);
    assert!(r.world.as_actuator().item_count(Material::String) >= 17);
}

#[tokio::test(start_paused = true)]
async fn test_hard_gate_names_material_when_refill_cannot_cover() {
    let mut r = rig(BotConfig::default());
    stock_except_string(&r.world, 10);

    let err = r.refill.ensure_sufficient_for(16).await.unwrap_err();
    match err {
        BuildError::InsufficientMaterial {
            remaining,
            buffer,
            shortfalls,
        } => {
            assert_eq!(remaining, 16);
            assert_eq!(buffer, 1);
            assert_eq!(shortfalls.len(), 1);
            assert_eq!(shortfalls[0].material, Material::String);
            assert_eq!(shortfalls[0].have, 10);
            assert_eq!(shortfalls[0].need, 17);
        }
        other => panic!("expected insufficient material, got {}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_sufficient_inventory_never_attempts() {
    let mut r = rig(BotConfig::default());
    stock_except_string(&r.world, 600);
    r.world
        .add_container(CHEST, BlockKind::Chest, &[(Material::String, 500)]);

    r.refill.ensure_sufficient_for(256).await.unwrap();
    assert_eq!(r.world.open_container_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_empty_container_ignored_until_window_expires() {
    let mut r = rig(BotConfig::default());
    stock_except_string(&r.world, 40);
    r.world.add_container(CHEST, BlockKind::Chest, &[]);

    assert!(!r.refill.try_replenish(false).await);
    assert_eq!(r.world.open_container_calls(), 1);

    // Past the cooldown but inside the two-minute ignore window: the chest
    // is skipped without an open.
    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(!r.refill.try_replenish(false).await);
    assert_eq!(r.world.open_container_calls(), 1);

    tokio::time::advance(Duration::from_secs(100)).await;
    r.refill.try_replenish(false).await;
    assert_eq!(r.world.open_container_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_errored_container_retried_after_short_ignore() {
    let mut r = rig(BotConfig::default());
    stock_except_string(&r.world, 40);
    r.world
        .add_container(CHEST, BlockKind::Chest, &[(Material::String, 500)]);
    r.world.fail_open_at(CHEST);

    assert!(!r.refill.try_replenish(false).await);
    assert_eq!(r.world.open_container_calls(), 1);

    // The fifteen-second error ignore expires well before the cooldown.
    tokio::time::advance(Duration::from_secs(31)).await;
    r.refill.try_replenish(false).await;
    assert_eq!(r.world.open_container_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_refill_never_attempts() {
    let mut cfg = BotConfig::default();
    cfg.refill.enabled = false;
    let mut r = rig(cfg);
    stock_except_string(&r.world, 0);
    r.world
        .add_container(CHEST, BlockKind::Chest, &[(Material::String, 500)]);

    assert!(!r.refill.try_replenish(true).await);
    assert_eq!(r.world.open_container_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_nearest_container_wins() {
    let mut r = rig(BotConfig::default());
    stock_except_string(&r.world, 40);
    let far = Vec3i::new(6, 64, 0);
    r.world
        .add_container(far, BlockKind::Barrel, &[(Material::String, 500)]);
    r.world
        .add_container(CHEST, BlockKind::Chest, &[(Material::String, 500)]);

    assert!(r.refill.try_replenish(false).await);
    assert_eq!(r.refill.status().last_container, Some(CHEST));
}

#[tokio::test(start_paused = true)]
async fn test_container_search_is_vertically_bounded() {
    let mut r = rig(BotConfig::default());
    stock_except_string(&r.world, 40);
    // Four blocks up is outside the two-block vertical scan.
    r.world.add_container(
        Vec3i::new(0, 68, 0),
        BlockKind::Chest,
        &[(Material::String, 500)],
    );

    assert!(!r.refill.try_replenish(false).await);
    assert_eq!(r.world.open_container_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reset_clears_transient_state() {
    let mut r = rig(BotConfig::default());
    stock_except_string(&r.world, 40);
    r.world
        .add_container(CHEST, BlockKind::Chest, &[(Material::String, 500)]);

    assert!(r.refill.try_replenish(false).await);
    let status = r.refill.status();
    assert!(status.attempted && status.succeeded);

    r.refill.reset();
    let status = r.refill.status();
    assert!(!status.attempted && !status.succeeded);
    assert_eq!(status.last_container, None);
}
