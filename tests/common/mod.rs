//! Shared test world: a scripted in-memory `WorldActuator`.
//!
//! Block placement applies synchronously, so confirmation polls succeed on
//! the first read unless a position is scripted to reject placements. All
//! state sits behind one mutex and every clone shares it, letting tests
//! hand the controller an `Arc<dyn WorldActuator>` while keeping a handle
//! for scripting and assertions.

use async_trait::async_trait;
use cactusbot::actuator::{ContainerHandle, WorldActuator};
use cactusbot::error::ActuatorError;
use cactusbot::models::{BlockKind, BlockView, Material, Vec3i};
use cactusbot::planner::{layer_height, layer_tasks};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const INVENTORY_CAPACITY: u32 = 2304;

struct WorldState {
    blocks: HashMap<Vec3i, BlockKind>,
    inventory: HashMap<Material, u32>,
    containers: HashMap<Vec3i, HashMap<Material, u32>>,
    position: Vec3i,
    stable: bool,
    traveling: bool,
    /// Remaining scripted `stand_at` failures per position.
    stand_failures: HashMap<Vec3i, u32>,
    /// Positions where placements silently do not land.
    reject_placements: HashSet<Vec3i>,
    /// Containers whose open call fails.
    fail_open: HashSet<Vec3i>,
    open_container_calls: u32,
    placements: u32,
}

#[derive(Clone)]
pub struct MockWorld {
    state: Arc<Mutex<WorldState>>,
}

impl MockWorld {
    pub fn new() -> Self {
        MockWorld {
            state: Arc::new(Mutex::new(WorldState {
                blocks: HashMap::new(),
                inventory: HashMap::new(),
                containers: HashMap::new(),
                position: Vec3i::new(0, 64, 0),
                stable: true,
                traveling: false,
                stand_failures: HashMap::new(),
                reject_placements: HashSet::new(),
                fail_open: HashSet::new(),
                open_container_calls: 0,
                placements: 0,
            })),
        }
    }

    pub fn as_actuator(&self) -> Arc<dyn WorldActuator> {
        Arc::new(self.clone())
    }

    pub fn set_block(&self, pos: Vec3i, kind: BlockKind) {
        self.state.lock().unwrap().blocks.insert(pos, kind);
    }

    pub fn block(&self, pos: Vec3i) -> Option<BlockKind> {
        self.state.lock().unwrap().blocks.get(&pos).copied()
    }

    pub fn give(&self, material: Material, count: u32) {
        *self
            .state
            .lock()
            .unwrap()
            .inventory
            .entry(material)
            .or_insert(0) += count;
    }

    pub fn set_inventory(&self, material: Material, count: u32) {
        self.state.lock().unwrap().inventory.insert(material, count);
    }

    pub fn add_container(&self, pos: Vec3i, kind: BlockKind, contents: &[(Material, u32)]) {
        let mut state = self.state.lock().unwrap();
        state.blocks.insert(pos, kind);
        state
            .containers
            .insert(pos, contents.iter().copied().collect());
    }

    pub fn set_stable(&self, stable: bool) {
        self.state.lock().unwrap().stable = stable;
    }

    pub fn set_traveling(&self, traveling: bool) {
        self.state.lock().unwrap().traveling = traveling;
    }

    pub fn script_stand_failures(&self, pos: Vec3i, times: u32) {
        self.state.lock().unwrap().stand_failures.insert(pos, times);
    }

    pub fn reject_placements_at(&self, pos: Vec3i) {
        self.state.lock().unwrap().reject_placements.insert(pos);
    }

    pub fn fail_open_at(&self, pos: Vec3i) {
        self.state.lock().unwrap().fail_open.insert(pos);
    }

    pub fn open_container_calls(&self) -> u32 {
        self.state.lock().unwrap().open_container_calls
    }

    pub fn placements(&self) -> u32 {
        self.state.lock().unwrap().placements
    }

    /// Seed solid ground under every cell target and support column of the
    /// given layer, plus the spine base block.
    pub fn seed_foundation(&self, origin: Vec3i, grid_size: u32, layer: u32) {
        let y = layer_height(origin, layer);
        let n = grid_size as i32;
        let mut state = self.state.lock().unwrap();
        for dz in 0..n {
            for dx in -1..=n {
                let base = Vec3i::new(origin.x + dx, y - 1, origin.z + dz);
                state.blocks.entry(base).or_insert(BlockKind::Other);
            }
        }
        state.blocks.insert(
            Vec3i::new(origin.x - 2, origin.y - 1, origin.z),
            BlockKind::Cobblestone,
        );
    }

    /// Mark a cell as already fully built in the world.
    pub fn seed_complete_cell(&self, target: Vec3i, support_offset: i32) {
        let mut state = self.state.lock().unwrap();
        state.blocks.insert(target, BlockKind::Sand);
        let cactus = target.offset(0, 1, 0);
        state.blocks.insert(cactus, BlockKind::Cactus);
        state
            .blocks
            .insert(cactus.offset(support_offset, 0, 0), BlockKind::Tripwire);
    }

    /// Mark every cell of a layer as already built.
    pub fn seed_complete_layer(&self, origin: Vec3i, grid_size: u32, layer: u32) {
        for task in layer_tasks(origin, layer, grid_size) {
            self.seed_complete_cell(task.target, task.support_offset);
        }
    }

    /// True iff the cell at `target` reads back complete.
    pub fn cell_complete(&self, target: Vec3i) -> bool {
        let state = self.state.lock().unwrap();
        let cactus = target.offset(0, 1, 0);
        state.blocks.get(&target) == Some(&BlockKind::Sand)
            && state.blocks.get(&cactus) == Some(&BlockKind::Cactus)
            && [-1, 1].iter().any(|&dx| {
                state.blocks.get(&cactus.offset(dx, 0, 0)) == Some(&BlockKind::Tripwire)
            })
    }
}

impl Default for MockWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorldActuator for MockWorld {
    async fn travel_near(&self, goal: Vec3i, _radius: i32) -> Result<(), ActuatorError> {
        self.state.lock().unwrap().position = goal;
        Ok(())
    }

    async fn stand_at(&self, pos: Vec3i) -> Result<(), ActuatorError> {
        let mut state = self.state.lock().unwrap();
        if let Some(remaining) = state.stand_failures.get_mut(&pos) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ActuatorError::Unreachable {
                    goal: pos,
                    detail: "scripted travel failure".to_string(),
                });
            }
        }
        if state.blocks.get(&pos).is_none() {
            return Err(ActuatorError::UnsafeFooting { pos });
        }
        state.position = pos;
        Ok(())
    }

    async fn place_block(
        &self,
        reference: Vec3i,
        face: Vec3i,
        material: Material,
    ) -> Result<(), ActuatorError> {
        let mut state = self.state.lock().unwrap();
        let have = state.inventory.get(&material).copied().unwrap_or(0);
        if have == 0 {
            return Err(ActuatorError::MissingItem { material });
        }

        let pos = reference.offset(face.x, face.y, face.z);
        if state.reject_placements.contains(&pos) {
            return Ok(());
        }

        state.inventory.insert(material, have - 1);
        state.blocks.insert(pos, material.placed_block());
        state.placements += 1;
        Ok(())
    }

    async fn dig_block(&self, pos: Vec3i) -> Result<(), ActuatorError> {
        self.state.lock().unwrap().blocks.remove(&pos);
        Ok(())
    }

    fn block_at(&self, pos: Vec3i) -> BlockView {
        match self.state.lock().unwrap().blocks.get(&pos) {
            Some(&kind) => BlockView::Solid(kind),
            None => BlockView::Empty,
        }
    }

    async fn await_clear(&self, _pos: Vec3i, _timeout: Duration) -> Result<(), ActuatorError> {
        Ok(())
    }

    fn item_count(&self, material: Material) -> u32 {
        self.state
            .lock()
            .unwrap()
            .inventory
            .get(&material)
            .copied()
            .unwrap_or(0)
    }

    fn free_capacity(&self, material: Material) -> u32 {
        INVENTORY_CAPACITY.saturating_sub(self.item_count(material))
    }

    fn position(&self) -> Vec3i {
        self.state.lock().unwrap().position
    }

    fn is_stable(&self) -> bool {
        self.state.lock().unwrap().stable
    }

    fn is_traveling(&self) -> bool {
        self.state.lock().unwrap().traveling
    }

    async fn open_container(
        &self,
        pos: Vec3i,
    ) -> Result<Box<dyn ContainerHandle>, ActuatorError> {
        let mut state = self.state.lock().unwrap();
        state.open_container_calls += 1;
        if state.fail_open.contains(&pos) {
            return Err(ActuatorError::Container {
                pos,
                detail: "scripted open failure".to_string(),
            });
        }
        if !state.containers.contains_key(&pos) {
            return Err(ActuatorError::Container {
                pos,
                detail: "no container here".to_string(),
            });
        }
        Ok(Box::new(MockContainer {
            state: self.state.clone(),
            pos,
        }))
    }
}

struct MockContainer {
    state: Arc<Mutex<WorldState>>,
    pos: Vec3i,
}

#[async_trait]
impl ContainerHandle for MockContainer {
    fn available(&self, material: Material) -> u32 {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(&self.pos)
            .and_then(|c| c.get(&material))
            .copied()
            .unwrap_or(0)
    }

    async fn withdraw(&mut self, material: Material, count: u32) -> Result<(), ActuatorError> {
        let mut state = self.state.lock().unwrap();
        let held = state
            .containers
            .get(&self.pos)
            .and_then(|c| c.get(&material))
            .copied()
            .unwrap_or(0);
        if held < count {
            return Err(ActuatorError::Container {
                pos: self.pos,
                detail: format!("withdraw of {} {} exceeds contents", count, material),
            });
        }

        if let Some(contents) = state.containers.get_mut(&self.pos) {
            contents.insert(material, held - count);
        }
        *state.inventory.entry(material).or_insert(0) += count;
        Ok(())
    }

    async fn close(&mut self) {}
}
