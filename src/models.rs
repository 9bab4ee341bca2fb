//! Core data structures shared across the build orchestration core.
//!
//! Everything here is plain data: coordinates, materials, cell tasks,
//! checkpoint records, log events. Behavior lives in the component modules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer block coordinate in the world grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vec3i {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Vec3i {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Vec3i { x, y, z }
    }

    /// Coordinate shifted by the given deltas.
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Vec3i::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Euclidean distance to another coordinate.
    pub fn distance_to(self, other: Vec3i) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        let dz = (self.z - other.z) as f64;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for Vec3i {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Consumable materials the build draws from the bot inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Material {
    Sand,
    Cactus,
    String,
    Cobblestone,
}

impl Material {
    /// All materials the refill system tracks.
    pub const ALL: [Material; 4] = [
        Material::Sand,
        Material::Cactus,
        Material::String,
        Material::Cobblestone,
    ];

    /// Materials consumed per cell (the spine uses cobblestone separately).
    pub const CELL_MATERIALS: [Material; 3] =
        [Material::Sand, Material::Cactus, Material::String];

    /// Item stack size. All tracked materials stack to 64.
    pub const STACK_SIZE: u32 = 64;

    pub fn name(self) -> &'static str {
        match self {
            Material::Sand => "sand",
            Material::Cactus => "cactus",
            Material::String => "string",
            Material::Cobblestone => "cobblestone",
        }
    }

    /// The block the material becomes once placed. String lays as tripwire.
    pub fn placed_block(self) -> BlockKind {
        match self {
            Material::Sand => BlockKind::Sand,
            Material::Cactus => BlockKind::Cactus,
            Material::String => BlockKind::Tripwire,
            Material::Cobblestone => BlockKind::Cobblestone,
        }
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Block identity as read back from the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Sand,
    Cactus,
    Tripwire,
    Cobblestone,
    Chest,
    TrappedChest,
    Barrel,
    /// Any other solid block.
    Other,
}

impl BlockKind {
    /// Storage blocks the refill system may open.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            BlockKind::Chest | BlockKind::TrappedChest | BlockKind::Barrel
        )
    }
}

/// Result of a world block read. `Unloaded` means the chunk is not available
/// and says nothing about the block, unlike a confirmed `Empty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockView {
    Unloaded,
    Empty,
    Solid(BlockKind),
}

impl BlockView {
    pub fn is_solid(self) -> bool {
        matches!(self, BlockView::Solid(_))
    }

    pub fn is_kind(self, kind: BlockKind) -> bool {
        self == BlockView::Solid(kind)
    }
}

/// One unit of buildable work: the sand coordinate of a cell plus which
/// horizontal side the temporary support block goes on. The sign follows the
/// row traversal direction so the support is always on the side already
/// traveled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellTask {
    pub target: Vec3i,
    pub support_offset: i32,
}

impl CellTask {
    /// Stand position used to reach this cell.
    pub fn support_pos(&self) -> Vec3i {
        self.target.offset(self.support_offset, 0, 0)
    }
}

/// Durable (layer, cell) resume pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub layer: u32,
    pub cell: u32,
    /// Wall-clock millis of the last save. Informational only.
    #[serde(default)]
    pub updated_at: i64,
}

impl Checkpoint {
    pub fn start() -> Self {
        Checkpoint {
            layer: 0,
            cell: 0,
            updated_at: 0,
        }
    }
}

/// Severity of an operator-facing log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A log line pushed to event subscribers, mirroring what the `log` facade
/// receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    /// Wall-clock millis.
    pub timestamp: i64,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        LogEvent {
            level,
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
