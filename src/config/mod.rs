//! Configuration for the build orchestration core.
//!
//! `BotConfig` is loaded from a JSON file. A missing or unparseable file is
//! never fatal: the loader warns and falls back to defaults, and every
//! numeric field is clamped into a safe range on validation so a hand-edited
//! config cannot push the build outside its operating envelope.

use crate::error::ConfigError;
use crate::models::{Material, Vec3i};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Clamp a value into `[min, max]`.
fn clamp_u32(value: u32, min: u32, max: u32) -> u32 {
    value.clamp(min, max)
}

/// Clamp a millisecond duration into `[min, max]`.
fn clamp_ms(value: u64, min: u64, max: u64) -> u64 {
    value.clamp(min, max)
}

/// Per-material counts, used for both refill thresholds and target stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialCounts {
    pub sand: u32,
    pub cactus: u32,
    pub string: u32,
    pub cobblestone: u32,
}

impl MaterialCounts {
    pub fn get(&self, material: Material) -> u32 {
        match material {
            Material::Sand => self.sand,
            Material::Cactus => self.cactus,
            Material::String => self.string,
            Material::Cobblestone => self.cobblestone,
        }
    }

    fn map(self, f: impl Fn(u32) -> u32) -> Self {
        MaterialCounts {
            sand: f(self.sand),
            cactus: f(self.cactus),
            string: f(self.string),
            cobblestone: f(self.cobblestone),
        }
    }
}

impl Default for MaterialCounts {
    fn default() -> Self {
        // Default refill thresholds; target stacks override via RefillConfig.
        MaterialCounts {
            sand: 64,
            cactus: 64,
            string: 64,
            cobblestone: 128,
        }
    }
}

/// Opportunistic replenishment settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefillConfig {
    pub enabled: bool,
    /// Container search radius in blocks.
    pub radius: i32,
    /// Minimum gap between non-forced refill attempts.
    pub cooldown_ms: u64,
    /// How long an empty container stays on the ignore list.
    pub ignore_empty_ms: u64,
    /// Hard floors: counts below these mark the material low.
    pub thresholds: MaterialCounts,
    /// Replenishment goals, in full stacks per material.
    pub target_stacks: MaterialCounts,
}

impl Default for RefillConfig {
    fn default() -> Self {
        RefillConfig {
            enabled: true,
            radius: 7,
            cooldown_ms: 30_000,
            ignore_empty_ms: 120_000,
            thresholds: MaterialCounts::default(),
            target_stacks: MaterialCounts {
                sand: 6,
                cactus: 6,
                string: 6,
                cobblestone: 8,
            },
        }
    }
}

impl RefillConfig {
    /// Target item count for a material: configured stacks times stack size.
    pub fn target_count(&self, material: Material) -> u32 {
        self.target_stacks.get(material) * Material::STACK_SIZE
    }

    fn validated(self) -> Self {
        RefillConfig {
            enabled: self.enabled,
            radius: self.radius.clamp(2, 12),
            cooldown_ms: clamp_ms(self.cooldown_ms, 5_000, 180_000),
            ignore_empty_ms: clamp_ms(self.ignore_empty_ms, 10_000, 600_000),
            thresholds: self.thresholds.map(|v| clamp_u32(v, 1, 2304)),
            target_stacks: self.target_stacks.map(|v| clamp_u32(v, 1, 36)),
        }
    }
}

/// Top-level build configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Total layers to build.
    pub layers: u32,
    /// Side length of the square cell grid per layer.
    pub grid_size: u32,
    /// Pacing delay after each placement, in game ticks (20 ticks/s).
    pub build_delay_ticks: u32,
    /// Dig the temporary support block back out after each cell.
    pub remove_support: bool,
    /// Grid origin: the first cell of layer 0.
    pub origin: Vec3i,
    /// Retreat coordinate used by the session layer; carried in config so
    /// operators keep one file.
    pub safe_platform: Vec3i,
    /// Durable checkpoint record location.
    pub checkpoint_path: PathBuf,
    pub refill: RefillConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        BotConfig {
            layers: 18,
            grid_size: 16,
            build_delay_ticks: 3,
            remove_support: false,
            origin: Vec3i::new(0, 64, 0),
            safe_platform: Vec3i::new(0, 64, 0),
            checkpoint_path: PathBuf::from("build-checkpoint.json"),
            refill: RefillConfig::default(),
        }
    }
}

impl BotConfig {
    /// Cells in one layer.
    pub fn cells_per_layer(&self) -> u32 {
        self.grid_size * self.grid_size
    }

    /// Clamp every field into its safe operating range.
    pub fn validated(self) -> Self {
        BotConfig {
            layers: clamp_u32(self.layers, 1, 128),
            grid_size: clamp_u32(self.grid_size, 2, 16),
            build_delay_ticks: clamp_u32(self.build_delay_ticks, 1, 40),
            refill: self.refill.validated(),
            ..self
        }
    }

    /// Load a config from `path`. Absence or a parse failure logs a warning
    /// and returns defaults; this mirrors the checkpoint loader's
    /// never-fatal posture.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(ConfigError::FileNotFound(p)) => {
                log::warn!("config {} not found, using defaults", p);
                BotConfig::default()
            }
            Err(e) => {
                log::warn!("failed to load config: {}. Using defaults.", e);
                BotConfig::default()
            }
        }
    }

    /// Load and validate a config file, reporting parse errors to the caller.
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let parsed: BotConfig = serde_json::from_str(&raw)?;
        Ok(parsed.validated())
    }
}
