//! Inventory sufficiency checks.
//!
//! A read-through view over the actuator's inventory: no caching, no side
//! effects. Every check against remaining work applies a 5% buffer on top of
//! the raw cell count to absorb placement attempts that consume an item
//! without verifying.

use crate::actuator::WorldActuator;
use crate::config::BotConfig;
use crate::error::{BuildError, Result, Shortfall};
use crate::models::Material;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Items needed to cover `remaining` cells including the safety buffer.
pub fn buffered_need(remaining: u32) -> u32 {
    remaining + remaining.div_ceil(20)
}

/// Per-material counts and low-water flags for the status surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InventorySnapshot {
    pub counts: BTreeMap<&'static str, u32>,
    pub low: BTreeMap<&'static str, bool>,
}

pub struct InventoryTracker {
    actuator: Arc<dyn WorldActuator>,
    cfg: Arc<BotConfig>,
}

impl InventoryTracker {
    pub fn new(actuator: Arc<dyn WorldActuator>, cfg: Arc<BotConfig>) -> Self {
        InventoryTracker { actuator, cfg }
    }

    pub fn count(&self, material: Material) -> u32 {
        self.actuator.item_count(material)
    }

    /// True iff every cell material covers `remaining` cells plus buffer.
    /// Zero remaining cells is always sufficient.
    pub fn has_sufficient_for(&self, remaining: u32) -> bool {
        let need = buffered_need(remaining);
        Material::CELL_MATERIALS
            .iter()
            .all(|&m| self.count(m) >= need)
    }

    /// Hard sufficiency gate naming every deficient material.
    pub fn require_sufficient_for(&self, remaining: u32) -> Result<()> {
        let need = buffered_need(remaining);
        let shortfalls: Vec<Shortfall> = Material::CELL_MATERIALS
            .iter()
            .filter_map(|&m| {
                let have = self.count(m);
                (have < need).then_some(Shortfall {
                    material: m,
                    have,
                    need,
                })
            })
            .collect();

        if shortfalls.is_empty() {
            return Ok(());
        }
        Err(BuildError::InsufficientMaterial {
            remaining,
            buffer: need - remaining,
            shortfalls,
        })
    }

    /// Cobblestone gate for one layer: four spine blocks per layer climbed,
    /// plus a conservative full-grid reserve when supports get dug back out.
    pub fn require_support_for_layer(&self, layer: u32) -> Result<()> {
        let spine_needed = (layer + 1) * 4;
        let support_reserve = if self.cfg.remove_support {
            self.cfg.cells_per_layer()
        } else {
            0
        };
        let need = spine_needed + support_reserve;
        let have = self.count(Material::Cobblestone);

        if have < need {
            return Err(BuildError::InsufficientMaterial {
                remaining: self.cfg.cells_per_layer(),
                buffer: 0,
                shortfalls: vec![Shortfall {
                    material: Material::Cobblestone,
                    have,
                    need,
                }],
            });
        }
        Ok(())
    }

    /// Current counts and low flags against the configured thresholds.
    pub fn snapshot(&self) -> InventorySnapshot {
        let mut snapshot = InventorySnapshot::default();
        for &m in Material::ALL.iter() {
            let count = self.count(m);
            snapshot.counts.insert(m.name(), count);
            snapshot
                .low
                .insert(m.name(), count < self.cfg.refill.thresholds.get(m));
        }
        snapshot
    }

    /// Any tracked material below its refill threshold.
    pub fn any_below_threshold(&self) -> bool {
        Material::ALL
            .iter()
            .any(|&m| self.count(m) < self.cfg.refill.thresholds.get(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_need() {
        assert_eq!(buffered_need(0), 0);
        assert_eq!(buffered_need(16), 17);
        assert_eq!(buffered_need(20), 21);
        assert_eq!(buffered_need(256), 269);
    }
}
