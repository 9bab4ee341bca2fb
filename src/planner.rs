//! Grid task planning: pure mapping from (origin, layer) to ordered cells.
//!
//! Layers are traversed boustrophedon: row 0 left-to-right, row 1
//! right-to-left, and so on. The support offset flips with the row direction
//! so the stand block for each cell is always on the side the bot just came
//! from, keeping travel monotonic along a row.

use crate::models::{CellTask, Vec3i};

/// Vertical distance between layers: sand, cactus, and one air gap.
pub const LAYER_STEP: i32 = 3;

/// Highest buildable y coordinate in the world.
pub const BUILD_CEILING: i32 = 319;

/// Height of a layer's cells.
pub fn layer_height(origin: Vec3i, layer: u32) -> i32 {
    origin.y + (layer as i32) * LAYER_STEP
}

/// Ordered cell tasks for one layer of a `grid_size` square.
pub fn layer_tasks(origin: Vec3i, layer: u32, grid_size: u32) -> Vec<CellTask> {
    let y = layer_height(origin, layer);
    let n = grid_size as i32;
    let mut cells = Vec::with_capacity((n * n) as usize);

    for dz in 0..n {
        let left_to_right = dz % 2 == 0;
        let support_offset = if left_to_right { 1 } else { -1 };
        let xs: Vec<i32> = if left_to_right {
            (0..n).collect()
        } else {
            (0..n).rev().collect()
        };

        for dx in xs {
            cells.push(CellTask {
                target: Vec3i::new(origin.x + dx, y, origin.z + dz),
                support_offset,
            });
        }
    }

    cells
}
