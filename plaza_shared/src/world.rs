//! Infinite grid partition.
//!
//! The ground is tiled with square cells around the local player. Only the
//! cell the player stands in is tracked; the renderer draws a fixed window of
//! cells centered on it.

use crate::{config::WorldConfig, math::Vec3};

/// Integer cell coordinate on the XZ plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GridCell {
    pub x: i32,
    pub z: i32,
}

impl GridCell {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// Tracks which grid cell the local player occupies.
#[derive(Debug, Clone)]
pub struct WorldGrid {
    cfg: WorldConfig,
    current: GridCell,
}

impl WorldGrid {
    pub fn new(cfg: WorldConfig) -> Self {
        Self {
            cfg,
            current: GridCell::default(),
        }
    }

    /// Cell containing `position`. Cells are centered on multiples of the
    /// cell size.
    pub fn cell_for(&self, position: Vec3) -> GridCell {
        let size = self.cfg.cell_size;
        let half = size / 2.0;
        GridCell::new(
            ((position.x + half) / size).floor() as i32,
            ((position.z + half) / size).floor() as i32,
        )
    }

    pub fn current(&self) -> GridCell {
        self.current
    }

    /// Moves the tracked cell; returns the new cell only when it changed.
    pub fn update(&mut self, position: Vec3) -> Option<GridCell> {
        let cell = self.cell_for(position);
        if cell == self.current {
            return None;
        }
        self.current = cell;
        Some(cell)
    }

    /// The window of cells to draw, row by row, centered on the current cell.
    pub fn visible_cells(&self) -> Vec<GridCell> {
        let (w, h) = (
            self.cfg.visible_cells_x as i32,
            self.cfg.visible_cells_z as i32,
        );
        let (x0, z0) = (self.current.x - w / 2, self.current.z - h / 2);
        (0..w)
            .flat_map(|dx| (0..h).map(move |dz| GridCell::new(x0 + dx, z0 + dz)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_centered_on_the_origin() {
        let grid = WorldGrid::new(WorldConfig::default());
        assert_eq!(grid.cell_for(Vec3::new(9.9, 0.0, -9.9)), GridCell::new(0, 0));
        assert_eq!(grid.cell_for(Vec3::new(10.0, 0.0, 0.0)), GridCell::new(1, 0));
        assert_eq!(grid.cell_for(Vec3::new(-10.1, 5.0, 31.0)), GridCell::new(-1, 2));
    }

    #[test]
    fn update_only_reports_changes() {
        let mut grid = WorldGrid::new(WorldConfig::default());
        assert_eq!(grid.update(Vec3::new(3.0, 0.0, 3.0)), None);
        assert_eq!(grid.update(Vec3::new(25.0, 0.0, 3.0)), Some(GridCell::new(1, 0)));
        assert_eq!(grid.update(Vec3::new(26.0, 0.0, 4.0)), None);
        assert_eq!(grid.current(), GridCell::new(1, 0));
    }

    #[test]
    fn visible_window_surrounds_current_cell() {
        let mut grid = WorldGrid::new(WorldConfig::default());
        grid.update(Vec3::new(40.0, 0.0, -40.0));
        let cells = grid.visible_cells();
        assert_eq!(cells.len(), 9);
        assert!(cells.contains(&GridCell::new(2, -2)));
        assert!(cells.contains(&GridCell::new(1, -3)));
        assert!(cells.contains(&GridCell::new(3, -1)));
    }
}
