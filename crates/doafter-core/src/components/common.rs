//! Spatial components shared by actors, targets and grids.

use hecs::Entity;
use serde::{Deserialize, Serialize};

/// 3D position vector
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_squared(&self, other: &Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance(&self, other: &Self) -> f32 {
        self.distance_squared(other).sqrt()
    }
}

/// Grid-relative location of an entity.
///
/// Two positions on different grids are never "the same place", however close
/// their local coordinates are.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    /// Local position within the grid
    pub local: Vec3,
    /// The grid entity this position is relative to
    pub grid: Option<Entity>,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            local: Vec3::new(x, y, 0.0),
            grid: None,
        }
    }

    pub fn on_grid(mut self, grid: Entity) -> Self {
        self.grid = Some(grid);
        self
    }

    /// True if `other` is on another grid or farther than `threshold` away.
    pub fn moved_from(&self, other: &Position, threshold: f32) -> bool {
        self.grid != other.grid || self.local.distance(&other.local) > threshold
    }

    /// Distance to `other`, or `None` when they sit on different grids.
    pub fn distance_to(&self, other: &Position) -> Option<f32> {
        (self.grid == other.grid).then(|| self.local.distance(&other.local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_distance() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 4.0, 0.0);
        assert!((a.distance(&b) - 5.0).abs() < 0.001);
    }

    #[test]
    fn test_moved_from_threshold() {
        let start = Position::new(1.0, 1.0);
        let nudged = Position::new(1.05, 1.0);

        assert!(nudged.moved_from(&start, 0.0));
        assert!(!nudged.moved_from(&start, 0.1));
        assert!(!start.moved_from(&start, 0.0));
    }

    #[test]
    fn test_grid_change_counts_as_movement() {
        let mut world = hecs::World::new();
        let a = world.spawn(());
        let b = world.spawn(());

        let here = Position::new(2.0, 2.0).on_grid(a);
        let there = Position::new(2.0, 2.0).on_grid(b);

        assert!(there.moved_from(&here, 100.0));
        assert_eq!(here.distance_to(&there), None);
        assert_eq!(here.distance_to(&here), Some(0.0));
    }
}
