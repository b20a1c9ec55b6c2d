//! External collaborators the scheduler consults.
//!
//! The scheduler never reaches for ambient state: the clock and the services
//! are handed in on every call. Services are stateless lenses over whatever
//! world they are given, which keeps them usable while the scheduler holds a
//! mutable borrow of an actor's action set.

use hecs::{Entity, World};

use crate::components::{Grid, Hands, Position, Stunned};

/// Source of "current simulation time", in seconds.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Monotonic simulation clock advanced by the host loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimClock {
    now: f64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, delta_seconds: f32) {
        if delta_seconds.is_finite() && delta_seconds > 0.0 {
            self.now += delta_seconds as f64;
        }
    }
}

impl Clock for SimClock {
    fn now(&self) -> f64 {
        self.now
    }
}

/// Location lookups and per-region pause state.
pub trait Spatial {
    fn exists(&self, world: &World, entity: Entity) -> bool;

    fn location(&self, world: &World, entity: Entity) -> Option<Position>;

    /// Is the region containing `entity` administratively paused?
    fn is_paused(&self, world: &World, entity: Entity) -> bool;
}

pub trait Status {
    fn is_stunned(&self, world: &World, entity: Entity) -> bool;
}

pub trait Manipulation {
    /// `None` when the entity has no notion of hands at all.
    fn has_free_hand(&self, world: &World, entity: Entity) -> Option<bool>;

    /// Current hand state, compared against the snapshot taken at start.
    fn hands(&self, world: &World, entity: Entity) -> Option<Hands>;
}

/// Everything a tick needs.
pub trait Services: Spatial + Status + Manipulation {}

impl<T: Spatial + Status + Manipulation> Services for T {}

/// Services answered from the components in the world.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldServices;

impl Spatial for WorldServices {
    fn exists(&self, world: &World, entity: Entity) -> bool {
        world.contains(entity)
    }

    fn location(&self, world: &World, entity: Entity) -> Option<Position> {
        world.get::<&Position>(entity).ok().map(|pos| *pos)
    }

    fn is_paused(&self, world: &World, entity: Entity) -> bool {
        self.location(world, entity)
            .and_then(|pos| pos.grid)
            .and_then(|grid| world.get::<&Grid>(grid).ok().map(|g| g.paused))
            .unwrap_or(false)
    }
}

impl Status for WorldServices {
    fn is_stunned(&self, world: &World, entity: Entity) -> bool {
        world.get::<&Stunned>(entity).is_ok()
    }
}

impl Manipulation for WorldServices {
    fn has_free_hand(&self, world: &World, entity: Entity) -> Option<bool> {
        self.hands(world, entity).map(|hands| hands.has_free())
    }

    fn hands(&self, world: &World, entity: Entity) -> Option<Hands> {
        world.get::<&Hands>(entity).ok().map(|hands| *hands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_ignores_negative_delta() {
        let mut clock = SimClock::new();
        clock.advance(1.5);
        clock.advance(-3.0);
        clock.advance(f32::NAN);
        assert!((clock.now() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_paused_grid() {
        let mut world = World::new();
        let grid = world.spawn((Grid::new("station"),));
        let actor = world.spawn((Position::new(0.0, 0.0).on_grid(grid),));
        let floating = world.spawn((Position::new(0.0, 0.0),));

        assert!(!WorldServices.is_paused(&world, actor));
        world.get::<&mut Grid>(grid).unwrap().paused = true;
        assert!(WorldServices.is_paused(&world, actor));
        assert!(!WorldServices.is_paused(&world, floating));
    }

    #[test]
    fn test_status_and_hands() {
        let mut world = World::new();
        let actor = world.spawn((Hands::new(1),));
        let handless = world.spawn(());

        assert!(!WorldServices.is_stunned(&world, actor));
        world.insert_one(actor, Stunned).unwrap();
        assert!(WorldServices.is_stunned(&world, actor));

        assert_eq!(WorldServices.has_free_hand(&world, actor), Some(true));
        world.get::<&mut Hands>(actor).unwrap().pick_up();
        assert_eq!(WorldServices.has_free_hand(&world, actor), Some(false));
        assert_eq!(WorldServices.has_free_hand(&world, handless), None);
        assert_eq!(WorldServices.hands(&world, actor).map(|h| h.held), Some(1));
    }

    #[test]
    fn test_despawned_entity() {
        let mut world = World::new();
        let actor = world.spawn((Position::new(1.0, 1.0),));
        world.despawn(actor).unwrap();

        assert!(!WorldServices.exists(&world, actor));
        assert_eq!(WorldServices.location(&world, actor), None);
    }
}
