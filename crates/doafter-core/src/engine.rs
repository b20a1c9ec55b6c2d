//! Simulation engine - main entry point for running the simulation

use hecs::{Entity, World};

use crate::components::*;
use crate::config::SchedulerConfig;
use crate::contract::DoAfterArgs;
use crate::damage::DamageChannel;
use crate::future::DoAfterHandle;
use crate::scheduler::{DoAfterEvent, DoAfterSystem, TickSummary};
use crate::services::{Clock, SimClock, WorldServices};

/// Main simulation engine
pub struct SimulationEngine {
    /// ECS world containing all entities
    pub world: World,
    /// Simulation clock in seconds since start
    pub clock: SimClock,
    /// Damage notifications, shared with the DoAfter system
    pub damage: DamageChannel,
    /// Deferred action scheduler
    pub doafters: DoAfterSystem,

    time_scale: f32,
}

impl SimulationEngine {
    /// Create a new empty simulation
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let damage = DamageChannel::new();
        Self {
            world: World::new(),
            clock: SimClock::new(),
            doafters: DoAfterSystem::with_config(config, damage.clone()),
            damage,
            time_scale: 1.0,
        }
    }

    /// Update the simulation by delta_seconds
    pub fn update(&mut self, delta_seconds: f32) -> TickSummary {
        let scaled_delta = delta_seconds * self.time_scale;
        self.clock.advance(scaled_delta);
        self.doafters.tick(&self.world, &WorldServices, scaled_delta)
    }

    /// Start a deferred action
    pub fn initiate(&mut self, args: impl Into<DoAfterArgs>) -> DoAfterHandle {
        self.doafters
            .initiate(&mut self.world, &self.clock, &WorldServices, args.into())
    }

    /// Report damage to an actor
    pub fn damage(&self, actor: Entity) -> usize {
        self.damage.notify(actor)
    }

    pub fn spawn_grid(&mut self, name: impl Into<String>) -> Entity {
        self.world.spawn((Grid::new(name),))
    }

    /// Spawn an actor standing on `grid` with two free hands
    pub fn spawn_actor(&mut self, grid: Entity, x: f32, y: f32) -> Entity {
        self.world
            .spawn((Position::new(x, y).on_grid(grid), Hands::default()))
    }

    /// Pause or resume every action on a grid. Returns false if `grid` is not a grid.
    pub fn pause_grid(&mut self, grid: Entity, paused: bool) -> bool {
        match self.world.get::<&mut Grid>(grid) {
            Ok(mut g) => {
                g.paused = paused;
                true
            }
            Err(_) => false,
        }
    }

    /// Move an entity to a new local position on its current grid
    pub fn move_to(&mut self, entity: Entity, x: f32, y: f32) -> bool {
        match self.world.get::<&mut Position>(entity) {
            Ok(mut pos) => {
                pos.local = Vec3::new(x, y, pos.local.z);
                true
            }
            Err(_) => false,
        }
    }

    pub fn set_stunned(&mut self, entity: Entity, stunned: bool) {
        if stunned {
            let _ = self.world.insert_one(entity, Stunned);
        } else {
            let _ = self.world.remove_one::<Stunned>(entity);
        }
    }

    pub fn drain_events(&mut self) -> Vec<DoAfterEvent> {
        self.doafters.drain_events()
    }

    /// Set time scale (1.0 = real-time, 2.0 = 2x speed, etc.)
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(0.0);
    }

    /// Get current time scale
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Get current simulation time in seconds
    pub fn sim_time(&self) -> f64 {
        self.clock.now()
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new()
    }
}
