//! DoAfter Core - Interruptible Deferred Actions
//!
//! A long-running player action (welding, disassembly, treating a patient)
//! is expressed as "wait N seconds, unless interrupted". This crate schedules
//! those actions inside a single-threaded, tick-driven ECS simulation.
//!
//! # Architecture
//!
//! The simulation uses an Entity Component System (ECS) architecture via `hecs`:
//! - **Entities**: Actors, targets, grids
//! - **Components**: Pure data ([`components::Position`], [`components::Stunned`],
//!   and each actor's [`record::DoAfterSet`])
//! - **Systems**: [`scheduler::DoAfterSystem`] advances every action once per tick
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`contract`] | Immutable initiation contract and cancel signal |
//! | [`record`] | Per-action record, state machine, actor action set |
//! | [`future`] | One-shot completion future returned to callers |
//! | [`damage`] | Damage notification pub/sub channel |
//! | [`services`] | Clock, spatial, status and manipulation collaborators |
//! | [`scheduler`] | Tick driver, cancellation, outcome events |
//! | [`engine`] | Host-loop wrapper owning world, clock and scheduler |
//!
//! # Example
//!
//! ```rust
//! use doafter_core::prelude::*;
//!
//! let mut engine = SimulationEngine::new();
//! let grid = engine.spawn_grid("station");
//! let actor = engine.spawn_actor(grid, 0.0, 0.0);
//!
//! let mut handle = engine.initiate(DoAfterArgs::new(actor, 2.0).break_on_actor_move(true));
//!
//! for _ in 0..3 {
//!     engine.update(1.0);
//! }
//! assert_eq!(handle.try_status(), Some(DoAfterStatus::Finished));
//! ```

pub mod components;
pub mod config;
pub mod contract;
pub mod damage;
pub mod engine;
pub mod error;
pub mod future;
pub mod record;
pub mod scheduler;
pub mod services;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::components::*;
    pub use crate::config::SchedulerConfig;
    pub use crate::contract::{CancelSignal, DoAfterArgs, DoAfterBuilder};
    pub use crate::damage::DamageChannel;
    pub use crate::engine::SimulationEngine;
    pub use crate::error::{DoAfterError, DoAfterResult};
    pub use crate::future::DoAfterHandle;
    pub use crate::record::{CancelReason, DoAfterId, DoAfterSet, DoAfterStatus};
    pub use crate::scheduler::{DoAfterEvent, DoAfterSystem, TickSummary};
    pub use crate::services::{Clock, SimClock, WorldServices};
}
