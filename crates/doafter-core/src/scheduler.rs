//! DoAfter system - drives every actor's deferred actions once per tick

use std::collections::HashMap;

use hecs::{Entity, World};
use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::contract::DoAfterArgs;
use crate::damage::DamageChannel;
use crate::error::DoAfterError;
use crate::future::{completion_pair, Completion, DoAfterHandle};
use crate::record::{CancelReason, DoAfter, DoAfterId, DoAfterSet, DoAfterStatus};
use crate::services::{Clock, Services};

/// Terminal outcome broadcast after routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoAfterEvent {
    pub id: DoAfterId,
    #[serde(skip)]
    pub actor: Option<Entity>,
    #[serde(skip)]
    pub target: Option<Entity>,
    pub status: DoAfterStatus,
    pub reason: Option<CancelReason>,
    pub label: Option<String>,
    /// Seconds of uninterrupted work served before the outcome
    pub elapsed: f32,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub actors_advanced: usize,
    pub actors_paused: usize,
    pub finished: usize,
    pub cancelled: usize,
}

/// Caller-facing half of an action, held until routing resolves it.
///
/// Records live in the actor's [`DoAfterSet`] and vanish with it; this entry
/// outlives the actor so a deletion is still reported on the next tick.
struct Pending {
    id: DoAfterId,
    target: Option<Entity>,
    label: Option<String>,
    elapsed: f32,
    completion: Completion,
}

/// The tick driver. Records live in each actor's [`DoAfterSet`] component;
/// the completions for them are kept here, grouped by actor.
pub struct DoAfterSystem {
    config: SchedulerConfig,
    damage: DamageChannel,
    next_id: u64,
    pending: HashMap<Entity, Vec<Pending>>,
    events: Vec<DoAfterEvent>,
}

impl DoAfterSystem {
    pub fn new(damage: DamageChannel) -> Self {
        Self::with_config(SchedulerConfig::default(), damage)
    }

    pub fn with_config(config: SchedulerConfig, damage: DamageChannel) -> Self {
        Self {
            config,
            damage,
            next_id: 0,
            pending: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn damage_channel(&self) -> &DamageChannel {
        &self.damage
    }

    /// Start a deferred action. Never fails: an action whose actor does not
    /// exist, or that is refused as a duplicate, is cancelled on the next tick.
    pub fn initiate<C, S>(
        &mut self,
        world: &mut World,
        clock: &C,
        services: &S,
        args: DoAfterArgs,
    ) -> DoAfterHandle
    where
        C: Clock + ?Sized,
        S: Services + ?Sized,
    {
        let id = DoAfterId(self.next_id);
        self.next_id += 1;

        let actor = args.actor();
        let movement_threshold = args
            .movement_threshold()
            .unwrap_or(self.config.movement_threshold)
            .max(0.0);
        let distance_threshold = args
            .target()
            .and(args.distance_threshold().or(self.config.default_distance_threshold));

        log::debug!(
            "doafter {} started: actor={:?} target={:?} delay={:.2}s label={:?}",
            id,
            actor,
            args.target(),
            args.delay(),
            args.label()
        );

        let (completion, handle) = completion_pair(id);
        self.pending.entry(actor).or_default().push(Pending {
            id,
            target: args.target(),
            label: args.label().map(str::to_owned),
            elapsed: 0.0,
            completion,
        });

        if !world.contains(actor) {
            log::warn!("doafter {} started by missing actor {:?}", id, actor);
            return handle;
        }

        let refused = (args.block_duplicate() || args.cancel_duplicate())
            && Self::process_duplicates(world, &args);

        let damage = (args.break_on_damage() && !refused).then(|| self.damage.subscribe(actor, id));
        let mut record = DoAfter::start(
            id,
            args,
            clock.now(),
            movement_threshold,
            distance_threshold,
            world,
            services,
            damage,
        );
        if refused {
            log::debug!("doafter {} refused: duplicate of a running action", id);
            record.cancel(CancelReason::Duplicate);
        }

        let record = match world.get::<&mut DoAfterSet>(actor) {
            Ok(mut set) => {
                set.push(record);
                None
            }
            Err(_) => Some(record),
        };
        if let Some(record) = record {
            let mut set = DoAfterSet::new();
            set.push(record);
            if let Err(err) = world.insert_one(actor, set) {
                log::warn!("doafter {} could not attach to {:?}: {}", id, actor, err);
            }
        }

        handle
    }

    /// Advance every running action by `delta_seconds`.
    ///
    /// Actors on paused grids are skipped outright. For every other actor all
    /// records are advanced first; only then are that actor's terminal
    /// records removed and resolved, cancelled ones before finished ones.
    pub fn tick<S: Services + ?Sized>(
        &mut self,
        world: &World,
        services: &S,
        delta_seconds: f32,
    ) -> TickSummary {
        let dt = if delta_seconds.is_finite() {
            delta_seconds.max(0.0)
        } else {
            0.0
        };
        let mut summary = TickSummary::default();

        self.cancel_abandoned(world, &mut summary);

        let actors: Vec<Entity> = self.pending.keys().copied().collect();
        for actor in actors {
            if services.is_paused(world, actor) {
                summary.actors_paused += 1;
                continue;
            }

            let (cancelled, finished) = {
                let Ok(mut set) = world.get::<&mut DoAfterSet>(actor) else {
                    continue;
                };
                // Refused duplicates enter the set already cancelled
                for record in set.iter_mut().filter(|r| r.is_running()) {
                    if let Err(err) = record.advance(dt, world, services) {
                        fault(err);
                    }
                }
                if let Some(entries) = self.pending.get_mut(&actor) {
                    for entry in entries.iter_mut() {
                        if let Some(record) = set.get(entry.id) {
                            entry.elapsed = record.elapsed();
                        }
                    }
                }
                set.drain_terminal()
            };

            summary.actors_advanced += 1;
            for record in cancelled.into_iter().chain(finished) {
                self.route(record, &mut summary);
            }
        }

        summary
    }

    /// Request cancellation of one action. Takes effect on the next tick.
    pub fn cancel(&mut self, world: &World, actor: Entity, id: DoAfterId) -> bool {
        let Ok(mut set) = world.get::<&mut DoAfterSet>(actor) else {
            return false;
        };
        match set.get_mut(id) {
            Some(record) if record.is_running() => {
                record.request_cancel(CancelReason::Manual);
                true
            }
            _ => false,
        }
    }

    /// Request cancellation of every running action of `actor`.
    pub fn cancel_all(&mut self, world: &World, actor: Entity) -> usize {
        let Ok(mut set) = world.get::<&mut DoAfterSet>(actor) else {
            return 0;
        };
        let mut count = 0;
        for record in set.iter_mut().filter(|r| r.is_running()) {
            record.request_cancel(CancelReason::Manual);
            count += 1;
        }
        count
    }

    /// Progress fraction of each action `actor` has in flight.
    pub fn progress(&self, world: &World, actor: Entity) -> Vec<(DoAfterId, f32)> {
        world
            .get::<&DoAfterSet>(actor)
            .map(|set| set.iter().map(|r| (r.id(), r.progress())).collect())
            .unwrap_or_default()
    }

    pub fn running_count(&self, world: &World, actor: Entity) -> usize {
        world
            .get::<&DoAfterSet>(actor)
            .map(|set| set.iter().filter(|r| r.is_running()).count())
            .unwrap_or(0)
    }

    /// Number of actors with at least one unresolved action.
    pub fn tracked_actors(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_events(&self) -> &[DoAfterEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<DoAfterEvent> {
        std::mem::take(&mut self.events)
    }

    /// Flag running duplicates of `args` for cancellation when both sides
    /// opted in. Returns whether the new action must be refused.
    fn process_duplicates(world: &World, args: &DoAfterArgs) -> bool {
        let Ok(mut set) = world.get::<&mut DoAfterSet>(args.actor()) else {
            return false;
        };
        let mut refused = false;
        for existing in set.iter_mut().filter(|r| r.is_duplicate_of(args)) {
            refused |= args.block_duplicate() || existing.args().block_duplicate();
            if args.cancel_duplicate() && existing.args().cancel_duplicate() {
                existing.request_cancel(CancelReason::Duplicate);
            }
        }
        refused
    }

    /// Actors that were despawned, or lost their action set, took their
    /// records with them. Cancel what they still had pending.
    fn cancel_abandoned(&mut self, world: &World, summary: &mut TickSummary) {
        let gone: Vec<Entity> = self
            .pending
            .keys()
            .copied()
            .filter(|actor| world.get::<&DoAfterSet>(*actor).is_err())
            .collect();

        for actor in gone {
            let released = self.damage.unsubscribe_actor(actor);
            let entries = self.pending.remove(&actor).unwrap_or_default();
            log::warn!(
                "actor {:?} gone with {} actions in flight, released {} damage subscriptions",
                actor,
                entries.len(),
                released
            );
            for entry in entries {
                self.settle(
                    actor,
                    entry,
                    DoAfterStatus::Cancelled,
                    Some(CancelReason::ActorDeleted),
                    summary,
                );
            }
        }
    }

    fn route(&mut self, mut record: DoAfter, summary: &mut TickSummary) {
        if let Some(subscription) = record.take_damage() {
            self.damage.unsubscribe(&subscription);
        }

        let actor = record.actor();
        let Some(mut entry) = self.take_pending(actor, record.id()) else {
            fault(DoAfterError::AlreadyResolved { id: record.id() });
            return;
        };
        entry.elapsed = record.elapsed();
        self.settle(actor, entry, record.status(), record.cancel_reason(), summary);
    }

    fn take_pending(&mut self, actor: Entity, id: DoAfterId) -> Option<Pending> {
        let entries = self.pending.get_mut(&actor)?;
        let index = entries.iter().position(|entry| entry.id == id)?;
        let entry = entries.swap_remove(index);
        if entries.is_empty() {
            self.pending.remove(&actor);
        }
        Some(entry)
    }

    /// Resolve the caller's future, count the outcome and broadcast it.
    fn settle(
        &mut self,
        actor: Entity,
        mut entry: Pending,
        status: DoAfterStatus,
        reason: Option<CancelReason>,
        summary: &mut TickSummary,
    ) {
        if let Err(err) = entry.completion.resolve(status) {
            fault(err);
        }

        match status {
            DoAfterStatus::Finished => summary.finished += 1,
            DoAfterStatus::Cancelled => summary.cancelled += 1,
            DoAfterStatus::Running => {}
        }

        log::debug!(
            "doafter {} {:?} after {:.2}s (reason {:?})",
            entry.id,
            status,
            entry.elapsed,
            reason
        );

        if self.config.emit_events {
            self.events.push(DoAfterEvent {
                id: entry.id,
                actor: Some(actor),
                target: entry.target,
                status,
                reason,
                label: entry.label,
                elapsed: entry.elapsed,
            });
        }
    }
}

/// Scheduler misuse. Logged always, fatal in debug builds.
fn fault(err: DoAfterError) {
    log::error!("{}", err);
    debug_assert!(false, "{}", err);
}

impl Default for DoAfterSystem {
    fn default() -> Self {
        Self::new(DamageChannel::new())
    }
}
