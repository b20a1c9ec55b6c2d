//! Deferred action record and its per-tick state machine.
//!
//! ```text
//! Running ──elapsed > delay──▶ Finished
//!    │
//!    └──interruption────────▶ Cancelled
//! ```
//!
//! Both terminal states are final. Success is tested before any interruption,
//! so an action that becomes due on the same tick it gets disrupted finishes.

use std::fmt;

use hecs::{Entity, World};
use serde::{Deserialize, Serialize};

use crate::components::{Hands, Position};
use crate::contract::DoAfterArgs;
use crate::damage::DamageSubscription;
use crate::error::{DoAfterError, DoAfterResult};
use crate::services::Services;

/// Scheduler-unique id of a deferred action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DoAfterId(pub u64);

impl fmt::Display for DoAfterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DoAfterStatus {
    Running,
    Cancelled,
    Finished,
}

impl DoAfterStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DoAfterStatus::Running)
    }
}

/// Why a record was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancelReason {
    /// The caller's cancel signal was raised
    ExternalSignal,
    /// `DoAfterSystem::cancel` was called for this record
    Manual,
    ActorMoved,
    TargetMoved,
    Damaged,
    ExtraCheckFailed,
    Stunned,
    /// Actor and target drifted beyond the distance threshold
    OutOfRange,
    NoFreeHand,
    /// The actor's held items or active hand changed
    HandChanged,
    TargetDeleted,
    ActorDeleted,
    /// Refused or displaced by an identical action of the same actor
    Duplicate,
}

/// One in-flight deferred action.
#[derive(Debug)]
pub struct DoAfter {
    id: DoAfterId,
    args: DoAfterArgs,
    start_time: f64,
    elapsed: f32,
    movement_threshold: f32,
    distance_threshold: Option<f32>,
    actor_start: Option<Position>,
    target_start: Option<Position>,
    hands_start: Option<Hands>,
    damage: Option<DamageSubscription>,
    requested: Option<CancelReason>,
    status: DoAfterStatus,
    reason: Option<CancelReason>,
}

impl DoAfter {
    /// Snapshot start locations and hands for the checks that are switched on.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn start<S: Services + ?Sized>(
        id: DoAfterId,
        args: DoAfterArgs,
        start_time: f64,
        movement_threshold: f32,
        distance_threshold: Option<f32>,
        world: &World,
        services: &S,
        damage: Option<DamageSubscription>,
    ) -> Self {
        let actor_start = if args.break_on_actor_move() {
            services.location(world, args.actor())
        } else {
            None
        };
        let target_start = match args.target() {
            Some(target) if args.break_on_target_move() => services.location(world, target),
            _ => None,
        };
        let hands_start = if args.break_on_hand_change() {
            services.hands(world, args.actor())
        } else {
            None
        };

        Self {
            id,
            args,
            start_time,
            elapsed: 0.0,
            movement_threshold,
            distance_threshold,
            actor_start,
            target_start,
            hands_start,
            damage,
            requested: None,
            status: DoAfterStatus::Running,
            reason: None,
        }
    }

    pub fn id(&self) -> DoAfterId {
        self.id
    }

    pub fn args(&self) -> &DoAfterArgs {
        &self.args
    }

    pub fn actor(&self) -> Entity {
        self.args.actor()
    }

    pub fn target(&self) -> Option<Entity> {
        self.args.target()
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn status(&self) -> DoAfterStatus {
        self.status
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.reason
    }

    pub fn is_running(&self) -> bool {
        self.status == DoAfterStatus::Running
    }

    /// Fraction of the delay already served, in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        let delay = self.args.delay();
        if delay <= 0.0 {
            return 1.0;
        }
        (self.elapsed / delay).clamp(0.0, 1.0)
    }

    /// Ask for cancellation on the next evaluation. The first request wins.
    pub(crate) fn request_cancel(&mut self, reason: CancelReason) {
        self.requested.get_or_insert(reason);
    }

    /// A running action with the same target and label as `args`.
    pub(crate) fn is_duplicate_of(&self, args: &DoAfterArgs) -> bool {
        self.is_running()
            && self.args.actor() == args.actor()
            && self.args.target() == args.target()
            && self.args.label() == args.label()
    }

    /// Advance by one tick and evaluate the record.
    pub fn advance<S: Services + ?Sized>(
        &mut self,
        delta_seconds: f32,
        world: &World,
        services: &S,
    ) -> DoAfterResult<DoAfterStatus> {
        if !self.is_running() {
            log::error!("doafter {} advanced after reaching {:?}", self.id, self.status);
            return Err(DoAfterError::NotRunning {
                id: self.id,
                status: self.status,
            });
        }

        self.elapsed += delta_seconds.max(0.0);

        if self.elapsed > self.args.delay() {
            self.status = DoAfterStatus::Finished;
        } else if let Some(reason) = self.interruption(world, services) {
            self.cancel(reason);
        }

        Ok(self.status)
    }

    /// First interruption that holds, in evaluation order.
    fn interruption<S: Services + ?Sized>(&self, world: &World, services: &S) -> Option<CancelReason> {
        let args = &self.args;
        let actor = args.actor();

        if let Some(target) = args.target() {
            if !services.exists(world, target) {
                return Some(CancelReason::TargetDeleted);
            }
        }

        if args.cancel_signal().is_some_and(|signal| signal.is_cancelled()) {
            return Some(CancelReason::ExternalSignal);
        }
        if let Some(reason) = self.requested {
            return Some(reason);
        }

        if args.break_on_actor_move()
            && has_moved(self.actor_start, services.location(world, actor), self.movement_threshold)
        {
            return Some(CancelReason::ActorMoved);
        }

        if let Some(target) = args.target() {
            if args.break_on_target_move()
                && has_moved(self.target_start, services.location(world, target), self.movement_threshold)
            {
                return Some(CancelReason::TargetMoved);
            }
        }

        if args.break_on_damage() && self.damage.as_ref().is_some_and(|d| d.took_damage()) {
            return Some(CancelReason::Damaged);
        }

        if !args.extra_check_passes() {
            return Some(CancelReason::ExtraCheckFailed);
        }

        if args.break_on_stun() && services.is_stunned(world, actor) {
            return Some(CancelReason::Stunned);
        }

        if let (Some(range), Some(target)) = (self.distance_threshold, args.target()) {
            let in_range = match (services.location(world, actor), services.location(world, target)) {
                (Some(a), Some(t)) => a.distance_to(&t).is_some_and(|d| d <= range),
                _ => false,
            };
            if !in_range {
                return Some(CancelReason::OutOfRange);
            }
        }

        if args.requires_free_hand() && services.has_free_hand(world, actor) == Some(false) {
            return Some(CancelReason::NoFreeHand);
        }

        if args.break_on_hand_change() && services.hands(world, actor) != self.hands_start {
            return Some(CancelReason::HandChanged);
        }

        None
    }

    /// Force a running record into `Cancelled`. No-op once terminal.
    pub(crate) fn cancel(&mut self, reason: CancelReason) {
        if self.is_running() {
            self.status = DoAfterStatus::Cancelled;
            self.reason = Some(reason);
        }
    }

    /// Hand back the damage subscription so the scheduler can release it.
    pub(crate) fn take_damage(&mut self) -> Option<DamageSubscription> {
        self.damage.take()
    }
}

fn has_moved(start: Option<Position>, now: Option<Position>, threshold: f32) -> bool {
    match (start, now) {
        (Some(start), Some(now)) => now.moved_from(&start, threshold),
        (None, None) => false,
        _ => true,
    }
}

/// Actor Action Set: every deferred action an actor has in flight.
///
/// Stored as a component on the actor and inserted the first time the actor
/// starts a DoAfter. Order carries no meaning.
#[derive(Debug, Default)]
pub struct DoAfterSet {
    records: Vec<DoAfter>,
}

impl DoAfterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, record: DoAfter) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DoAfter> {
        self.records.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut DoAfter> {
        self.records.iter_mut()
    }

    pub fn get(&self, id: DoAfterId) -> Option<&DoAfter> {
        self.records.iter().find(|r| r.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: DoAfterId) -> Option<&mut DoAfter> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    /// Remove terminal records, split into (cancelled, finished).
    pub(crate) fn drain_terminal(&mut self) -> (Vec<DoAfter>, Vec<DoAfter>) {
        let mut cancelled = Vec::new();
        let mut finished = Vec::new();
        let mut running = Vec::with_capacity(self.records.len());

        for record in self.records.drain(..) {
            match record.status {
                DoAfterStatus::Running => running.push(record),
                DoAfterStatus::Cancelled => cancelled.push(record),
                DoAfterStatus::Finished => finished.push(record),
            }
        }

        self.records = running;
        (cancelled, finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Hands, Stunned};
    use crate::contract::{CancelSignal, DoAfterBuilder};
    use crate::damage::DamageChannel;
    use crate::services::WorldServices;

    fn start(world: &World, builder: DoAfterBuilder, damage: Option<&DamageChannel>) -> DoAfter {
        let args = builder.build();
        let id = DoAfterId(0);
        let sub = damage
            .filter(|_| args.break_on_damage())
            .map(|channel| channel.subscribe(args.actor(), id));
        let range = args.distance_threshold();
        DoAfter::start(id, args, 0.0, 0.0, range, world, &WorldServices, sub)
    }

    #[test]
    fn test_finishes_only_after_strictly_exceeding_delay() {
        let mut world = World::new();
        let actor = world.spawn((Position::new(0.0, 0.0),));
        let mut record = start(&world, DoAfterArgs::new(actor, 3.0), None);

        for expected in [1.0, 2.0, 3.0] {
            let status = record.advance(1.0, &world, &WorldServices).unwrap();
            assert_eq!(status, DoAfterStatus::Running);
            assert!((record.elapsed() - expected).abs() < 1e-6);
        }

        let status = record.advance(0.1, &world, &WorldServices).unwrap();
        assert_eq!(status, DoAfterStatus::Finished);
    }

    #[test]
    fn test_zero_delay_finishes_on_first_positive_tick() {
        let mut world = World::new();
        let actor = world.spawn(());
        let mut record = start(&world, DoAfterArgs::new(actor, 0.0), None);

        assert_eq!(record.progress(), 1.0);
        assert_eq!(
            record.advance(0.016, &world, &WorldServices).unwrap(),
            DoAfterStatus::Finished
        );
    }

    #[test]
    fn test_negative_delta_does_not_rewind() {
        let mut world = World::new();
        let actor = world.spawn(());
        let mut record = start(&world, DoAfterArgs::new(actor, 5.0), None);

        record.advance(1.0, &world, &WorldServices).unwrap();
        record.advance(-10.0, &world, &WorldServices).unwrap();
        assert!((record.elapsed() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_advance_after_terminal_is_rejected() {
        let mut world = World::new();
        let actor = world.spawn(());
        let mut record = start(&world, DoAfterArgs::new(actor, 0.0), None);

        record.advance(1.0, &world, &WorldServices).unwrap();
        let err = record.advance(1.0, &world, &WorldServices).unwrap_err();
        assert!(matches!(
            err,
            DoAfterError::NotRunning {
                status: DoAfterStatus::Finished,
                ..
            }
        ));
    }

    #[test]
    fn test_success_wins_over_interruption() {
        let mut world = World::new();
        let actor = world.spawn((Position::new(0.0, 0.0),));
        let signal = CancelSignal::new();
        let builder = DoAfterArgs::new(actor, 1.0)
            .break_on_actor_move(true)
            .with_cancel_signal(signal.clone());
        let mut record = start(&world, builder, None);

        record.advance(0.5, &world, &WorldServices).unwrap();
        signal.cancel();
        world.get::<&mut Position>(actor).unwrap().local.x = 4.0;

        let status = record.advance(0.6, &world, &WorldServices).unwrap();
        assert_eq!(status, DoAfterStatus::Finished);
        assert_eq!(record.cancel_reason(), None);
    }

    #[test]
    fn test_signal_checked_before_movement() {
        let mut world = World::new();
        let actor = world.spawn((Position::new(0.0, 0.0), Stunned));
        let signal = CancelSignal::new();
        let builder = DoAfterArgs::new(actor, 10.0)
            .break_on_actor_move(true)
            .break_on_stun(true)
            .with_cancel_signal(signal.clone());
        let mut record = start(&world, builder, None);

        signal.cancel();
        world.get::<&mut Position>(actor).unwrap().local.y = 2.0;

        record.advance(0.1, &world, &WorldServices).unwrap();
        assert_eq!(record.cancel_reason(), Some(CancelReason::ExternalSignal));
    }

    #[test]
    fn test_damage_checked_before_extra_check_and_stun() {
        let mut world = World::new();
        let actor = world.spawn((Stunned,));
        let channel = DamageChannel::new();
        let builder = DoAfterArgs::new(actor, 10.0)
            .break_on_damage(true)
            .break_on_stun(true)
            .with_extra_check(|| false);
        let mut record = start(&world, builder, Some(&channel));

        channel.notify(actor);
        record.advance(0.1, &world, &WorldServices).unwrap();
        assert_eq!(record.cancel_reason(), Some(CancelReason::Damaged));
    }

    #[test]
    fn test_extra_check_before_stun() {
        let mut world = World::new();
        let actor = world.spawn((Stunned,));
        let builder = DoAfterArgs::new(actor, 10.0)
            .break_on_stun(true)
            .with_extra_check(|| false);
        let mut record = start(&world, builder, None);

        record.advance(0.1, &world, &WorldServices).unwrap();
        assert_eq!(record.cancel_reason(), Some(CancelReason::ExtraCheckFailed));
    }

    #[test]
    fn test_stun_ignored_without_flag() {
        let mut world = World::new();
        let actor = world.spawn((Stunned,));
        let mut record = start(&world, DoAfterArgs::new(actor, 1.0), None);

        assert_eq!(
            record.advance(0.5, &world, &WorldServices).unwrap(),
            DoAfterStatus::Running
        );
        assert_eq!(
            record.advance(0.6, &world, &WorldServices).unwrap(),
            DoAfterStatus::Finished
        );
    }

    #[test]
    fn test_target_moved() {
        let mut world = World::new();
        let actor = world.spawn((Position::new(0.0, 0.0),));
        let target = world.spawn((Position::new(1.0, 0.0),));
        let builder = DoAfterArgs::new(actor, 5.0)
            .with_target(target)
            .break_on_target_move(true);
        let mut record = start(&world, builder, None);

        record.advance(1.0, &world, &WorldServices).unwrap();
        assert!(record.is_running());

        world.get::<&mut Position>(target).unwrap().local.x = 1.5;
        record.advance(1.0, &world, &WorldServices).unwrap();
        assert_eq!(record.cancel_reason(), Some(CancelReason::TargetMoved));
    }

    #[test]
    fn test_target_deleted_cancels() {
        let mut world = World::new();
        let actor = world.spawn(());
        let target = world.spawn(());
        let mut record = start(&world, DoAfterArgs::new(actor, 5.0).with_target(target), None);

        world.despawn(target).unwrap();
        record.advance(1.0, &world, &WorldServices).unwrap();
        assert_eq!(record.cancel_reason(), Some(CancelReason::TargetDeleted));
    }

    #[test]
    fn test_out_of_range() {
        let mut world = World::new();
        let actor = world.spawn((Position::new(0.0, 0.0),));
        let target = world.spawn((Position::new(1.0, 0.0),));
        let builder = DoAfterArgs::new(actor, 5.0)
            .with_target(target)
            .with_distance_threshold(1.5);
        let mut record = start(&world, builder, None);

        record.advance(1.0, &world, &WorldServices).unwrap();
        assert!(record.is_running());

        world.get::<&mut Position>(actor).unwrap().local.x = -1.0;
        record.advance(1.0, &world, &WorldServices).unwrap();
        assert_eq!(record.cancel_reason(), Some(CancelReason::OutOfRange));
    }

    #[test]
    fn test_requires_free_hand() {
        let mut world = World::new();
        let actor = world.spawn((Hands::new(1),));
        let handless = world.spawn(());

        let mut record = start(&world, DoAfterArgs::new(actor, 5.0).requires_free_hand(true), None);
        let mut other = start(&world, DoAfterArgs::new(handless, 5.0).requires_free_hand(true), None);

        record.advance(1.0, &world, &WorldServices).unwrap();
        assert!(record.is_running());

        world.get::<&mut Hands>(actor).unwrap().pick_up();
        record.advance(1.0, &world, &WorldServices).unwrap();
        assert_eq!(record.cancel_reason(), Some(CancelReason::NoFreeHand));

        // No hands component: nothing to check against
        other.advance(1.0, &world, &WorldServices).unwrap();
        assert!(other.is_running());
    }

    #[test]
    fn test_damage_subscription_taken_once() {
        let mut world = World::new();
        let actor = world.spawn(());
        let channel = DamageChannel::new();
        let mut record = start(&world, DoAfterArgs::new(actor, 0.0).break_on_damage(true), Some(&channel));

        record.advance(1.0, &world, &WorldServices).unwrap();
        assert!(record.take_damage().is_some());
        assert!(record.take_damage().is_none());
    }

    #[test]
    fn test_hand_change_cancels() {
        let mut world = World::new();
        let actor = world.spawn((Hands::new(2),));
        let builder = DoAfterArgs::new(actor, 5.0).break_on_hand_change(true);
        let mut picked = start(&world, builder, None);
        let mut swapped = start(&world, DoAfterArgs::new(actor, 5.0).break_on_hand_change(true), None);
        let mut ignoring = start(&world, DoAfterArgs::new(actor, 5.0), None);

        picked.advance(1.0, &world, &WorldServices).unwrap();
        assert!(picked.is_running());

        world.get::<&mut Hands>(actor).unwrap().pick_up();
        picked.advance(1.0, &world, &WorldServices).unwrap();
        assert_eq!(picked.cancel_reason(), Some(CancelReason::HandChanged));

        // Putting the item back restores the snapshot
        world.get::<&mut Hands>(actor).unwrap().drop_one();
        swapped.advance(1.0, &world, &WorldServices).unwrap();
        assert!(swapped.is_running());

        world.get::<&mut Hands>(actor).unwrap().select(1);
        swapped.advance(1.0, &world, &WorldServices).unwrap();
        assert_eq!(swapped.cancel_reason(), Some(CancelReason::HandChanged));

        ignoring.advance(1.0, &world, &WorldServices).unwrap();
        assert!(ignoring.is_running());
    }

    #[test]
    fn test_duplicate_match() {
        let mut world = World::new();
        let actor = world.spawn(());
        let target = world.spawn(());
        let existing = start(&world, DoAfterArgs::new(actor, 5.0).with_target(target).with_label("cocoon"), None);

        assert!(existing.is_duplicate_of(&DoAfterArgs::new(actor, 1.0).with_target(target).with_label("cocoon").build()));
        assert!(!existing.is_duplicate_of(&DoAfterArgs::new(actor, 5.0).with_label("cocoon").build()));
        assert!(!existing.is_duplicate_of(&DoAfterArgs::new(actor, 5.0).with_target(target).with_label("strip").build()));
    }

    #[test]
    fn test_first_cancel_request_wins() {
        let mut world = World::new();
        let actor = world.spawn(());
        let mut record = start(&world, DoAfterArgs::new(actor, 5.0), None);

        record.request_cancel(CancelReason::Duplicate);
        record.request_cancel(CancelReason::Manual);
        record.advance(1.0, &world, &WorldServices).unwrap();
        assert_eq!(record.cancel_reason(), Some(CancelReason::Duplicate));
    }

    #[test]
    fn test_drain_terminal_partitions() {
        let mut world = World::new();
        let actor = world.spawn(());
        let mut set = DoAfterSet::new();

        let mut done = start(&world, DoAfterArgs::new(actor, 0.0), None);
        let mut stopped = start(&world, DoAfterArgs::new(actor, 9.0).with_extra_check(|| false), None);
        let mut waiting = start(&world, DoAfterArgs::new(actor, 9.0), None);
        for record in [&mut done, &mut stopped, &mut waiting] {
            record.advance(1.0, &world, &WorldServices).unwrap();
        }
        set.push(done);
        set.push(stopped);
        set.push(waiting);

        let (cancelled, finished) = set.drain_terminal();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(finished.len(), 1);
        assert_eq!(set.len(), 1);
        assert!(set.iter().all(DoAfter::is_running));
    }
}
