//! Initiation contract - what a caller hands the scheduler to start a DoAfter.
//!
//! A contract is assembled with [`DoAfterBuilder`] and frozen by
//! [`DoAfterBuilder::build`]. The built [`DoAfterArgs`] exposes read-only
//! accessors; nothing can change it once the scheduler owns it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hecs::Entity;

/// Caller-supplied predicate. Returning `false` cancels the action.
pub type ExtraCheck = Box<dyn Fn() -> bool + Send + Sync>;

/// Cooperative cancellation flag.
///
/// Clones share the flag. The scheduler only looks at it when it evaluates
/// the record on a tick, so setting it never takes effect mid-tick.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Immutable configuration of a single deferred action.
pub struct DoAfterArgs {
    actor: Entity,
    delay: f32,
    target: Option<Entity>,
    requires_free_hand: bool,
    break_on_actor_move: bool,
    break_on_target_move: bool,
    break_on_damage: bool,
    break_on_stun: bool,
    break_on_hand_change: bool,
    block_duplicate: bool,
    cancel_duplicate: bool,
    cancel_signal: Option<CancelSignal>,
    extra_check: Option<ExtraCheck>,
    movement_threshold: Option<f32>,
    distance_threshold: Option<f32>,
    label: Option<String>,
}

impl DoAfterArgs {
    /// Start building a contract for `actor` that must stay uninterrupted
    /// for `delay` seconds.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(actor: Entity, delay: f32) -> DoAfterBuilder {
        DoAfterBuilder {
            actor,
            delay,
            target: None,
            requires_free_hand: false,
            break_on_actor_move: false,
            break_on_target_move: false,
            break_on_damage: false,
            break_on_stun: false,
            break_on_hand_change: false,
            block_duplicate: false,
            cancel_duplicate: false,
            cancel_signal: None,
            extra_check: None,
            movement_threshold: None,
            distance_threshold: None,
            label: None,
        }
    }

    pub fn actor(&self) -> Entity {
        self.actor
    }

    pub fn delay(&self) -> f32 {
        self.delay
    }

    pub fn target(&self) -> Option<Entity> {
        self.target
    }

    pub fn requires_free_hand(&self) -> bool {
        self.requires_free_hand
    }

    pub fn break_on_actor_move(&self) -> bool {
        self.break_on_actor_move
    }

    /// Always false for untargeted contracts.
    pub fn break_on_target_move(&self) -> bool {
        self.break_on_target_move
    }

    pub fn break_on_damage(&self) -> bool {
        self.break_on_damage
    }

    pub fn break_on_stun(&self) -> bool {
        self.break_on_stun
    }

    pub fn break_on_hand_change(&self) -> bool {
        self.break_on_hand_change
    }

    /// Refuse to start while an identical action is running.
    pub fn block_duplicate(&self) -> bool {
        self.block_duplicate
    }

    /// Cancel a running identical action that also opted in.
    pub fn cancel_duplicate(&self) -> bool {
        self.cancel_duplicate
    }

    pub fn cancel_signal(&self) -> Option<&CancelSignal> {
        self.cancel_signal.as_ref()
    }

    /// Runs the caller's predicate. Contracts without one always pass.
    pub fn extra_check_passes(&self) -> bool {
        self.extra_check.as_ref().map_or(true, |check| check())
    }

    pub fn has_extra_check(&self) -> bool {
        self.extra_check.is_some()
    }

    pub fn movement_threshold(&self) -> Option<f32> {
        self.movement_threshold
    }

    /// Always `None` for untargeted contracts.
    pub fn distance_threshold(&self) -> Option<f32> {
        self.distance_threshold
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl fmt::Debug for DoAfterArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoAfterArgs")
            .field("actor", &self.actor)
            .field("delay", &self.delay)
            .field("target", &self.target)
            .field("requires_free_hand", &self.requires_free_hand)
            .field("break_on_actor_move", &self.break_on_actor_move)
            .field("break_on_target_move", &self.break_on_target_move)
            .field("break_on_damage", &self.break_on_damage)
            .field("break_on_stun", &self.break_on_stun)
            .field("break_on_hand_change", &self.break_on_hand_change)
            .field("block_duplicate", &self.block_duplicate)
            .field("cancel_duplicate", &self.cancel_duplicate)
            .field("cancel_signal", &self.cancel_signal)
            .field("extra_check", &self.extra_check.is_some())
            .field("movement_threshold", &self.movement_threshold)
            .field("distance_threshold", &self.distance_threshold)
            .field("label", &self.label)
            .finish()
    }
}

/// Mutable staging area for a [`DoAfterArgs`].
pub struct DoAfterBuilder {
    actor: Entity,
    delay: f32,
    target: Option<Entity>,
    requires_free_hand: bool,
    break_on_actor_move: bool,
    break_on_target_move: bool,
    break_on_damage: bool,
    break_on_stun: bool,
    break_on_hand_change: bool,
    block_duplicate: bool,
    cancel_duplicate: bool,
    cancel_signal: Option<CancelSignal>,
    extra_check: Option<ExtraCheck>,
    movement_threshold: Option<f32>,
    distance_threshold: Option<f32>,
    label: Option<String>,
}

impl DoAfterBuilder {
    pub fn with_target(mut self, target: Entity) -> Self {
        self.target = Some(target);
        self
    }

    pub fn requires_free_hand(mut self, yes: bool) -> Self {
        self.requires_free_hand = yes;
        self
    }

    pub fn break_on_actor_move(mut self, yes: bool) -> Self {
        self.break_on_actor_move = yes;
        self
    }

    pub fn break_on_target_move(mut self, yes: bool) -> Self {
        self.break_on_target_move = yes;
        self
    }

    pub fn break_on_damage(mut self, yes: bool) -> Self {
        self.break_on_damage = yes;
        self
    }

    pub fn break_on_stun(mut self, yes: bool) -> Self {
        self.break_on_stun = yes;
        self
    }

    /// Cancel when the actor's held items or active hand change.
    pub fn break_on_hand_change(mut self, yes: bool) -> Self {
        self.break_on_hand_change = yes;
        self
    }

    /// Duplicates are running actions of the same actor with the same target
    /// and label.
    pub fn block_duplicate(mut self, yes: bool) -> Self {
        self.block_duplicate = yes;
        self
    }

    pub fn cancel_duplicate(mut self, yes: bool) -> Self {
        self.cancel_duplicate = yes;
        self
    }

    /// Shorthand for every break-on flag a hands-on interaction usually wants.
    pub fn break_on_anything(self) -> Self {
        self.break_on_actor_move(true)
            .break_on_target_move(true)
            .break_on_damage(true)
            .break_on_stun(true)
    }

    pub fn with_cancel_signal(mut self, signal: CancelSignal) -> Self {
        self.cancel_signal = Some(signal);
        self
    }

    pub fn with_extra_check(mut self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.extra_check = Some(Box::new(check));
        self
    }

    pub fn with_movement_threshold(mut self, threshold: f32) -> Self {
        self.movement_threshold = Some(threshold);
        self
    }

    pub fn with_distance_threshold(mut self, range: f32) -> Self {
        self.distance_threshold = Some(range);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Freeze the contract. Target-relative checks are dropped when there
    /// is no target to compare against.
    pub fn build(self) -> DoAfterArgs {
        let has_target = self.target.is_some();
        DoAfterArgs {
            actor: self.actor,
            delay: self.delay,
            target: self.target,
            requires_free_hand: self.requires_free_hand,
            break_on_actor_move: self.break_on_actor_move,
            break_on_target_move: self.break_on_target_move && has_target,
            break_on_damage: self.break_on_damage,
            break_on_stun: self.break_on_stun,
            break_on_hand_change: self.break_on_hand_change,
            block_duplicate: self.block_duplicate,
            cancel_duplicate: self.cancel_duplicate,
            cancel_signal: self.cancel_signal,
            extra_check: self.extra_check,
            movement_threshold: self.movement_threshold,
            distance_threshold: self.distance_threshold.filter(|_| has_target),
            label: self.label,
        }
    }
}

impl From<DoAfterBuilder> for DoAfterArgs {
    fn from(builder: DoAfterBuilder) -> Self {
        builder.build()
    }
}
