//! Damage notification channel.
//!
//! Records that break on damage subscribe for their actor when they start and
//! unsubscribe when they leave `Running`, whichever way they leave it. A
//! notification only flips the subscribers' sticky flags; it never calls back
//! into the scheduler, so any system may publish at any point in a tick.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hecs::Entity;

use crate::record::DoAfterId;

/// A live subscription held by one record.
#[derive(Debug)]
pub struct DamageSubscription {
    actor: Entity,
    id: DoAfterId,
    flag: Arc<AtomicBool>,
}

impl DamageSubscription {
    /// Sticky: once set it stays set for the life of the subscription.
    pub fn took_damage(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn actor(&self) -> Entity {
        self.actor
    }
}

#[derive(Debug, Default)]
struct Subscribers {
    by_actor: HashMap<Entity, Vec<(DoAfterId, Arc<AtomicBool>)>>,
}

/// Shared publish/subscribe handle. Clones refer to the same subscriber table.
#[derive(Debug, Clone, Default)]
pub struct DamageChannel {
    inner: Rc<RefCell<Subscribers>>,
}

impl DamageChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, actor: Entity, id: DoAfterId) -> DamageSubscription {
        let flag = Arc::new(AtomicBool::new(false));
        self.inner
            .borrow_mut()
            .by_actor
            .entry(actor)
            .or_default()
            .push((id, flag.clone()));
        DamageSubscription { actor, id, flag }
    }

    pub fn unsubscribe(&self, subscription: &DamageSubscription) {
        let mut inner = self.inner.borrow_mut();
        if let Some(subs) = inner.by_actor.get_mut(&subscription.actor) {
            subs.retain(|(id, _)| *id != subscription.id);
            if subs.is_empty() {
                inner.by_actor.remove(&subscription.actor);
            }
        }
    }

    /// Drop every subscription for `actor`. Used when the actor is gone.
    pub fn unsubscribe_actor(&self, actor: Entity) -> usize {
        self.inner
            .borrow_mut()
            .by_actor
            .remove(&actor)
            .map_or(0, |subs| subs.len())
    }

    /// Report that `actor` took damage. Returns how many records heard it.
    pub fn notify(&self, actor: Entity) -> usize {
        let inner = self.inner.borrow();
        match inner.by_actor.get(&actor) {
            Some(subs) => {
                for (_, flag) in subs {
                    flag.store(true, Ordering::Release);
                }
                subs.len()
            }
            None => 0,
        }
    }

    pub fn subscriber_count(&self, actor: Entity) -> usize {
        self.inner
            .borrow()
            .by_actor
            .get(&actor)
            .map_or(0, |subs| subs.len())
    }

    pub fn total_subscribers(&self) -> usize {
        self.inner.borrow().by_actor.values().map(Vec::len).sum()
    }
}
