//! Typed change notifications from stores to subscribers.
//!
//! # Responsibility
//! - Carry entity + operation for every committed store write.
//! - Keep delivery best effort: observers never fail the write.
//!
//! # Invariants
//! - Events are published only after the write succeeded.
//! - Observers are invoked in subscription order.

use crate::model::movement::MovementId;
use crate::model::session::SessionId;
use log::warn;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEntity {
    Session(SessionId),
    Movement(MovementId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub entity: ChangeEntity,
    pub op: ChangeOp,
}

impl ChangeEvent {
    pub fn session(id: SessionId, op: ChangeOp) -> Self {
        Self {
            entity: ChangeEntity::Session(id),
            op,
        }
    }

    pub fn movement(id: MovementId, op: ChangeOp) -> Self {
        Self {
            entity: ChangeEntity::Movement(id),
            op,
        }
    }
}

/// Subscriber contract for store change events.
pub trait ChangeObserver: Send + Sync {
    fn on_change(&self, event: &ChangeEvent);
}

/// Handle returned by [`ChangeFeed::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct FeedState {
    next_id: u64,
    observers: BTreeMap<SubscriptionId, Arc<dyn ChangeObserver>>,
}

/// In-process observer registry owned by each store.
#[derive(Default)]
pub struct ChangeFeed {
    state: RwLock<FeedState>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn ChangeObserver>) -> SubscriptionId {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state.observers.insert(id, observer);
        id
    }

    /// Removes one subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.observers.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        match self.state.read() {
            Ok(state) => state.observers.len(),
            Err(poisoned) => poisoned.into_inner().observers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every current observer.
    pub fn publish(&self, event: ChangeEvent) {
        let observers: Vec<Arc<dyn ChangeObserver>> = match self.state.read() {
            Ok(state) => state.observers.values().cloned().collect(),
            Err(_) => {
                warn!("event=change_publish module=changes status=skipped reason=poisoned");
                return;
            }
        };
        for observer in observers {
            observer.on_change(&event);
        }
    }
}
