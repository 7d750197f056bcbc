//! Change listeners for the replicated text store.
//!
//! Dispatch is synchronous. Handlers are cloned out of the registry before
//! being called, so a handler may register or deregister listeners while a
//! notification is in flight.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::types::ChangeEvent;

/// Handle returned by `ObserverSet::add`, used to deregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Handler = Rc<dyn Fn(&ChangeEvent)>;

#[derive(Default)]
struct Slots {
    next_id: u64,
    handlers: Vec<(ObserverId, Handler)>,
}

/// Registry of change handlers.
#[derive(Clone, Default)]
pub struct ObserverSet {
    slots: Rc<RefCell<Slots>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handler: impl Fn(&ChangeEvent) + 'static) -> ObserverId {
        let mut slots = self.slots.borrow_mut();
        let id = ObserverId(slots.next_id);
        slots.next_id += 1;
        slots.handlers.push((id, Rc::new(handler)));
        id
    }

    /// Returns true if the handler was registered.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut slots = self.slots.borrow_mut();
        let before = slots.handlers.len();
        slots.handlers.retain(|(other, _)| *other != id);
        slots.handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every registered handler once with `event`.
    pub fn notify(&self, event: &ChangeEvent) {
        let handlers: Vec<Handler> = self
            .slots
            .borrow()
            .handlers
            .iter()
            .map(|(_, h)| Rc::clone(h))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    /// Register `handler` for as long as the returned guard lives.
    ///
    /// Dropping the guard first clears a liveness flag, so a notification
    /// that was already being dispatched when the guard dropped is
    /// suppressed instead of reaching a torn-down listener.
    pub fn subscribe(&self, handler: impl Fn(&ChangeEvent) + 'static) -> Subscription {
        let alive = Rc::new(Cell::new(true));
        let flag = Rc::clone(&alive);
        let id = self.add(move |event| {
            if flag.get() {
                handler(event);
            } else {
                tracing::trace!(origin = %event.origin, "suppressed stale notification");
            }
        });
        Subscription {
            id,
            slots: Rc::downgrade(&self.slots),
            alive,
        }
    }
}

/// Scoped registration: the listener is removed when this is dropped.
#[must_use = "dropping a Subscription immediately detaches its listener"]
pub struct Subscription {
    id: ObserverId,
    slots: Weak<RefCell<Slots>>,
    alive: Rc<Cell<bool>>,
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.alive.set(false);
        let Some(slots) = self.slots.upgrade() else {
            return;
        };
        match slots.try_borrow_mut() {
            Ok(mut slots) => slots.handlers.retain(|(other, _)| *other != self.id),
            // The flag already silences it; it can be swept later.
            Err(_) => tracing::debug!(id = ?self.id, "observer registry busy during detach"),
        };
    }
}
