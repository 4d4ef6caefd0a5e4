//! Synchronous signal delivery between entities, lists and callers.
//!
//! Listeners are registered explicitly and get a [`ListenerId`] back as their
//! unsubscribe handle. Dispatch happens in the same call that triggers it, in
//! registration order.

use crate::{Attrs, Entity, Error};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// What a listener wants after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep receiving events
    Continue,
    /// Unsubscribe after this event
    Detach,
}

/// Signals emitted by an [`Entity`].
#[derive(Debug, Clone)]
pub enum EntityEvent {
    /// Attributes were replaced or merged; carries the parsed attrs applied
    Update { entity: Entity, attrs: Attrs },
    /// A destroy is starting (or the entity is being deallocated)
    Destroy(Entity),
    /// The entity reached its terminal state
    Destroyed(Entity),
    /// A create request failed for good
    CreatedError { entity: Entity, error: Error },
    /// A destroy request failed; the entity is still live
    DestroyedError { entity: Entity, error: Error },
}

impl EntityEvent {
    /// The entity that emitted this event.
    pub fn entity(&self) -> &Entity {
        match self {
            EntityEvent::Update { entity, .. }
            | EntityEvent::Destroy(entity)
            | EntityEvent::Destroyed(entity)
            | EntityEvent::CreatedError { entity, .. }
            | EntityEvent::DestroyedError { entity, .. } => entity,
        }
    }
}

/// Signals emitted by an [`crate::EntityList`].
#[derive(Debug, Clone)]
pub enum ListEvent {
    Add(Entity),
    Remove(Entity),
    /// Membership was rebuilt from scratch
    Reset,
}

type Listener<E> = Rc<RefCell<dyn FnMut(&E) -> Flow>>;

pub(crate) struct Emitter<E> {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(ListenerId, Listener<E>)>>,
}

impl<E> Emitter<E> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self, listener: impl FnMut(&E) -> Flow + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let listener: Listener<E> = Rc::new(RefCell::new(listener));
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    fn is_subscribed(&self, id: ListenerId) -> bool {
        self.listeners.borrow().iter().any(|(lid, _)| *lid == id)
    }

    pub(crate) fn emit(&self, event: &E) {
        // Listeners may subscribe or unsubscribe while we dispatch.
        let snapshot: Vec<(ListenerId, Listener<E>)> = self
            .listeners
            .borrow()
            .iter()
            .map(|(id, listener)| (*id, Rc::clone(listener)))
            .collect();

        for (id, listener) in snapshot {
            if !self.is_subscribed(id) {
                continue;
            }
            let flow = match listener.try_borrow_mut() {
                Ok(mut listener) => (&mut *listener)(event),
                Err(_) => {
                    tracing::trace!(?id, "listener re-entered during its own dispatch; skipped");
                    continue;
                }
            };
            if flow == Flow::Detach {
                self.unsubscribe(id);
            }
        }
    }

    pub(crate) fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_registration_order() {
        let emitter: Emitter<u32> = Emitter::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let first = Rc::clone(&seen);
        emitter.subscribe(move |n| {
            first.borrow_mut().push(("first", *n));
            Flow::Continue
        });
        let second = Rc::clone(&seen);
        emitter.subscribe(move |n| {
            second.borrow_mut().push(("second", *n));
            Flow::Continue
        });

        emitter.emit(&7);
        assert_eq!(*seen.borrow(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn detach_is_one_shot() {
        let emitter: Emitter<u32> = Emitter::new();
        let count = Rc::new(Cell::new(0));
        let counter = Rc::clone(&count);
        emitter.subscribe(move |_| {
            counter.set(counter.get() + 1);
            Flow::Detach
        });

        emitter.emit(&1);
        emitter.emit(&2);
        assert_eq!(count.get(), 1);
        assert_eq!(emitter.len(), 0);
    }

    #[test]
    fn listener_removed_mid_dispatch_is_skipped() {
        let emitter = Rc::new(Emitter::<u32>::new());
        let called = Rc::new(Cell::new(false));

        let victim = Rc::new(Cell::new(None));
        let handle = Rc::clone(&emitter);
        let target = Rc::clone(&victim);
        emitter.subscribe(move |_| {
            if let Some(id) = target.get() {
                handle.unsubscribe(id);
            }
            Flow::Continue
        });
        let flag = Rc::clone(&called);
        let id = emitter.subscribe(move |_| {
            flag.set(true);
            Flow::Continue
        });
        victim.set(Some(id));

        emitter.emit(&1);
        assert!(!called.get());
    }
}
