//! Listener groups consulted by the translators.
//!
//! The registry is populated by the application (or an event bus sitting on
//! top of it) and only read by the backends. Slots use interior mutability so
//! a listener may subscribe further listeners while an event is in flight.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::event::{Event, EventKind, WindowId};

pub trait Listener {
    fn invoke(&self, window: WindowId, event: &Event);
}

impl<F> Listener for F
where
    F: Fn(WindowId, &Event),
{
    fn invoke(&self, window: WindowId, event: &Event) {
        self(window, event)
    }
}

pub type ListenerHandle = Rc<dyn Listener>;

#[derive(Default)]
pub struct EventDispatchRegistry {
    slots: [RefCell<Vec<ListenerHandle>>; EventKind::COUNT],
}

impl EventDispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: EventKind, listener: ListenerHandle) {
        self.slots[kind.index()].borrow_mut().push(listener);
    }

    /// Registers the same listener for every event kind.
    pub fn subscribe_all(&self, listener: ListenerHandle) {
        for kind in EventKind::ALL {
            self.subscribe(kind, Rc::clone(&listener));
        }
    }

    pub fn unsubscribe(&self, kind: EventKind, listener: &ListenerHandle) -> bool {
        let mut slot = self.slots[kind.index()].borrow_mut();
        let before = slot.len();
        slot.retain(|entry| !std::ptr::addr_eq(Rc::as_ptr(entry), Rc::as_ptr(listener)));
        slot.len() != before
    }

    /// Snapshot of the listeners for `kind`, in registration order.
    pub fn listeners(&self, kind: EventKind) -> Vec<ListenerHandle> {
        self.slots[kind.index()].borrow().clone()
    }

    pub fn is_empty(&self, kind: EventKind) -> bool {
        self.slots[kind.index()].borrow().is_empty()
    }

    pub fn dispatch(&self, window: WindowId, event: Event) {
        let listeners = self.listeners(event.kind());
        trace!(?window, ?event, listeners = listeners.len(), "dispatch");
        for listener in listeners {
            listener.invoke(window, &event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_dispatch_preserves_registration_order() {
        let registry = EventDispatchRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in 0..3 {
            let log = Rc::clone(&log);
            registry.subscribe(
                EventKind::Focus,
                Rc::new(move |_: WindowId, _: &Event| log.borrow_mut().push(tag)),
            );
        }
        registry.dispatch(WindowId(1), Event::Focus { focused: true });
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_slot_is_a_no_op() {
        let registry = EventDispatchRegistry::new();
        assert!(registry.is_empty(EventKind::Scroll));
        registry.dispatch(WindowId(7), Event::Scroll { h: 0.0, v: 1.0 });
    }

    #[test]
    fn test_unsubscribe_removes_only_that_listener() {
        let registry = EventDispatchRegistry::new();
        let hits = Rc::new(RefCell::new(0));
        let counting: ListenerHandle = {
            let hits = Rc::clone(&hits);
            Rc::new(move |_: WindowId, _: &Event| *hits.borrow_mut() += 1)
        };
        let other: ListenerHandle = Rc::new(|_: WindowId, _: &Event| {});
        registry.subscribe(EventKind::Resize, Rc::clone(&counting));
        registry.subscribe(EventKind::Resize, Rc::clone(&other));
        assert!(registry.unsubscribe(EventKind::Resize, &counting));
        assert!(!registry.unsubscribe(EventKind::Resize, &counting));
        registry.dispatch(WindowId(1), Event::Resize { size: Default::default() });
        assert_eq!(*hits.borrow(), 0);
        assert_eq!(registry.listeners(EventKind::Resize).len(), 1);
    }

    #[test]
    fn test_listener_may_subscribe_during_dispatch() {
        let registry = Rc::new(EventDispatchRegistry::new());
        let inner = Rc::clone(&registry);
        registry.subscribe(
            EventKind::Move,
            Rc::new(move |_: WindowId, _: &Event| {
                inner.subscribe(EventKind::Move, Rc::new(|_: WindowId, _: &Event| {}));
            }),
        );
        registry.dispatch(WindowId(1), Event::Move { pos: Default::default() });
        assert_eq!(registry.listeners(EventKind::Move).len(), 2);
    }
}
