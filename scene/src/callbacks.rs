//! Callback registry for domain events
//!
//! Every wrapper object owns one registry that maps an event kind to the
//! ordered list of handlers subscribed to it. Handlers fire synchronously in
//! registration order.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;
use tracing::trace;

/// Identifies a single registration inside a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

/// Type alias for a registered event handler
pub type Callback<E> = Rc<dyn Fn(&E)>;

/// Per-object map from event kind to ordered handler list
pub struct CallbackRegistry<K, E> {
    lists: RefCell<HashMap<K, Vec<(CallbackId, Callback<E>)>>>,
    next_id: Cell<u64>,
}

impl<K, E> Default for CallbackRegistry<K, E>
where
    K: Copy + Eq + Hash + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E> CallbackRegistry<K, E>
where
    K: Copy + Eq + Hash + fmt::Debug,
{
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            lists: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
        }
    }

    /// Append a handler to the list for `kind`
    pub fn register_callback(&self, kind: K, handler: impl Fn(&E) + 'static) -> CallbackId {
        let id = CallbackId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        self.lists
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push((id, Rc::new(handler)));

        trace!(kind = ?kind, callback = id.0, "Registered callback");
        id
    }

    /// Append a handler that receives `context` as its receiver
    pub fn register_with_context<C: 'static>(
        &self,
        kind: K,
        context: Rc<C>,
        handler: impl Fn(&C, &E) + 'static,
    ) -> CallbackId {
        self.register_callback(kind, move |event| handler(&context, event))
    }

    /// Whether at least one handler is registered for `kind`
    pub fn is_registered(&self, kind: K) -> bool {
        self.lists
            .borrow()
            .get(&kind)
            .is_some_and(|list| !list.is_empty())
    }

    /// Number of handlers registered for `kind`
    pub fn callback_count(&self, kind: K) -> usize {
        self.lists.borrow().get(&kind).map_or(0, Vec::len)
    }

    /// Remove one registration; other handlers for the same kind are untouched
    ///
    /// Returns false if the registration does not exist (anymore).
    pub fn unregister_callback(&self, kind: K, id: CallbackId) -> bool {
        let mut lists = self.lists.borrow_mut();
        let Some(list) = lists.get_mut(&kind) else {
            return false;
        };

        let before = list.len();
        list.retain(|(registered, _)| *registered != id);
        let removed = list.len() != before;

        if list.is_empty() {
            lists.remove(&kind);
        }

        if removed {
            trace!(kind = ?kind, callback = id.0, "Unregistered callback");
        }
        removed
    }

    /// Drop every handler and every kind mapping
    pub fn unregister_all(&self) {
        self.lists.borrow_mut().clear();
    }

    /// Invoke every handler registered for `kind` with `event`
    ///
    /// The handler list is snapshotted first, so handlers may subscribe or
    /// unsubscribe on this registry while the fan-out is in progress.
    pub fn callback(&self, kind: K, event: &E) {
        let snapshot: Vec<Callback<E>> = match self.lists.borrow().get(&kind) {
            Some(list) => list.iter().map(|(_, handler)| Rc::clone(handler)).collect(),
            None => return,
        };

        trace!(kind = ?kind, handlers = snapshot.len(), "Dispatching callbacks");
        for handler in snapshot {
            handler(event);
        }
    }
}

impl<K: fmt::Debug, E> fmt::Debug for CallbackRegistry<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lists = self.lists.borrow();
        f.debug_struct("CallbackRegistry")
            .field(
                "kinds",
                &lists
                    .iter()
                    .map(|(kind, list)| (kind, list.len()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        A,
        B,
    }

    #[test]
    fn test_registration_order_is_invocation_order() {
        let registry = CallbackRegistry::<Kind, u32>::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = Rc::clone(&log);
            registry.register_callback(Kind::A, move |value| {
                log.borrow_mut().push(format!("{tag}:{value}"));
            });
        }

        registry.callback(Kind::A, &7);
        assert_eq!(*log.borrow(), vec!["first:7", "second:7", "third:7"]);
    }

    #[test]
    fn test_unknown_kind_is_noop() {
        let registry = CallbackRegistry::<Kind, u32>::new();
        assert!(!registry.is_registered(Kind::B));
        registry.callback(Kind::B, &1);
    }

    #[test]
    fn test_unregister_one_keeps_others() {
        let registry = CallbackRegistry::<Kind, u32>::new();
        let hits = Rc::new(Cell::new(0));

        let first = {
            let hits = Rc::clone(&hits);
            registry.register_callback(Kind::A, move |_| hits.set(hits.get() + 1))
        };
        {
            let hits = Rc::clone(&hits);
            registry.register_callback(Kind::A, move |_| hits.set(hits.get() + 10));
        }

        assert!(registry.unregister_callback(Kind::A, first));
        assert!(!registry.unregister_callback(Kind::A, first));
        assert_eq!(registry.callback_count(Kind::A), 1);

        registry.callback(Kind::A, &0);
        assert_eq!(hits.get(), 10);
    }

    #[test]
    fn test_unregister_all_twice() {
        let registry = CallbackRegistry::<Kind, u32>::new();
        registry.register_callback(Kind::A, |_| {});
        registry.register_callback(Kind::B, |_| {});

        registry.unregister_all();
        registry.unregister_all();

        assert!(!registry.is_registered(Kind::A));
        assert!(!registry.is_registered(Kind::B));
    }

    #[test]
    fn test_handler_may_mutate_registry_during_fanout() {
        let registry = Rc::new(CallbackRegistry::<Kind, u32>::new());
        let hits = Rc::new(Cell::new(0));

        {
            let inner = Rc::clone(&registry);
            let hits = Rc::clone(&hits);
            registry.register_callback(Kind::A, move |_| {
                let hits = Rc::clone(&hits);
                inner.register_callback(Kind::A, move |_| hits.set(hits.get() + 1));
            });
        }

        // Newly added handler is not part of the running fan-out
        registry.callback(Kind::A, &0);
        assert_eq!(hits.get(), 0);
        assert_eq!(registry.callback_count(Kind::A), 2);

        // Clearing from inside a handler does not disturb the snapshot
        let clearing = Rc::clone(&registry);
        registry.register_callback(Kind::B, move |_| clearing.unregister_all());
        registry.callback(Kind::B, &0);
        assert!(!registry.is_registered(Kind::A));
    }

    #[test]
    fn test_register_with_context() {
        let registry = CallbackRegistry::<Kind, u32>::new();
        let context = Rc::new(RefCell::new(Vec::new()));

        registry.register_with_context(Kind::A, Rc::clone(&context), |ctx, value| {
            ctx.borrow_mut().push(*value);
        });

        registry.callback(Kind::A, &3);
        registry.callback(Kind::A, &4);
        assert_eq!(*context.borrow(), vec![3, 4]);
    }
}
