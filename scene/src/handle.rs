//! Handle liveness and backend identity tables

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Nullable pointer to a backend object
///
/// A handle is expired once its pointer has been cleared. Expiry is one-way:
/// there is no operation that sets the pointer again.
pub struct Handle<P> {
    ptr: RefCell<Option<P>>,
}

impl<P: Clone> Handle<P> {
    /// Create a live handle pointing at `ptr`
    pub fn new(ptr: P) -> Self {
        Self {
            ptr: RefCell::new(Some(ptr)),
        }
    }

    /// Create a handle that is expired from the start
    pub fn dangling() -> Self {
        Self {
            ptr: RefCell::new(None),
        }
    }

    /// Whether the backend object behind this handle is gone
    pub fn expired(&self) -> bool {
        self.ptr.borrow().is_none()
    }

    /// The backend pointer, or `None` once expired
    pub fn get(&self) -> Option<P> {
        self.ptr.borrow().clone()
    }

    /// Clear the backend pointer
    pub fn expire(&self) {
        self.ptr.borrow_mut().take();
    }
}

impl<P: fmt::Debug> fmt::Debug for Handle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.ptr.borrow() {
            Some(ptr) => f.debug_tuple("Handle").field(ptr).finish(),
            None => f.write_str("Handle(<expired>)"),
        }
    }
}

/// Identity table assigning stable integer ids to backend nodes
///
/// Ids are assigned on first observation and memoized against the node key,
/// so wrapping the same node again yields the same id. The table indexes
/// nodes by key only and never keeps a node alive.
#[derive(Debug)]
pub struct IdentityTable<N> {
    ids: HashMap<N, u32>,
    nodes: HashMap<u32, N>,
    next_id: u32,
}

impl<N: Copy + Eq + Hash> IdentityTable<N> {
    /// Create a table whose first assigned id is `first_id`
    pub fn new(first_id: u32) -> Self {
        Self {
            ids: HashMap::new(),
            nodes: HashMap::new(),
            next_id: first_id,
        }
    }

    /// Return the id for `node`, assigning a fresh one on first observation
    pub fn id_for(&mut self, node: N) -> u32 {
        if let Some(id) = self.ids.get(&node) {
            return *id;
        }
        while self.nodes.contains_key(&self.next_id) {
            self.next_id = self.next_id.wrapping_add(1);
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.ids.insert(node, id);
        self.nodes.insert(id, node);
        id
    }

    /// Bind `node` to an id chosen by the caller
    ///
    /// Returns false if either the node or the id is already bound.
    pub fn bind(&mut self, node: N, id: u32) -> bool {
        if self.ids.contains_key(&node) || self.nodes.contains_key(&id) {
            return false;
        }
        self.ids.insert(node, id);
        self.nodes.insert(id, node);
        true
    }

    /// Look up an already assigned id without assigning
    pub fn get_id(&self, node: N) -> Option<u32> {
        self.ids.get(&node).copied()
    }

    /// Look up the node an id was assigned to
    pub fn node(&self, id: u32) -> Option<N> {
        self.nodes.get(&id).copied()
    }

    /// Forget a node; returns its id if it had one
    pub fn release(&mut self, node: N) -> Option<u32> {
        let id = self.ids.remove(&node)?;
        self.nodes.remove(&id);
        Some(id)
    }

    /// Whether `id` is already taken
    pub fn contains_id(&self, id: u32) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of tracked nodes
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the table tracks no node
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_expiry_is_one_way() {
        let handle = Handle::new(42u64);
        assert!(!handle.expired());
        assert_eq!(handle.get(), Some(42));

        handle.expire();
        assert!(handle.expired());
        assert_eq!(handle.get(), None);

        handle.expire();
        assert!(handle.expired());
    }

    #[test]
    fn test_dangling_handle() {
        let handle = Handle::<u32>::dangling();
        assert!(handle.expired());
        assert_eq!(format!("{handle:?}"), "Handle(<expired>)");
    }

    #[test]
    fn test_identity_table_memoizes() {
        let mut table = IdentityTable::new(1);
        let a = table.id_for("a");
        let b = table.id_for("b");

        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(table.id_for("a"), a);
        assert_eq!(table.node(b), Some("b"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_identity_table_release() {
        let mut table = IdentityTable::new(100);
        let id = table.id_for(7u64);

        assert_eq!(table.release(7), Some(id));
        assert_eq!(table.get_id(7), None);
        assert!(!table.contains_id(id));
        assert!(table.is_empty());

        // A re-observed node gets a new id
        assert_ne!(table.id_for(7), id);
    }

    #[test]
    fn test_identity_table_bind() {
        let mut table = IdentityTable::new(1);
        assert!(table.bind(10u64, 0x8000_0000));
        assert!(!table.bind(11, 0x8000_0000));
        assert!(!table.bind(10, 5));
        assert_eq!(table.id_for(10), 0x8000_0000);
    }
}
