//! In-memory element tree with synchronous mutation observation
//!
//! Every mutation of an element made through this API produces a
//! [`MutationRecord`] that is delivered to all observers registered on the
//! owning [`Document`] before the mutating call returns.

use crate::error::DomError;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::trace;

/// Document-unique node identifier, never reused
pub type NodeId = u64;

/// Identifies an observer registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// What changed on the record's target
#[derive(Debug, Clone)]
pub enum MutationKind {
    ChildList {
        added: Vec<Element>,
        removed: Vec<Element>,
    },
    Attributes {
        name: String,
        old_value: Option<String>,
    },
    CharacterData {
        old_value: String,
    },
}

/// A single observed mutation
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub target: Element,
    pub kind: MutationKind,
}

type Observer = Rc<dyn Fn(&MutationRecord)>;

struct DocumentData {
    next_uid: Cell<NodeId>,
    next_observer: Cell<u64>,
    observers: RefCell<Vec<(ObserverId, Observer)>>,
    root: Element,
}

/// Owner of an element tree and its observers
#[derive(Clone)]
pub struct Document(Rc<DocumentData>);

impl Document {
    /// Create a document whose root element has tag `root_tag`
    pub fn new(root_tag: &str) -> Self {
        Self(Rc::new_cyclic(|document| DocumentData {
            next_uid: Cell::new(2),
            next_observer: Cell::new(1),
            observers: RefCell::new(Vec::new()),
            root: Element::detached(1, root_tag, document.clone()),
        }))
    }

    pub fn root(&self) -> Element {
        self.0.root.clone()
    }

    /// Create a detached element owned by this document
    pub fn create_element(&self, tag: &str) -> Element {
        let uid = self.0.next_uid.get();
        self.0.next_uid.set(uid + 1);
        Element::detached(uid, tag, Rc::downgrade(&self.0))
    }

    /// Register an observer for every mutation in this document
    pub fn observe(&self, observer: impl Fn(&MutationRecord) + 'static) -> ObserverId {
        let id = ObserverId(self.0.next_observer.get());
        self.0.next_observer.set(id.0 + 1);
        self.0
            .observers
            .borrow_mut()
            .push((id, Rc::new(observer)));
        id
    }

    pub fn disconnect(&self, id: ObserverId) -> bool {
        let mut observers = self.0.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(observer, _)| *observer != id);
        observers.len() != before
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("root", &self.0.root)
            .field("observers", &self.0.observers.borrow().len())
            .finish()
    }
}

fn notify(document: &Weak<DocumentData>, record: MutationRecord) {
    let Some(document) = document.upgrade() else {
        return;
    };
    trace!(target_uid = record.target.uid(), kind = ?record.kind, "Mutation record");
    // Observers may mutate the tree again
    let observers: Vec<Observer> = document
        .observers
        .borrow()
        .iter()
        .map(|(_, observer)| observer.clone())
        .collect();
    for observer in observers {
        observer(&record);
    }
}

struct ElementData {
    uid: NodeId,
    tag: String,
    attributes: RefCell<Vec<(String, String)>>,
    text: RefCell<String>,
    children: RefCell<Vec<Element>>,
    parent: RefCell<Weak<ElementData>>,
    document: Weak<DocumentData>,
}

/// Shared reference to an element node
#[derive(Clone)]
pub struct Element(Rc<ElementData>);

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Element {}

impl Element {
    fn detached(uid: NodeId, tag: &str, document: Weak<DocumentData>) -> Self {
        Self(Rc::new(ElementData {
            uid,
            tag: tag.to_string(),
            attributes: RefCell::new(Vec::new()),
            text: RefCell::new(String::new()),
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
            document,
        }))
    }

    pub fn uid(&self) -> NodeId {
        self.0.uid
    }

    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.0
            .attributes
            .borrow()
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Attribute names in insertion order
    pub fn attribute_names(&self) -> Vec<String> {
        self.0
            .attributes
            .borrow()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        let old_value = {
            let mut attributes = self.0.attributes.borrow_mut();
            match attributes.iter().position(|(key, _)| key == name) {
                Some(index) => Some(std::mem::replace(
                    &mut attributes[index].1,
                    value.to_string(),
                )),
                None => {
                    attributes.push((name.to_string(), value.to_string()));
                    None
                }
            }
        };
        notify(
            &self.0.document,
            MutationRecord {
                target: self.clone(),
                kind: MutationKind::Attributes {
                    name: name.to_string(),
                    old_value,
                },
            },
        );
    }

    /// Remove an attribute; false if it was not set
    pub fn remove_attribute(&self, name: &str) -> bool {
        let old_value = {
            let mut attributes = self.0.attributes.borrow_mut();
            let Some(index) = attributes.iter().position(|(key, _)| key == name) else {
                return false;
            };
            attributes.remove(index).1
        };
        notify(
            &self.0.document,
            MutationRecord {
                target: self.clone(),
                kind: MutationKind::Attributes {
                    name: name.to_string(),
                    old_value: Some(old_value),
                },
            },
        );
        true
    }

    pub fn text(&self) -> String {
        self.0.text.borrow().clone()
    }

    pub fn set_text(&self, text: &str) {
        let old_value = std::mem::replace(&mut *self.0.text.borrow_mut(), text.to_string());
        notify(
            &self.0.document,
            MutationRecord {
                target: self.clone(),
                kind: MutationKind::CharacterData { old_value },
            },
        );
    }

    pub fn parent(&self) -> Option<Element> {
        self.0.parent.borrow().upgrade().map(Element)
    }

    pub fn children(&self) -> Vec<Element> {
        self.0.children.borrow().clone()
    }

    pub fn children_with_tag(&self, tag: &str) -> Vec<Element> {
        self.0
            .children
            .borrow()
            .iter()
            .filter(|child| child.tag() == tag)
            .cloned()
            .collect()
    }

    /// Whether `other` is this element or one of its descendants
    pub fn contains(&self, other: &Element) -> bool {
        let mut cursor = Some(other.clone());
        while let Some(node) = cursor {
            if node == *self {
                return true;
            }
            cursor = node.parent();
        }
        false
    }

    /// Append `child`, detaching it from its current parent first
    pub fn append_child(&self, child: &Element) -> Result<(), DomError> {
        if child.contains(self) {
            return Err(DomError::HierarchyRequest {
                parent: self.tag().to_string(),
                child: child.tag().to_string(),
            });
        }
        if let Some(old_parent) = child.parent() {
            old_parent.remove_child(child)?;
        }

        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child.clone());
        notify(
            &self.0.document,
            MutationRecord {
                target: self.clone(),
                kind: MutationKind::ChildList {
                    added: vec![child.clone()],
                    removed: Vec::new(),
                },
            },
        );
        Ok(())
    }

    pub fn remove_child(&self, child: &Element) -> Result<(), DomError> {
        let removed = {
            let mut children = self.0.children.borrow_mut();
            match children.iter().position(|c| c == child) {
                Some(index) => children.remove(index),
                None => {
                    return Err(DomError::NotAChild {
                        parent: self.tag().to_string(),
                        child: child.tag().to_string(),
                    })
                }
            }
        };
        *removed.0.parent.borrow_mut() = Weak::new();
        notify(
            &self.0.document,
            MutationRecord {
                target: self.clone(),
                kind: MutationKind::ChildList {
                    added: Vec::new(),
                    removed: vec![removed],
                },
            },
        );
        Ok(())
    }

    /// Detach this element from its parent, if any
    pub fn remove(&self) -> Result<(), DomError> {
        match self.parent() {
            Some(parent) => parent.remove_child(self),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} #{}>", self.tag(), self.uid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(document: &Document) -> Rc<RefCell<Vec<MutationRecord>>> {
        let records = Rc::new(RefCell::new(Vec::new()));
        let sink = records.clone();
        document.observe(move |record| sink.borrow_mut().push(record.clone()));
        records
    }

    #[test]
    fn test_attribute_records_carry_old_value() {
        let document = Document::new("scene");
        let records = recording(&document);
        let group = document.create_element("group");

        group.set_attribute("name", "a");
        group.set_attribute("name", "b");
        assert_eq!(group.attribute("name").as_deref(), Some("b"));

        let records = records.borrow();
        assert_eq!(records.len(), 2);
        match &records[1].kind {
            MutationKind::Attributes { name, old_value } => {
                assert_eq!(name, "name");
                assert_eq!(old_value.as_deref(), Some("a"));
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_text_records() {
        let document = Document::new("scene");
        let records = recording(&document);
        let value = document.create_element("float");

        value.set_text("1.5");
        assert_eq!(value.text(), "1.5");
        assert!(matches!(
            &records.borrow()[0].kind,
            MutationKind::CharacterData { old_value } if old_value.is_empty()
        ));
    }

    #[test]
    fn test_append_moves_between_parents() {
        let document = Document::new("scene");
        let root = document.root();
        let a = document.create_element("group");
        let b = document.create_element("group");
        root.append_child(&a).unwrap();
        root.append_child(&b).unwrap();

        let records = recording(&document);
        a.append_child(&b).unwrap();

        assert_eq!(root.children(), vec![a.clone()]);
        assert_eq!(b.parent(), Some(a.clone()));
        // Removal from the old parent, then insertion into the new one
        assert_eq!(records.borrow().len(), 2);
        assert!(root.contains(&b));
    }

    #[test]
    fn test_hierarchy_errors() {
        let document = Document::new("scene");
        let a = document.create_element("group");
        let b = document.create_element("group");
        a.append_child(&b).unwrap();

        assert!(matches!(
            b.append_child(&a),
            Err(DomError::HierarchyRequest { .. })
        ));
        assert!(matches!(
            b.remove_child(&a),
            Err(DomError::NotAChild { .. })
        ));
        assert!(matches!(
            a.append_child(&a),
            Err(DomError::HierarchyRequest { .. })
        ));
    }

    #[test]
    fn test_observer_disconnect() {
        let document = Document::new("scene");
        let records = Rc::new(Cell::new(0));
        let counter = records.clone();
        let id = document.observe(move |_| counter.set(counter.get() + 1));

        document.root().set_attribute("x", "1");
        assert!(document.disconnect(id));
        assert!(!document.disconnect(id));
        document.root().set_attribute("x", "2");
        assert_eq!(records.get(), 1);
    }

    #[test]
    fn test_remove_attribute() {
        let document = Document::new("scene");
        let group = document.create_element("group");
        group.set_attribute("visible", "false");
        assert!(group.remove_attribute("visible"));
        assert!(!group.remove_attribute("visible"));
        assert!(!group.has_attribute("visible"));
    }
}
