//! Read-only access to the externally-owned accessible tree.
//!
//! The engine reads the tree exclusively through [`AccessibleTree`]. Objects can
//! be destroyed at any moment by the application that owns them, so every
//! accessor is fallible and `AccessError::Stale` is an ordinary answer.
//!
//! [`MemoryTree`] is an in-memory implementation built from a serialized
//! [`TreeSnapshot`]; the replay binary and the tests drive the engine with it.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::roles::Role;
use crate::types::{AppId, AppIdentity, ObjectId, State, StateSet};

/// Errors returned by tree accessors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The object was destroyed or its handle is no longer valid
    #[error("Object {0} is no longer alive")]
    Stale(ObjectId),

    /// The object does not implement the requested interface
    #[error("Object {0} does not support {1}")]
    NotSupported(ObjectId, &'static str),
}

/// Numeric value of a range widget (slider, spin button, progress bar).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericValue {
    pub current: f64,
    #[serde(default)]
    pub minimum: f64,
    #[serde(default = "default_maximum")]
    pub maximum: f64,
}

fn default_maximum() -> f64 {
    100.0
}

impl NumericValue {
    /// Position of `current` within the range, as a percentage.
    ///
    /// Returns `None` for an empty or inverted range.
    ///
    /// # Examples
    ///
    /// ```
    /// use output_engine::NumericValue;
    ///
    /// let v = NumericValue { current: 25.0, minimum: 0.0, maximum: 50.0 };
    /// assert_eq!(v.percentage(), Some(50.0));
    /// ```
    pub fn percentage(&self) -> Option<f64> {
        let span = self.maximum - self.minimum;
        if span <= 0.0 {
            return None;
        }
        Some(((self.current - self.minimum) / span * 100.0).round())
    }
}

/// Read-only view of the accessible tree.
pub trait AccessibleTree {
    /// Returns `true` while the handle refers to a live object.
    fn is_alive(&self, id: ObjectId) -> bool;

    fn role(&self, id: ObjectId) -> Result<Role, AccessError>;

    fn name(&self, id: ObjectId) -> Result<String, AccessError>;

    fn description(&self, id: ObjectId) -> Result<String, AccessError>;

    fn states(&self, id: ObjectId) -> Result<StateSet, AccessError>;

    /// Text content, for objects implementing the text interface.
    fn text(&self, id: ObjectId) -> Result<Option<String>, AccessError>;

    /// Numeric value, for objects implementing the value interface.
    fn value(&self, id: ObjectId) -> Result<Option<NumericValue>, AccessError>;

    /// A free-form object attribute (`level`, `placeholder-text`, ...).
    fn attribute(&self, id: ObjectId, key: &str) -> Result<Option<String>, AccessError>;

    /// Objects that label this one.
    fn labelled_by(&self, id: ObjectId) -> Result<Vec<ObjectId>, AccessError>;

    fn parent(&self, id: ObjectId) -> Result<Option<ObjectId>, AccessError>;

    fn children(&self, id: ObjectId) -> Result<Vec<ObjectId>, AccessError>;

    /// The application that owns the object.
    fn application(&self, id: ObjectId) -> Result<AppIdentity, AccessError>;

    /// Whether the object is the desktop root.
    fn is_desktop(&self, id: ObjectId) -> bool;

    /// Applications currently connected to the bus.
    fn running_applications(&self) -> Vec<AppId>;
}

/// One object in a [`TreeSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: ObjectId,
    pub role: Role,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub states: StateSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<NumericValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labelled_by: Vec<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ObjectId>,
    /// Owning application; inherited from the parent when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AppId>,
}

impl Node {
    pub fn new(id: u64, role: Role) -> Self {
        Self {
            id: ObjectId(id),
            role,
            name: String::new(),
            description: String::new(),
            states: StateSet::new(),
            text: None,
            value: None,
            attributes: BTreeMap::new(),
            labelled_by: Vec::new(),
            parent: None,
            app: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_states(mut self, states: impl IntoIterator<Item = State>) -> Self {
        for state in states {
            self.states.insert(state);
        }
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_value(mut self, current: f64, minimum: f64, maximum: f64) -> Self {
        self.value = Some(NumericValue {
            current,
            minimum,
            maximum,
        });
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn labelled_by(mut self, label: u64) -> Self {
        self.labelled_by.push(ObjectId(label));
        self
    }

    pub fn child_of(mut self, parent: u64) -> Self {
        self.parent = Some(ObjectId(parent));
        self
    }

    pub fn in_app(mut self, app: u64) -> Self {
        self.app = Some(AppId(app));
        self
    }
}

/// Serializable description of a whole tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    /// The desktop root, if the snapshot has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desktop: Option<ObjectId>,
    #[serde(default)]
    pub applications: Vec<AppIdentity>,
    /// Objects; children are ordered as their nodes appear here
    #[serde(default)]
    pub nodes: Vec<Node>,
}

/// In-memory accessible tree.
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    nodes: HashMap<ObjectId, Node>,
    children: HashMap<ObjectId, Vec<ObjectId>>,
    applications: BTreeMap<AppId, AppIdentity>,
    desktop: Option<ObjectId>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree from a snapshot.
    pub fn from_snapshot(snapshot: TreeSnapshot) -> Self {
        let mut tree = MemoryTree {
            desktop: snapshot.desktop,
            ..Self::default()
        };
        for app in snapshot.applications {
            tree.add_application(app);
        }
        for node in snapshot.nodes {
            tree.insert(node);
        }
        tree
    }

    pub fn set_desktop(&mut self, id: u64) {
        self.desktop = Some(ObjectId(id));
    }

    pub fn add_application(&mut self, app: AppIdentity) {
        self.applications.insert(app.id, app);
    }

    /// Adds an object as the last child of its parent.
    ///
    /// Inserting an id that already exists replaces the object in place. It
    /// keeps its position among its siblings unless the parent changed.
    pub fn insert(&mut self, node: Node) {
        let previous = self.nodes.get(&node.id).map(|old| old.parent);
        let reparented = match previous {
            Some(old_parent) if old_parent == node.parent => false,
            Some(old_parent) => {
                if let Some(siblings) = old_parent.and_then(|p| self.children.get_mut(&p)) {
                    siblings.retain(|c| *c != node.id);
                }
                true
            }
            None => true,
        };
        if reparented {
            if let Some(parent) = node.parent {
                self.children.entry(parent).or_default().push(node.id);
            }
        }
        self.nodes.insert(node.id, node);
    }

    /// Destroys an object and its whole subtree.
    pub fn remove(&mut self, id: ObjectId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        if let Some(siblings) = node.parent.and_then(|p| self.children.get_mut(&p)) {
            siblings.retain(|c| *c != id);
        }
        for child in self.children.remove(&id).unwrap_or_default() {
            self.remove(child);
        }
    }

    /// Removes an application from the running set along with its objects.
    pub fn remove_application(&mut self, app: AppId) {
        self.applications.remove(&app);
        let owned: Vec<ObjectId> = self
            .nodes
            .keys()
            .copied()
            .filter(|id| matches!(self.owning_app(*id), Some(a) if a == app))
            .collect();
        for id in owned {
            self.remove(id);
        }
    }

    /// Sets or clears a state flag. Returns `false` for a dead object.
    pub fn set_state(&mut self, id: ObjectId, state: State, on: bool) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                if on {
                    node.states.insert(state);
                } else {
                    node.states.remove(state);
                }
                true
            }
            None => false,
        }
    }

    /// Renames an object. Returns `false` for a dead object.
    pub fn set_name(&mut self, id: ObjectId, name: impl Into<String>) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.name = name.into();
                true
            }
            None => false,
        }
    }

    /// Updates the current numeric value. Returns `false` for a dead object.
    pub fn set_value(&mut self, id: ObjectId, current: f64) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                match node.value.as_mut() {
                    Some(value) => value.current = current,
                    None => {
                        node.value = Some(NumericValue {
                            current,
                            minimum: 0.0,
                            maximum: default_maximum(),
                        })
                    }
                }
                true
            }
            None => false,
        }
    }

    fn node(&self, id: ObjectId) -> Result<&Node, AccessError> {
        self.nodes.get(&id).ok_or(AccessError::Stale(id))
    }

    fn owning_app(&self, id: ObjectId) -> Option<AppId> {
        let mut visited = HashSet::new();
        let mut current = self.nodes.get(&id);
        while let Some(node) = current {
            if node.app.is_some() {
                return node.app;
            }
            if !visited.insert(node.id) {
                log::warn!("[TREE] Parent cycle through {:?}", node.id);
                return None;
            }
            current = node.parent.and_then(|p| self.nodes.get(&p));
        }
        None
    }
}

impl AccessibleTree for MemoryTree {
    fn is_alive(&self, id: ObjectId) -> bool {
        self.nodes.contains_key(&id)
    }

    fn role(&self, id: ObjectId) -> Result<Role, AccessError> {
        Ok(self.node(id)?.role.clone())
    }

    fn name(&self, id: ObjectId) -> Result<String, AccessError> {
        Ok(self.node(id)?.name.clone())
    }

    fn description(&self, id: ObjectId) -> Result<String, AccessError> {
        Ok(self.node(id)?.description.clone())
    }

    fn states(&self, id: ObjectId) -> Result<StateSet, AccessError> {
        Ok(self.node(id)?.states.clone())
    }

    fn text(&self, id: ObjectId) -> Result<Option<String>, AccessError> {
        Ok(self.node(id)?.text.clone())
    }

    fn value(&self, id: ObjectId) -> Result<Option<NumericValue>, AccessError> {
        Ok(self.node(id)?.value)
    }

    fn attribute(&self, id: ObjectId, key: &str) -> Result<Option<String>, AccessError> {
        Ok(self.node(id)?.attributes.get(key).cloned())
    }

    fn labelled_by(&self, id: ObjectId) -> Result<Vec<ObjectId>, AccessError> {
        Ok(self.node(id)?.labelled_by.clone())
    }

    fn parent(&self, id: ObjectId) -> Result<Option<ObjectId>, AccessError> {
        match self.node(id)?.parent {
            Some(parent) if parent == id => {
                log::warn!("[TREE] {:?} claims to be its own parent", id);
                Ok(None)
            }
            parent => Ok(parent),
        }
    }

    fn children(&self, id: ObjectId) -> Result<Vec<ObjectId>, AccessError> {
        self.node(id)?;
        Ok(self.children.get(&id).cloned().unwrap_or_default())
    }

    fn application(&self, id: ObjectId) -> Result<AppIdentity, AccessError> {
        self.node(id)?;
        self.owning_app(id)
            .and_then(|app| self.applications.get(&app).cloned())
            .ok_or(AccessError::NotSupported(id, "application"))
    }

    fn is_desktop(&self, id: ObjectId) -> bool {
        self.desktop == Some(id)
    }

    fn running_applications(&self) -> Vec<AppId> {
        self.applications.keys().copied().collect()
    }
}
