//! Attribute resolution.
//!
//! An attribute is a named semantic fact about one object: its label, its
//! spoken role, whether it is checked, where it sits among its siblings. Each
//! name maps to a function that reads the tree through an [`AttributeScope`].
//!
//! Resolution never fails. A stale object, a missing interface, or an unknown
//! name all resolve to `Value::NotApplicable` so that a template keeps going
//! with whatever parts it can still produce.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::accessible::{AccessError, AccessibleTree};
use crate::cache::ObjectCache;
use crate::formatting::{self, Indicator};
use crate::roles::Role;
use crate::types::{format_number, Channel, ObjectId, RelatedText, State, StateSet, Value, Voice};

/// Function computing one attribute.
pub type AttributeFn = Arc<dyn Fn(&AttributeScope<'_>) -> Result<Value, AccessError> + Send + Sync>;

/// What an attribute function can see: one object of the tree, on one channel.
pub struct AttributeScope<'a> {
    pub tree: &'a dyn AccessibleTree,
    pub object: ObjectId,
    pub channel: Channel,
}

impl<'a> AttributeScope<'a> {
    pub fn new(tree: &'a dyn AccessibleTree, object: ObjectId, channel: Channel) -> Self {
        Self {
            tree,
            object,
            channel,
        }
    }

    /// The same view moved to another object.
    pub fn at(&self, object: ObjectId) -> AttributeScope<'a> {
        AttributeScope {
            tree: self.tree,
            object,
            channel: self.channel,
        }
    }

    fn role(&self) -> Result<Role, AccessError> {
        self.tree.role(self.object)
    }

    fn states(&self) -> Result<StateSet, AccessError> {
        self.tree.states(self.object)
    }

    fn has_state(&self, state: State) -> Result<bool, AccessError> {
        Ok(self.states()?.contains(state))
    }

    fn indicator(&self, which: Indicator) -> Value {
        Value::Text(formatting::indicator(self.channel, which).to_string())
    }

    fn indicator_if(&self, on: bool, which: Indicator) -> Value {
        if on {
            self.indicator(which)
        } else {
            Value::NotApplicable
        }
    }
}

struct AttributeDef {
    compute: AttributeFn,
    voice: Voice,
}

/// Name table of attribute functions plus user preferences.
pub struct AttributeResolver {
    functions: HashMap<String, AttributeDef>,
    preferences: HashMap<String, Value>,
}

impl Default for AttributeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeResolver {
    /// Creates a resolver with every built-in attribute registered.
    pub fn new() -> Self {
        let mut resolver = Self::empty();
        for (name, compute, voice) in BUILTINS {
            resolver.register(name, *compute, *voice);
        }
        resolver
    }

    /// Creates a resolver with no attributes at all.
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
            preferences: HashMap::new(),
        }
    }

    /// Registers (or replaces) an attribute function.
    pub fn register<F>(&mut self, name: &str, compute: F, voice: Voice)
    where
        F: Fn(&AttributeScope<'_>) -> Result<Value, AccessError> + Send + Sync + 'static,
    {
        self.functions.insert(
            name.to_string(),
            AttributeDef {
                compute: Arc::new(compute),
                voice,
            },
        );
    }

    /// Exposes a user preference to templates under `name`.
    pub fn set_preference(&mut self, name: &str, value: Value) {
        self.preferences.insert(name.to_string(), value);
    }

    /// Whether templates may refer to `name`.
    pub fn is_known(&self, name: &str) -> bool {
        self.functions.contains_key(name) || self.preferences.contains_key(name)
    }

    /// Voice hint for fragments of the attribute.
    pub fn voice(&self, name: &str) -> Voice {
        self.functions
            .get(name)
            .map(|def| def.voice)
            .unwrap_or_default()
    }

    /// Resolves `name` for the scope's object, memoized in `cache`.
    pub fn resolve(&self, scope: &AttributeScope<'_>, name: &str, cache: &mut ObjectCache) -> Value {
        if let Some(def) = self.functions.get(name) {
            return cache.get_or_compute(scope.object, name, || match (def.compute)(scope) {
                Ok(value) => value,
                Err(err) => {
                    log::trace!("[ATTR] {} on {}: {}", name, scope.object, err);
                    Value::NotApplicable
                }
            });
        }
        if let Some(value) = self.preferences.get(name) {
            return value.clone();
        }
        log::debug!("[ATTR] Unknown attribute '{}'", name);
        Value::NotApplicable
    }
}

type Builtin = fn(&AttributeScope<'_>) -> Result<Value, AccessError>;

const BUILTINS: &[(&str, Builtin, Voice)] = &[
    ("name", name, Voice::Default),
    ("label", label, Voice::Default),
    ("labelOrName", label_or_name, Voice::Default),
    ("labelAndName", label_and_name, Voice::Default),
    ("description", description, Voice::Default),
    ("role", role_name, Voice::System),
    ("roleName", role_name, Voice::System),
    ("text", text, Voice::Default),
    ("placeholderText", placeholder_text, Voice::Default),
    ("value", value, Voice::Default),
    ("percentage", percentage, Voice::Default),
    ("checkedState", checked_state, Voice::System),
    ("expandableState", expandable_state, Voice::System),
    ("selectedState", selected_state, Voice::System),
    ("required", required, Voice::System),
    ("readOnly", read_only, Voice::System),
    ("invalid", invalid, Voice::System),
    ("availability", availability, Voice::System),
    ("stateList", state_list, Voice::System),
    ("positionInSet", position_in_set, Voice::System),
    ("itemCount", item_count, Voice::System),
    ("level", level, Voice::System),
    ("accelerator", accelerator, Voice::System),
    ("ancestors", ancestors, Voice::Default),
    ("applicationName", application_name, Voice::Default),
    ("isFocused", is_focused, Voice::Default),
    ("isShowing", is_showing, Voice::Default),
    ("isEditable", is_editable, Voice::Default),
    ("isExpandable", is_expandable, Voice::Default),
    ("isCheckable", is_checkable, Voice::Default),
    ("hasChildren", has_children, Voice::Default),
];

fn non_empty(text: String) -> Value {
    if text.trim().is_empty() {
        Value::NotApplicable
    } else {
        Value::Text(text)
    }
}

fn name(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    Ok(non_empty(scope.tree.name(scope.object)?))
}

fn label_text(scope: &AttributeScope<'_>) -> Result<String, AccessError> {
    let mut parts = Vec::new();
    for label in scope.tree.labelled_by(scope.object)? {
        if label == scope.object {
            continue;
        }
        // A label that went away mid-request just contributes nothing.
        if let Ok(text) = scope.tree.name(label) {
            let text = text.trim().to_string();
            if !text.is_empty() && !parts.contains(&text) {
                parts.push(text);
            }
        }
    }
    Ok(parts.join(" "))
}

fn label(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    Ok(non_empty(label_text(scope)?))
}

fn label_or_name(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    let label = label_text(scope)?;
    if !label.is_empty() {
        return Ok(Value::Text(label));
    }
    name(scope)
}

fn label_and_name(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    let label = label_text(scope)?;
    let name = scope.tree.name(scope.object)?.trim().to_string();
    let mut items = Vec::new();
    if !label.is_empty() {
        items.push(label.clone());
    }
    if !name.is_empty() && name != label {
        items.push(name);
    }
    Ok(Value::List(items))
}

fn description(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    let description = scope.tree.description(scope.object)?.trim().to_string();
    if description == scope.tree.name(scope.object)?.trim() || description == label_text(scope)? {
        return Ok(Value::NotApplicable);
    }
    Ok(non_empty(description))
}

fn role_name(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    let role = scope.role()?;
    let name = match scope.channel {
        Channel::Speech => role.speech_name(),
        Channel::Braille => role.braille_name(),
    };
    Ok(Value::Text(name.to_string()))
}

fn text(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    Ok(scope
        .tree
        .text(scope.object)?
        .map(non_empty)
        .unwrap_or(Value::NotApplicable))
}

fn placeholder_text(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    Ok(scope
        .tree
        .attribute(scope.object, "placeholder-text")?
        .map(non_empty)
        .unwrap_or(Value::NotApplicable))
}

fn value(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    Ok(match scope.tree.value(scope.object)? {
        Some(v) => Value::Text(format_number(v.current)),
        None => Value::NotApplicable,
    })
}

fn percentage(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    Ok(match scope.tree.value(scope.object)?.and_then(|v| v.percentage()) {
        Some(p) => Value::Text(formatting::percentage(scope.channel, &format_number(p))),
        None => Value::NotApplicable,
    })
}

fn checked_state(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    let role = scope.role()?;
    let states = scope.states()?;
    if role == Role::ToggleButton {
        let on = states.contains(State::Pressed) || states.contains(State::Checked);
        return Ok(scope.indicator(if on { Indicator::Pressed } else { Indicator::NotPressed }));
    }
    let checkable = matches!(role, Role::CheckBox | Role::CheckMenuItem)
        || states.contains(State::Checkable);
    if !checkable {
        return Ok(Value::NotApplicable);
    }
    let which = if states.contains(State::Indeterminate) {
        Indicator::PartiallyChecked
    } else if states.contains(State::Checked) {
        Indicator::Checked
    } else {
        Indicator::NotChecked
    };
    Ok(scope.indicator(which))
}

fn expandable_state(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    let states = scope.states()?;
    if !states.contains(State::Expandable) {
        return Ok(Value::NotApplicable);
    }
    Ok(scope.indicator(if states.contains(State::Expanded) {
        Indicator::Expanded
    } else {
        Indicator::Collapsed
    }))
}

fn selected_state(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    let states = scope.states()?;
    match scope.role()? {
        Role::RadioButton | Role::RadioMenuItem => Ok(scope.indicator(if states.contains(State::Checked) {
            Indicator::Selected
        } else {
            Indicator::NotSelected
        })),
        _ => Ok(scope.indicator_if(
            states.contains(State::Selectable) && states.contains(State::Selected),
            Indicator::Selected,
        )),
    }
}

fn required(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    let mut on = scope.has_state(State::Required)?;
    if !on && scope.role()? == Role::RadioButton {
        // Radio groups carry the flag on the group, not on each button.
        if let Some(parent) = scope.tree.parent(scope.object)? {
            on = scope.at(parent).has_state(State::Required).unwrap_or(false);
        }
    }
    Ok(scope.indicator_if(on, Indicator::Required))
}

fn read_only(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    Ok(scope.indicator_if(scope.has_state(State::ReadOnly)?, Indicator::ReadOnly))
}

fn invalid(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    Ok(scope.indicator_if(scope.has_state(State::Invalid)?, Indicator::Invalid))
}

fn availability(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    let states = scope.states()?;
    let usable = states.contains(State::Sensitive) || states.contains(State::Enabled);
    Ok(scope.indicator_if(!usable, Indicator::Unavailable))
}

fn state_list(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    let checks: [Builtin; 6] = [
        checked_state,
        expandable_state,
        selected_state,
        required,
        read_only,
        invalid,
    ];
    let mut items = Vec::new();
    for check in checks {
        if let Value::Text(text) = check(scope)? {
            items.push(text);
        }
    }
    Ok(Value::List(items))
}

fn object_attribute_number(scope: &AttributeScope<'_>, key: &str) -> Result<Option<i64>, AccessError> {
    Ok(scope
        .tree
        .attribute(scope.object, key)?
        .and_then(|v| v.trim().parse::<i64>().ok()))
}

fn position_in_set(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    if let (Some(index), Some(total)) = (
        object_attribute_number(scope, "posinset")?,
        object_attribute_number(scope, "setsize")?,
    ) {
        if index > 0 && total >= index {
            return Ok(Value::Text(formatting::position(
                scope.channel,
                index as usize,
                total as usize,
            )));
        }
    }
    let Some(parent) = scope.tree.parent(scope.object)? else {
        return Ok(Value::NotApplicable);
    };
    let role = scope.role()?;
    let mut index = None;
    let mut total = 0;
    for sibling in scope.tree.children(parent)? {
        // Siblings that died mid-walk are simply not counted.
        if scope.tree.role(sibling).ok().as_ref() != Some(&role) {
            continue;
        }
        total += 1;
        if sibling == scope.object {
            index = Some(total);
        }
    }
    Ok(match index {
        Some(index) => Value::Text(formatting::position(scope.channel, index, total)),
        None => Value::NotApplicable,
    })
}

fn item_count(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    let count = scope.tree.children(scope.object)?.len();
    Ok(Value::Text(formatting::item_count(scope.channel, count)))
}

fn level(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    Ok(match object_attribute_number(scope, "level")? {
        Some(level) if level > 0 => Value::Text(formatting::level(scope.channel, level)),
        _ => Value::NotApplicable,
    })
}

fn accelerator(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    for key in ["accelerator", "keyshortcuts"] {
        if let Some(text) = scope.tree.attribute(scope.object, key)? {
            if !text.trim().is_empty() {
                return Ok(Value::Text(text));
            }
        }
    }
    Ok(Value::NotApplicable)
}

fn ancestors(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    let mut items = Vec::new();
    let mut visited = HashSet::from([scope.object]);
    let mut current = scope.tree.parent(scope.object)?;
    while let Some(id) = current {
        if scope.tree.is_desktop(id) {
            break;
        }
        if !visited.insert(id) {
            log::warn!("[ATTR] Parent cycle through {:?}; ancestors cut short", id);
            break;
        }
        let role = scope.tree.role(id)?;
        if !role.is_layout_only() {
            let name = scope.tree.name(id)?.trim().to_string();
            if !name.is_empty() {
                items.push(RelatedText { source: id, text: name });
            }
        }
        current = scope.tree.parent(id)?;
    }
    items.reverse();
    Ok(Value::Related(items))
}

fn application_name(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    Ok(non_empty(scope.tree.application(scope.object)?.name))
}

fn is_focused(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    Ok(Value::Bool(scope.has_state(State::Focused)?))
}

fn is_showing(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    Ok(Value::Bool(scope.has_state(State::Showing)?))
}

fn is_editable(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    Ok(Value::Bool(scope.has_state(State::Editable)?))
}

fn is_expandable(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    Ok(Value::Bool(scope.has_state(State::Expandable)?))
}

fn is_checkable(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    let role = scope.role()?;
    Ok(Value::Bool(
        matches!(role, Role::CheckBox | Role::CheckMenuItem | Role::ToggleButton)
            || scope.has_state(State::Checkable)?,
    ))
}

fn has_children(scope: &AttributeScope<'_>) -> Result<Value, AccessError> {
    Ok(Value::Bool(!scope.tree.children(scope.object)?.is_empty()))
}
