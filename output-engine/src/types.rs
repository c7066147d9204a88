//! Core data types for the output-engine crate.
//!
//! This module defines the fundamental types used throughout the crate:
//! - `ObjectId` / `AppId` / `AppIdentity`: handles into the externally-owned tree
//! - `Channel` / `Context`: where and in which situation output is presented
//! - `State` / `StateSet`: state flags of an accessible object
//! - `Value` / `Fragment`: resolved attribute values and the output pieces they produce
//! - `OutputUnit` / `Voice`: what the engine hands to the speech and braille sinks
//! - `EngineError`: error types surfaced at startup and configuration time

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::accessible::AccessError;

/// Handle to one accessible object.
///
/// The handle is minted by whoever owns the tree. It identifies the object
/// only for as long as the object is alive; the engine never keeps one past
/// the notification or generation request that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of one running application session (usually its process id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(pub u64);

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app-{}", self.0)
    }
}

/// The application an accessible object belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppIdentity {
    /// Session identifier, unique among running applications
    pub id: AppId,

    /// Application name as reported by the bus (e.g. "gedit", "org.gnome.Nautilus")
    pub name: String,

    /// UI toolkit reported by the application (e.g. "GTK", "Qt", "Gecko")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolkit: Option<String>,
}

impl AppIdentity {
    /// Creates an identity without toolkit information.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: AppId(id),
            name: name.into(),
            toolkit: None,
        }
    }

    /// Sets the toolkit name.
    pub fn with_toolkit(mut self, toolkit: impl Into<String>) -> Self {
        self.toolkit = Some(toolkit.into());
        self
    }
}

/// Output modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Spoken output
    Speech,
    /// Refreshable braille display output
    Braille,
}

impl Channel {
    /// All channels, in presentation order.
    pub const ALL: [Channel; 2] = [Channel::Speech, Channel::Braille];

    /// Returns the string identifier for this channel.
    ///
    /// # Examples
    ///
    /// ```
    /// use output_engine::Channel;
    ///
    /// assert_eq!(Channel::Speech.as_str(), "speech");
    /// assert_eq!(Channel::Braille.as_str(), "braille");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Speech => "speech",
            Channel::Braille => "braille",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "speech" => Ok(Channel::Speech),
            "braille" => Ok(Channel::Braille),
            other => Err(EngineError::UnknownValue {
                kind: "channel",
                value: other.to_string(),
            }),
        }
    }
}

/// Presentation situation a template applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Context {
    /// The object just received focus
    Focused,
    /// The object is presented without having focus (the default context)
    Unfocused,
    /// The object is presented as a container of the focused object
    Ancestor,
    /// Short status query ("where am I")
    BasicStatus,
    /// Detailed status query
    DetailedStatus,
    /// A state of the focused object changed (checked, expanded, ...)
    StateChanged,
    /// The value of the focused object changed
    ValueChanged,
    /// The name of the focused object changed
    NameChanged,
}

impl Context {
    /// Context used when a role has no entry for the requested one.
    pub const DEFAULT: Context = Context::Unfocused;

    /// All contexts.
    pub const ALL: [Context; 8] = [
        Context::Focused,
        Context::Unfocused,
        Context::Ancestor,
        Context::BasicStatus,
        Context::DetailedStatus,
        Context::StateChanged,
        Context::ValueChanged,
        Context::NameChanged,
    ];

    /// Returns the string identifier for this context.
    pub fn as_str(&self) -> &'static str {
        match self {
            Context::Focused => "focused",
            Context::Unfocused => "unfocused",
            Context::Ancestor => "ancestor",
            Context::BasicStatus => "basic-status",
            Context::DetailedStatus => "detailed-status",
            Context::StateChanged => "state-changed",
            Context::ValueChanged => "value-changed",
            Context::NameChanged => "name-changed",
        }
    }

    /// The closest context to try before falling back to the default one.
    ///
    /// An ancestor is presented like a focused object, and a detailed status
    /// query reuses the basic one.
    ///
    /// # Examples
    ///
    /// ```
    /// use output_engine::Context;
    ///
    /// assert_eq!(Context::Ancestor.related(), Some(Context::Focused));
    /// assert_eq!(Context::DetailedStatus.related(), Some(Context::BasicStatus));
    /// assert_eq!(Context::Focused.related(), None);
    /// ```
    pub fn related(&self) -> Option<Context> {
        match self {
            Context::Ancestor => Some(Context::Focused),
            Context::DetailedStatus => Some(Context::BasicStatus),
            _ => None,
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Context {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Context::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| EngineError::UnknownValue {
                kind: "context",
                value: s.to_string(),
            })
    }
}

/// A state flag of an accessible object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum State {
    Focused,
    Focusable,
    Showing,
    Visible,
    Checkable,
    Checked,
    Indeterminate,
    Pressed,
    Expandable,
    Expanded,
    Sensitive,
    Enabled,
    Required,
    ReadOnly,
    Invalid,
    Selectable,
    Selected,
    Editable,
    MultiSelectable,
    Defunct,
}

/// The set of state flags an object currently has.
///
/// Ordered so that anything derived from it (debug output, state lists) is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateSet(BTreeSet<State>);

impl StateSet {
    /// Creates an empty state set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the flag is set.
    pub fn contains(&self, state: State) -> bool {
        self.0.contains(&state)
    }

    /// Sets a flag.
    pub fn insert(&mut self, state: State) {
        self.0.insert(state);
    }

    /// Clears a flag.
    pub fn remove(&mut self, state: State) {
        self.0.remove(&state);
    }

    /// Iterates the flags in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = State> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<State> for StateSet {
    fn from_iter<I: IntoIterator<Item = State>>(iter: I) -> Self {
        StateSet(iter.into_iter().collect())
    }
}

/// One notification from the accessibility bus.
///
/// The type is a dotted hierarchy such as `object.state-changed.focused`.
/// AT-SPI spells the same types with colons (`object:state-changed:focused`,
/// `focus:`); both spellings normalize to the dotted form on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "type", deserialize_with = "deserialize_event_type")]
    pub event_type: String,

    /// Object the notification is about
    pub source: ObjectId,

    /// First detail (booleans are encoded as 0/1)
    #[serde(default)]
    pub detail1: i64,

    #[serde(default)]
    pub detail2: i64,
}

impl NotificationEvent {
    /// Creates an event with both details set to zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use output_engine::{NotificationEvent, ObjectId};
    ///
    /// let event = NotificationEvent::new("object:state-changed:focused", ObjectId(5));
    /// assert_eq!(event.event_type, "object.state-changed.focused");
    /// assert_eq!(NotificationEvent::new("focus:", ObjectId(5)).event_type, "focus");
    /// ```
    pub fn new(event_type: &str, source: ObjectId) -> Self {
        Self {
            event_type: Self::normalize_type(event_type),
            source,
            detail1: 0,
            detail2: 0,
        }
    }

    /// Sets the detail values.
    pub fn with_details(mut self, detail1: i64, detail2: i64) -> Self {
        self.detail1 = detail1;
        self.detail2 = detail2;
        self
    }

    /// Converts an event type to its dotted form, dropping empty segments.
    pub fn normalize_type(raw: &str) -> String {
        raw.split(|c| c == ':' || c == '.')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Segments of the type, outermost first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.event_type.split('.')
    }
}

fn deserialize_event_type<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(NotificationEvent::normalize_type(&raw))
}

/// Hint telling the speech sink how to voice an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    /// The user's regular reading voice
    #[default]
    Default,
    /// Voice used for information the screen reader adds itself (roles, states)
    System,
    /// Voice used for link text
    Hyperlink,
    /// Voice used for upper-case text
    Uppercase,
}

/// Text taken from an object related to the one being presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedText {
    pub source: ObjectId,
    pub text: String,
}

/// The result of resolving one named attribute against an object.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The attribute does not apply (or the object went stale)
    NotApplicable,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Multi-part attribute, one fragment per item
    List(Vec<String>),
    /// Multi-part attribute whose items come from other objects (ancestors, labels)
    Related(Vec<RelatedText>),
}

impl Value {
    /// Returns `true` if the value counts as true in `and`/`or`.
    ///
    /// # Examples
    ///
    /// ```
    /// use output_engine::Value;
    ///
    /// assert!(Value::Text("checked".into()).is_truthy());
    /// assert!(!Value::Text(String::new()).is_truthy());
    /// assert!(!Value::NotApplicable.is_truthy());
    /// assert!(!Value::Int(0).is_truthy());
    /// ```
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::NotApplicable => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::List(items) => items.iter().any(|s| !s.is_empty()),
            Value::Related(items) => items.iter().any(|r| !r.text.is_empty()),
        }
    }

    /// Converts the value into output fragments attributed to `source`.
    ///
    /// Booleans and `NotApplicable` produce nothing; empty strings are dropped
    /// so that concatenation never yields blank fragments.
    pub fn into_fragments(self, source: ObjectId, voice: Voice) -> Vec<Fragment> {
        let plain = |text: String| Fragment {
            text,
            source,
            voice,
        };
        match self {
            Value::NotApplicable | Value::Bool(_) => Vec::new(),
            Value::Int(i) => vec![plain(i.to_string())],
            Value::Float(f) => vec![plain(format_number(f))],
            Value::Text(s) if s.is_empty() => Vec::new(),
            Value::Text(s) => vec![plain(s)],
            Value::List(items) => items
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(plain)
                .collect(),
            Value::Related(items) => items
                .into_iter()
                .filter(|r| !r.text.is_empty())
                .map(|r| Fragment {
                    text: r.text,
                    source: r.source,
                    voice,
                })
                .collect(),
        }
    }
}

/// Renders a number without a trailing ".0" for whole values.
pub(crate) fn format_number(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

/// One atomic piece of output produced while evaluating a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub source: ObjectId,
    pub voice: Voice,
}

/// One unit of output handed to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputUnit {
    /// Text to speak or display
    pub text: String,

    /// Channel the unit was generated for
    pub channel: Channel,

    /// Object the text describes
    pub source: ObjectId,

    /// Whether this unit is the region of the presented object itself
    /// (the braille cursor goes here)
    pub focused: bool,

    /// Speech presentation hint
    pub voice: Voice,
}

/// Errors surfaced by the engine.
///
/// Runtime problems with the accessible tree never reach this type through
/// template evaluation; they degrade to `Value::NotApplicable` instead. These
/// variants cover startup, configuration, and explicit tree queries.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A template expression failed to parse at registration time
    #[error("Malformed template for ({channel}, {role}, {context}): {message}")]
    MalformedTemplate {
        channel: Channel,
        role: String,
        context: Context,
        message: String,
    },

    /// A configuration table is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// A string did not name a known channel, context, or script kind
    #[error("Unknown {kind}: {value}")]
    UnknownValue { kind: &'static str, value: String },

    /// The accessible tree could not answer
    #[error("Accessibility error: {0}")]
    Access(#[from] AccessError),

    /// Reading a configuration or scenario file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file is not valid TOML for the expected schema
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A scenario file is not valid JSON for the expected schema
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
