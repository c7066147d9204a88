//! Output Engine - Turn accessibility notifications into speech and braille.
//!
//! This crate sits between an accessibility tree and a user's speech
//! synthesizer and braille display. It consumes notifications (focus moved, a
//! state flipped, a window activated), decides what to say, and produces
//! ordered output units for each channel.
//!
//! # Overview
//!
//! What is said about an object is described by templates: small expressions
//! over named attributes such as `name + roleName + checkedState`. Templates
//! are keyed by channel, role and presentation context, and are overridden per
//! application and per toolkit by scripts.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use output_engine::{
//!     AppIdentity, AttributeResolver, EventDispatcher, MemoryTree, Node, NotificationEvent,
//!     ObjectId, OutputGenerator, Role, ScriptRegistry, State, TemplateRegistry,
//! };
//!
//! let mut tree = MemoryTree::new();
//! tree.add_application(AppIdentity::new(7, "gedit").with_toolkit("GTK"));
//! tree.insert(Node::new(1, Role::Frame).named("Untitled").in_app(7));
//! tree.insert(Node::new(2, Role::CheckBox).named("Wrap").with_states([State::Checked, State::Sensitive]).child_of(1));
//!
//! let generator = OutputGenerator::new(
//!     Arc::new(TemplateRegistry::with_defaults().unwrap()),
//!     Arc::new(AttributeResolver::new()),
//! );
//! let mut engine = EventDispatcher::new(tree, Arc::new(ScriptRegistry::new()), generator);
//!
//! let focus = NotificationEvent::new("object:state-changed:focused", ObjectId(2)).with_details(1, 0);
//! let presented = engine.dispatch(focus);
//! assert_eq!(presented[0].texts(), vec!["Wrap", "check box", "checked"]);
//! ```
//!
//! # Modules
//!
//! - [`types`]: Core data types (events, values, output units, errors)
//! - [`accessible`]: The tree abstraction and an in-memory implementation
//! - [`roles`]: Role table with speech names and braille abbreviations
//! - [`attributes`]: Named attribute functions
//! - [`cache`]: Request-scoped memoization
//! - [`expression`]: Template expression parser and evaluator
//! - [`formatting`]: Indicator strings and the default template tables
//! - [`templates`]: Template registry with layered fallback
//! - [`script`]: Per-application and per-toolkit overrides
//! - [`generator`]: Template evaluation into output units
//! - [`dispatcher`]: Notification routing and focus tracking
//! - [`sink`]: Speech and braille sinks
//! - [`config`]: TOML configuration

pub mod accessible;
pub mod attributes;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod expression;
pub mod formatting;
pub mod generator;
pub mod roles;
pub mod script;
pub mod sink;
pub mod templates;
pub mod types;

// Re-export core types
pub use types::{
    AppId, AppIdentity, Channel, Context, EngineError, Fragment, NotificationEvent, ObjectId,
    OutputUnit, RelatedText, State, StateSet, Value, Voice,
};

pub use accessible::{AccessError, AccessibleTree, MemoryTree, Node, NumericValue, TreeSnapshot};
pub use attributes::{AttributeResolver, AttributeScope};
pub use cache::ObjectCache;
pub use config::Config;
pub use dispatcher::{EventDispatcher, FocusState, HandlerContext, IgnoreSet};
pub use generator::{Generated, GenerationRequest, OutputGenerator};
pub use roles::Role;
pub use script::{Hook, Script, ScriptChain, ScriptKind, ScriptRegistry, ScriptResolver};
pub use sink::{BrailleRegion, BrailleSink, ChannelBrailleSink, ChannelSpeechSink, Sinks, SpeechSink, Utterance};
pub use templates::{TemplateOrigin, TemplateRegistry};
