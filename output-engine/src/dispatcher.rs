//! Notification intake and focus tracking.
//!
//! The dispatcher consumes one [`NotificationEvent`] at a time, to completion:
//!
//! 1. stop at desktop events, reclaiming ended application sessions when the
//!    desktop loses a child
//! 2. drop it if its type is suppressed
//! 3. drop it if its source is gone (losing the target if that was it)
//! 4. resolve the script chain of the source's application
//! 5. find a handler by name, most specific script first, then the built-ins,
//!    relaxing the type one segment at a time
//! 6. run it
//!
//! Handler names are derived from the dotted type: `object.state-changed.focused`
//! is handled by `onObjectStateChangedFocused`, and falls back to
//! `onObjectStateChanged` and `onObject` when no layer defines it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::accessible::AccessibleTree;
use crate::config::Config;
use crate::generator::{GenerationRequest, Generated, OutputGenerator};
use crate::script::{Handler, ScriptChain, ScriptRegistry, ScriptResolver};
use crate::sink::Sinks;
use crate::types::{Channel, Context, EngineError, NotificationEvent, ObjectId};

/// Counted set of suppressed notification types.
///
/// Suppression nests: a type pushed twice stays suppressed until popped twice.
/// An entry also covers the sub-types below it, so `object.children-changed`
/// suppresses `object.children-changed.add`.
#[derive(Debug, Default, Clone)]
pub struct IgnoreSet {
    counts: HashMap<String, usize>,
}

impl IgnoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppresses a type (one more level).
    pub fn push(&mut self, event_type: &str) {
        *self
            .counts
            .entry(NotificationEvent::normalize_type(event_type))
            .or_insert(0) += 1;
    }

    /// Removes one level of suppression. Returns `false` if the type was not suppressed.
    pub fn pop(&mut self, event_type: &str) -> bool {
        let key = NotificationEvent::normalize_type(event_type);
        match self.counts.get_mut(&key) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.counts.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Current suppression depth of exactly this type.
    pub fn depth(&self, event_type: &str) -> usize {
        self.counts
            .get(&NotificationEvent::normalize_type(event_type))
            .copied()
            .unwrap_or(0)
    }

    /// Whether a (normalized) type is suppressed by itself or by a parent type.
    ///
    /// # Examples
    ///
    /// ```
    /// use output_engine::IgnoreSet;
    ///
    /// let mut ignore = IgnoreSet::new();
    /// ignore.push("object.children-changed");
    /// assert!(ignore.is_ignored("object.children-changed.add"));
    /// assert!(!ignore.is_ignored("object.children-changedness"));
    /// ```
    pub fn is_ignored(&self, event_type: &str) -> bool {
        self.counts.keys().any(|ignored| {
            event_type == ignored
                || (event_type.starts_with(ignored.as_str())
                    && event_type[ignored.len()..].starts_with('.'))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Who has the user's attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
    Idle,
    HasTarget { object: ObjectId, epoch: u64 },
}

/// Target state machine. Every change of target starts a new epoch.
#[derive(Debug, Clone)]
pub struct FocusTracker {
    state: FocusState,
    epoch: u64,
}

impl Default for FocusTracker {
    fn default() -> Self {
        Self {
            state: FocusState::Idle,
            epoch: 0,
        }
    }
}

impl FocusTracker {
    pub fn state(&self) -> FocusState {
        self.state
    }

    pub fn target(&self) -> Option<ObjectId> {
        match self.state {
            FocusState::Idle => None,
            FocusState::HasTarget { object, .. } => Some(object),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Makes `object` the target; returns the new epoch.
    pub fn set_target(&mut self, object: ObjectId) -> u64 {
        self.epoch += 1;
        self.state = FocusState::HasTarget {
            object,
            epoch: self.epoch,
        };
        self.epoch
    }

    /// Returns to `Idle`.
    pub fn clear(&mut self) {
        if self.state != FocusState::Idle {
            self.epoch += 1;
            self.state = FocusState::Idle;
        }
    }
}

/// What a handler can see and do while it runs.
pub struct HandlerContext<'a> {
    pub tree: &'a dyn AccessibleTree,
    pub chain: &'a ScriptChain,
    generator: &'a OutputGenerator,
    ignore: &'a mut IgnoreSet,
    focus: &'a mut FocusTracker,
    sinks: &'a Sinks,
    channels: &'a [Channel],
    presented: &'a mut Vec<Generated>,
}

impl HandlerContext<'_> {
    /// Current target, if any.
    pub fn target(&self) -> Option<ObjectId> {
        self.focus.target()
    }

    pub fn set_target(&mut self, object: ObjectId) {
        let epoch = self.focus.set_target(object);
        log::debug!("[DISPATCH] Target is now {} (epoch {})", object, epoch);
    }

    pub fn clear_target(&mut self) {
        self.focus.clear();
        log::debug!("[DISPATCH] Target cleared (epoch {})", self.focus.epoch());
    }

    /// Generates and delivers `object` in `context` on every enabled channel.
    pub fn present(&mut self, object: ObjectId, context: Context) {
        for &channel in self.channels {
            let request = GenerationRequest::new(object, channel, context).with_epoch(self.focus.epoch());
            let generated = self.generator.generate(self.tree, self.chain, request);
            if commit(self.focus, self.sinks, &generated) {
                self.presented.push(generated);
            }
        }
    }

    /// Suppresses a notification type until [`HandlerContext::restore`] is called.
    pub fn suppress(&mut self, event_type: &str) {
        self.ignore.push(event_type);
    }

    pub fn restore(&mut self, event_type: &str) {
        self.ignore.pop(event_type);
    }
}

fn commit(focus: &FocusTracker, sinks: &Sinks, generated: &Generated) -> bool {
    if generated.epoch != focus.epoch() {
        log::debug!(
            "[DISPATCH] Discarding output for {} from epoch {} (now {})",
            generated.target,
            generated.epoch,
            focus.epoch()
        );
        return false;
    }
    sinks.deliver(generated.channel, &generated.units);
    true
}

/// Converts a dotted type to its handler name.
///
/// # Examples
///
/// ```
/// use output_engine::dispatcher::handler_name;
///
/// assert_eq!(handler_name("object.state-changed.focused"), "onObjectStateChangedFocused");
/// assert_eq!(handler_name("focus"), "onFocus");
/// ```
pub fn handler_name(event_type: &str) -> String {
    let mut name = String::from("on");
    for word in event_type.split(|c| c == '.' || c == '-' || c == ':') {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    name
}

/// States whose change on the target is announced.
const PRESENTED_STATES: &[&str] = &[
    "checked",
    "expanded",
    "indeterminate",
    "pressed",
    "selected",
    "required",
    "invalid",
    "read-only",
];

fn on_focus(ctx: &mut HandlerContext<'_>, event: &NotificationEvent) -> Result<(), EngineError> {
    ctx.set_target(event.source);
    ctx.present(event.source, Context::Focused);
    Ok(())
}

fn on_state_changed_focused(ctx: &mut HandlerContext<'_>, event: &NotificationEvent) -> Result<(), EngineError> {
    if event.detail1 == 0 {
        return Ok(());
    }
    on_focus(ctx, event)
}

fn on_state_changed(ctx: &mut HandlerContext<'_>, event: &NotificationEvent) -> Result<(), EngineError> {
    if ctx.target() != Some(event.source) {
        return Ok(());
    }
    let state = event.segments().nth(2).unwrap_or_default();
    if PRESENTED_STATES.contains(&state) {
        ctx.present(event.source, Context::StateChanged);
    }
    Ok(())
}

fn on_state_changed_defunct(ctx: &mut HandlerContext<'_>, event: &NotificationEvent) -> Result<(), EngineError> {
    if event.detail1 != 0 && ctx.target() == Some(event.source) {
        ctx.clear_target();
    }
    Ok(())
}

fn on_value_changed(ctx: &mut HandlerContext<'_>, event: &NotificationEvent) -> Result<(), EngineError> {
    if ctx.target() == Some(event.source) {
        ctx.present(event.source, Context::ValueChanged);
    }
    Ok(())
}

fn on_name_changed(ctx: &mut HandlerContext<'_>, event: &NotificationEvent) -> Result<(), EngineError> {
    if ctx.target() == Some(event.source) {
        ctx.present(event.source, Context::NameChanged);
    }
    Ok(())
}

fn on_window_activate(ctx: &mut HandlerContext<'_>, event: &NotificationEvent) -> Result<(), EngineError> {
    ctx.present(event.source, Context::Unfocused);
    Ok(())
}

fn on_window_deactivate(ctx: &mut HandlerContext<'_>, event: &NotificationEvent) -> Result<(), EngineError> {
    let Some(target) = ctx.target() else {
        return Ok(());
    };
    let window_app = ctx.tree.application(event.source)?;
    // A target that already went away counts as owned by the window.
    let owned = match ctx.tree.application(target) {
        Ok(app) => app.id == window_app.id,
        Err(_) => true,
    };
    if owned {
        ctx.clear_target();
    }
    Ok(())
}

type BuiltinHandler = fn(&mut HandlerContext<'_>, &NotificationEvent) -> Result<(), EngineError>;

const BUILTIN_HANDLERS: &[(&str, BuiltinHandler)] = &[
    ("onFocus", on_focus),
    ("onObjectStateChangedFocused", on_state_changed_focused),
    ("onObjectStateChangedDefunct", on_state_changed_defunct),
    ("onObjectStateChanged", on_state_changed),
    ("onObjectValueChanged", on_value_changed),
    ("onObjectPropertyChangeAccessibleValue", on_value_changed),
    ("onObjectPropertyChangeAccessibleName", on_name_changed),
    ("onWindowActivate", on_window_activate),
    ("onWindowDeactivate", on_window_deactivate),
];

/// Routes notifications to handlers and owns all runtime state.
pub struct EventDispatcher<T: AccessibleTree> {
    tree: T,
    scripts: ScriptResolver,
    generator: OutputGenerator,
    ignore: IgnoreSet,
    focus: FocusTracker,
    sinks: Sinks,
    channels: Vec<Channel>,
    builtins: HashMap<String, Handler>,
}

impl<T: AccessibleTree> EventDispatcher<T> {
    pub fn new(tree: T, scripts: Arc<ScriptRegistry>, generator: OutputGenerator) -> Self {
        let builtins = BUILTIN_HANDLERS
            .iter()
            .map(|(name, handler)| (name.to_string(), Arc::new(*handler) as Handler))
            .collect();
        Self {
            tree,
            scripts: ScriptResolver::new(scripts),
            generator,
            ignore: IgnoreSet::new(),
            focus: FocusTracker::default(),
            sinks: Sinks::default(),
            channels: Channel::ALL.to_vec(),
            builtins,
        }
    }

    /// Builds a dispatcher from configuration tables.
    pub fn from_config(tree: T, config: &Config) -> Result<Self, EngineError> {
        let resolver = config.attribute_resolver();
        let scripts = config.script_registry()?;
        let mut templates = config.template_registry()?;
        templates.check_attributes(&resolver, &scripts);
        let generator = OutputGenerator::new(Arc::new(templates), Arc::new(resolver));
        let mut dispatcher = Self::new(tree, Arc::new(scripts), generator);
        dispatcher.set_channels(config.enabled_channels());
        for event_type in &config.dispatch.ignored_event_types {
            dispatcher.suppress(event_type);
        }
        Ok(dispatcher)
    }

    pub fn with_sinks(mut self, sinks: Sinks) -> Self {
        self.sinks = sinks;
        self
    }

    /// Channels generated for each presentation.
    pub fn set_channels(&mut self, channels: Vec<Channel>) {
        self.channels = channels;
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    /// Mutable access for the owner of the tree (replays, tests).
    pub fn tree_mut(&mut self) -> &mut T {
        &mut self.tree
    }

    pub fn generator(&self) -> &OutputGenerator {
        &self.generator
    }

    pub fn script_resolver(&self) -> &ScriptResolver {
        &self.scripts
    }

    pub fn ignore_set(&self) -> &IgnoreSet {
        &self.ignore
    }

    pub fn focus(&self) -> &FocusTracker {
        &self.focus
    }

    pub fn target(&self) -> Option<ObjectId> {
        self.focus.target()
    }

    pub fn suppress(&mut self, event_type: &str) {
        self.ignore.push(event_type);
    }

    pub fn restore(&mut self, event_type: &str) -> bool {
        self.ignore.pop(event_type)
    }

    /// Consumes one notification. Returns what was presented while handling it.
    pub fn dispatch(&mut self, event: NotificationEvent) -> Vec<Generated> {
        // Desktop removals end sessions even while the event type is suppressed
        if self.tree.is_desktop(event.source) {
            if event.event_type == "object.children-changed.remove" {
                let live = self.tree.running_applications();
                self.scripts.reclaim(&live);
            }
            return Vec::new();
        }

        if self.ignore.is_ignored(&event.event_type) {
            log::trace!("[DISPATCH] Ignoring {} from {}", event.event_type, event.source);
            return Vec::new();
        }

        if !self.tree.is_alive(event.source) {
            if self.focus.target() == Some(event.source) {
                log::debug!("[DISPATCH] Target {} is gone", event.source);
                self.focus.clear();
            }
            log::debug!("[DISPATCH] Dropping {} from dead {}", event.event_type, event.source);
            return Vec::new();
        }

        let chain = self.chain_for(event.source);
        let Some(handler) = self.find_handler(&chain, &event.event_type) else {
            log::trace!("[DISPATCH] No handler for {}", event.event_type);
            return Vec::new();
        };

        let mut presented = Vec::new();
        let mut ctx = HandlerContext {
            tree: &self.tree,
            chain: &chain,
            generator: &self.generator,
            ignore: &mut self.ignore,
            focus: &mut self.focus,
            sinks: &self.sinks,
            channels: &self.channels,
            presented: &mut presented,
        };
        if let Err(err) = handler(&mut ctx, &event) {
            log::warn!("[DISPATCH] Handler for {} failed: {}", event.event_type, err);
        }
        presented
    }

    /// Presents the current target in an explicit context (e.g. a status query).
    pub fn present_command(&mut self, context: Context) -> Vec<Generated> {
        let Some(target) = self.focus.target() else {
            log::debug!("[DISPATCH] No target to present");
            return Vec::new();
        };
        let chain = self.chain_for(target);
        let mut presented = Vec::new();
        let mut ctx = HandlerContext {
            tree: &self.tree,
            chain: &chain,
            generator: &self.generator,
            ignore: &mut self.ignore,
            focus: &mut self.focus,
            sinks: &self.sinks,
            channels: &self.channels,
            presented: &mut presented,
        };
        ctx.present(target, context);
        presented
    }

    /// Generates output for any object without delivering it.
    pub fn generate(&mut self, object: ObjectId, channel: Channel, context: Context) -> Generated {
        let chain = self.chain_for(object);
        let request = GenerationRequest::new(object, channel, context).with_epoch(self.focus.epoch());
        self.generator.generate(&self.tree, &chain, request)
    }

    /// Delivers a result unless the target changed since it was requested.
    pub fn commit(&self, generated: &Generated) -> bool {
        commit(&self.focus, &self.sinks, generated)
    }

    fn chain_for(&mut self, object: ObjectId) -> ScriptChain {
        match self.tree.application(object) {
            Ok(app) => self.scripts.resolve_chain(&app),
            Err(err) => {
                log::debug!("[DISPATCH] No application for {}: {}", object, err);
                self.scripts.registry().default_chain()
            }
        }
    }

    fn find_handler(&self, chain: &ScriptChain, event_type: &str) -> Option<Handler> {
        let segments: Vec<&str> = event_type.split('.').collect();
        for len in (1..=segments.len()).rev() {
            let name = handler_name(&segments[..len].join("."));
            if let Some(handler) = chain.handler(&name).or_else(|| self.builtins.get(&name)) {
                if len < segments.len() {
                    log::trace!("[DISPATCH] {} handled by {}", event_type, name);
                }
                return Some(Arc::clone(handler));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessible::{MemoryTree, Node};
    use crate::attributes::AttributeResolver;
    use crate::roles::Role;
    use crate::script::{Script, ScriptKind};
    use crate::sink::{ChannelSpeechSink, Sinks};
    use crate::templates::TemplateRegistry;
    use crate::types::{AppId, AppIdentity, State};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tree() -> MemoryTree {
        let mut tree = MemoryTree::new();
        tree.set_desktop(1);
        tree.add_application(AppIdentity::new(100, "gedit").with_toolkit("GTK"));
        tree.add_application(AppIdentity::new(200, "evince").with_toolkit("GTK"));
        tree.insert(Node::new(1, Role::DesktopFrame));
        tree.insert(Node::new(2, Role::Frame).named("Untitled").child_of(1).in_app(100));
        tree.insert(
            Node::new(3, Role::CheckBox)
                .named("Enable")
                .with_states([State::Focusable, State::Sensitive])
                .child_of(2),
        );
        tree.insert(Node::new(4, Role::PushButton).named("Close").with_states([State::Sensitive]).child_of(2));
        tree.insert(Node::new(5, Role::Frame).named("Document").child_of(1).in_app(200));
        tree
    }

    fn dispatcher_with(scripts: ScriptRegistry) -> EventDispatcher<MemoryTree> {
        let mut templates = TemplateRegistry::empty();
        templates
            .insert(Channel::Speech, "check-box", Context::Focused, "name + roleName + checkedState")
            .unwrap();
        templates
            .insert(Channel::Speech, "check-box", Context::StateChanged, "checkedState")
            .unwrap();
        let generator = OutputGenerator::new(Arc::new(templates), Arc::new(AttributeResolver::new()));
        let mut dispatcher = EventDispatcher::new(tree(), Arc::new(scripts), generator);
        dispatcher.set_channels(vec![Channel::Speech]);
        dispatcher
    }

    fn dispatcher() -> EventDispatcher<MemoryTree> {
        dispatcher_with(ScriptRegistry::new())
    }

    fn focus(object: u64) -> NotificationEvent {
        NotificationEvent::new("object:state-changed:focused", ObjectId(object)).with_details(1, 0)
    }

    // ============================================================================
    // Unit Tests for handler names
    // ============================================================================

    #[test]
    fn test_handler_names() {
        assert_eq!(handler_name("object.children-changed.add"), "onObjectChildrenChangedAdd");
        assert_eq!(handler_name("window.activate"), "onWindowActivate");
        assert_eq!(
            handler_name("object.property-change.accessible-name"),
            "onObjectPropertyChangeAccessibleName"
        );
    }

    // ============================================================================
    // Unit Tests for IgnoreSet
    // ============================================================================

    #[test]
    fn test_ignore_set_is_a_stack() {
        let mut ignore = IgnoreSet::new();
        ignore.push("object.children-changed.add");
        ignore.push("object.children-changed.add");
        assert!(ignore.pop("object.children-changed.add"));
        assert!(ignore.is_ignored("object.children-changed.add"));
        assert!(ignore.pop("object.children-changed.add"));
        assert!(!ignore.is_ignored("object.children-changed.add"));
        assert!(!ignore.pop("object.children-changed.add"));
        assert!(ignore.is_empty());
    }

    #[test]
    fn test_ignore_set_accepts_colon_spelling() {
        let mut ignore = IgnoreSet::new();
        ignore.push("object:text-caret-moved");
        assert!(ignore.is_ignored("object.text-caret-moved"));
        assert_eq!(ignore.depth("object.text-caret-moved"), 1);
    }

    // ============================================================================
    // Unit Tests for dispatch
    // ============================================================================

    #[test]
    fn test_focus_event_sets_target_and_presents() {
        let mut dispatcher = dispatcher();
        dispatcher.tree_mut().set_state(ObjectId(3), State::Checked, true);
        let presented = dispatcher.dispatch(focus(3));
        assert_eq!(dispatcher.target(), Some(ObjectId(3)));
        assert_eq!(presented.len(), 1);
        assert_eq!(presented[0].texts(), vec!["Enable", "check box", "checked"]);
    }

    #[test]
    fn test_focus_lost_is_not_presented() {
        let mut dispatcher = dispatcher();
        let lost = NotificationEvent::new("object:state-changed:focused", ObjectId(3));
        assert!(dispatcher.dispatch(lost).is_empty());
        assert_eq!(dispatcher.target(), None);
    }

    #[test]
    fn test_state_change_on_target_uses_general_handler() {
        let mut dispatcher = dispatcher();
        dispatcher.dispatch(focus(3));
        dispatcher.tree_mut().set_state(ObjectId(3), State::Checked, true);
        let presented = dispatcher.dispatch(
            NotificationEvent::new("object:state-changed:checked", ObjectId(3)).with_details(1, 0),
        );
        assert_eq!(presented[0].texts(), vec!["checked"]);
        assert_eq!(presented[0].context, Context::StateChanged);

        let showing = NotificationEvent::new("object:state-changed:showing", ObjectId(3));
        assert!(dispatcher.dispatch(showing).is_empty());
    }

    #[test]
    fn test_state_change_elsewhere_is_quiet() {
        let mut dispatcher = dispatcher();
        dispatcher.dispatch(focus(3));
        let presented = dispatcher.dispatch(NotificationEvent::new("object:state-changed:checked", ObjectId(4)));
        assert!(presented.is_empty());
    }

    #[test]
    fn test_stale_target_returns_to_idle() {
        let mut dispatcher = dispatcher();
        dispatcher.dispatch(focus(3));
        let epoch = dispatcher.focus().epoch();
        dispatcher.tree_mut().remove(ObjectId(3));
        assert!(dispatcher
            .dispatch(NotificationEvent::new("object:state-changed:checked", ObjectId(3)))
            .is_empty());
        assert_eq!(dispatcher.focus().state(), FocusState::Idle);
        assert!(dispatcher.focus().epoch() > epoch);
    }

    #[test]
    fn test_unknown_type_is_dropped() {
        let mut dispatcher = dispatcher();
        assert!(dispatcher
            .dispatch(NotificationEvent::new("mouse:abs", ObjectId(3)))
            .is_empty());
    }

    #[test]
    fn test_suppressed_type_is_dropped_until_restored() {
        let mut dispatcher = dispatcher();
        dispatcher.suppress("object.state-changed");
        dispatcher.suppress("object.state-changed");
        assert!(dispatcher.dispatch(focus(3)).is_empty());
        dispatcher.restore("object.state-changed");
        assert!(dispatcher.dispatch(focus(3)).is_empty());
        dispatcher.restore("object.state-changed");
        assert_eq!(dispatcher.dispatch(focus(3)).len(), 1);
    }

    #[test]
    fn test_suppressed_events_open_no_session() {
        let mut dispatcher = dispatcher();
        dispatcher.suppress("object.state-changed");
        dispatcher.suppress("window.activate");
        assert!(dispatcher.dispatch(focus(3)).is_empty());
        assert!(dispatcher
            .dispatch(NotificationEvent::new("window:activate", ObjectId(5)))
            .is_empty());
        assert_eq!(dispatcher.script_resolver().session_count(), 0);

        dispatcher.restore("window.activate");
        dispatcher.dispatch(NotificationEvent::new("window:activate", ObjectId(5)));
        assert_eq!(dispatcher.script_resolver().session_count(), 1);
    }

    #[test]
    fn test_window_deactivate_clears_target_of_same_app() {
        let mut dispatcher = dispatcher();
        dispatcher.dispatch(focus(3));
        dispatcher.dispatch(NotificationEvent::new("window:deactivate", ObjectId(5)));
        assert_eq!(dispatcher.target(), Some(ObjectId(3)));
        dispatcher.dispatch(NotificationEvent::new("window:deactivate", ObjectId(2)));
        assert_eq!(dispatcher.target(), None);
    }

    #[test]
    fn test_window_activate_presents_unfocused() {
        let mut dispatcher = dispatcher();
        let presented = dispatcher.dispatch(NotificationEvent::new("window:activate", ObjectId(2)));
        assert_eq!(presented[0].context, Context::Unfocused);
        assert_eq!(presented[0].texts(), vec!["Untitled", "frame"]);
    }

    // ============================================================================
    // Unit Tests for script handlers
    // ============================================================================

    #[test]
    fn test_script_handler_overrides_builtin_for_its_app_only() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut scripts = ScriptRegistry::new();
        scripts
            .register(
                Script::builder("gedit", ScriptKind::Application)
                    .handler("onWindowActivate", move |_, _| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .build(),
            )
            .unwrap();
        let mut dispatcher = dispatcher_with(scripts);

        let presented = dispatcher.dispatch(NotificationEvent::new("window:activate", ObjectId(2)));
        assert!(presented.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let presented = dispatcher.dispatch(NotificationEvent::new("window:activate", ObjectId(5)));
        assert_eq!(presented.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_can_suppress_follow_up_events() {
        let mut scripts = ScriptRegistry::new();
        scripts
            .register(
                Script::builder("gtk", ScriptKind::Toolkit)
                    .handler("onObjectChildrenChanged", |ctx, _| {
                        ctx.suppress("object.children-changed");
                        Ok(())
                    })
                    .build(),
            )
            .unwrap();
        let mut dispatcher = dispatcher_with(scripts);
        dispatcher.dispatch(NotificationEvent::new("object:children-changed:add", ObjectId(2)));
        assert!(dispatcher.ignore_set().is_ignored("object.children-changed.remove"));
    }

    #[test]
    fn test_handler_errors_are_swallowed() {
        let mut scripts = ScriptRegistry::new();
        scripts
            .register(
                Script::builder("gedit", ScriptKind::Application)
                    .handler("onFocus", |_, _| Err(EngineError::Config("boom".into())))
                    .build(),
            )
            .unwrap();
        let mut dispatcher = dispatcher_with(scripts);
        assert!(dispatcher.dispatch(NotificationEvent::new("focus:", ObjectId(3))).is_empty());
    }

    // ============================================================================
    // Unit Tests for sessions and supersession
    // ============================================================================

    #[test]
    fn test_desktop_child_removal_reclaims_sessions() {
        let mut dispatcher = dispatcher();
        dispatcher.dispatch(focus(3));
        dispatcher.dispatch(NotificationEvent::new("window:activate", ObjectId(5)));
        assert_eq!(dispatcher.script_resolver().session_count(), 2);

        dispatcher.tree_mut().remove_application(AppId(200));
        dispatcher.dispatch(NotificationEvent::new("object:children-changed:remove", ObjectId(1)));
        assert_eq!(dispatcher.script_resolver().session_count(), 1);
    }

    #[test]
    fn test_suppressed_children_changed_still_reclaims_sessions() {
        let mut dispatcher = dispatcher();
        dispatcher.dispatch(focus(3));
        dispatcher.dispatch(NotificationEvent::new("window:activate", ObjectId(5)));
        assert_eq!(dispatcher.script_resolver().session_count(), 2);

        dispatcher.suppress("object.children-changed");
        dispatcher.tree_mut().remove_application(AppId(200));
        dispatcher.dispatch(NotificationEvent::new("object:children-changed:remove", ObjectId(1)));
        assert_eq!(dispatcher.script_resolver().session_count(), 1);
        assert!(dispatcher.ignore_set().is_ignored("object.children-changed.remove"));
    }

    #[test]
    fn test_superseded_output_is_discarded() {
        let (speech, mut rx) = ChannelSpeechSink::new();
        let mut dispatcher = dispatcher().with_sinks(Sinks {
            speech: Some(Box::new(speech)),
            braille: None,
        });
        dispatcher.dispatch(focus(3));
        assert!(rx.try_recv().is_ok());

        let pending = dispatcher.generate(ObjectId(3), Channel::Speech, Context::BasicStatus);
        dispatcher.dispatch(focus(4));
        assert!(rx.try_recv().is_ok());
        assert!(!dispatcher.commit(&pending));
        assert!(rx.try_recv().is_err());

        let fresh = dispatcher.generate(ObjectId(4), Channel::Speech, Context::BasicStatus);
        assert!(dispatcher.commit(&fresh));
    }

    #[test]
    fn test_present_command_uses_current_target() {
        let mut dispatcher = dispatcher();
        assert!(dispatcher.present_command(Context::BasicStatus).is_empty());
        dispatcher.dispatch(focus(4));
        let presented = dispatcher.present_command(Context::BasicStatus);
        assert_eq!(presented[0].target, ObjectId(4));
        assert_eq!(presented[0].context, Context::BasicStatus);
    }

    // ============================================================================
    // Property Tests
    // ============================================================================

    proptest! {
        /// A type stays suppressed exactly while pushes outnumber pops.
        #[test]
        fn prop_ignore_set_counts(ops in proptest::collection::vec(any::<bool>(), 0..30)) {
            let mut ignore = IgnoreSet::new();
            let mut depth = 0usize;
            for push in ops {
                if push {
                    ignore.push("object.children-changed.add");
                    depth += 1;
                } else {
                    let popped = ignore.pop("object.children-changed.add");
                    prop_assert_eq!(popped, depth > 0);
                    depth = depth.saturating_sub(1);
                }
                prop_assert_eq!(ignore.is_ignored("object.children-changed.add"), depth > 0);
                prop_assert_eq!(ignore.depth("object.children-changed.add"), depth);
            }
        }

        /// Handler names always start with "on" and contain no separators.
        #[test]
        fn prop_handler_names_are_identifiers(event_type in "[a-z]{1,6}([.:-][a-z]{1,6}){0,3}") {
            let name = handler_name(&event_type);
            prop_assert!(name.starts_with("on"));
            prop_assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }
}
