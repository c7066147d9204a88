//! Script layers and chain resolution.
//!
//! A script is a partial overlay of behavior for one application or toolkit:
//! some templates, some notification handlers, some generator hooks. For the
//! application that owns an object, the engine consults an ordered chain of
//! scripts, most specific first:
//!
//! application script → toolkit script → default script
//!
//! Scripts are immutable once registered and shared as `Arc<Script>`. The
//! [`ScriptResolver`] remembers the chain of every application session until
//! the application goes away.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dispatcher::HandlerContext;
use crate::templates::TemplateSet;
use crate::types::{AppId, AppIdentity, Channel, Context, EngineError, NotificationEvent};

/// Notification handler. Errors are logged by the dispatcher and otherwise ignored.
pub type Handler =
    Arc<dyn Fn(&mut HandlerContext<'_>, &NotificationEvent) -> Result<(), EngineError> + Send + Sync>;

/// What a script overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    /// Keyed by normalized application name
    Application,
    /// Keyed by normalized toolkit name
    Toolkit,
    /// The catch-all layer at the end of every chain
    Default,
}

impl FromStr for ScriptKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "application" => Ok(ScriptKind::Application),
            "toolkit" => Ok(ScriptKind::Toolkit),
            "default" => Ok(ScriptKind::Default),
            other => Err(EngineError::UnknownValue {
                kind: "script kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Generator hook: what to do instead of resolving an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hook {
    /// Produce nothing for the attribute
    Skip,
    /// Produce this text instead
    Replace(String),
}

/// One override layer.
pub struct Script {
    name: String,
    kind: ScriptKind,
    templates: TemplateSet,
    handlers: HashMap<String, Handler>,
    hooks: HashMap<(String, Option<String>), Hook>,
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handlers: Vec<&String> = self.handlers.keys().collect();
        handlers.sort();
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("templates", &self.templates.len())
            .field("handlers", &handlers)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl Script {
    /// Starts building a script.
    pub fn builder(name: impl Into<String>, kind: ScriptKind) -> ScriptBuilder {
        ScriptBuilder {
            script: Script {
                name: name.into(),
                kind,
                templates: TemplateSet::new(),
                handlers: HashMap::new(),
                hooks: HashMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ScriptKind {
        self.kind
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    /// Handler registered under `name` (e.g. `onObjectStateChangedFocused`).
    pub fn handler(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    /// Hook for `attribute`; a role-specific hook wins over a role-independent one.
    pub fn hook(&self, attribute: &str, role: &str) -> Option<&Hook> {
        self.hooks
            .get(&(attribute.to_string(), Some(role.to_string())))
            .or_else(|| self.hooks.get(&(attribute.to_string(), None)))
    }
}

/// Builder for [`Script`].
pub struct ScriptBuilder {
    script: Script,
}

impl ScriptBuilder {
    /// Adds a template; fails if the expression does not parse.
    pub fn template(
        mut self,
        channel: Channel,
        role: &str,
        context: Context,
        source: &str,
    ) -> Result<Self, EngineError> {
        self.script.templates.insert(channel, role, context, source)?;
        Ok(self)
    }

    pub fn prefix(mut self, channel: Channel, context: Context, source: &str) -> Result<Self, EngineError> {
        self.script.templates.insert_prefix(channel, context, source)?;
        Ok(self)
    }

    pub fn suffix(mut self, channel: Channel, context: Context, source: &str) -> Result<Self, EngineError> {
        self.script.templates.insert_suffix(channel, context, source)?;
        Ok(self)
    }

    /// Adds a notification handler.
    pub fn handler<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_>, &NotificationEvent) -> Result<(), EngineError> + Send + Sync + 'static,
    {
        self.script.handlers.insert(name.to_string(), Arc::new(handler));
        self
    }

    /// Adds a generator hook, optionally limited to one role key.
    pub fn hook(mut self, attribute: &str, role: Option<&str>, hook: Hook) -> Self {
        self.script
            .hooks
            .insert((attribute.to_string(), role.map(str::to_string)), hook);
        self
    }

    pub fn build(self) -> Script {
        self.script
    }
}

/// Ordered override layers for one application, most specific first.
#[derive(Debug, Clone, Default)]
pub struct ScriptChain(Vec<Arc<Script>>);

impl ScriptChain {
    pub fn new(scripts: Vec<Arc<Script>>) -> Self {
        Self(scripts)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Script>> {
        self.0.iter()
    }

    /// Script names in chain order.
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The most specific hook for `attribute` on an object of role `role`.
    pub fn hook(&self, attribute: &str, role: &str) -> Option<&Hook> {
        self.0.iter().find_map(|s| s.hook(attribute, role))
    }

    /// The most specific handler registered under `name`.
    pub fn handler(&self, name: &str) -> Option<&Handler> {
        self.0.iter().find_map(|s| s.handler(name))
    }
}

/// Application names that share another application's script.
const APP_ALIASES: &[(&str, &str)] = &[
    ("gtk-window-decorator", "switcher"),
    ("marco", "switcher"),
    ("mate-notification-daemon", "notification-daemon"),
    ("metacity", "switcher"),
    ("pluma", "gedit"),
    ("xfce4-notifyd", "notification-daemon"),
];

/// Maps a reported application name to the key its script is registered under.
///
/// # Examples
///
/// ```
/// use output_engine::script::normalize_app_name;
///
/// assert_eq!(normalize_app_name("gedit"), "gedit");
/// assert_eq!(normalize_app_name("org.gnome.Nautilus"), "nautilus");
/// assert_eq!(normalize_app_name("orca.py"), "orca");
/// assert_eq!(normalize_app_name("Pluma"), "gedit");
/// ```
pub fn normalize_app_name(name: &str) -> String {
    let name = name.trim();
    let base = if name.ends_with(".py") || name.ends_with(".bin") {
        name.split('.').next().unwrap_or(name)
    } else if name.starts_with("org.") || name.starts_with("com.") {
        name.rsplit('.').next().unwrap_or(name)
    } else {
        name
    };
    let base = base.to_lowercase();
    APP_ALIASES
        .iter()
        .find(|(alias, _)| *alias == base)
        .map(|(_, target)| target.to_string())
        .unwrap_or(base)
}

/// Maps a reported toolkit name to the key its script is registered under.
pub fn normalize_toolkit(name: &str) -> String {
    match name.trim() {
        "GTK" | "GAIL" => "gtk".to_string(),
        other => other.to_lowercase(),
    }
}

/// All registered scripts, immutable after startup.
#[derive(Debug)]
pub struct ScriptRegistry {
    applications: HashMap<String, Arc<Script>>,
    toolkits: HashMap<String, Arc<Script>>,
    default: Arc<Script>,
}

impl Default for ScriptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptRegistry {
    /// Creates a registry with an empty default script.
    pub fn new() -> Self {
        Self {
            applications: HashMap::new(),
            toolkits: HashMap::new(),
            default: Arc::new(Script::builder("default", ScriptKind::Default).build()),
        }
    }

    /// Registers a script under its normalized key.
    ///
    /// A second script for the same key is rejected; a `Default` script
    /// replaces the built-in empty one.
    pub fn register(&mut self, script: Script) -> Result<(), EngineError> {
        let script = Arc::new(script);
        let (map, key) = match script.kind() {
            ScriptKind::Default => {
                log::info!("[SCRIPTS] Using '{}' as the default script", script.name());
                self.default = script;
                return Ok(());
            }
            ScriptKind::Application => (&mut self.applications, normalize_app_name(script.name())),
            ScriptKind::Toolkit => (&mut self.toolkits, normalize_toolkit(script.name())),
        };
        if map.contains_key(&key) {
            return Err(EngineError::Config(format!(
                "script '{}' registered twice",
                key
            )));
        }
        log::debug!("[SCRIPTS] Registered {:?} script '{}'", script.kind(), key);
        map.insert(key, script);
        Ok(())
    }

    /// Builds the chain for an application.
    pub fn chain_for(&self, app: &AppIdentity) -> ScriptChain {
        let mut chain = Vec::with_capacity(3);
        if let Some(script) = self.applications.get(&normalize_app_name(&app.name)) {
            chain.push(Arc::clone(script));
        }
        if let Some(script) = app
            .toolkit
            .as_deref()
            .and_then(|toolkit| self.toolkits.get(&normalize_toolkit(toolkit)))
        {
            chain.push(Arc::clone(script));
        }
        chain.push(Arc::clone(&self.default));
        ScriptChain(chain)
    }

    /// Chain for objects that belong to no known application.
    pub fn default_chain(&self) -> ScriptChain {
        ScriptChain(vec![Arc::clone(&self.default)])
    }

    /// Every registered script, default last.
    pub fn scripts(&self) -> impl Iterator<Item = &Arc<Script>> {
        let mut named: Vec<&Arc<Script>> = self
            .applications
            .values()
            .chain(self.toolkits.values())
            .collect();
        named.sort_by(|a, b| a.name().cmp(b.name()));
        named.into_iter().chain(std::iter::once(&self.default))
    }
}

/// Per-application cache of resolved chains.
#[derive(Debug)]
pub struct ScriptResolver {
    registry: Arc<ScriptRegistry>,
    sessions: HashMap<AppId, ScriptChain>,
}

impl ScriptResolver {
    pub fn new(registry: Arc<ScriptRegistry>) -> Self {
        Self {
            registry,
            sessions: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ScriptRegistry> {
        &self.registry
    }

    /// Returns the chain for the application, resolving it on first use.
    pub fn resolve_chain(&mut self, app: &AppIdentity) -> ScriptChain {
        if let Some(chain) = self.sessions.get(&app.id) {
            return chain.clone();
        }
        let chain = self.registry.chain_for(app);
        log::info!(
            "[SCRIPTS] Session {} ({}) uses [{}]",
            app.id,
            app.name,
            chain.names().join(" → ")
        );
        self.sessions.insert(app.id, chain.clone());
        chain
    }

    /// Drops the session of an application that exited.
    pub fn end_session(&mut self, app: AppId) -> bool {
        self.sessions.remove(&app).is_some()
    }

    /// Drops every session whose application is no longer running.
    ///
    /// Returns the number of sessions dropped.
    pub fn reclaim(&mut self, live: &[AppId]) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|app, _| live.contains(app));
        let dropped = before - self.sessions.len();
        if dropped > 0 {
            log::info!("[SCRIPTS] Reclaimed {} ended session(s)", dropped);
        }
        dropped
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
