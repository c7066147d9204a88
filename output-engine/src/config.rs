//! Configuration management for the output engine.
//!
//! Loads template, script and preference tables from TOML and provides
//! runtime defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::attributes::AttributeResolver;
use crate::script::{Hook, Script, ScriptKind, ScriptRegistry};
use crate::templates::{TemplateRegistry, TemplateSet};
use crate::types::{Channel, Context, EngineError, Value};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub speech: ChannelConfig,

    #[serde(default)]
    pub braille: ChannelConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// User preferences, visible to templates by name
    #[serde(default = "default_preferences")]
    pub preferences: BTreeMap<String, PreferenceValue>,

    /// Extra entries for the default template layer
    #[serde(default)]
    pub templates: Vec<TemplateEntry>,

    #[serde(default)]
    pub scripts: Vec<ScriptConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            speech: ChannelConfig::default(),
            braille: ChannelConfig::default(),
            dispatch: DispatchConfig::default(),
            preferences: default_preferences(),
            templates: Vec::new(),
            scripts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Whether output is generated for this channel
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Notification types suppressed from startup (colon or dotted spelling)
    #[serde(default)]
    pub ignored_event_types: Vec<String>,
}

/// A preference value as written in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&PreferenceValue> for Value {
    fn from(value: &PreferenceValue) -> Self {
        match value {
            PreferenceValue::Bool(b) => Value::Bool(*b),
            PreferenceValue::Int(i) => Value::Int(*i),
            PreferenceValue::Float(f) => Value::Float(*f),
            PreferenceValue::Text(s) => Value::Text(s.clone()),
        }
    }
}

/// Where a template entry goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// Keyed by role and context
    #[default]
    Main,
    /// Evaluated before the main template (role is ignored)
    Prefix,
    /// Evaluated after the main template (role is ignored)
    Suffix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub channel: Channel,

    /// Role key, or `default` for the generic entry
    #[serde(default = "default_role")]
    pub role: String,

    #[serde(default = "default_context")]
    pub context: Context,

    #[serde(default)]
    pub placement: Placement,

    pub template: String,
}

impl TemplateEntry {
    fn apply(&self, set: &mut TemplateSet) -> Result<(), EngineError> {
        match self.placement {
            Placement::Main => set.insert(self.channel, &self.role, self.context, &self.template),
            Placement::Prefix => set.insert_prefix(self.channel, self.context, &self.template),
            Placement::Suffix => set.insert_suffix(self.channel, self.context, &self.template),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookAction {
    Skip,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookConfig {
    pub attribute: String,

    /// Limit the hook to one role key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    pub action: HookAction,

    /// Replacement text, required for `replace`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl HookConfig {
    fn to_hook(&self) -> Result<Hook, EngineError> {
        match (self.action, &self.text) {
            (HookAction::Skip, _) => Ok(Hook::Skip),
            (HookAction::Replace, Some(text)) => Ok(Hook::Replace(text.clone())),
            (HookAction::Replace, None) => Err(EngineError::Config(format!(
                "replace hook for '{}' has no text",
                self.attribute
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Application or toolkit name as reported by the platform
    pub name: String,

    pub kind: ScriptKind,

    #[serde(default)]
    pub templates: Vec<TemplateEntry>,

    #[serde(default)]
    pub hooks: Vec<HookConfig>,
}

impl ScriptConfig {
    fn build(&self) -> Result<Script, EngineError> {
        let mut builder = Script::builder(self.name.as_str(), self.kind);
        for entry in &self.templates {
            builder = match entry.placement {
                Placement::Main => builder.template(entry.channel, &entry.role, entry.context, &entry.template)?,
                Placement::Prefix => builder.prefix(entry.channel, entry.context, &entry.template)?,
                Placement::Suffix => builder.suffix(entry.channel, entry.context, &entry.template)?,
            };
        }
        for hook in &self.hooks {
            builder = builder.hook(&hook.attribute, hook.role.as_deref(), hook.to_hook()?);
        }
        Ok(builder.build())
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_role() -> String {
    crate::roles::GENERIC_ROLE_KEY.to_string()
}

fn default_context() -> Context {
    Context::DEFAULT
}

fn default_preferences() -> BTreeMap<String, PreferenceValue> {
    let mut preferences = BTreeMap::new();
    preferences.insert("speakDescription".to_string(), PreferenceValue::Bool(true));
    preferences
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path, falling back to defaults
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    log::info!("[CONFIG] Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    log::warn!("[CONFIG] Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("[CONFIG] No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Read a configuration file the user named explicitly.
    ///
    /// Unlike [`Config::load_from_path`], a missing file or a schema error is
    /// returned instead of replaced by defaults.
    pub fn read_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::info!("[CONFIG] Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse configuration, reporting errors instead of falling back
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        Ok(toml::from_str(contents)?)
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("output-engine")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::write(&path, contents)?;
        log::info!("[CONFIG] Saved configuration to {:?}", path);
        Ok(())
    }

    /// Channels with output enabled, in presentation order.
    pub fn enabled_channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|channel| match channel {
                Channel::Speech => self.speech.enabled,
                Channel::Braille => self.braille.enabled,
            })
            .collect()
    }

    /// Built-in templates with the configured entries layered over them.
    pub fn template_registry(&self) -> Result<TemplateRegistry, EngineError> {
        let mut registry = TemplateRegistry::with_defaults()?;
        for entry in &self.templates {
            entry.apply(registry.defaults_mut())?;
        }
        Ok(registry)
    }

    pub fn script_registry(&self) -> Result<ScriptRegistry, EngineError> {
        let mut registry = ScriptRegistry::new();
        for script in &self.scripts {
            registry.register(script.build()?)?;
        }
        Ok(registry)
    }

    /// Built-in attributes plus the configured preferences.
    pub fn attribute_resolver(&self) -> AttributeResolver {
        let mut resolver = AttributeResolver::new();
        for (name, value) in &self.preferences {
            resolver.set_preference(name, Value::from(value));
        }
        resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Role;
    use crate::templates::TemplateOrigin;
    use crate::types::AppIdentity;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[general]
log_level = "debug"

[braille]
enabled = false

[dispatch]
ignored_event_types = ["object:text-caret-moved"]

[preferences]
speakDescription = false
verbosity = 2

[[templates]]
channel = "speech"
role = "push-button"
context = "focused"
template = "name + roleName + description"

[[templates]]
channel = "speech"
context = "basic-status"
placement = "prefix"
template = "applicationName"

[[scripts]]
name = "gedit"
kind = "application"

[[scripts.templates]]
channel = "speech"
role = "check-box"
context = "focused"
template = "roleName + name"

[[scripts.hooks]]
attribute = "roleName"
role = "push-button"
action = "replace"
text = "button"
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert!(config.speech.enabled);
        assert!(config.braille.enabled);
        assert_eq!(
            config.preferences.get("speakDescription"),
            Some(&PreferenceValue::Bool(true))
        );
        assert_eq!(config.enabled_channels(), vec![Channel::Speech, Channel::Braille]);
    }

    #[test]
    fn test_parse_toml() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.enabled_channels(), vec![Channel::Speech]);
        assert_eq!(config.preferences.get("verbosity"), Some(&PreferenceValue::Int(2)));
        assert_eq!(config.templates.len(), 2);
        assert_eq!(config.templates[1].placement, Placement::Prefix);
        assert_eq!(config.templates[1].role, "default");
        assert_eq!(config.scripts[0].hooks[0].action, HookAction::Replace);
    }

    #[test]
    fn test_invalid_toml_is_an_error_when_strict() {
        assert!(matches!(
            Config::from_toml_str("[speech]\nenabled = \"loud\""),
            Err(EngineError::Toml(_))
        ));
    }

    #[test]
    fn test_configured_templates_layer_over_defaults() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let templates = config.template_registry().unwrap();
        let scripts = config.script_registry().unwrap();

        let gedit = scripts.chain_for(&AppIdentity::new(1, "gedit"));
        let found = templates.lookup(&gedit, Channel::Speech, &Role::CheckBox, Context::Focused);
        assert_eq!(found.origin, TemplateOrigin::Script("gedit".into()));
        assert_eq!(found.template.source, "roleName + name");

        let other = scripts.chain_for(&AppIdentity::new(2, "evince"));
        let found = templates.lookup(&other, Channel::Speech, &Role::PushButton, Context::Focused);
        assert_eq!(found.origin, TemplateOrigin::Registry);
        assert_eq!(found.template.source, "name + roleName + description");
        assert!(templates.prefix(&other, Channel::Speech, Context::BasicStatus).is_some());
    }

    #[test]
    fn test_malformed_template_is_rejected() {
        let mut config = Config::default();
        config.templates.push(TemplateEntry {
            channel: Channel::Speech,
            role: "label".into(),
            context: Context::Focused,
            placement: Placement::Main,
            template: "name +".into(),
        });
        assert!(matches!(
            config.template_registry(),
            Err(EngineError::MalformedTemplate { .. })
        ));
    }

    #[test]
    fn test_replace_hook_needs_text() {
        let mut config = Config::default();
        config.scripts.push(ScriptConfig {
            name: "gedit".into(),
            kind: ScriptKind::Application,
            templates: Vec::new(),
            hooks: vec![HookConfig {
                attribute: "roleName".into(),
                role: None,
                action: HookAction::Replace,
                text: None,
            }],
        });
        assert!(matches!(config.script_registry(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_preferences_reach_the_resolver() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let resolver = config.attribute_resolver();
        assert!(resolver.is_known("verbosity"));
        assert!(resolver.is_known("speakDescription"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::from_toml_str(SAMPLE).unwrap();
        config.save_to_path(path.clone()).unwrap();
        assert_eq!(Config::load_from_path(path), config);
    }

    #[test]
    fn test_missing_or_broken_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Config::load_from_path(dir.path().join("absent.toml")), Config::default());

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[[templates]\n").unwrap();
        assert_eq!(Config::load_from_path(broken), Config::default());
    }

    #[test]
    fn test_explicit_path_reports_schema_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::read_from_path(&dir.path().join("absent.toml")),
            Err(EngineError::Io(_))
        ));

        let misspelled = dir.path().join("misspelled.toml");
        std::fs::write(
            &misspelled,
            "[[templates]]\nchannel = \"speech\"\ncontext = \"focussed\"\ntemplate = \"name\"\n",
        )
        .unwrap();
        assert!(matches!(Config::read_from_path(&misspelled), Err(EngineError::Toml(_))));

        let good = dir.path().join("good.toml");
        std::fs::write(&good, SAMPLE).unwrap();
        assert_eq!(Config::read_from_path(&good).unwrap(), Config::from_toml_str(SAMPLE).unwrap());
    }
}
