//! Template registry with layered fallback.
//!
//! A template is a parsed expression registered under a
//! `(channel, role, context)` key. Templates live in layers: each script in
//! the active chain may carry a partial [`TemplateSet`], and the registry owns
//! the default layer underneath them all.
//!
//! Lookup walks a fixed fallback order, scanning every layer at each step
//! before relaxing the key:
//!
//! 1. the exact key
//! 2. the related context (`ancestor` → `focused`, `detailed-status` → `basic-status`)
//! 3. the role's default context (`unfocused`)
//! 4. the generic role in the requested, then related, context
//! 5. the generic role's default context
//! 6. the built-in minimal template `name + roleName`
//!
//! Lookup therefore never fails.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::attributes::AttributeResolver;
use crate::expression::{parse, Expr};
use crate::formatting::{DEFAULT_PREFIXES, DEFAULT_SUFFIXES, DEFAULT_TEMPLATES, MINIMAL_TEMPLATE};
use crate::roles::{Role, GENERIC_ROLE_KEY};
use crate::script::{ScriptChain, ScriptRegistry};
use crate::types::{Channel, Context, EngineError};

/// Registry key of one template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub channel: Channel,
    pub role: String,
    pub context: Context,
}

impl TemplateKey {
    pub fn new(channel: Channel, role: impl Into<String>, context: Context) -> Self {
        Self {
            channel,
            role: role.into(),
            context,
        }
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.channel, self.role, self.context)
    }
}

/// A parsed template together with its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub source: String,
    pub expr: Expr,
}

impl Template {
    fn parse(key: &TemplateKey, source: &str) -> Result<Self, EngineError> {
        let expr = parse(source).map_err(|err| EngineError::MalformedTemplate {
            channel: key.channel,
            role: key.role.clone(),
            context: key.context,
            message: err.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }
}

/// Which layer supplied a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateOrigin {
    /// A script in the chain, by name
    Script(String),
    /// The registry's default layer
    Registry,
    /// The built-in minimal template
    Fallback,
}

/// Result of a template lookup.
#[derive(Debug, Clone)]
pub struct TemplateMatch {
    pub template: Arc<Template>,
    pub origin: TemplateOrigin,
}

/// One layer of templates, prefixes and suffixes.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    entries: HashMap<TemplateKey, Arc<Template>>,
    prefixes: HashMap<(Channel, Context), Arc<Template>>,
    suffixes: HashMap<(Channel, Context), Arc<Template>>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and registers a template, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::MalformedTemplate` naming the key when the
    /// expression does not parse.
    pub fn insert(
        &mut self,
        channel: Channel,
        role: &str,
        context: Context,
        source: &str,
    ) -> Result<(), EngineError> {
        let key = TemplateKey::new(channel, role, context);
        let template = Template::parse(&key, source)?;
        self.entries.insert(key, Arc::new(template));
        Ok(())
    }

    /// Registers the expression evaluated before the main template.
    pub fn insert_prefix(&mut self, channel: Channel, context: Context, source: &str) -> Result<(), EngineError> {
        let template = Template::parse(&TemplateKey::new(channel, "prefix", context), source)?;
        self.prefixes.insert((channel, context), Arc::new(template));
        Ok(())
    }

    /// Registers the expression evaluated after the main template.
    pub fn insert_suffix(&mut self, channel: Channel, context: Context, source: &str) -> Result<(), EngineError> {
        let template = Template::parse(&TemplateKey::new(channel, "suffix", context), source)?;
        self.suffixes.insert((channel, context), Arc::new(template));
        Ok(())
    }

    pub fn get(&self, key: &TemplateKey) -> Option<&Arc<Template>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.prefixes.len() + self.suffixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All templates of the layer with a printable key, prefixes and suffixes included.
    fn labelled(&self) -> Vec<(String, &Arc<Template>)> {
        let mut all: Vec<(String, &Arc<Template>)> = self
            .entries
            .iter()
            .map(|(key, t)| (key.to_string(), t))
            .collect();
        all.extend(
            self.prefixes
                .iter()
                .map(|((channel, context), t)| (format!("prefix ({}, {})", channel, context), t)),
        );
        all.extend(
            self.suffixes
                .iter()
                .map(|((channel, context), t)| (format!("suffix ({}, {})", channel, context), t)),
        );
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

/// A template that names attributes nothing can resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Layer the template lives in ("registry" or a script name)
    pub layer: String,
    /// Printable template key
    pub template: String,
    pub unknown: Vec<String>,
}

/// The default template layer plus the lookup policy over script chains.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    defaults: TemplateSet,
    minimal: Arc<Template>,
    diagnostics: Vec<Diagnostic>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl TemplateRegistry {
    /// Creates a registry whose default layer is empty.
    pub fn empty() -> Self {
        let minimal = Template {
            source: MINIMAL_TEMPLATE.to_string(),
            expr: Expr::Concat(
                Box::new(Expr::Attr("name".to_string())),
                Box::new(Expr::Attr("roleName".to_string())),
            ),
        };
        Self {
            defaults: TemplateSet::new(),
            minimal: Arc::new(minimal),
            diagnostics: Vec::new(),
        }
    }

    /// Creates a registry loaded with the built-in default tables.
    pub fn with_defaults() -> Result<Self, EngineError> {
        let mut registry = Self::empty();
        for (channel, role, context, source) in DEFAULT_TEMPLATES {
            registry.defaults.insert(*channel, role, *context, source)?;
        }
        for (channel, context, source) in DEFAULT_PREFIXES {
            registry.defaults.insert_prefix(*channel, *context, source)?;
        }
        for (channel, context, source) in DEFAULT_SUFFIXES {
            registry.defaults.insert_suffix(*channel, *context, source)?;
        }
        Ok(registry)
    }

    /// Registers a template in the default layer.
    pub fn insert(
        &mut self,
        channel: Channel,
        role: &str,
        context: Context,
        source: &str,
    ) -> Result<(), EngineError> {
        self.defaults.insert(channel, role, context, source)
    }

    /// The built-in minimal template, `name + roleName`.
    pub fn minimal(&self) -> &Arc<Template> {
        &self.minimal
    }

    /// The registry's own layer.
    pub fn defaults(&self) -> &TemplateSet {
        &self.defaults
    }

    /// Mutable access to the registry's own layer.
    pub fn defaults_mut(&mut self) -> &mut TemplateSet {
        &mut self.defaults
    }

    /// Finds the template for `(channel, role, context)` through the chain.
    ///
    /// # Examples
    ///
    /// ```
    /// use output_engine::{Channel, Context, Role, ScriptChain, TemplateOrigin, TemplateRegistry};
    ///
    /// let registry = TemplateRegistry::empty();
    /// let found = registry.lookup(
    ///     &ScriptChain::default(),
    ///     Channel::Speech,
    ///     &Role::Other("widget-42".into()),
    ///     Context::Focused,
    /// );
    /// assert_eq!(found.origin, TemplateOrigin::Fallback);
    /// assert_eq!(found.template.source, "name + roleName");
    /// ```
    pub fn lookup(&self, chain: &ScriptChain, channel: Channel, role: &Role, context: Context) -> TemplateMatch {
        let role_key = role.key();
        let mut role_keys = vec![role_key];
        if role_key != GENERIC_ROLE_KEY {
            role_keys.push(GENERIC_ROLE_KEY);
        }
        let mut contexts = vec![context];
        contexts.extend(context.related());
        if !contexts.contains(&Context::DEFAULT) {
            contexts.push(Context::DEFAULT);
        }

        for role_key in &role_keys {
            for ctx in &contexts {
                let key = TemplateKey::new(channel, *role_key, *ctx);
                if let Some(found) = self.find(chain, |set| set.get(&key)) {
                    return found;
                }
            }
        }

        log::warn!(
            "[TEMPLATES] No template for ({}, {}, {}); using minimal fallback",
            channel,
            role_key,
            context
        );
        TemplateMatch {
            template: Arc::clone(&self.minimal),
            origin: TemplateOrigin::Fallback,
        }
    }

    /// Finds the prefix expression for `(channel, context)`, if any layer has one.
    pub fn prefix(&self, chain: &ScriptChain, channel: Channel, context: Context) -> Option<TemplateMatch> {
        self.find(chain, |set| set.prefixes.get(&(channel, context)))
    }

    /// Finds the suffix expression for `(channel, context)`, if any layer has one.
    pub fn suffix(&self, chain: &ScriptChain, channel: Channel, context: Context) -> Option<TemplateMatch> {
        self.find(chain, |set| set.suffixes.get(&(channel, context)))
    }

    fn find<'a, F>(&'a self, chain: &'a ScriptChain, get: F) -> Option<TemplateMatch>
    where
        F: Fn(&'a TemplateSet) -> Option<&'a Arc<Template>>,
    {
        for script in chain.iter() {
            if let Some(template) = get(script.templates()) {
                return Some(TemplateMatch {
                    template: Arc::clone(template),
                    origin: TemplateOrigin::Script(script.name().to_string()),
                });
            }
        }
        get(&self.defaults).map(|template| TemplateMatch {
            template: Arc::clone(template),
            origin: TemplateOrigin::Registry,
        })
    }

    /// Reports templates naming attributes the resolver does not know.
    ///
    /// Each offending template is logged once and recorded in
    /// [`TemplateRegistry::diagnostics`]. Unknown names still evaluate (to
    /// nothing) at runtime.
    pub fn check_attributes(&mut self, resolver: &AttributeResolver, scripts: &ScriptRegistry) {
        let mut found = Vec::new();
        let mut layers: Vec<(String, &TemplateSet)> = vec![("registry".to_string(), &self.defaults)];
        layers.extend(
            scripts
                .scripts()
                .map(|script| (script.name().to_string(), script.templates())),
        );
        for (layer, set) in layers {
            for (label, template) in set.labelled() {
                let unknown: Vec<String> = template
                    .expr
                    .names()
                    .into_iter()
                    .filter(|name| !resolver.is_known(name))
                    .map(str::to_string)
                    .collect();
                if unknown.is_empty() {
                    continue;
                }
                let diagnostic = Diagnostic {
                    layer: layer.clone(),
                    template: label,
                    unknown,
                };
                if !self.diagnostics.contains(&diagnostic) {
                    log::warn!(
                        "[TEMPLATES] {} template {} names unknown attributes: {}",
                        diagnostic.layer,
                        diagnostic.template,
                        diagnostic.unknown.join(", ")
                    );
                    found.push(diagnostic);
                }
            }
        }
        self.diagnostics.extend(found);
    }

    /// Templates reported by [`TemplateRegistry::check_attributes`].
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}
