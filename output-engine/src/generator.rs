//! One generation pass: object → template → output units.
//!
//! A pass looks up the template for the target's role and the requested
//! context, evaluates it (wrapped in the context prefix and suffix when asked
//! for) against a cache that lives only as long as the request, and tags every
//! fragment with the object it describes.

use std::sync::Arc;

use crate::accessible::AccessibleTree;
use crate::attributes::{AttributeResolver, AttributeScope};
use crate::cache::ObjectCache;
use crate::expression::AttributeSource;
use crate::roles::Role;
use crate::script::{Hook, ScriptChain};
use crate::templates::{Template, TemplateOrigin, TemplateRegistry};
use crate::types::{Channel, Context, Fragment, ObjectId, OutputUnit, Value, Voice};

/// Everything one generation pass needs, including its private cache.
#[derive(Debug)]
pub struct GenerationRequest {
    pub target: ObjectId,
    pub channel: Channel,
    pub context: Context,
    /// Evaluate the prefix and suffix templates around the main one
    pub include_context: bool,
    /// Focus epoch the request was issued under
    pub epoch: u64,
    cache: ObjectCache,
}

impl GenerationRequest {
    pub fn new(target: ObjectId, channel: Channel, context: Context) -> Self {
        Self {
            target,
            channel,
            context,
            include_context: true,
            epoch: 0,
            cache: ObjectCache::new(),
        }
    }

    pub fn with_context(mut self, include_context: bool) -> Self {
        self.include_context = include_context;
        self
    }

    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }
}

/// Output of one generation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub target: ObjectId,
    pub channel: Channel,
    pub context: Context,
    pub epoch: u64,
    /// Layer that supplied the main template; `None` when the target was stale
    pub origin: Option<TemplateOrigin>,
    pub units: Vec<OutputUnit>,
}

impl Generated {
    /// Unit texts in order.
    pub fn texts(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.text.as_str()).collect()
    }
}

/// Attribute source for one request: script hooks first, then the resolver.
struct RequestSource<'a> {
    tree: &'a dyn AccessibleTree,
    resolver: &'a AttributeResolver,
    chain: &'a ScriptChain,
    object: ObjectId,
    role: &'a Role,
    channel: Channel,
    cache: &'a mut ObjectCache,
}

impl AttributeSource for RequestSource<'_> {
    fn subject(&self) -> ObjectId {
        self.object
    }

    fn resolve(&mut self, name: &str) -> Value {
        if let Some(hook) = self.chain.hook(name, self.role.key()) {
            return match hook {
                Hook::Skip => Value::NotApplicable,
                Hook::Replace(text) => Value::Text(text.clone()),
            };
        }
        let scope = AttributeScope::new(self.tree, self.object, self.channel);
        self.resolver.resolve(&scope, name, self.cache)
    }

    fn voice(&self, name: &str) -> Voice {
        let voice = self.resolver.voice(name);
        if voice == Voice::Default && *self.role == Role::Link && matches!(name, "name" | "labelOrName") {
            return Voice::Hyperlink;
        }
        voice
    }
}

/// Turns objects into output units.
#[derive(Clone)]
pub struct OutputGenerator {
    templates: Arc<TemplateRegistry>,
    resolver: Arc<AttributeResolver>,
}

impl OutputGenerator {
    pub fn new(templates: Arc<TemplateRegistry>, resolver: Arc<AttributeResolver>) -> Self {
        Self {
            templates,
            resolver,
        }
    }

    pub fn templates(&self) -> &Arc<TemplateRegistry> {
        &self.templates
    }

    pub fn resolver(&self) -> &Arc<AttributeResolver> {
        &self.resolver
    }

    /// Runs one generation pass.
    ///
    /// A stale target produces no units. Otherwise the result is never empty
    /// as long as the object has a name or a role: when the selected template
    /// yields nothing, the minimal template is evaluated instead.
    pub fn generate(
        &self,
        tree: &dyn AccessibleTree,
        chain: &ScriptChain,
        mut request: GenerationRequest,
    ) -> Generated {
        let mut generated = Generated {
            target: request.target,
            channel: request.channel,
            context: request.context,
            epoch: request.epoch,
            origin: None,
            units: Vec::new(),
        };
        let role = match tree.role(request.target) {
            Ok(role) => role,
            Err(err) => {
                log::debug!("[GENERATOR] Nothing to present: {}", err);
                return generated;
            }
        };

        let found = self
            .templates
            .lookup(chain, request.channel, &role, request.context);
        let mut source = RequestSource {
            tree,
            resolver: &self.resolver,
            chain,
            object: request.target,
            role: &role,
            channel: request.channel,
            cache: &mut request.cache,
        };

        let mut main = found.template.expr.evaluate(&mut source).fragments;
        if main.is_empty() && found.origin != TemplateOrigin::Fallback {
            log::debug!(
                "[GENERATOR] Template '{}' produced nothing for {}; using minimal template",
                found.template.source,
                request.target
            );
            main = evaluate(&self.templates.minimal(), &mut source);
        }

        let mut fragments = Vec::new();
        if request.include_context {
            if let Some(prefix) = self.templates.prefix(chain, request.channel, request.context) {
                fragments.extend(evaluate(&prefix.template, &mut source));
            }
        }
        fragments.extend(main);
        if request.include_context {
            if let Some(suffix) = self.templates.suffix(chain, request.channel, request.context) {
                fragments.extend(evaluate(&suffix.template, &mut source));
            }
        }

        generated.units = to_units(fragments, request.channel, request.target);
        generated.origin = Some(found.origin);
        log::debug!(
            "[GENERATOR] {} {} {} → {} unit(s), cache {} hit(s) / {} miss(es)",
            request.channel,
            request.context,
            request.target,
            generated.units.len(),
            request.cache.hits(),
            request.cache.misses()
        );
        generated
    }
}

fn evaluate(template: &Template, source: &mut dyn AttributeSource) -> Vec<Fragment> {
    template.expr.evaluate(source).fragments
}

fn is_shouted(text: &str) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() > 1 && letters.iter().all(|c| c.is_uppercase())
}

fn to_units(fragments: Vec<Fragment>, channel: Channel, target: ObjectId) -> Vec<OutputUnit> {
    let mut focus_placed = false;
    fragments
        .into_iter()
        .map(|fragment| {
            let focused = !focus_placed && fragment.source == target;
            focus_placed |= focused;
            let voice = if channel == Channel::Speech
                && fragment.voice == Voice::Default
                && is_shouted(&fragment.text)
            {
                Voice::Uppercase
            } else {
                fragment.voice
            };
            OutputUnit {
                text: fragment.text,
                channel,
                source: fragment.source,
                focused,
                voice,
            }
        })
        .collect()
}
