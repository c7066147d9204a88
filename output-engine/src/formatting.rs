//! Built-in presentation tables.
//!
//! This module holds everything the engine says or shows that is not read from
//! the accessible tree:
//! - state indicator strings per channel ("checked" in speech, `<x>` in braille)
//! - number formats (position in set, heading level, percentages)
//! - the default template table every registry starts from
//! - the default prefix and suffix templates wrapped around it

use crate::roles::GENERIC_ROLE_KEY;
use crate::types::{Channel, Context};

/// A state indicator the resolver can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    Checked,
    NotChecked,
    PartiallyChecked,
    Pressed,
    NotPressed,
    Expanded,
    Collapsed,
    Selected,
    NotSelected,
    Required,
    ReadOnly,
    Invalid,
    Unavailable,
}

/// Returns the string shown for a state indicator on a channel.
///
/// # Examples
///
/// ```
/// use output_engine::formatting::{indicator, Indicator};
/// use output_engine::Channel;
///
/// assert_eq!(indicator(Channel::Speech, Indicator::Checked), "checked");
/// assert_eq!(indicator(Channel::Braille, Indicator::Checked), "<x>");
/// ```
pub fn indicator(channel: Channel, which: Indicator) -> &'static str {
    use Indicator::*;
    match channel {
        Channel::Speech => match which {
            Checked => "checked",
            NotChecked => "not checked",
            PartiallyChecked => "partially checked",
            Pressed => "pressed",
            NotPressed => "not pressed",
            Expanded => "expanded",
            Collapsed => "collapsed",
            Selected => "selected",
            NotSelected => "not selected",
            Required => "required",
            ReadOnly => "read only",
            Invalid => "invalid entry",
            Unavailable => "grayed",
        },
        Channel::Braille => match which {
            Checked => "<x>",
            NotChecked => "< >",
            PartiallyChecked => "<->",
            Pressed => "=x",
            NotPressed => "= ",
            Expanded => "-",
            Collapsed => "+",
            Selected => "(x)",
            NotSelected => "( )",
            Required => "REQ",
            ReadOnly => "RO",
            Invalid => "INV",
            Unavailable => "dim",
        },
    }
}

/// "3 of 5" in speech, "3/5" in braille.
pub fn position(channel: Channel, index: usize, total: usize) -> String {
    match channel {
        Channel::Speech => format!("{} of {}", index, total),
        Channel::Braille => format!("{}/{}", index, total),
    }
}

/// Number of children of a container.
pub fn item_count(channel: Channel, count: usize) -> String {
    match (channel, count) {
        (Channel::Speech, 1) => "1 item".to_string(),
        (Channel::Speech, n) => format!("{} items", n),
        (Channel::Braille, n) => format!("({})", n),
    }
}

/// Heading or tree level.
pub fn level(channel: Channel, level: i64) -> String {
    match channel {
        Channel::Speech => format!("level {}", level),
        Channel::Braille => format!("h{}", level),
    }
}

/// Percentage of a range widget.
pub fn percentage(channel: Channel, percent: &str) -> String {
    match channel {
        Channel::Speech => format!("{} percent", percent),
        Channel::Braille => format!("{}%", percent),
    }
}

/// Template every role ends up with when nothing else matches.
pub const MINIMAL_TEMPLATE: &str = "name + roleName";

/// Default templates: (channel, role key, context, expression).
pub const DEFAULT_TEMPLATES: &[(Channel, &str, Context, &str)] = &[
    // Speech, generic role
    (Channel::Speech, GENERIC_ROLE_KEY, Context::Focused, "labelOrName + roleName + stateList + availability"),
    (Channel::Speech, GENERIC_ROLE_KEY, Context::Unfocused, "labelOrName + roleName + stateList + availability"),
    (Channel::Speech, GENERIC_ROLE_KEY, Context::Ancestor, "labelOrName + roleName"),
    (Channel::Speech, GENERIC_ROLE_KEY, Context::BasicStatus, "labelOrName + roleName + stateList + positionInSet + accelerator"),
    (Channel::Speech, GENERIC_ROLE_KEY, Context::DetailedStatus, "ancestors + labelOrName + roleName + stateList + positionInSet + description + accelerator"),
    (Channel::Speech, GENERIC_ROLE_KEY, Context::StateChanged, "expandableState or checkedState or selectedState or stateList"),
    (Channel::Speech, GENERIC_ROLE_KEY, Context::ValueChanged, "value or text"),
    (Channel::Speech, GENERIC_ROLE_KEY, Context::NameChanged, "name"),
    // Speech, specific roles
    (Channel::Speech, "alert", Context::Unfocused, "labelOrName + roleName + (text or description)"),
    (Channel::Speech, "check-box", Context::Focused, "labelOrName + roleName + checkedState + required + invalid + availability"),
    (Channel::Speech, "check-box", Context::StateChanged, "checkedState"),
    (Channel::Speech, "check-menu-item", Context::Focused, "labelOrName + roleName + checkedState + accelerator + positionInSet + availability"),
    (Channel::Speech, "check-menu-item", Context::StateChanged, "checkedState"),
    (Channel::Speech, "combo-box", Context::Focused, "labelAndName + roleName + expandableState + availability"),
    (Channel::Speech, "dialog", Context::Unfocused, "labelOrName + roleName + description"),
    (Channel::Speech, "entry", Context::Focused, "label + roleName + (text or placeholderText) + required + invalid + readOnly + availability"),
    (Channel::Speech, "entry", Context::ValueChanged, "text"),
    (Channel::Speech, "frame", Context::Unfocused, "labelOrName + roleName"),
    (Channel::Speech, "heading", Context::Focused, "labelOrName + roleName + level"),
    (Channel::Speech, "image", Context::Focused, "labelOrName + roleName + description"),
    (Channel::Speech, "label", Context::Unfocused, "name or text"),
    (Channel::Speech, "link", Context::Focused, "name + roleName"),
    (Channel::Speech, "list-item", Context::Focused, "labelOrName + expandableState + level + positionInSet"),
    (Channel::Speech, "menu", Context::Focused, "labelOrName + roleName + accelerator + positionInSet + availability"),
    (Channel::Speech, "menu-item", Context::Focused, "labelOrName + expandableState + accelerator + positionInSet + availability"),
    (Channel::Speech, "page-tab", Context::Focused, "labelOrName + roleName + positionInSet"),
    (Channel::Speech, "paragraph", Context::Unfocused, "text"),
    (Channel::Speech, "password-text", Context::Focused, "label + roleName + required + availability"),
    (Channel::Speech, "progress-bar", Context::Unfocused, "labelOrName + roleName + percentage"),
    (Channel::Speech, "progress-bar", Context::ValueChanged, "percentage"),
    (Channel::Speech, "push-button", Context::Focused, "labelOrName + roleName + expandableState + availability + accelerator"),
    (Channel::Speech, "radio-button", Context::Focused, "labelOrName + roleName + selectedState + positionInSet + availability"),
    (Channel::Speech, "radio-button", Context::StateChanged, "selectedState"),
    (Channel::Speech, "radio-menu-item", Context::Focused, "labelOrName + roleName + selectedState + accelerator + positionInSet + availability"),
    (Channel::Speech, "radio-menu-item", Context::StateChanged, "selectedState"),
    (Channel::Speech, "separator", Context::Unfocused, "roleName"),
    (Channel::Speech, "slider", Context::Focused, "labelOrName + roleName + value + availability"),
    (Channel::Speech, "spin-button", Context::Focused, "labelOrName + roleName + value + required + availability"),
    (Channel::Speech, "status-bar", Context::Unfocused, "labelOrName + roleName + text"),
    (Channel::Speech, "table-cell", Context::Focused, "(text or labelOrName) + selectedState"),
    (Channel::Speech, "text", Context::Focused, "label + roleName + (text or placeholderText) + readOnly"),
    (Channel::Speech, "toggle-button", Context::Focused, "labelOrName + roleName + checkedState + availability"),
    (Channel::Speech, "toggle-button", Context::StateChanged, "checkedState"),
    (Channel::Speech, "tree-table", Context::Focused, "labelOrName + roleName + itemCount"),
    // Braille, generic role
    (Channel::Braille, GENERIC_ROLE_KEY, Context::Focused, "labelOrName + roleName + stateList"),
    (Channel::Braille, GENERIC_ROLE_KEY, Context::Unfocused, "labelOrName + roleName + stateList"),
    (Channel::Braille, GENERIC_ROLE_KEY, Context::Ancestor, "labelOrName"),
    (Channel::Braille, GENERIC_ROLE_KEY, Context::StateChanged, "checkedState + labelOrName + roleName"),
    (Channel::Braille, GENERIC_ROLE_KEY, Context::ValueChanged, "labelOrName + (value or text) + roleName"),
    // Braille, specific roles
    (Channel::Braille, "check-box", Context::Unfocused, "checkedState + labelOrName + roleName"),
    (Channel::Braille, "check-menu-item", Context::Unfocused, "checkedState + labelOrName + roleName + accelerator"),
    (Channel::Braille, "combo-box", Context::Unfocused, "labelAndName + roleName"),
    (Channel::Braille, "entry", Context::Unfocused, "label + (text or placeholderText)"),
    (Channel::Braille, "heading", Context::Unfocused, "labelOrName + roleName + level"),
    (Channel::Braille, "label", Context::Unfocused, "name or text"),
    (Channel::Braille, "link", Context::Unfocused, "name + roleName"),
    (Channel::Braille, "list-item", Context::Unfocused, "labelOrName + expandableState"),
    (Channel::Braille, "menu-item", Context::Unfocused, "labelOrName + expandableState + accelerator"),
    (Channel::Braille, "paragraph", Context::Unfocused, "text"),
    (Channel::Braille, "progress-bar", Context::Unfocused, "labelOrName + percentage + roleName"),
    (Channel::Braille, "push-button", Context::Unfocused, "labelOrName + roleName"),
    (Channel::Braille, "radio-button", Context::Unfocused, "selectedState + labelOrName + roleName"),
    (Channel::Braille, "radio-menu-item", Context::Unfocused, "selectedState + labelOrName + roleName + accelerator"),
    (Channel::Braille, "slider", Context::Unfocused, "labelOrName + value + roleName"),
    (Channel::Braille, "spin-button", Context::Unfocused, "labelOrName + value + roleName"),
    (Channel::Braille, "text", Context::Unfocused, "label + (text or placeholderText)"),
    (Channel::Braille, "toggle-button", Context::Unfocused, "checkedState + labelOrName + roleName"),
];

/// Default prefix templates: (channel, context, expression).
pub const DEFAULT_PREFIXES: &[(Channel, Context, &str)] = &[
    (Channel::Braille, Context::Focused, "ancestors"),
    (Channel::Braille, Context::Unfocused, "ancestors"),
    (Channel::Speech, Context::DetailedStatus, "applicationName"),
];

/// Default suffix templates: (channel, context, expression).
pub const DEFAULT_SUFFIXES: &[(Channel, Context, &str)] = &[
    (Channel::Speech, Context::Focused, "speakDescription and description"),
    (Channel::Speech, Context::BasicStatus, "speakDescription and description"),
];
