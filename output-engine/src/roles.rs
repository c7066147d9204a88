//! Role constants and role-name tables.
//!
//! Roles form an open set: the toolkits in the wild report roles the engine
//! has never heard of, so `Role::Other` carries those verbatim. Each known
//! role has a stable key (used in template tables), a spoken name, and a
//! short braille abbreviation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Template key of the generic role every role falls back to.
pub const GENERIC_ROLE_KEY: &str = "default";

/// Role of an accessible object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Alert,
    Application,
    CheckBox,
    CheckMenuItem,
    ComboBox,
    DesktopFrame,
    Dialog,
    DocumentFrame,
    Entry,
    Filler,
    Frame,
    Heading,
    Icon,
    Image,
    Label,
    Link,
    List,
    ListItem,
    Menu,
    MenuBar,
    MenuItem,
    PageTab,
    PageTabList,
    Panel,
    Paragraph,
    PasswordText,
    ProgressBar,
    PushButton,
    RadioButton,
    RadioMenuItem,
    ScrollBar,
    Section,
    Separator,
    Slider,
    SpinButton,
    StatusBar,
    Table,
    TableCell,
    Text,
    ToggleButton,
    ToolBar,
    ToolTip,
    Tree,
    TreeTable,
    Window,
    /// The toolkit reported no usable role
    Unknown,
    /// A role outside the known set, keyed by its reported name
    Other(String),
}

/// Known roles: (role, template key, spoken name, braille abbreviation).
const ROLE_NAMES: &[(Role, &str, &str, &str)] = &[
    (Role::Alert, "alert", "alert", "alrt"),
    (Role::Application, "application", "application", "app"),
    (Role::CheckBox, "check-box", "check box", "chk"),
    (Role::CheckMenuItem, "check-menu-item", "check menu item", "chk"),
    (Role::ComboBox, "combo-box", "combo box", "cbo"),
    (Role::DesktopFrame, "desktop-frame", "desktop frame", "frm"),
    (Role::Dialog, "dialog", "dialog", "dlg"),
    (Role::DocumentFrame, "document-frame", "document", "html"),
    (Role::Entry, "entry", "entry", "txt"),
    (Role::Filler, "filler", "filler", "flr"),
    (Role::Frame, "frame", "frame", "frm"),
    (Role::Heading, "heading", "heading", "hdng"),
    (Role::Icon, "icon", "icon", "icn"),
    (Role::Image, "image", "image", "img"),
    (Role::Label, "label", "label", "lbl"),
    (Role::Link, "link", "link", "lnk"),
    (Role::List, "list", "list", "lst"),
    (Role::ListItem, "list-item", "list item", "lstitm"),
    (Role::Menu, "menu", "menu", "mnu"),
    (Role::MenuBar, "menu-bar", "menu bar", "mnubr"),
    (Role::MenuItem, "menu-item", "menu item", "mnuitm"),
    (Role::PageTab, "page-tab", "page tab", "pgt"),
    (Role::PageTabList, "page-tab-list", "page tab list", "tblst"),
    (Role::Panel, "panel", "panel", "pnl"),
    (Role::Paragraph, "paragraph", "paragraph", "para"),
    (Role::PasswordText, "password-text", "password text", "pwd"),
    (Role::ProgressBar, "progress-bar", "progress bar", "pgbar"),
    (Role::PushButton, "push-button", "push button", "btn"),
    (Role::RadioButton, "radio-button", "radio button", "radio"),
    (Role::RadioMenuItem, "radio-menu-item", "radio menu item", "rdmnuitm"),
    (Role::ScrollBar, "scroll-bar", "scroll bar", "scbr"),
    (Role::Section, "section", "section", "sctn"),
    (Role::Separator, "separator", "separator", "seprtr"),
    (Role::Slider, "slider", "slider", "sldr"),
    (Role::SpinButton, "spin-button", "spin button", "spin"),
    (Role::StatusBar, "status-bar", "status bar", "statbr"),
    (Role::Table, "table", "table", "tbl"),
    (Role::TableCell, "table-cell", "table cell", "cll"),
    (Role::Text, "text", "text", "txt"),
    (Role::ToggleButton, "toggle-button", "toggle button", "tglbtn"),
    (Role::ToolBar, "tool-bar", "tool bar", "tbar"),
    (Role::ToolTip, "tool-tip", "tool tip", "tip"),
    (Role::Tree, "tree", "tree", "tre"),
    (Role::TreeTable, "tree-table", "tree table", "trtbl"),
    (Role::Window, "window", "window", "wnd"),
    (Role::Unknown, "unknown", "unknown", "unk"),
];

/// Roles that only group other objects and are skipped when listing ancestors.
pub const LAYOUT_ROLES: &[Role] = &[
    Role::Application,
    Role::DesktopFrame,
    Role::Filler,
    Role::Panel,
    Role::Section,
    Role::Unknown,
];

impl Role {
    fn entry(&self) -> Option<&'static (Role, &'static str, &'static str, &'static str)> {
        ROLE_NAMES.iter().find(|(role, ..)| role == self)
    }

    /// Parses a role from its template key.
    ///
    /// Keys outside the known set become `Role::Other`, and an empty key is
    /// `Role::Unknown`.
    ///
    /// # Examples
    ///
    /// ```
    /// use output_engine::Role;
    ///
    /// assert_eq!(Role::from_key("check-box"), Role::CheckBox);
    /// assert_eq!(Role::from_key("widget-42"), Role::Other("widget-42".into()));
    /// assert_eq!(Role::from_key(""), Role::Unknown);
    /// ```
    pub fn from_key(key: &str) -> Role {
        if key.is_empty() {
            return Role::Unknown;
        }
        ROLE_NAMES
            .iter()
            .find(|(_, k, ..)| *k == key)
            .map(|(role, ..)| role.clone())
            .unwrap_or_else(|| Role::Other(key.to_string()))
    }

    /// Returns the key templates are registered under.
    pub fn key(&self) -> &str {
        match self {
            Role::Other(name) => name,
            known => known.entry().map(|(_, key, ..)| *key).unwrap_or("unknown"),
        }
    }

    /// Returns the spoken role name.
    ///
    /// # Examples
    ///
    /// ```
    /// use output_engine::Role;
    ///
    /// assert_eq!(Role::CheckBox.speech_name(), "check box");
    /// assert_eq!(Role::Other("widget-42".into()).speech_name(), "widget-42");
    /// ```
    pub fn speech_name(&self) -> &str {
        match self {
            Role::Other(name) => name,
            known => known
                .entry()
                .map(|(_, _, speech, _)| *speech)
                .unwrap_or("unknown"),
        }
    }

    /// Returns the short role name shown on a braille display.
    pub fn braille_name(&self) -> &str {
        match self {
            Role::Other(name) => name,
            known => known
                .entry()
                .map(|(_, _, _, braille)| *braille)
                .unwrap_or("unk"),
        }
    }

    /// Whether the role only groups other objects.
    pub fn is_layout_only(&self) -> bool {
        LAYOUT_ROLES.contains(self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl From<String> for Role {
    fn from(key: String) -> Self {
        Role::from_key(&key)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.key().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ============================================================================
    // Unit Tests for the role table
    // ============================================================================

    #[test]
    fn test_role_keys_are_unique() {
        let mut keys: Vec<&str> = ROLE_NAMES.iter().map(|(_, k, ..)| *k).collect();
        keys.sort_unstable();
        let before = keys.len();
        keys.dedup();
        assert_eq!(keys.len(), before);
    }

    #[test]
    fn test_every_known_role_round_trips_through_its_key() {
        for (role, key, ..) in ROLE_NAMES {
            assert_eq!(role.key(), *key);
            assert_eq!(&Role::from_key(key), role);
        }
    }

    #[test]
    fn test_generic_key_is_not_a_known_role() {
        assert_eq!(
            Role::from_key(GENERIC_ROLE_KEY),
            Role::Other(GENERIC_ROLE_KEY.to_string())
        );
    }

    // ============================================================================
    // Unit Tests for role names
    // ============================================================================

    #[test]
    fn test_speech_names() {
        assert_eq!(Role::PushButton.speech_name(), "push button");
        assert_eq!(Role::CheckBox.speech_name(), "check box");
        assert_eq!(Role::DocumentFrame.speech_name(), "document");
        assert_eq!(Role::Unknown.speech_name(), "unknown");
    }

    #[test]
    fn test_braille_abbreviations() {
        assert_eq!(Role::CheckBox.braille_name(), "chk");
        assert_eq!(Role::PushButton.braille_name(), "btn");
        assert_eq!(Role::ComboBox.braille_name(), "cbo");
        assert_eq!(Role::Heading.braille_name(), "hdng");
        assert_eq!(Role::Link.braille_name(), "lnk");
        assert_eq!(Role::Other("gauge".into()).braille_name(), "gauge");
    }

    #[test]
    fn test_layout_roles() {
        assert!(Role::Filler.is_layout_only());
        assert!(Role::Panel.is_layout_only());
        assert!(!Role::Dialog.is_layout_only());
        assert!(!Role::Other("panel-ish".into()).is_layout_only());
    }

    #[test]
    fn test_role_serde_uses_key() {
        let json = serde_json::to_string(&Role::RadioButton).unwrap();
        assert_eq!(json, "\"radio-button\"");
        let role: Role = serde_json::from_str("\"widget-42\"").unwrap();
        assert_eq!(role, Role::Other("widget-42".into()));
    }

    // ============================================================================
    // Property Tests
    // ============================================================================

    proptest! {
        /// Any non-empty key survives a parse and re-key unchanged.
        #[test]
        fn prop_key_round_trip(key in "[a-z][a-z0-9-]{0,15}") {
            let role = Role::from_key(&key);
            prop_assert_eq!(role.key(), key.as_str());
        }

        /// Every role has a non-empty spoken and braille name.
        #[test]
        fn prop_names_never_empty(key in "[a-z][a-z0-9-]{0,15}") {
            let role = Role::from_key(&key);
            prop_assert!(!role.speech_name().is_empty());
            prop_assert!(!role.braille_name().is_empty());
        }
    }
}
