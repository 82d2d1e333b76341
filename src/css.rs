//! Stylesheet synthesis and installation.
//!
//! [`render`] rebuilds the whole stylesheet from settings and overrides every
//! time, so repeated calls never accumulate rules. [`StyleInstaller`] owns the
//! single style element the result is written into.

use std::fmt::Write;

use tracing::{debug, warn};

use crate::config::{Knob, Settings, SourceKind};
use crate::error::HostError;
use crate::host::{Document, StyleHandle};
use crate::overrides::{resolve, OverrideStack, Resolved};

/// Element id of the managed style element.
pub const STYLE_ELEMENT_ID: &str = "font-manager--ui-fonts";

/// Elements that receive the UI font.
const UI_SELECTORS: [&str; 8] = [
    "body",
    "input",
    "select",
    "span",
    "code",
    ".list-group-item",
    ".ui-widget-content .ui-menu-item-wrapper",
    "textarea:not(#send_textarea)",
];

/// Keeps icon fonts (Font Awesome and friends) out of UI rules.
const ICON_EXCLUSION: &str = r#":not([class*="fa-"]):not([class*="icon"])"#;

const CHAT_SELECTORS: [&str; 1] = [".mes_text"];

const INPUT_SELECTORS: [&str; 1] = ["#send_textarea"];

/// Quote a family name for use in a `font-family` list.
fn css_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Keep user text from closing a comment early.
fn comment_safe(value: &str) -> String {
    value.replace("*/", "* /")
}

fn selector_list(selectors: &[&str], suffix: &str) -> String {
    selectors
        .iter()
        .map(|s| format!("{}{}", s, suffix))
        .collect::<Vec<_>>()
        .join(",\n")
}

fn family_declaration(family: &str, fallback: &str) -> String {
    format!(
        "  font-family: {}, {} !important;\n",
        css_string(family),
        fallback
    )
}

/// Build the complete stylesheet for the given state.
///
/// Pure: identical inputs produce identical output.
pub fn render(settings: &Settings, overrides: Option<&OverrideStack>) -> String {
    render_resolved(settings, &resolve(settings, overrides))
}

pub fn render_resolved(settings: &Settings, resolved: &Resolved) -> String {
    let mut css = String::new();

    // 1. Variables
    css.push_str("/* FONT MANAGER VARIABLES */\n:root {\n");
    for knob in Knob::ALL {
        let _ = writeln!(
            css,
            "  {}: {};",
            knob.css_variable(),
            knob.css_value(resolved.typography.get(knob))
        );
    }
    css.push_str("}\n\n");

    // 2. Font definitions
    css.push_str("/* FONT DEFINITIONS */\n");
    for font in settings
        .fonts
        .iter()
        .filter(|f| f.source_kind == SourceKind::EmbeddedCss)
    {
        let _ = writeln!(css, "/* FONT: {} */\n{}\n", comment_safe(&font.name), font.payload.trim());
    }
    css.push('\n');

    // 3. UI typography
    css.push_str("/* UI FONT APPLICATION */\n");
    css.push_str(&selector_list(&UI_SELECTORS, ICON_EXCLUSION));
    css.push_str(" {\n");
    if let Some(family) = &resolved.ui_family {
        css.push_str(&family_declaration(family, "var(--ui-default-font), sans-serif"));
    }
    let _ = write!(
        css,
        "  font-size: var({});\n  -webkit-text-stroke: var({});\n}}\n\n",
        Knob::UiFontSize.css_variable(),
        Knob::UiFontWeight.css_variable()
    );

    // 4. Chat typography
    css.push_str("/* CHAT FONT APPLICATION */\n");
    css.push_str(&selector_list(&CHAT_SELECTORS, ICON_EXCLUSION));
    css.push_str(" {\n");
    if let Some(family) = &resolved.message_family {
        css.push_str(&family_declaration(family, "var(--main-font), sans-serif"));
    }
    let _ = write!(
        css,
        "  font-size: var({});\n  line-height: var({});\n  -webkit-text-stroke: var({});\n}}\n\n",
        Knob::ChatFontSize.css_variable(),
        Knob::ChatLineHeight.css_variable(),
        Knob::ChatFontWeight.css_variable()
    );

    css.push_str(&selector_list(&INPUT_SELECTORS, ""));
    css.push_str(" {\n");
    if let Some(family) = &resolved.message_family {
        css.push_str(&family_declaration(family, "var(--main-font), sans-serif"));
    }
    let _ = write!(
        css,
        "  font-size: var({});\n  line-height: var({});\n}}\n",
        Knob::InputFontSize.css_variable(),
        Knob::ChatLineHeight.css_variable()
    );

    css
}

/// Round-trip `css` through the host's CSS parser.
///
/// Any failure falls back to the original text so font definitions are
/// never lost.
pub fn sanitize<D: Document + ?Sized>(doc: &mut D, css: &str) -> String {
    if css.is_empty() {
        return String::new();
    }
    match doc.parse_stylesheet(css) {
        Ok(rules) => rules.join("\n"),
        Err(e) => {
            warn!(error = %e, "css sanitization failed, installing unsanitized stylesheet");
            css.to_string()
        }
    }
}

/// Owner of the one style element the stylesheet lives in.
#[derive(Debug, Default)]
pub struct StyleInstaller {
    element: Option<StyleHandle>,
    installed: Option<String>,
}

impl StyleInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize and install `css`, creating the style element on first use.
    ///
    /// Returns false when the text was already installed.
    pub fn install<D: Document + ?Sized>(&mut self, doc: &mut D, css: &str) -> Result<bool, HostError> {
        let sanitized = sanitize(doc, css);
        if self.installed.as_deref() == Some(sanitized.as_str()) {
            return Ok(false);
        }

        let handle = match self.element {
            Some(handle) => handle,
            None => {
                let handle = doc.create_style_element(STYLE_ELEMENT_ID)?;
                debug!(id = STYLE_ELEMENT_ID, "created style element");
                self.element = Some(handle);
                handle
            }
        };
        doc.set_style_text(handle, &sanitized)?;
        debug!(bytes = sanitized.len(), "stylesheet installed");
        self.installed = Some(sanitized);
        Ok(true)
    }

    /// Text currently in the style element, after sanitization.
    pub fn installed(&self) -> Option<&str> {
        self.installed.as_deref()
    }
}
