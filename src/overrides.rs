//! Temporary overrides and layered value resolution.
//!
//! Any rendered attribute resolves as: override (if set) > selected preset's
//! value (if set) > global setting > hard-coded fallback.

use crate::config::{FontSlot, Knob, Settings, Typography};

/// A font pick made in the dialog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FontChoice {
    /// Explicitly use the host's default font.
    Default,
    /// A font entry, by its user-facing name.
    Named(String),
}

impl FontChoice {
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some(n) if !n.is_empty() => FontChoice::Named(n.to_string()),
            _ => FontChoice::Default,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            FontChoice::Default => None,
            FontChoice::Named(n) => Some(n),
        }
    }
}

/// In-session values shadowing the selected preset and globals.
///
/// `selected_preset` is the preset the session currently previews; an
/// absent field means "inherit".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverrideStack {
    pub selected_preset: Option<String>,
    pub ui_font: Option<FontChoice>,
    pub message_font: Option<FontChoice>,
    pub ui_font_size: Option<f32>,
    pub ui_font_weight: Option<f32>,
    pub chat_font_size: Option<f32>,
    pub input_font_size: Option<f32>,
    pub chat_font_weight: Option<f32>,
    pub chat_line_height: Option<f32>,
}

impl OverrideStack {
    /// Overrides seeded with every resolved value of `preset_id` (or of the
    /// globals when `None`).
    pub fn seeded(settings: &Settings, preset_id: Option<&str>) -> Self {
        let preset = preset_id.and_then(|id| settings.preset(id));
        let mut stack = OverrideStack {
            selected_preset: preset.map(|p| p.id.clone()),
            ui_font: Some(FontChoice::from_name(preset.and_then(|p| p.font(FontSlot::Ui)))),
            message_font: Some(FontChoice::from_name(
                preset.and_then(|p| p.font(FontSlot::Message)),
            )),
            ..OverrideStack::default()
        };
        for knob in Knob::ALL {
            let value = preset
                .and_then(|p| p.knob(knob))
                .unwrap_or_else(|| settings.typography.get(knob));
            stack.set_knob(knob, Some(value));
        }
        stack
    }

    pub fn knob(&self, knob: Knob) -> Option<f32> {
        match knob {
            Knob::UiFontSize => self.ui_font_size,
            Knob::UiFontWeight => self.ui_font_weight,
            Knob::ChatFontSize => self.chat_font_size,
            Knob::InputFontSize => self.input_font_size,
            Knob::ChatFontWeight => self.chat_font_weight,
            Knob::ChatLineHeight => self.chat_line_height,
        }
    }

    pub fn set_knob(&mut self, knob: Knob, value: Option<f32>) {
        let slot = match knob {
            Knob::UiFontSize => &mut self.ui_font_size,
            Knob::UiFontWeight => &mut self.ui_font_weight,
            Knob::ChatFontSize => &mut self.chat_font_size,
            Knob::InputFontSize => &mut self.input_font_size,
            Knob::ChatFontWeight => &mut self.chat_font_weight,
            Knob::ChatLineHeight => &mut self.chat_line_height,
        };
        *slot = value;
    }

    pub fn font(&self, slot: FontSlot) -> Option<&FontChoice> {
        match slot {
            FontSlot::Ui => self.ui_font.as_ref(),
            FontSlot::Message => self.message_font.as_ref(),
        }
    }

    pub fn set_font(&mut self, slot: FontSlot, choice: Option<FontChoice>) {
        match slot {
            FontSlot::Ui => self.ui_font = choice,
            FontSlot::Message => self.message_font = choice,
        }
    }

    /// Point any override naming `font_name` back at the default font.
    pub fn forget_font(&mut self, font_name: &str) {
        for slot in [FontSlot::Ui, FontSlot::Message] {
            if self.font(slot).and_then(FontChoice::name) == Some(font_name) {
                self.set_font(slot, Some(FontChoice::Default));
            }
        }
    }
}

/// Fully resolved values, ready to render.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    /// `font-family` for UI text; `None` keeps the host's font.
    pub ui_family: Option<String>,
    /// `font-family` for chat messages and the input box.
    pub message_family: Option<String>,
    pub typography: Typography,
}

/// Resolve every attribute. Without an override stack the committed
/// current preset is used.
pub fn resolve(settings: &Settings, overrides: Option<&OverrideStack>) -> Resolved {
    let preset = match overrides {
        Some(stack) => stack.selected_preset.as_deref().and_then(|id| settings.preset(id)),
        None => settings.current(),
    };

    let family_for = |slot: FontSlot| -> Option<String> {
        let name = match overrides.and_then(|s| s.font(slot)) {
            Some(choice) => choice.name(),
            None => preset.and_then(|p| p.font(slot)),
        }?;
        // A name that no longer matches a registered font degrades to default
        settings
            .font_by_name(name)
            .map(|font| font.resolved_family.clone())
    };

    let mut typography = Typography::default();
    for knob in Knob::ALL {
        let value = overrides
            .and_then(|s| s.knob(knob))
            .or_else(|| preset.and_then(|p| p.knob(knob)))
            .unwrap_or_else(|| settings.typography.get(knob));
        let value = if value.is_finite() { value } else { knob.fallback() };
        typography.set(knob, value);
    }

    Resolved {
        ui_family: family_for(FontSlot::Ui),
        message_family: family_for(FontSlot::Message),
        typography,
    }
}
