//! Settings store: fonts, presets, global typography and theme bindings.
//!
//! The settings live in a JSON bag shared with other extensions, under the
//! [`EXTENSION_NAME`] key. Older or partial shapes are upgraded by
//! [`Settings::normalize`], which runs once on every load.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use directories::ProjectDirs;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ConfigError;
use crate::fonts::{extract_font_family, FontFormat};

/// Key of our entry in the host settings bag.
pub const EXTENSION_NAME: &str = "Font-Manager";

// Global typography defaults
pub const DEFAULT_UI_FONT_SIZE: f32 = 14.0;
pub const DEFAULT_UI_FONT_WEIGHT: f32 = 0.0;
pub const DEFAULT_CHAT_FONT_SIZE: f32 = 14.0;
pub const DEFAULT_INPUT_FONT_SIZE: f32 = 14.0;
pub const DEFAULT_CHAT_FONT_WEIGHT: f32 = 0.0;
pub const DEFAULT_CHAT_LINE_HEIGHT: f32 = 1.2;

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// A `null` knob becomes NaN, which [`Settings::normalize`] replaces with the
/// knob's fallback.
fn null_as_nan<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(f32::NAN))
}

/// Produce a fresh opaque id (`id_<millis>_<random>`).
pub fn generate_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("id_{}_{}", Utc::now().timestamp_millis(), &random[..9])
}

/// One numeric typography knob. Presets may override each of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Knob {
    UiFontSize,
    /// Stroke width applied to UI text, in px.
    UiFontWeight,
    ChatFontSize,
    InputFontSize,
    ChatFontWeight,
    ChatLineHeight,
}

impl Knob {
    pub const ALL: [Knob; 6] = [
        Knob::UiFontSize,
        Knob::UiFontWeight,
        Knob::ChatFontSize,
        Knob::InputFontSize,
        Knob::ChatFontWeight,
        Knob::ChatLineHeight,
    ];

    /// Value used when neither a preset nor the global settings provide one.
    pub fn fallback(self) -> f32 {
        match self {
            Knob::UiFontSize => DEFAULT_UI_FONT_SIZE,
            Knob::UiFontWeight => DEFAULT_UI_FONT_WEIGHT,
            Knob::ChatFontSize => DEFAULT_CHAT_FONT_SIZE,
            Knob::InputFontSize => DEFAULT_INPUT_FONT_SIZE,
            Knob::ChatFontWeight => DEFAULT_CHAT_FONT_WEIGHT,
            Knob::ChatLineHeight => DEFAULT_CHAT_LINE_HEIGHT,
        }
    }

    /// Slider range accepted for this knob.
    pub fn range(self) -> (f32, f32) {
        match self {
            Knob::UiFontSize | Knob::ChatFontSize | Knob::InputFontSize => (8.0, 32.0),
            Knob::UiFontWeight | Knob::ChatFontWeight => (0.0, 2.0),
            Knob::ChatLineHeight => (0.8, 3.0),
        }
    }

    /// Clamp into range; non-finite input is refused.
    pub fn clamp(self, value: f32) -> Option<f32> {
        if !value.is_finite() {
            return None;
        }
        let (min, max) = self.range();
        Some(value.clamp(min, max))
    }

    /// CSS text for a value of this knob (`16px`, `0.5px`, `1.2`).
    pub fn css_value(self, value: f32) -> String {
        match self {
            Knob::ChatLineHeight => format!("{}", value),
            _ => format!("{}px", value),
        }
    }

    /// Name of the custom property this knob is exposed as.
    pub fn css_variable(self) -> &'static str {
        match self {
            Knob::UiFontSize => "--font-manager-ui-size",
            Knob::UiFontWeight => "--font-manager-ui-weight",
            Knob::ChatFontSize => "--font-manager-chat-size",
            Knob::InputFontSize => "--font-manager-input-size",
            Knob::ChatFontWeight => "--font-manager-chat-weight",
            Knob::ChatLineHeight => "--font-manager-chat-line-height",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Knob::UiFontSize => "ui-size",
            Knob::UiFontWeight => "ui-weight",
            Knob::ChatFontSize => "chat-size",
            Knob::InputFontSize => "input-size",
            Knob::ChatFontWeight => "chat-weight",
            Knob::ChatLineHeight => "line-height",
        }
    }
}

impl fmt::Display for Knob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Knob {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Knob::ALL
            .into_iter()
            .find(|k| k.label() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Knob::ALL.iter().map(|k| k.label()).collect();
                format!("unknown setting '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// Which font slot a choice applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FontSlot {
    Ui,
    Message,
}

impl FromStr for FontSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ui" => Ok(FontSlot::Ui),
            "message" | "chat" => Ok(FontSlot::Message),
            other => Err(format!("unknown font slot '{}' (expected ui or message)", other)),
        }
    }
}

/// Global typography values. Every field always has a value.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Typography {
    #[serde(deserialize_with = "null_as_nan")]
    pub ui_font_size: f32,
    #[serde(deserialize_with = "null_as_nan")]
    pub ui_font_weight: f32,
    #[serde(deserialize_with = "null_as_nan")]
    pub chat_font_size: f32,
    #[serde(deserialize_with = "null_as_nan")]
    pub input_font_size: f32,
    #[serde(deserialize_with = "null_as_nan")]
    pub chat_font_weight: f32,
    #[serde(deserialize_with = "null_as_nan")]
    pub chat_line_height: f32,
}

impl Default for Typography {
    fn default() -> Self {
        Self {
            ui_font_size: DEFAULT_UI_FONT_SIZE,
            ui_font_weight: DEFAULT_UI_FONT_WEIGHT,
            chat_font_size: DEFAULT_CHAT_FONT_SIZE,
            input_font_size: DEFAULT_INPUT_FONT_SIZE,
            chat_font_weight: DEFAULT_CHAT_FONT_WEIGHT,
            chat_line_height: DEFAULT_CHAT_LINE_HEIGHT,
        }
    }
}

impl Typography {
    pub fn get(&self, knob: Knob) -> f32 {
        match knob {
            Knob::UiFontSize => self.ui_font_size,
            Knob::UiFontWeight => self.ui_font_weight,
            Knob::ChatFontSize => self.chat_font_size,
            Knob::InputFontSize => self.input_font_size,
            Knob::ChatFontWeight => self.chat_font_weight,
            Knob::ChatLineHeight => self.chat_line_height,
        }
    }

    pub fn set(&mut self, knob: Knob, value: f32) {
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
}

/// How a font entry was supplied.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// `@font-face` CSS pasted by the user.
    #[default]
    #[serde(rename = "source")]
    EmbeddedCss,
    /// An uploaded font file, stored base64 encoded.
    #[serde(rename = "file")]
    BinaryFile,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FontEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// User-facing label, unique across the registry.
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub source_kind: SourceKind,
    /// CSS text or base64 font data.
    #[serde(rename = "data", default, deserialize_with = "null_as_default")]
    pub payload: String,
    /// The `font-family` value rules should use.
    #[serde(rename = "fontFamily", default, deserialize_with = "null_as_default")]
    pub resolved_family: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    /// Embedding format that loaded for a binary font.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FontFormat>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub ui_font: Option<String>,
    #[serde(default)]
    pub message_font: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_font_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_font_weight: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_font_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_font_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_font_weight: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_line_height: Option<f32>,
}

impl Preset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            ..Self::default()
        }
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

    pub fn font(&self, slot: FontSlot) -> Option<&str> {
        match slot {
            FontSlot::Ui => self.ui_font.as_deref(),
            FontSlot::Message => self.message_font.as_deref(),
        }
    }

    pub fn set_font(&mut self, slot: FontSlot, name: Option<String>) {
        match slot {
            FontSlot::Ui => self.ui_font = name,
            FontSlot::Message => self.message_font = name,
        }
    }

    /// Same preset with the values of `other` (id and name kept).
    fn copy_values_from(&mut self, other: &Preset) {
        let (id, name) = (std::mem::take(&mut self.id), std::mem::take(&mut self.name));
        *self = Preset {
            id,
            name,
            ..other.clone()
        };
    }
}

/// Auto-apply `preset_id` when the host theme matches `theme_id`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThemeBinding {
    pub theme_id: String,
    pub preset_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    #[serde(deserialize_with = "null_as_default")]
    pub fonts: Vec<FontEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub presets: Vec<Preset>,
    pub current_preset: Option<String>,
    #[serde(flatten)]
    pub typography: Typography,
    #[serde(deserialize_with = "null_as_default")]
    pub theme_bindings: Vec<ThemeBinding>,
}

impl Settings {
    pub fn font(&self, id: &str) -> Option<&FontEntry> {
        self.fonts.iter().find(|f| f.id == id)
    }

    pub fn font_by_name(&self, name: &str) -> Option<&FontEntry> {
        self.fonts.iter().find(|f| f.name == name)
    }

    pub fn preset(&self, id: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.id == id)
    }

    pub fn preset_mut(&mut self, id: &str) -> Option<&mut Preset> {
        self.presets.iter_mut().find(|p| p.id == id)
    }

    pub fn preset_by_name(&self, name: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.name == name)
    }

    /// The current preset, ignoring a dangling pointer.
    pub fn current(&self) -> Option<&Preset> {
        self.current_preset.as_deref().and_then(|id| self.preset(id))
    }

    /// Overwrite the stored values of preset `id` with `values`.
    pub(crate) fn restore_preset_values(&mut self, id: &str, values: &Preset) -> bool {
        match self.preset_mut(id) {
            Some(preset) if preset.knobs_and_fonts_differ(values) => {
                preset.copy_values_from(values);
                true
            }
            _ => false,
        }
    }

    /// Fill defaults and repair older or damaged shapes. Idempotent.
    ///
    /// Returns true when anything had to change.
    pub fn normalize(&mut self) -> bool {
        let mut changed = false;

        for knob in Knob::ALL {
            if !self.typography.get(knob).is_finite() {
                self.typography.set(knob, knob.fallback());
                changed = true;
            }
        }

        let before = self.fonts.len();
        let mut seen_names: Vec<String> = Vec::new();
        self.fonts.retain(|font| {
            let name = font.name.trim();
            if name.is_empty() || seen_names.iter().any(|n| n == name) {
                warn!(font = %font.name, "dropping unusable font entry");
                return false;
            }
            seen_names.push(name.to_string());
            true
        });
        changed |= self.fonts.len() != before;

        for font in &mut self.fonts {
            if font.id.is_empty() {
                font.id = generate_id();
                changed = true;
            }
            if font.resolved_family.trim().is_empty() {
                font.resolved_family = match font.source_kind {
                    SourceKind::EmbeddedCss => extract_font_family(&font.payload)
                        .unwrap_or_else(|| font.name.clone()),
                    SourceKind::BinaryFile => font.name.clone(),
                };
                changed = true;
            }
        }

        for preset in &mut self.presets {
            if preset.id.is_empty() {
                preset.id = generate_id();
                changed = true;
            }
            for knob in Knob::ALL {
                if matches!(preset.knob(knob), Some(v) if !v.is_finite()) {
                    preset.set_knob(knob, None);
                    changed = true;
                }
            }
        }

        if self.current_preset.is_some() && self.current().is_none() {
            debug!("clearing dangling current preset");
            self.current_preset = None;
            changed = true;
        }

        let before = self.theme_bindings.len();
        let presets = &self.presets;
        self.theme_bindings.retain(|b| {
            !b.theme_id.trim().is_empty() && presets.iter().any(|p| p.id == b.preset_id)
        });
        changed |= self.theme_bindings.len() != before;

        changed
    }

    /// Read our entry from a host settings bag; a missing entry yields defaults.
    pub fn from_bag(bag: &Value) -> Result<Self, ConfigError> {
        let mut settings = match bag.get(EXTENSION_NAME) {
            Some(Value::Null) | None => Settings::default(),
            Some(value) => serde_json::from_value(value.clone())?,
        };
        if settings.normalize() {
            debug!("settings upgraded during load");
        }
        Ok(settings)
    }

    /// Store our entry into a host settings bag, leaving other keys alone.
    pub fn write_into_bag(&self, bag: &mut Value) -> Result<(), ConfigError> {
        if !bag.is_object() {
            *bag = Value::Object(Map::new());
        }
        if let Value::Object(map) = bag {
            map.insert(EXTENSION_NAME.to_string(), serde_json::to_value(self)?);
        }
        Ok(())
    }
}

impl Preset {
    fn knobs_and_fonts_differ(&self, other: &Preset) -> bool {
        self.ui_font != other.ui_font
            || self.message_font != other.message_font
            || Knob::ALL.iter().any(|k| self.knob(*k) != other.knob(*k))
    }
}

pub fn settings_path() -> Result<PathBuf, ConfigError> {
    let proj =
        ProjectDirs::from("org", "font-manager", "font-manager").ok_or(ConfigError::NoConfigDir)?;
    let dir = proj.config_dir();
    fs::create_dir_all(dir)?;
    Ok(dir.join("settings.json"))
}

/// Read the whole settings bag; a missing file is an empty bag.
pub fn load_bag(path: &Path) -> Result<Value, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(Value::Object(Map::new())),
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Value::Object(Map::new())),
        Err(e) => Err(e.into()),
    }
}

pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    Settings::from_bag(&load_bag(path)?)
}

/// Write our entry into the bag at `path`. An unreadable bag is left alone
/// so other extensions' keys are never lost.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    let mut bag = load_bag(path)?;
    settings.write_into_bag(&mut bag)?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, serde_json::to_string_pretty(&bag)?)?;
    Ok(())
}
