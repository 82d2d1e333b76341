//! Seams to the host application.
//!
//! The font manager never touches the page directly. Everything it needs from
//! the host (style elements, font faces, theme state, persistence, command
//! and menu registries) goes through the traits below.

use crossbeam_channel::Sender;

use crate::config::Settings;
use crate::error::HostError;
use crate::fonts::FontFormat;
use crate::theme::ThemeSignals;

/// A style element owned by the font manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StyleHandle(pub u64);

/// A font face registered with the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FaceHandle(pub u64);

/// The live document the stylesheet is installed into.
pub trait Document {
    /// Create and attach a new style element with the given element id.
    fn create_style_element(&mut self, id: &str) -> Result<StyleHandle, HostError>;

    /// Replace the full text of a style element.
    fn set_style_text(&mut self, handle: StyleHandle, css: &str) -> Result<(), HostError>;

    /// Parse `css` in a throwaway style element and return the serialized
    /// rules the host's CSS parser kept.
    fn parse_stylesheet(&mut self, css: &str) -> Result<Vec<String>, HostError>;

    /// Remove a previously loaded font face.
    fn unregister_face(&mut self, face: FaceHandle) -> Result<(), HostError>;

    /// Current theme indicators (active theme name, stylesheets, classes).
    fn theme_signals(&self) -> Result<ThemeSignals, HostError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceLoadError {
    /// The host did not accept the data in the requested format.
    Rejected(String),
    /// The data could not be decoded at all.
    Corrupt(String),
}

/// Asynchronous font face loading.
#[allow(async_fn_in_trait)]
pub trait FaceLoader {
    async fn load_face(
        &self,
        family: &str,
        source: &str,
        format: FontFormat,
    ) -> Result<FaceHandle, FaceLoadError>;
}

/// Durable storage for the settings object.
///
/// Calls are fire-and-forget; implementations debounce or batch writes.
pub trait Persistence {
    fn request_save(&self, settings: &Settings);
}

/// Kinds of host change that may mean the theme switched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// A stylesheet link was added to or removed from the document head.
    StylesheetsChanged,
    /// Root or body class/data attributes changed.
    RootAttributesChanged,
    /// The host announced that its own settings changed.
    SettingsChanged,
}

/// Sources of theme change notifications.
pub trait ThemeObserverHost {
    /// Watch head stylesheet links and root/body attributes.
    fn observe_theme_changes(&mut self, tx: Sender<HostSignal>) -> Result<(), HostError>;

    /// Subscribe to the host's settings-changed notification.
    fn subscribe_settings_changed(&mut self, tx: Sender<HostSignal>) -> Result<(), HostError>;
}

/// Description of a user-invokable command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub help: &'static str,
}

pub trait CommandRegistry {
    fn register_command(&mut self, spec: &CommandSpec) -> Result<(), HostError>;
}

pub trait MenuHost {
    /// Append a button to the host's extensions menu.
    fn append_menu_button(&mut self, id: &str, label: &str) -> Result<(), HostError>;
}
