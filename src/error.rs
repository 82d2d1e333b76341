//! Error types shared across the font manager.
//!
//! Validation problems are reported back to the user and the prompt loops
//! re-ask; load failures roll the entry back out; host failures are mostly
//! logged and absorbed at the call site.

use std::time::Duration;

use thiserror::Error;

use crate::config::Knob;

/// Why a binary font could not be loaded, in terms a user can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFailureKind {
    /// The data decoded but no format accepted it as a font.
    Corrupt,
    /// The host never finished loading within the time limit.
    Timeout,
    /// None of the negotiated formats matched the file.
    UnrecognizedFormat,
}

impl LoadFailureKind {
    pub fn describe(self) -> &'static str {
        match self {
            LoadFailureKind::Corrupt => "the font file appears to be damaged",
            LoadFailureKind::Timeout => "loading the font took too long",
            LoadFailureKind::UnrecognizedFormat => "the font format was not recognized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FontError {
    #[error("Font name cannot be empty")]
    EmptyName,

    #[error("Font name too long (max {max} characters)")]
    NameTooLong { max: usize },

    #[error("A font named '{0}' already exists, please choose another name")]
    DuplicateName(String),

    #[error("Font source is not usable: {0}")]
    InvalidPayload(String),

    #[error("Unsupported font file '{0}' (expected .ttf, .otf, .woff or .woff2)")]
    UnsupportedFileType(String),

    #[error("Font file is too large ({size} bytes, limit is {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Font did not load within {0:?}")]
    LoadTimeout(Duration),

    #[error("Font could not be loaded: {}", kind.describe())]
    LoadFailed { kind: LoadFailureKind, detail: String },

    #[error("No font with id '{0}'")]
    UnknownFont(String),
}

impl FontError {
    /// Classification for load failures, `None` for validation errors.
    pub fn failure_kind(&self) -> Option<LoadFailureKind> {
        match self {
            FontError::LoadTimeout(_) => Some(LoadFailureKind::Timeout),
            FontError::LoadFailed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresetError {
    #[error("Preset name cannot be empty")]
    EmptyName,

    #[error("Preset name too long (max {max} characters)")]
    NameTooLong { max: usize },

    #[error("A preset named '{0}' already exists, please choose another name")]
    DuplicateName(String),

    #[error("No preset with id '{0}'")]
    UnknownPreset(String),

    #[error("Select a preset first")]
    NoPresetSelected,

    #[error("Theme name cannot be empty")]
    EmptyThemeId,

    #[error("The font manager dialog is not open")]
    NotEditing,

    #[error("{0} needs a finite number")]
    InvalidValue(Knob),

    #[error("No font named '{0}'")]
    UnknownFont(String),
}

/// Failures reported by the host environment (document, registries, menus).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("{0} is not available yet")]
    NotReady(String),

    #[error("host rejected the request: {0}")]
    Rejected(String),

    #[error("unknown handle {0}")]
    UnknownHandle(u64),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine a configuration directory")]
    NoConfigDir,

    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_classification() {
        assert_eq!(
            FontError::LoadTimeout(Duration::from_secs(10)).failure_kind(),
            Some(LoadFailureKind::Timeout)
        );
        let err = FontError::LoadFailed {
            kind: LoadFailureKind::Corrupt,
            detail: "bad table".into(),
        };
        assert_eq!(err.failure_kind(), Some(LoadFailureKind::Corrupt));
        assert_eq!(FontError::EmptyName.failure_kind(), None);
    }

    #[test]
    fn test_load_failure_message_is_readable() {
        let err = FontError::LoadFailed {
            kind: LoadFailureKind::UnrecognizedFormat,
            detail: String::new(),
        };
        assert_eq!(
            err.to_string(),
            "Font could not be loaded: the font format was not recognized"
        );
    }
}
