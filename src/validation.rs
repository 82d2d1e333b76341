//! Input validation for font and preset names and uploaded font files.

use std::path::Path;

use crate::config::{FontEntry, Preset};
use crate::error::{FontError, PresetError};
use crate::fonts::FontFormat;

/// Longest accepted font or preset name, in characters.
pub const MAX_NAME_LEN: usize = 50;

/// Largest accepted font upload (10 MB).
pub const MAX_FONT_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Validate a new font name; returns the trimmed name.
pub fn validate_font_name(candidate: &str, fonts: &[FontEntry]) -> Result<String, FontError> {
    let name = candidate.trim();
    if name.is_empty() {
        return Err(FontError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(FontError::NameTooLong { max: MAX_NAME_LEN });
    }
    // Case-sensitive: "Foo" and "foo" are different fonts
    if fonts.iter().any(|f| f.name == name) {
        return Err(FontError::DuplicateName(name.to_string()));
    }
    Ok(name.to_string())
}

/// Validate a preset name; `renaming` is the id of the preset being renamed,
/// which may keep its own name.
pub fn validate_preset_name(
    candidate: &str,
    presets: &[Preset],
    renaming: Option<&str>,
) -> Result<String, PresetError> {
    let name = candidate.trim();
    if name.is_empty() {
        return Err(PresetError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(PresetError::NameTooLong { max: MAX_NAME_LEN });
    }
    if presets
        .iter()
        .any(|p| p.name == name && Some(p.id.as_str()) != renaming)
    {
        return Err(PresetError::DuplicateName(name.to_string()));
    }
    Ok(name.to_string())
}

/// Check an upload against the extension allow-list and size ceiling.
///
/// Returns the format named by the extension.
pub fn validate_font_file(filename: &str, size: u64) -> Result<FontFormat, FontError> {
    let format = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(FontFormat::from_extension)
        .ok_or_else(|| FontError::UnsupportedFileType(filename.to_string()))?;

    if size > MAX_FONT_FILE_BYTES {
        return Err(FontError::FileTooLarge {
            size,
            limit: MAX_FONT_FILE_BYTES,
        });
    }
    if size == 0 {
        return Err(FontError::InvalidPayload(format!("{} is empty", filename)));
    }
    Ok(format)
}

/// Validate a theme id for a binding; returns the trimmed id.
pub fn validate_theme_id(candidate: &str) -> Result<String, PresetError> {
    let theme_id = candidate.trim();
    if theme_id.is_empty() {
        return Err(PresetError::EmptyThemeId);
    }
    Ok(theme_id.to_string())
}
