//! The font manager context: settings, live stylesheet, loaded faces, the
//! open edit session and the auto-apply guard, all in one place.
//!
//! Every mutating operation persists through [`Persistence`] and re-renders.
//! Session edits re-render but never persist until committed.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::config::{generate_id, FontEntry, FontSlot, Knob, Preset, Settings, SourceKind, ThemeBinding};
use crate::css::{self, StyleInstaller};
use crate::error::{FontError, HostError, PresetError};
use crate::fonts::{encode_font_payload, extract_font_family, FaceLoadResult, FontFormat, PendingFace};
use crate::host::{Document, FaceHandle, Persistence};
use crate::overrides::{resolve, FontChoice, Resolved};
use crate::session::EditSession;
use crate::theme::{MatchDecision, ThemeMatcher};
use crate::validation::{validate_font_file, validate_font_name, validate_preset_name, validate_theme_id};

/// Outcome of one auto-apply evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoApply {
    /// The bound preset was switched to and persisted.
    Applied(String),
    /// The match was the preset applied last time.
    Skipped(String),
    NoMatch,
    /// An edit session is open; evaluation runs again when it closes.
    Deferred,
    /// The host could not report theme signals.
    Failed,
}

pub struct FontManager<D: Document, P: Persistence> {
    settings: Settings,
    document: D,
    persistence: P,
    installer: StyleInstaller,
    /// Faces currently registered with the host, by font id.
    live_faces: HashMap<String, FaceHandle>,
    session: Option<EditSession>,
    generation: u64,
    matcher: ThemeMatcher,
    auto_apply_deferred: bool,
    pending_loads: Vec<PendingFace>,
}

impl<D: Document, P: Persistence> FontManager<D, P> {
    /// Take ownership of loaded settings. Stored binary fonts are queued for
    /// re-registration; see [`FontManager::take_pending_loads`].
    pub fn new(mut settings: Settings, document: D, persistence: P) -> Self {
        if settings.normalize() {
            debug!("settings normalized on startup");
        }
        let pending_loads = settings
            .fonts
            .iter()
            .filter(|f| f.source_kind == SourceKind::BinaryFile)
            .map(restore_request)
            .collect();

        Self {
            settings,
            document,
            persistence,
            installer: StyleInstaller::new(),
            live_faces: HashMap::new(),
            session: None,
            generation: 0,
            matcher: ThemeMatcher::new(),
            auto_apply_deferred: false,
            pending_loads,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    pub fn is_editing(&self) -> bool {
        self.session.is_some()
    }

    /// The stylesheet for the current state, including session overrides.
    pub fn render_css(&self) -> String {
        css::render(&self.settings, self.session.as_ref().map(EditSession::overrides))
    }

    pub fn resolved(&self) -> Resolved {
        resolve(&self.settings, self.session.as_ref().map(EditSession::overrides))
    }

    /// Re-render and install the stylesheet.
    pub fn refresh(&mut self) -> Result<bool, HostError> {
        let css = self.render_css();
        self.installer.install(&mut self.document, &css)
    }

    /// Text last written into the style element.
    pub fn installed_css(&self) -> Option<&str> {
        self.installer.installed()
    }

    fn rerender(&mut self) {
        if let Err(e) = self.refresh() {
            warn!(error = %e, "failed to install stylesheet");
        }
    }

    fn persist(&self) {
        self.persistence.request_save(&self.settings);
    }

    // Font registry

    /// Register pasted `@font-face` CSS under `name`.
    pub fn import_css_font(&mut self, name: &str, css_text: &str) -> Result<FontEntry, FontError> {
        let name = validate_font_name(name, &self.settings.fonts)?;
        let payload = css_text.trim();
        if payload.is_empty() {
            return Err(FontError::InvalidPayload("CSS source is empty".into()));
        }

        let resolved_family = extract_font_family(payload).unwrap_or_else(|| name.clone());
        let entry = FontEntry {
            id: generate_id(),
            name,
            source_kind: SourceKind::EmbeddedCss,
            payload: payload.to_string(),
            resolved_family,
            original_filename: None,
            format: None,
        };
        info!(font = %entry.name, family = %entry.resolved_family, "font added");
        self.settings.fonts.push(entry.clone());
        self.persist();
        self.rerender();
        Ok(entry)
    }

    /// Validate and encode an uploaded font file.
    ///
    /// Nothing is stored until the returned request has been negotiated and
    /// handed to [`FontManager::finish_binary_import`].
    pub fn begin_binary_import(
        &self,
        name: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PendingFace, FontError> {
        validate_font_file(filename, bytes.len() as u64)?;
        let name = validate_font_name(name, &self.settings.fonts)?;
        debug!(font = %name, bytes = bytes.len(), "encoding font upload");

        Ok(PendingFace {
            font_id: generate_id(),
            family: name.clone(),
            name,
            payload: encode_font_payload(bytes),
            original_filename: Some(filename.to_string()),
            formats: FontFormat::NEGOTIATION_ORDER.to_vec(),
            generation: self.session.as_ref().map(EditSession::generation),
            restore: false,
        })
    }

    /// Apply a finished face load.
    ///
    /// Returns the new entry for a successful import, `None` for restores and
    /// for loads that are no longer relevant.
    pub fn finish_binary_import(&mut self, result: FaceLoadResult) -> Result<Option<FontEntry>, FontError> {
        let FaceLoadResult { pending, outcome } = result;
        self.pending_loads.retain(|p| p.font_id != pending.font_id);

        let (format, face) = match outcome {
            Ok(loaded) => loaded,
            Err(e) if pending.restore => {
                warn!(font = %pending.name, error = %e, "could not restore font, keeping entry");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if pending.restore {
            if self.settings.font(&pending.font_id).is_none() {
                debug!(font = %pending.name, "font removed while restoring");
                self.drop_face(face);
                return Ok(None);
            }
            if let Some(previous) = self.live_faces.insert(pending.font_id.clone(), face) {
                self.drop_face(previous);
            }
            debug!(font = %pending.name, format = format.css_hint(), "font restored");
            return Ok(None);
        }

        let current_generation = self.session.as_ref().map(EditSession::generation);
        if pending.generation.is_some() && pending.generation != current_generation {
            debug!(font = %pending.name, "dialog closed before font finished loading");
            self.drop_face(face);
            return Ok(None);
        }
        if self.settings.font_by_name(&pending.name).is_some() {
            self.drop_face(face);
            return Err(FontError::DuplicateName(pending.name));
        }

        let entry = pending.into_entry(format);
        info!(font = %entry.name, format = format.css_hint(), "font added");
        self.live_faces.insert(entry.id.clone(), face);
        self.settings.fonts.push(entry.clone());
        self.persist();
        self.rerender();
        Ok(Some(entry))
    }

    /// Loads the host should negotiate and hand back.
    pub fn take_pending_loads(&mut self) -> Vec<PendingFace> {
        std::mem::take(&mut self.pending_loads)
    }

    fn drop_face(&mut self, face: FaceHandle) {
        if let Err(e) = self.document.unregister_face(face) {
            warn!(error = %e, "failed to unregister font face");
        }
    }

    /// Make a stored font live. CSS fonts ride along in the stylesheet;
    /// binary fonts are queued for loading if not already loaded.
    pub fn apply_font(&mut self, id: &str) -> Result<(), FontError> {
        let font = self
            .settings
            .font(id)
            .ok_or_else(|| FontError::UnknownFont(id.to_string()))?;
        if font.source_kind == SourceKind::BinaryFile
            && !self.live_faces.contains_key(id)
            && !self.pending_loads.iter().any(|p| p.font_id == id)
        {
            let request = restore_request(font);
            self.pending_loads.push(request);
        }
        self.rerender();
        Ok(())
    }

    /// Take a font's live definition out of the page. The entry is kept.
    pub fn unapply_font(&mut self, id: &str) -> Result<(), FontError> {
        if self.settings.font(id).is_none() {
            return Err(FontError::UnknownFont(id.to_string()));
        }
        self.retire_face(id);
        Ok(())
    }

    /// Forget any queued load and unregister the loaded face for `id`.
    fn retire_face(&mut self, id: &str) {
        self.pending_loads.retain(|p| p.font_id != id);
        if let Some(face) = self.live_faces.remove(id) {
            self.drop_face(face);
        }
    }

    /// Remove a font and every reference to it. Unknown ids are ignored.
    pub fn remove_font(&mut self, id: &str) -> Option<FontEntry> {
        let index = self.settings.fonts.iter().position(|f| f.id == id)?;
        self.retire_face(id);
        let entry = self.settings.fonts.remove(index);

        for preset in &mut self.settings.presets {
            for slot in [FontSlot::Ui, FontSlot::Message] {
                if preset.font(slot) == Some(entry.name.as_str()) {
                    preset.set_font(slot, None);
                }
            }
        }
        if let Some(session) = &mut self.session {
            session.forget_font(&entry.name);
        }

        info!(font = %entry.name, "font removed");
        self.persist();
        self.rerender();
        Some(entry)
    }

    // Presets

    /// Create an empty preset. An open session switches to it.
    pub fn add_preset(&mut self, name: &str) -> Result<String, PresetError> {
        let name = validate_preset_name(name, &self.settings.presets, None)?;
        let preset = Preset::new(name);
        let id = preset.id.clone();
        info!(preset = %preset.name, "preset added");
        self.settings.presets.push(preset);

        if let Some(session) = &mut self.session {
            session.select_preset(&self.settings, Some(id.as_str()))?;
        }
        self.persist();
        self.rerender();
        Ok(id)
    }

    pub fn rename_preset(&mut self, id: &str, name: &str) -> Result<(), PresetError> {
        if self.settings.preset(id).is_none() {
            return Err(PresetError::UnknownPreset(id.to_string()));
        }
        let name = validate_preset_name(name, &self.settings.presets, Some(id))?;
        if let Some(preset) = self.settings.preset_mut(id) {
            debug!(from = %preset.name, to = %name, "preset renamed");
            preset.name = name;
        }
        self.persist();
        Ok(())
    }

    /// Delete a preset and its theme bindings. The session selection moves
    /// to the first remaining preset.
    pub fn delete_preset(&mut self, id: &str) -> Result<(), PresetError> {
        let index = self
            .settings
            .presets
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| PresetError::UnknownPreset(id.to_string()))?;
        let removed = self.settings.presets.remove(index);

        if self.settings.current_preset.as_deref() == Some(id) {
            self.settings.current_preset = None;
        }
        self.settings.theme_bindings.retain(|b| b.preset_id != id);
        if self.matcher.last_applied() == Some(id) {
            self.matcher = ThemeMatcher::new();
        }

        let fallback = self.settings.presets.first().map(|p| p.id.clone());
        if let Some(session) = &mut self.session {
            session.forget_preset(&self.settings, id, fallback.as_deref());
        }

        info!(preset = %removed.name, "preset deleted");
        self.persist();
        self.rerender();
        Ok(())
    }

    /// Store the session's values into its selected preset and make it
    /// current, leaving the session open.
    pub fn save_current_preset(&mut self) -> Result<(), PresetError> {
        let session = self.session.as_mut().ok_or(PresetError::NotEditing)?;
        if session.selected_preset().is_none() {
            return Err(PresetError::NoPresetSelected);
        }
        session.save(&mut self.settings);
        info!(preset = ?self.settings.current_preset, "preset saved");
        self.persist();
        self.rerender();
        Ok(())
    }

    /// Make `id` the committed current preset (`None` for globals only).
    ///
    /// Returns false when it already was.
    pub fn switch_preset(&mut self, id: Option<&str>) -> Result<bool, PresetError> {
        if let Some(id) = id {
            if self.settings.preset(id).is_none() {
                return Err(PresetError::UnknownPreset(id.to_string()));
            }
        }
        if self.settings.current_preset.as_deref() == id {
            return Ok(false);
        }
        self.settings.current_preset = id.map(str::to_string);
        self.persist();
        self.rerender();
        Ok(true)
    }

    // Theme bindings

    /// Bind a theme to a preset, replacing any binding for the same theme.
    pub fn add_theme_binding(&mut self, theme_id: &str, preset_id: &str) -> Result<(), PresetError> {
        let theme_id = validate_theme_id(theme_id)?;
        if self.settings.preset(preset_id).is_none() {
            return Err(PresetError::UnknownPreset(preset_id.to_string()));
        }

        let key = theme_id.to_lowercase();
        match self
            .settings
            .theme_bindings
            .iter_mut()
            .find(|b| b.theme_id.to_lowercase() == key)
        {
            Some(binding) => {
                binding.theme_id = theme_id;
                binding.preset_id = preset_id.to_string();
            }
            None => self.settings.theme_bindings.push(ThemeBinding {
                theme_id,
                preset_id: preset_id.to_string(),
            }),
        }
        self.persist();
        Ok(())
    }

    pub fn remove_theme_binding(&mut self, theme_id: &str) -> bool {
        let key = theme_id.trim().to_lowercase();
        let before = self.settings.theme_bindings.len();
        self.settings
            .theme_bindings
            .retain(|b| b.theme_id.to_lowercase() != key);
        let removed = self.settings.theme_bindings.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    // Edit session

    /// Open the edit session, or return the one already open.
    pub fn begin_edit(&mut self) -> u64 {
        if let Some(session) = &self.session {
            return session.generation();
        }
        self.generation += 1;
        self.session = Some(EditSession::begin(&self.settings, self.generation));
        self.rerender();
        self.generation
    }

    fn session_mut(&mut self) -> Result<&mut EditSession, PresetError> {
        self.session.as_mut().ok_or(PresetError::NotEditing)
    }

    /// Preview another preset, discarding unsaved tweaks.
    pub fn select_preset(&mut self, id: Option<&str>) -> Result<(), PresetError> {
        let session = self.session.as_mut().ok_or(PresetError::NotEditing)?;
        session.select_preset(&self.settings, id)?;
        self.rerender();
        Ok(())
    }

    /// Preview a knob value; returns the value after clamping.
    pub fn set_knob(&mut self, knob: Knob, value: f32) -> Result<f32, PresetError> {
        let stored = self
            .session_mut()?
            .set_knob(knob, value)
            .ok_or(PresetError::InvalidValue(knob))?;
        self.rerender();
        Ok(stored)
    }

    pub fn set_font(&mut self, slot: FontSlot, choice: FontChoice) -> Result<(), PresetError> {
        if let FontChoice::Named(name) = &choice {
            if self.settings.font_by_name(name).is_none() {
                return Err(PresetError::UnknownFont(name.clone()));
            }
        }
        self.session_mut()?.set_font(slot, choice);
        self.rerender();
        Ok(())
    }

    /// Close the session, keeping its values. Returns false if none was open.
    pub fn commit_edit(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        session.capture_into(&mut self.settings);
        info!(preset = ?self.settings.current_preset, "font settings committed");
        self.persist();
        self.rerender();
        self.run_deferred_auto_apply();
        true
    }

    /// Close the session and put back what it started from.
    pub fn cancel_edit(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        if session.restore(&mut self.settings) {
            debug!("edit session cancelled, committed values restored");
        }
        self.rerender();
        self.run_deferred_auto_apply();
        true
    }

    // Theme auto-apply

    fn run_deferred_auto_apply(&mut self) {
        if std::mem::take(&mut self.auto_apply_deferred) {
            self.check_and_apply_auto_preset();
        }
    }

    /// Apply the preset bound to the active theme, if any. Errors are logged.
    pub fn check_and_apply_auto_preset(&mut self) -> AutoApply {
        if self.session.is_some() {
            debug!("theme check deferred until the dialog closes");
            self.auto_apply_deferred = true;
            return AutoApply::Deferred;
        }
        match self.try_auto_apply() {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "theme detection failed");
                AutoApply::Failed
            }
        }
    }

    fn try_auto_apply(&mut self) -> Result<AutoApply, HostError> {
        let signals = self.document.theme_signals()?;
        match self.matcher.evaluate(&self.settings, &signals) {
            MatchDecision::Apply(found) => {
                let preset_id = found.binding.preset_id;
                info!(
                    theme = %found.binding.theme_id,
                    signal = ?found.signal,
                    preset = %preset_id,
                    "auto-applying preset for theme"
                );
                self.matcher.mark_applied(&preset_id);
                if let Err(e) = self.switch_preset(Some(preset_id.as_str())) {
                    warn!(error = %e, "auto-apply failed");
                }
                Ok(AutoApply::Applied(preset_id))
            }
            MatchDecision::AlreadyApplied(preset_id) => Ok(AutoApply::Skipped(preset_id)),
            MatchDecision::NoMatch => Ok(AutoApply::NoMatch),
        }
    }
}

/// Re-registration request for a stored binary font.
fn restore_request(font: &FontEntry) -> PendingFace {
    PendingFace {
        font_id: font.id.clone(),
        name: font.name.clone(),
        family: font.resolved_family.clone(),
        payload: font.payload.clone(),
        original_filename: font.original_filename.clone(),
        formats: FontFormat::attempt_order(font.format),
        generation: None,
        restore: true,
    }
}
