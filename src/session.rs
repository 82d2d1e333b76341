//! Edit session state machine (Idle -> Open -> Committed | Cancelled).
//!
//! An open session previews changes through an [`OverrideStack`] and never
//! persists on its own. The snapshot taken when it opens (or at the last
//! in-session save) is what cancelling goes back to.

use tracing::{debug, info};

use crate::config::{FontSlot, Knob, Preset, Settings, Typography};
use crate::error::PresetError;
use crate::overrides::{FontChoice, OverrideStack};

/// Committed values a cancel restores.
#[derive(Clone, Debug, PartialEq)]
struct Snapshot {
    current_preset: Option<String>,
    typography: Typography,
    presets: Vec<Preset>,
}

impl Snapshot {
    fn take(settings: &Settings) -> Self {
        Self {
            current_preset: settings.current_preset.clone(),
            typography: settings.typography,
            presets: settings.presets.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EditSession {
    generation: u64,
    snapshot: Snapshot,
    overrides: OverrideStack,
}

impl EditSession {
    /// Open a session over `settings`, selecting the current preset if it
    /// is valid and the globals otherwise.
    pub fn begin(settings: &Settings, generation: u64) -> Self {
        let selected = settings.current().map(|p| p.id.clone());
        debug!(generation, preset = ?selected, "edit session opened");
        Self {
            generation,
            snapshot: Snapshot::take(settings),
            overrides: OverrideStack::seeded(settings, selected.as_deref()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn overrides(&self) -> &OverrideStack {
        &self.overrides
    }

    pub fn selected_preset(&self) -> Option<&str> {
        self.overrides.selected_preset.as_deref()
    }

    /// Switch the previewed preset. Unsaved tweaks are discarded.
    pub fn select_preset(&mut self, settings: &Settings, preset_id: Option<&str>) -> Result<(), PresetError> {
        if let Some(id) = preset_id {
            if settings.preset(id).is_none() {
                return Err(PresetError::UnknownPreset(id.to_string()));
            }
        }
        self.overrides = OverrideStack::seeded(settings, preset_id);
        Ok(())
    }

    /// Set one knob, clamped to its range. Returns the value stored, or
    /// `None` when `value` was not a finite number.
    pub fn set_knob(&mut self, knob: Knob, value: f32) -> Option<f32> {
        let value = knob.clamp(value)?;
        self.overrides.set_knob(knob, Some(value));
        Some(value)
    }

    pub fn set_font(&mut self, slot: FontSlot, choice: FontChoice) {
        self.overrides.set_font(slot, Some(choice));
    }

    /// Drop every reference to a removed font, both in the preview and in
    /// what a cancel would restore.
    pub fn forget_font(&mut self, font_name: &str) {
        self.overrides.forget_font(font_name);
        for preset in &mut self.snapshot.presets {
            for slot in [FontSlot::Ui, FontSlot::Message] {
                if preset.font(slot) == Some(font_name) {
                    preset.set_font(slot, None);
                }
            }
        }
    }

    /// Forget a deleted preset; the selection moves to `fallback`.
    pub fn forget_preset(&mut self, settings: &Settings, preset_id: &str, fallback: Option<&str>) {
        self.snapshot.presets.retain(|p| p.id != preset_id);
        if self.snapshot.current_preset.as_deref() == Some(preset_id) {
            self.snapshot.current_preset = None;
        }
        if self.selected_preset() == Some(preset_id) {
            self.overrides = OverrideStack::seeded(settings, fallback);
        }
    }

    /// Write the previewed values into `settings`.
    ///
    /// With a preset selected, every knob and font is copied into it and it
    /// becomes current. Without one, knobs go to the globals and no preset
    /// stays current.
    pub fn capture_into(&self, settings: &mut Settings) {
        let overrides = &self.overrides;
        let target = overrides
            .selected_preset
            .as_deref()
            .and_then(|id| settings.presets.iter_mut().find(|p| p.id == id));

        match target {
            Some(preset) => {
                for knob in Knob::ALL {
                    if let Some(value) = overrides.knob(knob) {
                        preset.set_knob(knob, Some(value));
                    }
                }
                for slot in [FontSlot::Ui, FontSlot::Message] {
                    if let Some(choice) = overrides.font(slot) {
                        preset.set_font(slot, choice.name().map(str::to_string));
                    }
                }
                settings.current_preset = Some(preset.id.clone());
            }
            None => {
                for knob in Knob::ALL {
                    if let Some(value) = overrides.knob(knob) {
                        settings.typography.set(knob, value);
                    }
                }
                settings.current_preset = None;
                let picked_font = [FontSlot::Ui, FontSlot::Message]
                    .into_iter()
                    .any(|slot| overrides.font(slot).and_then(FontChoice::name).is_some());
                if picked_font {
                    info!("no preset selected, font choices were only previewed");
                }
            }
        }
    }

    /// Capture into `settings` and make the result the new cancel point.
    pub fn save(&mut self, settings: &mut Settings) {
        self.capture_into(settings);
        self.snapshot = Snapshot::take(settings);
    }

    /// Put the snapshot back. Presets created during the session are kept;
    /// deleted ones stay deleted. Returns true when anything changed.
    pub fn restore(&self, settings: &mut Settings) -> bool {
        let mut changed = false;

        let current = self
            .snapshot
            .current_preset
            .as_ref()
            .filter(|id| settings.preset(id).is_some())
            .cloned();
        if settings.current_preset != current {
            settings.current_preset = current;
            changed = true;
        }
        if settings.typography != self.snapshot.typography {
            settings.typography = self.snapshot.typography;
            changed = true;
        }
        for preset in &self.snapshot.presets {
            changed |= settings.restore_preset_values(&preset.id, preset);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            presets: vec![
                Preset {
                    id: "a".into(),
                    name: "A".into(),
                    ui_font: Some("Foo".into()),
                    ui_font_size: Some(16.0),
                    ..Preset::default()
                },
                Preset {
                    id: "b".into(),
                    name: "B".into(),
                    ui_font_size: Some(20.0),
                    ..Preset::default()
                },
            ],
            current_preset: Some("a".into()),
            ..Settings::default()
        }
    }

    #[test]
    fn test_begin_selects_current_or_globals() {
        let s = settings();
        assert_eq!(EditSession::begin(&s, 1).selected_preset(), Some("a"));

        let mut s = settings();
        s.current_preset = Some("dangling".into());
        let session = EditSession::begin(&s, 1);
        assert_eq!(session.selected_preset(), None);
        assert_eq!(session.overrides().ui_font_size, Some(14.0));
    }

    #[test]
    fn test_select_preset_reseeds() {
        let s = settings();
        let mut session = EditSession::begin(&s, 1);
        session.set_knob(Knob::UiFontSize, 30.0);
        session.select_preset(&s, Some("b")).unwrap();
        assert_eq!(session.overrides().ui_font_size, Some(20.0));
        assert_eq!(session.overrides().ui_font, Some(FontChoice::Default));
        assert_eq!(
            session.select_preset(&s, Some("zzz")),
            Err(PresetError::UnknownPreset("zzz".into()))
        );
    }

    #[test]
    fn test_set_knob_clamps() {
        let mut session = EditSession::begin(&settings(), 1);
        assert_eq!(session.set_knob(Knob::ChatLineHeight, 9.0), Some(3.0));
        assert_eq!(session.set_knob(Knob::UiFontSize, f32::INFINITY), None);
        assert_eq!(session.overrides().ui_font_size, Some(16.0));
    }

    #[test]
    fn test_capture_into_preset_materializes_values() {
        let mut s = settings();
        let mut session = EditSession::begin(&s, 1);
        session.select_preset(&s, Some("b")).unwrap();
        session.set_knob(Knob::ChatFontSize, 18.0);
        session.capture_into(&mut s);

        let b = s.preset("b").unwrap();
        assert_eq!(b.chat_font_size, Some(18.0));
        assert_eq!(b.ui_font_size, Some(20.0));
        // Inherited globals are written out explicitly
        assert_eq!(b.chat_line_height, Some(1.2));
        assert_eq!(s.current_preset.as_deref(), Some("b"));
    }

    #[test]
    fn test_capture_without_preset_writes_globals() {
        let mut s = Settings::default();
        let mut session = EditSession::begin(&s, 1);
        session.set_knob(Knob::UiFontSize, 18.0);
        session.set_font(FontSlot::Ui, FontChoice::Named("Foo".into()));
        session.capture_into(&mut s);
        assert_eq!(s.typography.ui_font_size, 18.0);
        assert_eq!(s.current_preset, None);
    }

    #[test]
    fn test_capture_without_preset_clears_current() {
        let mut s = settings();
        assert!(s.current_preset.is_some());
        let mut session = EditSession::begin(&s, 1);
        session.select_preset(&s, None).unwrap();
        session.set_knob(Knob::UiFontSize, 18.0);
        session.capture_into(&mut s);
        assert_eq!(s.current_preset, None);
        assert_eq!(s.typography.ui_font_size, 18.0);
    }

    #[test]
    fn test_restore_is_exact() {
        let mut s = settings();
        let before = s.clone();
        let mut session = EditSession::begin(&s, 1);
        session.select_preset(&s, Some("b")).unwrap();
        session.set_knob(Knob::UiFontSize, 25.0);
        session.capture_into(&mut s);
        assert_ne!(s, before);

        assert!(session.restore(&mut s));
        assert_eq!(s, before);
        assert!(!session.restore(&mut s));
    }

    #[test]
    fn test_save_moves_cancel_point() {
        let mut s = settings();
        let mut session = EditSession::begin(&s, 1);
        session.set_knob(Knob::UiFontSize, 25.0);
        session.save(&mut s);
        let saved = s.clone();

        session.set_knob(Knob::UiFontSize, 10.0);
        session.capture_into(&mut s);
        session.restore(&mut s);
        assert_eq!(s, saved);
    }

    #[test]
    fn test_forget_font_scrubs_snapshot() {
        let mut s = settings();
        let mut session = EditSession::begin(&s, 1);
        s.presets[0].ui_font = None;
        session.forget_font("Foo");
        assert_eq!(session.overrides().ui_font, Some(FontChoice::Default));
        assert!(!session.restore(&mut s));
    }
}
