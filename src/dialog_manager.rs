//! The font management dialog.
//!
//! The host owns the actual widgets. This module turns user actions
//! ([`DialogEvent`]) into manager operations, drives the name prompts, and
//! ties the edit session to the dialog's lifetime: [`EditGuard`] opens the
//! session and cancels it on drop unless the dialog closed with Save.

use tracing::debug;

use crate::config::{FontSlot, Knob, SourceKind, ThemeBinding};
use crate::error::PresetError;
use crate::fonts::{FaceLoadResult, PendingFace};
use crate::host::{Document, Persistence};
use crate::manager::FontManager;
use crate::overrides::FontChoice;
use crate::validation::{validate_font_file, validate_font_name, validate_preset_name};

/// One user action inside the dialog.
#[derive(Debug)]
pub enum DialogEvent {
    /// Preview another preset (`None` for globals).
    SelectPreset(Option<String>),
    SetFont(FontSlot, FontChoice),
    SetKnob(Knob, f32),
    AddPreset,
    RenamePreset,
    DeletePreset,
    SavePreset,
    /// Import pasted `@font-face` CSS; the name is prompted for.
    ImportCss(String),
    DropFontFile { filename: String, bytes: Vec<u8> },
    /// A load requested through [`DialogUpdate::loads`] finished.
    FontLoaded(FaceLoadResult),
    RemoveFont(String),
    /// Bind a theme to the selected preset.
    AddThemeBinding(String),
    RemoveThemeBinding(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresetRow {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FontRow {
    pub id: String,
    pub name: String,
    pub family: String,
    pub kind: SourceKind,
}

/// Everything the dialog displays.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogView {
    pub presets: Vec<PresetRow>,
    pub selected_preset: Option<String>,
    pub fonts: Vec<FontRow>,
    /// Font names picked for each slot; `None` is the host default.
    pub ui_font: Option<String>,
    pub message_font: Option<String>,
    pub knobs: Vec<(Knob, f32)>,
    pub theme_bindings: Vec<ThemeBinding>,
}

impl DialogView {
    pub fn build<D: Document, P: Persistence>(manager: &FontManager<D, P>) -> Self {
        let settings = manager.settings();
        let resolved = manager.resolved();
        let overrides = manager.session().map(|s| s.overrides());
        let font_name = |slot: FontSlot| -> Option<String> {
            match overrides.and_then(|o| o.font(slot)) {
                Some(choice) => choice.name().map(str::to_string),
                None => settings.current().and_then(|p| p.font(slot)).map(str::to_string),
            }
        };

        Self {
            presets: settings
                .presets
                .iter()
                .map(|p| PresetRow {
                    id: p.id.clone(),
                    name: p.name.clone(),
                })
                .collect(),
            selected_preset: match manager.session() {
                Some(session) => session.selected_preset().map(str::to_string),
                None => settings.current().map(|p| p.id.clone()),
            },
            fonts: settings
                .fonts
                .iter()
                .map(|f| FontRow {
                    id: f.id.clone(),
                    name: f.name.clone(),
                    family: f.resolved_family.clone(),
                    kind: f.source_kind,
                })
                .collect(),
            ui_font: font_name(FontSlot::Ui),
            message_font: font_name(FontSlot::Message),
            knobs: Knob::ALL
                .iter()
                .map(|k| (*k, resolved.typography.get(*k)))
                .collect(),
            theme_bindings: settings.theme_bindings.clone(),
        }
    }
}

/// Reply to an event: the refreshed view and any font loads to start.
#[derive(Debug)]
pub struct DialogUpdate {
    pub view: DialogView,
    pub loads: Vec<PendingFace>,
}

/// The modal window itself.
pub trait ManagementModal {
    /// Show the dialog until the user closes it. `handler` is called for
    /// every action. Returns true when closed with Save.
    fn show(&mut self, view: DialogView, handler: &mut dyn FnMut(DialogEvent) -> DialogUpdate) -> bool;
}

/// Small blocking prompts shown on top of the dialog.
pub trait Prompter {
    /// Ask for a name; `None` when the user cancels.
    fn prompt_name(&mut self, title: &str, initial: &str) -> Option<String>;
    fn notice(&mut self, message: &str);
    fn confirm(&mut self, question: &str) -> bool;
}

/// Ask for a preset name until it is valid or the user cancels.
pub fn prompt_preset_name<Q: Prompter + ?Sized>(
    prompter: &mut Q,
    presets: &[crate::config::Preset],
    renaming: Option<(&str, &str)>,
) -> Option<String> {
    let (renaming_id, initial) = match renaming {
        Some((id, name)) => (Some(id), name),
        None => (None, ""),
    };
    loop {
        let input = prompter.prompt_name("Preset name", initial)?;
        match validate_preset_name(&input, presets, renaming_id) {
            Ok(name) => return Some(name),
            Err(e) => prompter.notice(&e.to_string()),
        }
    }
}

/// Ask for a font name until it is valid or the user cancels.
pub fn prompt_font_name<Q: Prompter + ?Sized>(
    prompter: &mut Q,
    fonts: &[crate::config::FontEntry],
) -> Option<String> {
    loop {
        let input = prompter.prompt_name("Font name", "")?;
        match validate_font_name(&input, fonts) {
            Ok(name) => return Some(name),
            Err(e) => prompter.notice(&e.to_string()),
        }
    }
}

/// Scoped edit session: opened on creation, cancelled on drop unless
/// committed.
pub struct EditGuard<'a, D: Document, P: Persistence> {
    manager: &'a mut FontManager<D, P>,
    committed: bool,
}

impl<'a, D: Document, P: Persistence> EditGuard<'a, D, P> {
    pub fn new(manager: &'a mut FontManager<D, P>) -> Self {
        manager.begin_edit();
        Self {
            manager,
            committed: false,
        }
    }

    pub fn manager(&mut self) -> &mut FontManager<D, P> {
        self.manager
    }

    pub fn commit(mut self) {
        self.committed = true;
        self.manager.commit_edit();
    }
}

impl<D: Document, P: Persistence> Drop for EditGuard<'_, D, P> {
    fn drop(&mut self) {
        if !self.committed {
            self.manager.cancel_edit();
        }
    }
}

/// Apply one dialog event to the manager.
pub fn handle_event<D, P, Q>(manager: &mut FontManager<D, P>, prompter: &mut Q, event: DialogEvent) -> DialogUpdate
where
    D: Document,
    P: Persistence,
    Q: Prompter + ?Sized,
{
    let mut loads = Vec::new();
    debug!(?event, "dialog event");

    match event {
        DialogEvent::SelectPreset(id) => {
            if let Err(e) = manager.select_preset(id.as_deref()) {
                prompter.notice(&e.to_string());
            }
        }
        DialogEvent::SetFont(slot, choice) => {
            if let Err(e) = manager.set_font(slot, choice) {
                prompter.notice(&e.to_string());
            }
        }
        DialogEvent::SetKnob(knob, value) => {
            if let Err(e) = manager.set_knob(knob, value) {
                prompter.notice(&e.to_string());
            }
        }
        DialogEvent::AddPreset => {
            if let Some(name) = prompt_preset_name(prompter, &manager.settings().presets, None) {
                if let Err(e) = manager.add_preset(&name) {
                    prompter.notice(&e.to_string());
                }
            }
        }
        DialogEvent::RenamePreset => match selected_preset(manager) {
            Some(id) => {
                let current = manager
                    .settings()
                    .preset(&id)
                    .map(|p| p.name.clone())
                    .unwrap_or_default();
                let renamed = prompt_preset_name(
                    prompter,
                    &manager.settings().presets,
                    Some((id.as_str(), current.as_str())),
                );
                if let Some(name) = renamed {
                    if let Err(e) = manager.rename_preset(&id, &name) {
                        prompter.notice(&e.to_string());
                    }
                }
            }
            None => prompter.notice(&PresetError::NoPresetSelected.to_string()),
        },
        DialogEvent::DeletePreset => match selected_preset(manager) {
            Some(id) => {
                if prompter.confirm("Delete the selected preset?") {
                    if let Err(e) = manager.delete_preset(&id) {
                        prompter.notice(&e.to_string());
                    }
                }
            }
            None => prompter.notice(&PresetError::NoPresetSelected.to_string()),
        },
        DialogEvent::SavePreset => match manager.save_current_preset() {
            Ok(()) => prompter.notice("Preset saved."),
            Err(e) => prompter.notice(&e.to_string()),
        },
        DialogEvent::ImportCss(css) => {
            if css.trim().is_empty() {
                prompter.notice("Paste the font's CSS source first.");
            } else if let Some(name) = prompt_font_name(prompter, &manager.settings().fonts) {
                if let Err(e) = manager.import_css_font(&name, &css) {
                    prompter.notice(&e.to_string());
                }
            }
        }
        DialogEvent::DropFontFile { filename, bytes } => {
            // Reject the file before asking for a name
            if let Err(e) = validate_font_file(&filename, bytes.len() as u64) {
                prompter.notice(&e.to_string());
            } else if let Some(name) = prompt_font_name(prompter, &manager.settings().fonts) {
                match manager.begin_binary_import(&name, &filename, &bytes) {
                    Ok(pending) => loads.push(pending),
                    Err(e) => prompter.notice(&e.to_string()),
                }
            }
        }
        DialogEvent::FontLoaded(result) => {
            if let Err(e) = manager.finish_binary_import(result) {
                prompter.notice(&e.to_string());
            }
        }
        DialogEvent::RemoveFont(id) => {
            if prompter.confirm("Delete this font?") {
                manager.remove_font(&id);
            }
        }
        DialogEvent::AddThemeBinding(theme_id) => match selected_preset(manager) {
            Some(preset_id) => {
                if let Err(e) = manager.add_theme_binding(&theme_id, &preset_id) {
                    prompter.notice(&e.to_string());
                }
            }
            None => prompter.notice(&PresetError::NoPresetSelected.to_string()),
        },
        DialogEvent::RemoveThemeBinding(theme_id) => {
            manager.remove_theme_binding(&theme_id);
        }
    }

    DialogUpdate {
        view: DialogView::build(manager),
        loads,
    }
}

fn selected_preset<D: Document, P: Persistence>(manager: &FontManager<D, P>) -> Option<String> {
    manager
        .session()
        .and_then(|s| s.selected_preset())
        .map(str::to_string)
}

/// Run the management dialog as one edit session.
///
/// Returns true when the user saved; any other way out cancels.
pub fn open_management_dialog<D, P, M, Q>(manager: &mut FontManager<D, P>, modal: &mut M, prompter: &mut Q) -> bool
where
    D: Document,
    P: Persistence,
    M: ManagementModal + ?Sized,
    Q: Prompter + ?Sized,
{
    let mut guard = EditGuard::new(manager);
    let view = DialogView::build(guard.manager());
    let saved = modal.show(view, &mut |event| handle_event(guard.manager(), prompter, event));
    if saved {
        guard.commit();
    }
    saved
}
