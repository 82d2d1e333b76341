//! Font Manager command line.
//!
//! Runs the font manager against the settings file with the in-memory
//! headless host, so fonts, presets and theme bindings can be managed and the
//! resulting stylesheet inspected without a browser.

use std::error::Error;
use std::fs;
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use clap::{Parser, Subcommand};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tokio::runtime::Runtime;
use tracing::info;

use font_manager::config::{load_settings, settings_path, FontSlot, Knob, SourceKind};
use font_manager::error::{HostError, PresetError};
use font_manager::fonts::{negotiate_face, LOAD_TIMEOUT};
use font_manager::headless::HeadlessDocument;
use font_manager::host::{HostSignal, ThemeObserverHost};
use font_manager::manager::{AutoApply, FontManager};
use font_manager::overrides::FontChoice;
use font_manager::persist::DebouncedSaver;
use font_manager::theme::ThemeSignals;
use font_manager::watcher::{install_theme_watch, run_theme_watcher};

type Manager = FontManager<HeadlessDocument, DebouncedSaver>;
type CliResult<T = ()> = Result<T, Box<dyn Error>>;

/// Manage custom fonts, typography presets and theme bindings
#[derive(Parser, Debug)]
#[command(name = "font-manager")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stylesheet for the current preset
    Render,
    /// List registered fonts
    Fonts,
    /// Register @font-face CSS read from a file
    ImportCss { name: String, file: PathBuf },
    /// Register a .ttf/.otf/.woff/.woff2 font file
    ImportFile { name: String, file: PathBuf },
    /// Remove a font and every preset reference to it
    RemoveFont { name: String },
    /// List presets and theme bindings
    Presets,
    AddPreset { name: String },
    RenamePreset { name: String, new_name: String },
    DeletePreset { name: String },
    /// Make a preset current (omit the name to use global values only)
    UsePreset { name: Option<String> },
    /// Set a typography value on the current preset (or the globals)
    Set { knob: Knob, value: f32 },
    /// Pick the font for a slot (`ui` or `message`); omit the font for the default
    SetFont { slot: FontSlot, font: Option<String> },
    /// Auto-apply a preset when the host theme matches
    BindTheme { theme: String, preset: String },
    UnbindTheme { theme: String },
    /// Run theme detection against the given signals
    Detect {
        #[arg(long)]
        theme: Option<String>,
        #[arg(long = "class")]
        classes: Vec<String>,
        #[arg(long = "href")]
        hrefs: Vec<String>,
        /// Stylesheet text to match against
        #[arg(long = "stylesheet")]
        stylesheets: Vec<String>,
    },
    /// Read active theme names from stdin, one per line, and auto-apply
    Watch,
}

fn main() -> ExitCode {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult {
    let path = match cli.config {
        Some(path) => path,
        None => settings_path()?,
    };
    let settings = load_settings(&path)?;
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    let mut manager = FontManager::new(settings, HeadlessDocument::new(), DebouncedSaver::new(path));
    restore_fonts(&rt, &mut manager);
    manager.refresh()?;

    let result = execute(&rt, &mut manager, cli.command);
    manager.persistence().flush();
    result
}

/// Re-register stored binary fonts with the host.
fn restore_fonts(rt: &Runtime, manager: &mut Manager) {
    for pending in manager.take_pending_loads() {
        let result = rt.block_on(negotiate_face(manager.document(), pending, LOAD_TIMEOUT));
        // Restore failures are logged by the manager and never returned
        let _ = manager.finish_binary_import(result);
    }
}

fn preset_id(manager: &Manager, name: &str) -> Result<String, PresetError> {
    manager
        .settings()
        .preset_by_name(name)
        .map(|p| p.id.clone())
        .ok_or_else(|| PresetError::UnknownPreset(name.to_string()))
}

fn execute(rt: &Runtime, manager: &mut Manager, command: Command) -> CliResult {
    match command {
        Command::Render => print!("{}", manager.render_css()),
        Command::Fonts => {
            if manager.settings().fonts.is_empty() {
                println!("No fonts registered.");
            }
            for font in &manager.settings().fonts {
                let kind = match font.source_kind {
                    SourceKind::EmbeddedCss => "css",
                    SourceKind::BinaryFile => font.format.map(|f| f.css_hint()).unwrap_or("file"),
                };
                println!("{}\t{}\t{}", font.name, font.resolved_family, kind);
            }
        }
        Command::ImportCss { name, file } => {
            let css = fs::read_to_string(&file)?;
            let entry = manager.import_css_font(&name, &css)?;
            println!("Added '{}' (font-family: {})", entry.name, entry.resolved_family);
        }
        Command::ImportFile { name, file } => {
            let bytes = fs::read(&file)?;
            let filename = file
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            let pending = manager.begin_binary_import(&name, &filename, &bytes)?;
            let result = rt.block_on(negotiate_face(manager.document(), pending, LOAD_TIMEOUT));
            if let Some(entry) = manager.finish_binary_import(result)? {
                let format = entry.format.map(|f| f.css_hint()).unwrap_or("unknown");
                println!("Added '{}' ({})", entry.name, format);
            }
        }
        Command::RemoveFont { name } => {
            let id = manager
                .settings()
                .font_by_name(&name)
                .map(|f| f.id.clone())
                .ok_or_else(|| PresetError::UnknownFont(name.clone()))?;
            manager.remove_font(&id);
            println!("Removed '{}'", name);
        }
        Command::Presets => {
            let settings = manager.settings();
            if settings.presets.is_empty() {
                println!("No presets.");
            }
            for preset in &settings.presets {
                let marker = if settings.current_preset.as_deref() == Some(preset.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} {}\tui: {}\tmessage: {}",
                    marker,
                    preset.name,
                    preset.ui_font.as_deref().unwrap_or("default"),
                    preset.message_font.as_deref().unwrap_or("default")
                );
            }
            for binding in &settings.theme_bindings {
                let preset = settings
                    .preset(&binding.preset_id)
                    .map(|p| p.name.as_str())
                    .unwrap_or("?");
                println!("theme '{}' -> {}", binding.theme_id, preset);
            }
        }
        Command::AddPreset { name } => {
            manager.add_preset(&name)?;
            println!("Added preset '{}'", name.trim());
        }
        Command::RenamePreset { name, new_name } => {
            let id = preset_id(manager, &name)?;
            manager.rename_preset(&id, &new_name)?;
        }
        Command::DeletePreset { name } => {
            let id = preset_id(manager, &name)?;
            manager.delete_preset(&id)?;
        }
        Command::UsePreset { name } => {
            let id = name.as_deref().map(|n| preset_id(manager, n)).transpose()?;
            if !manager.switch_preset(id.as_deref())? {
                println!("Already in use.");
            }
        }
        Command::Set { knob, value } => {
            manager.begin_edit();
            match manager.set_knob(knob, value) {
                Ok(stored) => {
                    manager.commit_edit();
                    println!("{} = {}", knob, knob.css_value(stored));
                }
                Err(e) => {
                    manager.cancel_edit();
                    return Err(e.into());
                }
            }
        }
        Command::SetFont { slot, font } => {
            let choice = FontChoice::from_name(font.as_deref());
            manager.begin_edit();
            if manager.session().and_then(|s| s.selected_preset()).is_none() {
                manager.cancel_edit();
                return Err(PresetError::NoPresetSelected.into());
            }
            if let Err(e) = manager.set_font(slot, choice) {
                manager.cancel_edit();
                return Err(e.into());
            }
            manager.commit_edit();
        }
        Command::BindTheme { theme, preset } => {
            let id = preset_id(manager, &preset)?;
            manager.add_theme_binding(&theme, &id)?;
        }
        Command::UnbindTheme { theme } => {
            if !manager.remove_theme_binding(&theme) {
                println!("No binding for '{}'.", theme);
            }
        }
        Command::Detect {
            theme,
            classes,
            hrefs,
            stylesheets,
        } => {
            manager.document_mut().set_theme_signals(ThemeSignals {
                active_theme: theme,
                stylesheet_texts: stylesheets,
                stylesheet_hrefs: hrefs,
                class_names: classes,
            });
            let outcome = manager.check_and_apply_auto_preset();
            println!("{}", describe(manager, &outcome));
        }
        Command::Watch => watch(rt, manager)?,
    }
    Ok(())
}

fn describe(manager: &Manager, outcome: &AutoApply) -> String {
    let name = |id: &str| {
        manager
            .settings()
            .preset(id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| id.to_string())
    };
    match outcome {
        AutoApply::Applied(id) => format!("Applied preset '{}'", name(id)),
        AutoApply::Skipped(id) => format!("Preset '{}' already applied", name(id)),
        AutoApply::NoMatch => "No theme binding matched".to_string(),
        AutoApply::Deferred => "Deferred until the dialog closes".to_string(),
        AutoApply::Failed => "Theme detection failed".to_string(),
    }
}

/// Stand-in host whose theme notifications come from stdin.
struct StdinThemes {
    names: Option<Sender<String>>,
}

impl ThemeObserverHost for StdinThemes {
    fn observe_theme_changes(&mut self, tx: Sender<HostSignal>) -> Result<(), HostError> {
        let names = self
            .names
            .take()
            .ok_or_else(|| HostError::Rejected("stdin is already being watched".into()))?;
        thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if names.send(line).is_err() || tx.send(HostSignal::RootAttributesChanged).is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    fn subscribe_settings_changed(&mut self, _tx: Sender<HostSignal>) -> Result<(), HostError> {
        Err(HostError::NotReady("settings notifications".into()))
    }
}

fn watch(rt: &Runtime, manager: &mut Manager) -> CliResult {
    let (names_tx, names_rx): (Sender<String>, Receiver<String>) = unbounded();
    let (signal_tx, signal_rx) = unbounded();
    let mut host = StdinThemes {
        names: Some(names_tx),
    };
    install_theme_watch(&mut host, signal_tx)?;
    info!("watching stdin for theme names");

    rt.block_on(run_theme_watcher(signal_rx, || {
        // Only the newest theme in a burst matters
        if let Some(theme) = names_rx.try_iter().last() {
            manager.document_mut().set_theme_signals(ThemeSignals {
                active_theme: Some(theme),
                ..ThemeSignals::default()
            });
        }
        let outcome = manager.check_and_apply_auto_preset();
        println!("{}", describe(manager, &outcome));
    }));
    Ok(())
}
