//! Integration tests for font-manager
//!
//! These tests exercise full workflows across the registry, presets, the
//! edit session, stylesheet rendering and theme auto-apply.

use crate::config::{load_settings, FontSlot, Knob, Preset, Settings, ThemeBinding};
use crate::css::{render, STYLE_ELEMENT_ID};
use crate::error::FontError;
use crate::headless::{HeadlessDocument, MemoryPersistence};
use crate::host::{HostSignal, Persistence};
use crate::manager::{AutoApply, FontManager};
use crate::overrides::{resolve, FontChoice};
use crate::persist::DebouncedSaver;
use crate::theme::ThemeSignals;
use crate::watcher::{install_theme_watch, run_theme_watcher, WatchSource};

type Manager = FontManager<HeadlessDocument, MemoryPersistence>;

fn manager_with(settings: Settings) -> Manager {
    let mut m = FontManager::new(settings, HeadlessDocument::new(), MemoryPersistence::new());
    m.refresh().unwrap();
    m
}

fn font_css(family: &str) -> String {
    format!(
        "@font-face {{ font-family: '{}'; src: url(https://fonts.example/{}.woff2) format('woff2'); }}",
        family, family
    )
}

fn ab_settings() -> Settings {
    Settings {
        presets: vec![
            Preset {
                id: "A".into(),
                name: "A".into(),
                ui_font_size: Some(16.0),
                ..Preset::default()
            },
            Preset {
                id: "B".into(),
                name: "B".into(),
                ui_font_size: Some(20.0),
                ..Preset::default()
            },
        ],
        current_preset: Some("A".into()),
        ..Settings::default()
    }
}

fn installed(m: &Manager) -> &str {
    m.document().style_text(STYLE_ELEMENT_ID).unwrap()
}

/// Test registry size equals successful imports, duplicates never grow it
#[test]
fn test_registry_size_law() {
    let mut m = manager_with(Settings::default());
    let names = ["Foo", "Bar", "Foo", "Baz", "Bar", "foo"];
    let mut successes = 0;

    for name in names {
        let before = m.settings().fonts.len();
        match m.import_css_font(name, &font_css(name)) {
            Ok(_) => successes += 1,
            Err(e) => {
                assert_eq!(e, FontError::DuplicateName(name.to_string()));
                assert_eq!(m.settings().fonts.len(), before);
            }
        }
        assert_eq!(m.settings().fonts.len(), successes);
    }
    // "foo" differs from "Foo" by case only and is accepted
    assert_eq!(successes, 4);
}

/// Test deleting a referenced font degrades the preset to the default font
#[test]
fn test_deleted_font_degrades_to_default() {
    let mut m = manager_with(Settings::default());
    m.import_css_font("Fancy", &font_css("FancySerif")).unwrap();
    let id = m.add_preset("Reading").unwrap();
    m.begin_edit();
    m.select_preset(Some(id.as_str())).unwrap();
    m.set_font(FontSlot::Ui, FontChoice::Named("Fancy".into())).unwrap();
    m.set_font(FontSlot::Message, FontChoice::Named("Fancy".into())).unwrap();
    assert!(m.commit_edit());
    assert!(installed(&m).contains("FancySerif"));

    let font_id = m.settings().fonts[0].id.clone();
    m.remove_font(&font_id);

    let css = m.render_css();
    assert!(!css.contains("Fancy"));
    assert!(!installed(&m).contains("Fancy"));
    let resolved = m.resolved();
    assert_eq!(resolved.ui_family, None);
    assert_eq!(resolved.message_family, None);
}

/// Test a dangling name left in stored settings still renders as default
#[test]
fn test_dangling_font_name_in_settings() {
    let mut settings = ab_settings();
    settings.presets[0].ui_font = Some("Gone".into());
    let css = render(&settings, None);
    assert!(!css.contains("Gone"));
    assert!(!css.contains("font-family"));
}

/// Test render output is byte-identical for identical inputs
#[test]
fn test_render_is_pure() {
    let mut m = manager_with(ab_settings());
    m.import_css_font("Foo", &font_css("RealFoo")).unwrap();
    m.begin_edit();
    m.set_font(FontSlot::Ui, FontChoice::Named("Foo".into())).unwrap();
    m.set_knob(Knob::ChatLineHeight, 1.6).unwrap();

    let overrides = m.session().unwrap().overrides().clone();
    let first = render(m.settings(), Some(&overrides));
    let second = render(m.settings(), Some(&overrides));
    assert_eq!(first, second);
    assert_eq!(first, m.render_css());

    // Re-installing the same state leaves the element untouched
    assert!(!m.refresh().unwrap());
    assert_eq!(m.document().style_element_count(), 1);
}

/// Test cancel reproduces the pre-session stylesheet after any edits
#[test]
fn test_cancel_restore_law() {
    let mut m = manager_with(ab_settings());
    m.import_css_font("Foo", &font_css("RealFoo")).unwrap();
    let before_css = m.render_css();
    let before_installed = installed(&m).to_string();
    let saves = m.persistence().save_count();

    m.begin_edit();
    m.set_knob(Knob::UiFontSize, 30.0).unwrap();
    m.select_preset(Some("B")).unwrap();
    m.set_font(FontSlot::Message, FontChoice::Named("Foo".into())).unwrap();
    m.set_knob(Knob::ChatFontWeight, 1.5).unwrap();
    m.select_preset(None).unwrap();
    m.set_knob(Knob::InputFontSize, 9.0).unwrap();
    m.set_font(FontSlot::Ui, FontChoice::Named("Foo".into())).unwrap();
    assert_ne!(m.render_css(), before_css);

    assert!(m.cancel_edit());
    assert_eq!(m.render_css(), before_css);
    assert_eq!(installed(&m), before_installed);
    assert_eq!(m.persistence().save_count(), saves);
}

/// Test committed values resolve identically without overrides
#[test]
fn test_commit_law() {
    let mut m = manager_with(ab_settings());
    m.import_css_font("Foo", &font_css("RealFoo")).unwrap();
    m.begin_edit();
    m.select_preset(Some("B")).unwrap();
    m.set_font(FontSlot::Ui, FontChoice::Named("Foo".into())).unwrap();
    m.set_knob(Knob::ChatFontSize, 19.0).unwrap();
    m.set_knob(Knob::ChatLineHeight, 1.4).unwrap();

    let live = m.resolved();
    let live_css = m.render_css();
    assert!(m.commit_edit());

    assert_eq!(resolve(m.settings(), None), live);
    assert_eq!(m.render_css(), live_css);
    assert_eq!(m.settings().current_preset.as_deref(), Some("B"));

    let saved = m.persistence().last_saved().unwrap();
    assert_eq!(saved.preset("B").unwrap().chat_font_size, Some(19.0));
}

/// Test the family inside the CSS is used, not the user-facing name
#[test]
fn test_real_family_scenario() {
    let mut m = manager_with(Settings::default());
    let entry = m
        .import_css_font("Foo", "@font-face { font-family: 'RealFoo'; src: url(foo.woff2); }")
        .unwrap();
    assert_eq!(m.settings().fonts.len(), 1);
    assert_eq!(entry.resolved_family, "RealFoo");

    m.begin_edit();
    m.set_font(FontSlot::Ui, FontChoice::Named("Foo".into())).unwrap();
    let css = m.render_css();
    let ui_rule = &css[css.find("/* UI FONT APPLICATION */").unwrap()..];
    assert!(ui_rule.contains("font-family: \"RealFoo\""));
    assert!(!css.contains("font-family: \"Foo\""));
}

/// Test previewing preset B and cancelling back to A
#[test]
fn test_preset_preview_scenario() {
    let mut m = manager_with(ab_settings());
    assert!(installed(&m).contains("--font-manager-ui-size: 16px;"));

    m.begin_edit();
    m.select_preset(Some("B")).unwrap();
    assert!(installed(&m).contains("--font-manager-ui-size: 20px;"));
    assert_eq!(m.settings().current_preset.as_deref(), Some("A"));

    m.cancel_edit();
    assert!(installed(&m).contains("--font-manager-ui-size: 16px;"));
    assert_eq!(m.persistence().save_count(), 0);
}

/// Test theme auto-apply commits once and the guard stops a second save
#[test]
fn test_dark_theme_scenario() {
    let mut settings = ab_settings();
    settings.theme_bindings.push(ThemeBinding {
        theme_id: "dark".into(),
        preset_id: "B".into(),
    });
    let mut m = manager_with(settings);
    m.document_mut().set_theme_signals(ThemeSignals {
        active_theme: Some("Dark Mode".into()),
        ..ThemeSignals::default()
    });

    assert_eq!(m.check_and_apply_auto_preset(), AutoApply::Applied("B".into()));
    assert_eq!(m.settings().current_preset.as_deref(), Some("B"));
    assert_eq!(m.persistence().save_count(), 1);
    assert!(installed(&m).contains("--font-manager-ui-size: 20px;"));

    assert_eq!(m.check_and_apply_auto_preset(), AutoApply::Skipped("B".into()));
    assert_eq!(m.persistence().save_count(), 1);
}

/// Test theme changes across href and class signals re-arm auto-apply
#[test]
fn test_href_and_class_signals_rearm_auto_apply() {
    let mut settings = ab_settings();
    settings.theme_bindings.push(ThemeBinding {
        theme_id: "nord".into(),
        preset_id: "B".into(),
    });
    let mut m = manager_with(settings);

    m.document_mut().set_theme_signals(ThemeSignals {
        stylesheet_hrefs: vec!["/css/themes/light.css".into()],
        ..ThemeSignals::default()
    });
    assert_eq!(m.check_and_apply_auto_preset(), AutoApply::NoMatch);

    m.document_mut().set_theme_signals(ThemeSignals {
        stylesheet_hrefs: vec!["/css/themes/Nord.css".into()],
        ..ThemeSignals::default()
    });
    assert_eq!(m.check_and_apply_auto_preset(), AutoApply::Applied("B".into()));

    // Manual switch back, then the same theme applies again after leaving it
    m.switch_preset(Some("A")).unwrap();
    m.document_mut().set_theme_signals(ThemeSignals::default());
    assert_eq!(m.check_and_apply_auto_preset(), AutoApply::NoMatch);
    m.document_mut().set_theme_signals(ThemeSignals {
        class_names: vec!["theme-nord".into()],
        ..ThemeSignals::default()
    });
    assert_eq!(m.check_and_apply_auto_preset(), AutoApply::Applied("B".into()));
}

/// Test a burst of host theme signals leads to one auto-apply
#[tokio::test(start_paused = true)]
async fn test_theme_watcher_drives_auto_apply() {
    let mut settings = ab_settings();
    settings.theme_bindings.push(ThemeBinding {
        theme_id: "dark".into(),
        preset_id: "B".into(),
    });
    let mut m = manager_with(settings);

    let mut host = HeadlessDocument::new();
    let (tx, rx) = crossbeam_channel::unbounded();
    assert_eq!(install_theme_watch(&mut host, tx).unwrap(), WatchSource::Observer);

    m.document_mut().set_theme_signals(ThemeSignals {
        active_theme: Some("Dark Mode".into()),
        ..ThemeSignals::default()
    });
    host.notify(HostSignal::StylesheetsChanged);
    host.notify(HostSignal::RootAttributesChanged);
    host.notify(HostSignal::StylesheetsChanged);
    // The watcher stops once the host's senders are gone
    drop(host);

    let mut outcomes = Vec::new();
    run_theme_watcher(rx, || outcomes.push(m.check_and_apply_auto_preset())).await;

    assert_eq!(outcomes, vec![AutoApply::Applied("B".into())]);
    assert_eq!(m.settings().current_preset.as_deref(), Some("B"));
    assert_eq!(m.persistence().save_count(), 1);
}

/// Test committing with no preset keeps the previewed globals
#[test]
fn test_commit_without_preset_keeps_preview() {
    let mut m = manager_with(ab_settings());
    m.begin_edit();
    m.select_preset(None).unwrap();
    m.set_knob(Knob::UiFontSize, 18.0).unwrap();
    let live_css = m.render_css();
    assert!(live_css.contains("--font-manager-ui-size: 18px;"));

    assert!(m.commit_edit());
    assert_eq!(m.settings().current_preset, None);
    assert_eq!(m.render_css(), live_css);
    assert!(installed(&m).contains("--font-manager-ui-size: 18px;"));
    assert_eq!(m.settings().typography.ui_font_size, 18.0);
}

/// Test settings written through the file saver load back unchanged
#[test]
fn test_settings_survive_reload() {
    let dir = std::env::temp_dir().join(format!(
        "font-manager-it-{}",
        uuid::Uuid::new_v4().simple()
    ));
    let path = dir.join("settings.json");

    let mut m = manager_with(ab_settings());
    m.import_css_font("Foo", &font_css("RealFoo")).unwrap();
    m.add_theme_binding("dark", "B").unwrap();
    m.begin_edit();
    m.set_knob(Knob::UiFontWeight, 0.5).unwrap();
    m.commit_edit();

    let saver = DebouncedSaver::new(path.clone());
    saver.request_save(m.settings());
    saver.flush();

    let loaded = load_settings(&path).unwrap();
    assert_eq!(&loaded, m.settings());
    assert_eq!(render(&loaded, None), m.render_css());

    drop(saver);
    let _ = std::fs::remove_dir_all(dir);
}
