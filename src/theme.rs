//! Theme-binding matcher.
//!
//! The host does not tell us which theme is active in a structured way, so
//! detection is heuristic: each binding's theme id is tested against a fixed,
//! ordered list of signals. The order is a policy choice; the first binding
//! (in configured order) with any matching signal wins.

use crate::config::{Settings, ThemeBinding};

/// Theme indicators read from the host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThemeSignals {
    /// Theme name the host reports as active.
    pub active_theme: Option<String>,
    /// Text content of every loaded stylesheet.
    pub stylesheet_texts: Vec<String>,
    /// `href` of every stylesheet link.
    pub stylesheet_hrefs: Vec<String>,
    /// Class names on the root and body elements.
    pub class_names: Vec<String>,
}

/// Signals with everything lowercased once up front.
struct LoweredSignals {
    active_theme: Option<String>,
    stylesheet_texts: Vec<String>,
    stylesheet_hrefs: Vec<String>,
    class_names: Vec<String>,
}

impl LoweredSignals {
    fn new(signals: &ThemeSignals) -> Self {
        let lower_all = |v: &[String]| v.iter().map(|s| s.to_lowercase()).collect::<Vec<_>>();
        Self {
            active_theme: signals
                .active_theme
                .as_deref()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty()),
            stylesheet_texts: lower_all(&signals.stylesheet_texts),
            stylesheet_hrefs: lower_all(&signals.stylesheet_hrefs),
            class_names: lower_all(&signals.class_names),
        }
    }
}

/// One predicate of the detection pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchSignal {
    /// Theme id equals the active theme name.
    ActiveThemeExact,
    /// One of theme id and active theme name contains the other.
    ActiveThemeSubstring,
    /// Theme id appears in a loaded stylesheet's text.
    StylesheetText,
    /// Theme id appears in a stylesheet href.
    StylesheetHref,
    /// Theme id appears in a root/body class name.
    ClassName,
}

impl MatchSignal {
    pub const PIPELINE: [MatchSignal; 5] = [
        MatchSignal::ActiveThemeExact,
        MatchSignal::ActiveThemeSubstring,
        MatchSignal::StylesheetText,
        MatchSignal::StylesheetHref,
        MatchSignal::ClassName,
    ];

    /// `theme_id` must already be lowercased and non-empty.
    fn matches(self, theme_id: &str, signals: &LoweredSignals) -> bool {
        let any_contains = |haystack: &[String]| haystack.iter().any(|s| s.contains(theme_id));
        match self {
            MatchSignal::ActiveThemeExact => signals.active_theme.as_deref() == Some(theme_id),
            MatchSignal::ActiveThemeSubstring => signals
                .active_theme
                .as_deref()
                .is_some_and(|active| active.contains(theme_id) || theme_id.contains(active)),
            MatchSignal::StylesheetText => any_contains(&signals.stylesheet_texts),
            MatchSignal::StylesheetHref => any_contains(&signals.stylesheet_hrefs),
            MatchSignal::ClassName => any_contains(&signals.class_names),
        }
    }
}

/// The binding that matched and the signal that matched it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThemeMatch {
    pub binding: ThemeBinding,
    pub signal: MatchSignal,
}

/// First binding whose theme id matches any signal.
///
/// Bindings with an empty theme id or a preset that no longer exists are
/// skipped.
pub fn find_binding(settings: &Settings, signals: &ThemeSignals) -> Option<ThemeMatch> {
    let lowered = LoweredSignals::new(signals);
    settings.theme_bindings.iter().find_map(|binding| {
        let theme_id = binding.theme_id.trim().to_lowercase();
        if theme_id.is_empty() || settings.preset(&binding.preset_id).is_none() {
            return None;
        }
        MatchSignal::PIPELINE
            .into_iter()
            .find(|signal| signal.matches(&theme_id, &lowered))
            .map(|signal| ThemeMatch {
                binding: binding.clone(),
                signal,
            })
    })
}

/// What an evaluation pass decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchDecision {
    /// Apply this match's preset.
    Apply(ThemeMatch),
    /// The matched preset was the last one auto-applied.
    AlreadyApplied(String),
    NoMatch,
}

/// Matcher with a guard against re-applying the same preset back to back.
#[derive(Debug, Default)]
pub struct ThemeMatcher {
    last_applied: Option<String>,
}

impl ThemeMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(&mut self, settings: &Settings, signals: &ThemeSignals) -> MatchDecision {
        match find_binding(settings, signals) {
            Some(found) if self.last_applied.as_deref() == Some(found.binding.preset_id.as_str()) => {
                MatchDecision::AlreadyApplied(found.binding.preset_id)
            }
            Some(found) => MatchDecision::Apply(found),
            None => {
                // Coming back to a bound theme later should apply again
                self.last_applied = None;
                MatchDecision::NoMatch
            }
        }
    }

    pub fn mark_applied(&mut self, preset_id: &str) {
        self.last_applied = Some(preset_id.to_string());
    }

    pub fn last_applied(&self) -> Option<&str> {
        self.last_applied.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;

    fn settings(bindings: &[(&str, &str)]) -> Settings {
        Settings {
            presets: vec![
                Preset {
                    id: "a".into(),
                    name: "A".into(),
                    ..Preset::default()
                },
                Preset {
                    id: "b".into(),
                    name: "B".into(),
                    ..Preset::default()
                },
            ],
            theme_bindings: bindings
                .iter()
                .map(|(theme, preset)| ThemeBinding {
                    theme_id: theme.to_string(),
                    preset_id: preset.to_string(),
                })
                .collect(),
            ..Settings::default()
        }
    }

    fn active(name: &str) -> ThemeSignals {
        ThemeSignals {
            active_theme: Some(name.to_string()),
            ..ThemeSignals::default()
        }
    }

    #[test]
    fn test_exact_match_is_case_insensitive() {
        let found = find_binding(&settings(&[("Dark", "b")]), &active("dark")).unwrap();
        assert_eq!(found.signal, MatchSignal::ActiveThemeExact);
        assert_eq!(found.binding.preset_id, "b");
    }

    #[test]
    fn test_substring_either_direction() {
        let found = find_binding(&settings(&[("dark", "b")]), &active("Dark Mode")).unwrap();
        assert_eq!(found.signal, MatchSignal::ActiveThemeSubstring);

        let found = find_binding(&settings(&[("cappuccino-latte", "a")]), &active("Latte")).unwrap();
        assert_eq!(found.signal, MatchSignal::ActiveThemeSubstring);
    }

    #[test]
    fn test_stylesheet_href_and_class_signals() {
        let signals = ThemeSignals {
            stylesheet_hrefs: vec!["/themes/Nord.css".into()],
            class_names: vec!["theme-solarized".into()],
            ..ThemeSignals::default()
        };
        let found = find_binding(&settings(&[("nord", "a")]), &signals).unwrap();
        assert_eq!(found.signal, MatchSignal::StylesheetHref);
        let found = find_binding(&settings(&[("solarized", "b")]), &signals).unwrap();
        assert_eq!(found.signal, MatchSignal::ClassName);
    }

    #[test]
    fn test_stylesheet_text_checked_before_href() {
        let signals = ThemeSignals {
            stylesheet_texts: vec![":root { --theme: ocean; }".into()],
            stylesheet_hrefs: vec!["ocean.css".into()],
            ..ThemeSignals::default()
        };
        let found = find_binding(&settings(&[("Ocean", "a")]), &signals).unwrap();
        assert_eq!(found.signal, MatchSignal::StylesheetText);
    }

    #[test]
    fn test_first_binding_wins() {
        let s = settings(&[("light", "a"), ("dark", "b"), ("mode", "a")]);
        let found = find_binding(&s, &active("Dark Mode")).unwrap();
        assert_eq!(found.binding.theme_id, "dark");
    }

    #[test]
    fn test_empty_and_dangling_bindings_skipped() {
        let s = settings(&[("", "a"), ("dark", "gone"), ("dark", "b")]);
        let found = find_binding(&s, &active("dark")).unwrap();
        assert_eq!(found.binding.preset_id, "b");

        // An empty active theme name is not a substring match for everything
        let s = settings(&[("dark", "b")]);
        assert_eq!(find_binding(&s, &active("  ")), None);
        assert_eq!(find_binding(&s, &ThemeSignals::default()), None);
    }

    #[test]
    fn test_guard_skips_consecutive_reapply() {
        let s = settings(&[("dark", "b")]);
        let mut matcher = ThemeMatcher::new();

        let decision = matcher.evaluate(&s, &active("Dark Mode"));
        assert!(matches!(decision, MatchDecision::Apply(_)));
        matcher.mark_applied("b");

        assert_eq!(
            matcher.evaluate(&s, &active("Dark Mode")),
            MatchDecision::AlreadyApplied("b".into())
        );

        // Leaving the theme resets the guard
        assert_eq!(matcher.evaluate(&s, &active("Light")), MatchDecision::NoMatch);
        assert!(matches!(
            matcher.evaluate(&s, &active("Dark Mode")),
            MatchDecision::Apply(_)
        ));
    }
}
