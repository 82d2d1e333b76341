//! In-memory host used by the CLI and the tests.
//!
//! `HeadlessDocument` keeps style elements as strings, "parses" CSS with a
//! small brace-matching reader standing in for a browser's CSS parser, and
//! loads font faces by sniffing file signatures.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use crossbeam_channel::Sender;

use crate::config::Settings;
use crate::error::HostError;
use crate::fonts::FontFormat;
use crate::host::{
    Document, FaceHandle, FaceLoadError, FaceLoader, HostSignal, Persistence, StyleHandle,
    ThemeObserverHost,
};
use crate::theme::ThemeSignals;

struct StyleElement {
    handle: StyleHandle,
    id: String,
    text: String,
}

pub struct HeadlessDocument {
    next_handle: u64,
    styles: Vec<StyleElement>,
    next_face: Cell<u64>,
    faces: RefCell<HashMap<u64, (String, FontFormat)>>,
    fail_parsing: bool,
    signals: ThemeSignals,
    observer_available: bool,
    observers: Vec<Sender<HostSignal>>,
    settings_subscribers: Vec<Sender<HostSignal>>,
}

impl Default for HeadlessDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDocument {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            styles: Vec::new(),
            next_face: Cell::new(1),
            faces: RefCell::new(HashMap::new()),
            fail_parsing: false,
            signals: ThemeSignals::default(),
            observer_available: true,
            observers: Vec::new(),
            settings_subscribers: Vec::new(),
        }
    }

    pub fn style_text(&self, id: &str) -> Option<&str> {
        self.styles
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.text.as_str())
    }

    pub fn style_element_count(&self) -> usize {
        self.styles.len()
    }

    /// Make every CSS parse fail, as a host rejecting the stylesheet would.
    pub fn fail_parsing(&mut self, fail: bool) {
        self.fail_parsing = fail;
    }

    pub fn set_theme_signals(&mut self, signals: ThemeSignals) {
        self.signals = signals;
    }

    /// Pretend the structural observer API is missing.
    pub fn set_observer_available(&mut self, available: bool) {
        self.observer_available = available;
    }

    pub fn face_families(&self) -> Vec<String> {
        let mut families: Vec<String> = self
            .faces
            .borrow()
            .values()
            .map(|(family, _)| family.clone())
            .collect();
        families.sort();
        families
    }

    /// Deliver a change notification to whoever subscribed for it.
    pub fn notify(&self, signal: HostSignal) {
        let targets = match signal {
            HostSignal::SettingsChanged => &self.settings_subscribers,
            _ => &self.observers,
        };
        for tx in targets {
            let _ = tx.send(signal);
        }
    }
}

impl Document for HeadlessDocument {
    fn create_style_element(&mut self, id: &str) -> Result<StyleHandle, HostError> {
        let handle = StyleHandle(self.next_handle);
        self.next_handle += 1;
        self.styles.push(StyleElement {
            handle,
            id: id.to_string(),
            text: String::new(),
        });
        Ok(handle)
    }

    fn set_style_text(&mut self, handle: StyleHandle, css: &str) -> Result<(), HostError> {
        let element = self
            .styles
            .iter_mut()
            .find(|s| s.handle == handle)
            .ok_or(HostError::UnknownHandle(handle.0))?;
        element.text = css.to_string();
        Ok(())
    }

    fn parse_stylesheet(&mut self, css: &str) -> Result<Vec<String>, HostError> {
        if self.fail_parsing {
            return Err(HostError::Rejected("stylesheet parsing disabled".into()));
        }
        parse_rules(css)
    }

    fn unregister_face(&mut self, face: FaceHandle) -> Result<(), HostError> {
        self.faces
            .borrow_mut()
            .remove(&face.0)
            .map(|_| ())
            .ok_or(HostError::UnknownHandle(face.0))
    }

    fn theme_signals(&self) -> Result<ThemeSignals, HostError> {
        Ok(self.signals.clone())
    }
}

/// Guess a font container from its first bytes.
pub fn sniff_format(bytes: &[u8]) -> Option<FontFormat> {
    let magic: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    match &magic {
        b"\x00\x01\x00\x00" | b"true" => Some(FontFormat::TrueType),
        b"OTTO" => Some(FontFormat::OpenType),
        b"wOF2" => Some(FontFormat::Woff2),
        b"wOFF" => Some(FontFormat::Woff),
        _ => None,
    }
}

impl FaceLoader for HeadlessDocument {
    async fn load_face(
        &self,
        family: &str,
        source: &str,
        format: FontFormat,
    ) -> Result<FaceHandle, FaceLoadError> {
        let (_, encoded) = source
            .split_once(";base64,")
            .ok_or_else(|| FaceLoadError::Rejected("only base64 data sources are supported".into()))?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| FaceLoadError::Corrupt(format!("invalid base64: {}", e)))?;
        if bytes.len() < 4 {
            return Err(FaceLoadError::Corrupt("file is truncated".into()));
        }
        match sniff_format(&bytes) {
            Some(found) if found == format => {
                let id = self.next_face.get();
                self.next_face.set(id + 1);
                self.faces
                    .borrow_mut()
                    .insert(id, (family.to_string(), format));
                Ok(FaceHandle(id))
            }
            Some(found) => Err(FaceLoadError::Rejected(format!(
                "data is {}, not {}",
                found.css_hint(),
                format.css_hint()
            ))),
            None => Err(FaceLoadError::Rejected("unknown font signature".into())),
        }
    }
}

impl ThemeObserverHost for HeadlessDocument {
    fn observe_theme_changes(&mut self, tx: Sender<HostSignal>) -> Result<(), HostError> {
        if !self.observer_available {
            return Err(HostError::NotReady("mutation observer".into()));
        }
        self.observers.push(tx);
        Ok(())
    }

    fn subscribe_settings_changed(&mut self, tx: Sender<HostSignal>) -> Result<(), HostError> {
        self.settings_subscribers.push(tx);
        Ok(())
    }
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut chars = css.chars().peekable();
    let mut quote: Option<char> = None;
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                out.push(c);
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a stylesheet into top-level rules, dropping comments.
fn parse_rules(css: &str) -> Result<Vec<String>, HostError> {
    let text = strip_comments(css);
    let mut rules = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                if depth == 0 {
                    return Err(HostError::Rejected(format!("unexpected '}}' at byte {}", i)));
                }
                depth -= 1;
                if depth == 0 {
                    rules.push(collapse_whitespace(&text[start..=i]));
                    start = i + 1;
                }
            }
            ';' if depth == 0 => {
                let statement = text[start..=i].trim();
                if statement.len() > 1 {
                    rules.push(collapse_whitespace(statement));
                }
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 || quote.is_some() {
        return Err(HostError::Rejected("unterminated block or string".into()));
    }
    Ok(rules)
}

/// Persistence that keeps every requested save in memory.
#[derive(Clone, Default)]
pub struct MemoryPersistence {
    saves: Rc<RefCell<Vec<Settings>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self) -> usize {
        self.saves.borrow().len()
    }

    pub fn last_saved(&self) -> Option<Settings> {
        self.saves.borrow().last().cloned()
    }
}

impl Persistence for MemoryPersistence {
    fn request_save(&self, settings: &Settings) {
        self.saves.borrow_mut().push(settings.clone());
    }
}
