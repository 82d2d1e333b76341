//! Font registry helpers: family extraction, upload encoding and format
//! negotiation for binary fonts.
//!
//! The registry itself is `Settings::fonts`; the operations that mutate it
//! live on [`crate::manager::FontManager`] so they can persist and re-render.

use std::io::Write;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderStringWriter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::config::{FontEntry, SourceKind};
use crate::error::{FontError, LoadFailureKind};
use crate::host::{FaceHandle, FaceLoadError, FaceLoader};

/// Upper bound on waiting for the host to load a binary font.
pub const LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes encoded per step when converting an upload to base64.
pub const ENCODE_CHUNK_SIZE: usize = 8 * 1024;

static FONT_FACE_FAMILY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)@font-face\s*\{[^}]*?font-family\s*:\s*['"]*([^'";}]+)['"]*"#)
        .expect("font-face regex pattern is valid")
});

/// The `font-family` declared by the first `@font-face` block, if any.
pub fn extract_font_family(css: &str) -> Option<String> {
    let family = FONT_FACE_FAMILY_RE
        .captures(css)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|f| !f.is_empty());
    if let Some(ref f) = family {
        debug!(family = %f, "extracted font-family from css");
    }
    family
}

/// Embedding formats for uploaded fonts, in negotiation order.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FontFormat {
    TrueType,
    OpenType,
    Woff2,
    Woff,
}

impl FontFormat {
    pub const NEGOTIATION_ORDER: [FontFormat; 4] = [
        FontFormat::TrueType,
        FontFormat::OpenType,
        FontFormat::Woff2,
        FontFormat::Woff,
    ];

    /// Value for the CSS `format()` hint.
    pub fn css_hint(self) -> &'static str {
        match self {
            FontFormat::TrueType => "truetype",
            FontFormat::OpenType => "opentype",
            FontFormat::Woff2 => "woff2",
            FontFormat::Woff => "woff",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            FontFormat::TrueType => "font/ttf",
            FontFormat::OpenType => "font/otf",
            FontFormat::Woff2 => "font/woff2",
            FontFormat::Woff => "font/woff",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "ttf" => Some(FontFormat::TrueType),
            "otf" => Some(FontFormat::OpenType),
            "woff2" => Some(FontFormat::Woff2),
            "woff" => Some(FontFormat::Woff),
            _ => None,
        }
    }

    /// Order to try formats in, with `preferred` moved to the front.
    pub fn attempt_order(preferred: Option<FontFormat>) -> Vec<FontFormat> {
        let mut order = Vec::with_capacity(Self::NEGOTIATION_ORDER.len());
        order.extend(preferred);
        order.extend(
            Self::NEGOTIATION_ORDER
                .into_iter()
                .filter(|f| Some(*f) != preferred),
        );
        order
    }
}

/// Base64 encode an upload, feeding the encoder in fixed-size chunks.
pub fn encode_font_payload(bytes: &[u8]) -> String {
    let mut encoder = EncoderStringWriter::new(&STANDARD);
    for chunk in bytes.chunks(ENCODE_CHUNK_SIZE) {
        // Writing into a String cannot fail
        let _ = encoder.write_all(chunk);
    }
    encoder.into_inner()
}

pub fn data_url(format: FontFormat, payload: &str) -> String {
    format!("data:{};base64,{}", format.mime_type(), payload)
}

/// A binary font waiting for the host to load it.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingFace {
    pub font_id: String,
    pub name: String,
    pub family: String,
    /// Base64 font data.
    pub payload: String,
    pub original_filename: Option<String>,
    pub formats: Vec<FontFormat>,
    /// Edit session that asked for the load, if any.
    pub generation: Option<u64>,
    /// True when re-registering a font that is already stored.
    pub restore: bool,
}

impl PendingFace {
    /// The registry entry this load produces once a format sticks.
    pub fn into_entry(self, format: FontFormat) -> FontEntry {
        FontEntry {
            id: self.font_id,
            name: self.name,
            source_kind: SourceKind::BinaryFile,
            payload: self.payload,
            resolved_family: self.family,
            original_filename: self.original_filename,
            format: Some(format),
        }
    }
}

/// Outcome of [`negotiate_face`], carrying the request back for bookkeeping.
#[derive(Debug)]
pub struct FaceLoadResult {
    pub pending: PendingFace,
    pub outcome: Result<(FontFormat, FaceHandle), FontError>,
}

/// Try each candidate format until the host accepts one.
///
/// The whole negotiation shares one deadline of `limit`.
pub async fn negotiate_face<L>(loader: &L, pending: PendingFace, limit: Duration) -> FaceLoadResult
where
    L: FaceLoader + ?Sized,
{
    let deadline = Instant::now() + limit;
    let mut saw_corrupt: Option<String> = None;
    let mut rejected: Vec<String> = Vec::new();

    for format in pending.formats.iter().copied() {
        let source = data_url(format, &pending.payload);
        match timeout_at(deadline, loader.load_face(&pending.family, &source, format)).await {
            Ok(Ok(face)) => {
                debug!(font = %pending.name, format = format.css_hint(), "font face loaded");
                return FaceLoadResult {
                    pending,
                    outcome: Ok((format, face)),
                };
            }
            Ok(Err(FaceLoadError::Rejected(reason))) => {
                debug!(font = %pending.name, format = format.css_hint(), %reason, "format rejected");
                rejected.push(format!("{}: {}", format.css_hint(), reason));
            }
            Ok(Err(FaceLoadError::Corrupt(reason))) => {
                debug!(font = %pending.name, format = format.css_hint(), %reason, "font data corrupt");
                saw_corrupt.get_or_insert(reason);
            }
            Err(_) => {
                warn!(font = %pending.name, "font load timed out after {:?}", limit);
                return FaceLoadResult {
                    pending,
                    outcome: Err(FontError::LoadTimeout(limit)),
                };
            }
        }
    }

    let error = match saw_corrupt {
        Some(detail) => FontError::LoadFailed {
            kind: LoadFailureKind::Corrupt,
            detail,
        },
        None => FontError::LoadFailed {
            kind: LoadFailureKind::UnrecognizedFormat,
            detail: rejected.join("; "),
        },
    };
    warn!(font = %pending.name, error = %error, "no format could load the font");
    FaceLoadResult {
        pending,
        outcome: Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_extract_font_family() {
        let css = "@font-face { font-family: 'RealFoo'; src: url(foo.woff2) format('woff2'); }";
        assert_eq!(extract_font_family(css).as_deref(), Some("RealFoo"));

        let css = "@FONT-FACE{font-family:\"Noto Sans KR\";font-weight:400}";
        assert_eq!(extract_font_family(css).as_deref(), Some("Noto Sans KR"));

        let css = "@font-face {\n  src: url(a.ttf);\n  font-family: Plain ;\n}";
        assert_eq!(extract_font_family(css).as_deref(), Some("Plain"));
    }

    #[test]
    fn test_extract_font_family_takes_first_block() {
        let css = "@font-face { font-family: 'First'; }\n@font-face { font-family: 'Second'; }";
        assert_eq!(extract_font_family(css).as_deref(), Some("First"));
    }

    #[test]
    fn test_extract_font_family_without_match() {
        assert_eq!(extract_font_family("body { font-family: 'Nope'; }"), None);
        assert_eq!(extract_font_family("@import url(https://fonts.example/css);"), None);
        assert_eq!(extract_font_family("@font-face { font-family: ''; }"), None);
        assert_eq!(extract_font_family(""), None);
    }

    #[test]
    fn test_encode_matches_single_pass() {
        use base64::Engine;
        let bytes: Vec<u8> = (0..(ENCODE_CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        assert_eq!(encode_font_payload(&bytes), STANDARD.encode(&bytes));
        assert_eq!(encode_font_payload(&[]), "");
    }

    #[test]
    fn test_attempt_order() {
        assert_eq!(
            FontFormat::attempt_order(None),
            FontFormat::NEGOTIATION_ORDER.to_vec()
        );
        assert_eq!(
            FontFormat::attempt_order(Some(FontFormat::Woff)),
            vec![
                FontFormat::Woff,
                FontFormat::TrueType,
                FontFormat::OpenType,
                FontFormat::Woff2
            ]
        );
    }

    /// Loader that accepts one format and records every attempt.
    struct OnlyFormat {
        accepts: Option<FontFormat>,
        corrupt: bool,
        hang: bool,
        attempts: RefCell<Vec<FontFormat>>,
    }

    impl OnlyFormat {
        fn new(accepts: Option<FontFormat>) -> Self {
            Self {
                accepts,
                corrupt: false,
                hang: false,
                attempts: RefCell::new(Vec::new()),
            }
        }
    }

    impl FaceLoader for OnlyFormat {
        async fn load_face(
            &self,
            _family: &str,
            source: &str,
            format: FontFormat,
        ) -> Result<FaceHandle, FaceLoadError> {
            assert!(source.starts_with(&format!("data:{};base64,", format.mime_type())));
            self.attempts.borrow_mut().push(format);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.corrupt {
                return Err(FaceLoadError::Corrupt("bad glyph table".into()));
            }
            if Some(format) == self.accepts {
                Ok(FaceHandle(7))
            } else {
                Err(FaceLoadError::Rejected("not this one".into()))
            }
        }
    }

    fn pending() -> PendingFace {
        PendingFace {
            font_id: "id_x".into(),
            name: "Upload".into(),
            family: "Upload".into(),
            payload: "AAEAAA==".into(),
            original_filename: Some("upload.woff2".into()),
            formats: FontFormat::attempt_order(None),
            generation: None,
            restore: false,
        }
    }

    #[tokio::test]
    async fn test_negotiation_walks_priority_order() {
        let loader = OnlyFormat::new(Some(FontFormat::Woff2));
        let result = negotiate_face(&loader, pending(), LOAD_TIMEOUT).await;
        let (format, face) = result.outcome.unwrap();
        assert_eq!(format, FontFormat::Woff2);
        assert_eq!(face, FaceHandle(7));
        assert_eq!(
            *loader.attempts.borrow(),
            vec![FontFormat::TrueType, FontFormat::OpenType, FontFormat::Woff2]
        );
    }

    #[tokio::test]
    async fn test_negotiation_unrecognized() {
        let loader = OnlyFormat::new(None);
        let result = negotiate_face(&loader, pending(), LOAD_TIMEOUT).await;
        let err = result.outcome.unwrap_err();
        assert_eq!(err.failure_kind(), Some(LoadFailureKind::UnrecognizedFormat));
        assert_eq!(loader.attempts.borrow().len(), 4);
    }

    #[tokio::test]
    async fn test_negotiation_corrupt() {
        let mut loader = OnlyFormat::new(None);
        loader.corrupt = true;
        let result = negotiate_face(&loader, pending(), LOAD_TIMEOUT).await;
        assert_eq!(
            result.outcome.unwrap_err().failure_kind(),
            Some(LoadFailureKind::Corrupt)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiation_times_out() {
        let mut loader = OnlyFormat::new(Some(FontFormat::TrueType));
        loader.hang = true;
        let result = negotiate_face(&loader, pending(), LOAD_TIMEOUT).await;
        assert_eq!(result.outcome.unwrap_err(), FontError::LoadTimeout(LOAD_TIMEOUT));
        assert_eq!(result.pending.name, "Upload");
    }

    #[test]
    fn test_pending_into_entry() {
        let entry = pending().into_entry(FontFormat::Woff2);
        assert_eq!(entry.source_kind, SourceKind::BinaryFile);
        assert_eq!(entry.resolved_family, "Upload");
        assert_eq!(entry.format, Some(FontFormat::Woff2));
        assert_eq!(entry.original_filename.as_deref(), Some("upload.woff2"));
    }
}
