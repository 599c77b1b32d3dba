//! Title/narrative validation and sanitization.
//!
//! Order matters: the length gate and XSS scan run on the RAW input, before
//! any decoding a sanitizer would do — otherwise an encoded payload slips
//! through sanitization and reassembles downstream.

use std::sync::OnceLock;

use regex::{Regex, RegexSet};
use unicode_normalization::UnicodeNormalization;

use skywatch_common::{SkywatchError, MAX_NARRATIVE_LEN, MAX_TITLE_LEN};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextRejection {
    TooLong { field: &'static str, len: usize, max: usize },
    Malicious { pattern: String },
}

impl From<TextRejection> for SkywatchError {
    fn from(r: TextRejection) -> Self {
        match r {
            TextRejection::TooLong { field, len, max } => SkywatchError::InvalidInput(format!(
                "{field} exceeds maximum length ({len} > {max})"
            )),
            TextRejection::Malicious { pattern } => SkywatchError::MaliciousContent(pattern),
        }
    }
}

/// Validate and sanitize a title. `None` is valid and yields an empty string.
pub fn validate_title(raw: Option<&str>) -> Result<String, TextRejection> {
    validate_field(raw, "title", MAX_TITLE_LEN)
}

/// Validate and sanitize a narrative.
pub fn validate_narrative(raw: Option<&str>) -> Result<String, TextRejection> {
    validate_field(raw, "narrative", MAX_NARRATIVE_LEN)
}

fn validate_field(
    raw: Option<&str>,
    field: &'static str,
    max: usize,
) -> Result<String, TextRejection> {
    let raw = match raw {
        Some(r) => r,
        None => return Ok(String::new()),
    };

    // Length counted in Unicode code points, not bytes.
    let len = raw.chars().count();
    if len > max {
        return Err(TextRejection::TooLong { field, len, max });
    }

    if let Some(pattern) = detect_xss(raw) {
        return Err(TextRejection::Malicious { pattern });
    }

    Ok(sanitize(raw))
}

// --- XSS detection (pre-sanitize, raw input) ---

const XSS_PATTERNS: &[&str] = &[
    r"(?i)<\s*script",
    r"(?i)javascript\s*:",
    r"(?i)vbscript\s*:",
    r"(?i)data\s*:\s*text/html",
    r"(?i)data\s*:[^,]*;\s*base64",
    r"(?i)\bon[a-z]+\s*=",
    r"(?i)<\s*iframe",
    r"(?i)<\s*svg",
    r"(?i)<\s*object",
    r"(?i)<\s*embed",
    r"(?i)<\s*form",
    r"(?i)<\s*meta",
    r"(?i)<\s*img",
    r"(?i)srcdoc",
    r"(?i)formaction",
    r"(?i)xlink:href",
    r"(?i)expression\s*\(",
];

fn xss_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| RegexSet::new(XSS_PATTERNS).expect("XSS pattern set must compile"))
}

/// Scan raw input for the fixed XSS pattern set, including single- and
/// double-URL-encoded and HTML-entity-encoded variants. Returns the first
/// matching pattern for the rejection message.
pub fn detect_xss(raw: &str) -> Option<String> {
    let set = xss_set();

    let once = percent_decode(raw);
    let twice = percent_decode(&once);
    let entities = decode_entities(raw);

    for variant in [raw, once.as_str(), twice.as_str(), entities.as_str()] {
        if let Some(idx) = set.matches(variant).iter().next() {
            return Some(XSS_PATTERNS[idx].trim_start_matches("(?i)").to_string());
        }
    }
    None
}

// --- Sanitization ---

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"))
}

fn cdata_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!\[CDATA\[.*?\]\]>").expect("valid regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

fn horizontal_ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]+").expect("valid regex"))
}

fn paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \n]*\n[ \n]*\n[ \n]*").expect("valid regex"))
}

/// Deterministic cleanup: entity decode, strip comments/CDATA/tags, drop
/// control characters (keeping \t \n \r), NFC-normalize, collapse runs of
/// horizontal whitespace, reduce 3+ newlines to a single paragraph break.
pub fn sanitize(raw: &str) -> String {
    let decoded = decode_entities(raw);
    let no_comments = comment_re().replace_all(&decoded, " ");
    let no_cdata = cdata_re().replace_all(&no_comments, " ");
    let no_tags = tag_re().replace_all(&no_cdata, " ");

    let no_controls: String = no_tags
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect();

    let normalized: String = no_controls.nfc().collect();
    let unix_newlines = normalized.replace("\r\n", "\n").replace('\r', "\n");
    let collapsed = horizontal_ws_re().replace_all(&unix_newlines, " ");
    let paragraphs = paragraph_re().replace_all(&collapsed, "\n\n");

    paragraphs
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Decode HTML entities: the common named set plus numeric (decimal and
/// hex) references. `&amp;` is decoded last so `&amp;lt;` stays `&lt;`.
pub fn decode_entities(text: &str) -> String {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    let numeric =
        NUMERIC.get_or_init(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("valid regex"));

    let decoded = numeric.replace_all(text, |caps: &regex::Captures| {
        let body = &caps[1];
        let code = if let Some(hex) = body.strip_prefix('x').or_else(|| body.strip_prefix('X')) {
            u32::from_str_radix(hex, 16).ok()
        } else {
            body.parse::<u32>().ok()
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    decoded
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Decode one layer of percent-encoding. Invalid sequences pass through.
fn percent_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(
                std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or(""),
                16,
            ) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
