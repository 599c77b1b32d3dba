//! Pull a citable quote out of article text for the `source_quote` field
//! when the feed didn't provide one.

use std::sync::OnceLock;

use regex::Regex;

const MAX_QUOTE_CHARS: usize = 200;

fn quote_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r#""([^"]{20,200})""#,          // straight quotes
            r"»([^»«]{20,200})«",           // Danish guillemets
            r"siger[:\s]+([^.]{20,200})\.", // "says: ..."
            r"oplyser[:\s]+([^.]{20,200})\.", // "informs: ..."
        ]
        .iter()
        .map(|p| Regex::new(p).expect("quote pattern"))
        .collect()
    })
}

/// Extract a quote from article text. Prefers explicit quotation marks and
/// attribution verbs; falls back to the first sentence that mentions a
/// drone or an airport.
pub fn extract_quote(text: &str) -> Option<String> {
    for pattern in quote_patterns() {
        if let Some(caps) = pattern.captures(text) {
            return Some(caps[1].trim().to_string());
        }
    }

    for sentence in text.split('.') {
        let lower = sentence.to_lowercase();
        if ["drone", "dron", "lufthavn", "airport"]
            .iter()
            .any(|w| lower.contains(w))
        {
            let trimmed = sentence.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Some(trimmed.chars().take(MAX_QUOTE_CHARS).collect());
        }
    }

    None
}
