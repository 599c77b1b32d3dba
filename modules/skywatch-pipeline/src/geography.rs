//! Geographic scope analysis with confidence scoring.
//!
//! Decides whether a report happened inside the deployment's region, as
//! opposed to being regional coverage OF a foreign event (the classic trap:
//! a Copenhagen desk writing about drones over Kyiv, with Copenhagen
//! coordinates extracted from the byline).

use regex::Regex;

use skywatch_common::{GeoBounds, ScopeKind, EUROPEAN_BOUNDS, NORDIC_BOUNDS};

#[derive(Debug, Clone)]
pub struct GeoAnalysis {
    pub in_scope: bool,
    pub confidence: f32,
    pub reason: String,
    pub flags: Vec<String>,
}

/// A deployment scope: bounds plus the keyword lists the analyzer scans for.
/// Constructed once at startup and shared read-only.
pub struct GeoScope {
    pub kind: ScopeKind,
    pub bounds: GeoBounds,
    foreign_re: Regex,
    city_re: Regex,
    context_markers: &'static [&'static str],
    official_tokens: &'static [&'static str],
}

fn word_alternation(keywords: &[&str]) -> Regex {
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b({alternation})\b")).expect("keyword alternation must compile")
}

impl GeoScope {
    pub fn for_kind(kind: ScopeKind) -> Self {
        match kind {
            ScopeKind::European => Self::european(),
            ScopeKind::Nordic => Self::nordic(),
        }
    }

    /// Continental Europe plus the Nordics. Foreign = war zones, Middle
    /// East, Asia, the Americas, Africa.
    pub fn european() -> Self {
        Self {
            kind: ScopeKind::European,
            bounds: EUROPEAN_BOUNDS,
            foreign_re: word_alternation(FOREIGN_OUTSIDE_EUROPE),
            city_re: word_alternation(EUROPEAN_CITIES),
            context_markers: CONTEXT_MARKERS,
            official_tokens: OFFICIAL_TOKENS,
        }
    }

    /// The narrower Nordic deployment: non-Nordic Europe counts as foreign.
    pub fn nordic() -> Self {
        let mut foreign: Vec<&'static str> = FOREIGN_OUTSIDE_EUROPE.to_vec();
        foreign.extend_from_slice(NON_NORDIC_EUROPE);
        Self {
            kind: ScopeKind::Nordic,
            bounds: NORDIC_BOUNDS,
            foreign_re: word_alternation(&foreign),
            city_re: word_alternation(NORDIC_CITIES),
            context_markers: CONTEXT_MARKERS,
            official_tokens: OFFICIAL_TOKENS,
        }
    }

    pub fn analyze(
        &self,
        title: &str,
        narrative: &str,
        lat: Option<f64>,
        lon: Option<f64>,
    ) -> GeoAnalysis {
        let mut flags = Vec::new();
        let mut confidence: f32 = 1.0;
        let full_text = format!("{title} {narrative}");

        let (lat, lon) = match (lat, lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                return GeoAnalysis {
                    in_scope: false,
                    confidence: 0.0,
                    reason: "no coordinates provided".to_string(),
                    flags: vec!["missing_coords".to_string()],
                }
            }
        };

        if !self.bounds.contains(lat, lon) {
            return GeoAnalysis {
                in_scope: false,
                confidence: 1.0,
                reason: format!("coordinates outside region ({lat}, {lon})"),
                flags: vec!["coords_outside_region".to_string()],
            };
        }
        flags.push("coords_in_region".to_string());

        let foreign_matches: Vec<String> = self
            .foreign_re
            .find_iter(&full_text)
            .map(|m| m.as_str().to_lowercase())
            .collect();

        let mut reason = String::new();
        if !foreign_matches.is_empty() {
            let sample = foreign_matches
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            if self.has_context_markers(&full_text) {
                // Regional response TO a foreign event — uncertain, not a
                // hard reject.
                confidence -= 0.4;
                flags.push("foreign_with_nordic_context".to_string());
                flags.push(format!("foreign_keywords: {sample}"));
                reason = format!("uncertain: foreign keywords ({sample}) with regional context");
            } else {
                let mut reject_flags = vec!["foreign_incident".to_string()];
                reject_flags.extend(foreign_matches.iter().take(3).map(|k| format!("keyword:{k}")));
                return GeoAnalysis {
                    in_scope: false,
                    confidence: 1.0,
                    reason: format!("foreign incident detected: {sample}"),
                    flags: reject_flags,
                };
            }
        }

        let cities: Vec<String> = self
            .city_re
            .find_iter(&full_text)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        if !cities.is_empty() {
            let boost = 0.2 * cities.len() as f32;
            confidence = (confidence + boost).min(1.0);
            let sample = cities.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
            flags.push(format!("in_scope_cities: {sample}"));
        }

        let lower = full_text.to_lowercase();
        if self.official_tokens.iter().any(|t| lower.contains(t)) {
            confidence = (confidence + 0.1).min(1.0);
            flags.push("official_source".to_string());
        }

        let in_scope = confidence >= 0.5;
        if reason.is_empty() {
            reason = if in_scope {
                "passed all checks".to_string()
            } else {
                format!("low confidence ({confidence:.2})")
            };
        }

        GeoAnalysis {
            in_scope,
            confidence: (confidence * 100.0).round() / 100.0,
            reason,
            flags,
        }
    }

    fn has_context_markers(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.context_markers.iter().any(|m| lower.contains(m))
    }
}

/// Locations that are foreign under every scope: war zones, Middle East,
/// Asia, the Americas, Africa. Includes Nordic-language adjective forms so
/// a Danish wire about "russiske droner" still trips the filter.
const FOREIGN_OUTSIDE_EUROPE: &[&str] = &[
    // War zones / Eastern neighbors
    "ukraina", "ukraine", "ukrainsk", "ukrainian", "kiev", "kyiv", "odesa", "kharkiv", "lviv",
    "russia", "rusland", "russisk", "russian", "moscow", "moskva", "st. petersburg",
    "belarus", "hviderusland", "hviderussisk", "belarusian", "minsk",
    // Middle East
    "israel", "gaza", "tel aviv", "jerusalem",
    "iran", "tehran", "syria", "damascus", "iraq", "baghdad", "yemen", "lebanon", "beirut",
    // Asia
    "china", "kina", "beijing", "shanghai", "japan", "tokyo", "korea", "seoul",
    "india", "delhi", "mumbai", "pakistan", "afghanistan", "kabul",
    // Americas
    "united states", "usa", "washington", "new york", "pentagon",
    "canada", "ottawa", "mexico", "brazil", "venezuela",
    // Africa
    "egypt", "cairo", "libya", "tripoli", "nigeria", "mali", "sudan", "ethiopia",
];

/// European countries and cities that count as foreign only under the
/// Nordic scope.
const NON_NORDIC_EUROPE: &[&str] = &[
    "poland", "polen", "polsk", "polish", "warsaw", "warszawa", "krakow",
    "germany", "tyskland", "tysk", "german", "berlin", "münchen", "munich", "hamburg", "frankfurt",
    "france", "frankrig", "fransk", "french", "paris", "lyon", "marseille",
    "netherlands", "holland", "nederlandsk", "dutch", "amsterdam", "rotterdam",
    "belgium", "belgien", "belgisk", "belgian", "brussels", "bruxelles",
    "uk", "england", "britain", "britisk", "british", "london", "manchester",
    "spain", "spanien", "spansk", "spanish", "madrid", "barcelona",
    "italy", "italien", "italiensk", "italian", "rome", "milano", "milan",
    "estonia", "estland", "estisk", "estonian", "tallinn",
    "latvia", "letland", "lettisk", "latvian", "riga",
    "lithuania", "litauen", "litauisk", "lithuanian", "vilnius",
];

/// Phrases indicating a regional response to a foreign event rather than a
/// local incident.
const CONTEXT_MARKERS: &[&str] = &[
    "responds to", "reacts to", "comments on", "addresses",
    "nordic", "scandinavian", "european union", "eu responds", "nato",
    "foreign minister", "prime minister", "defense minister", "foreign office",
    "summit in", "meets in", "conference in",
    "nordic cooperation", "nordic ministers", "nordic leaders", "european ministers",
];

const NORDIC_CITIES: &[&str] = &[
    // Denmark
    "copenhagen", "københavn", "aarhus", "odense", "aalborg", "esbjerg", "roskilde",
    "kastrup", "billund",
    // Norway
    "oslo", "bergen", "trondheim", "stavanger", "tromsø", "drammen", "kristiansand",
    "bodø", "gardermoen", "ålesund",
    // Sweden
    "stockholm", "göteborg", "gothenburg", "malmö", "uppsala", "linköping", "örebro",
    "helsingborg", "arlanda", "bromma",
    // Finland
    "helsinki", "espoo", "tampere", "vantaa", "oulu", "turku", "jyväskylä",
    "lahti", "kuopio",
    // Iceland
    "reykjavík", "reykjavik", "keflavík", "keflavik", "akureyri",
];

const EUROPEAN_CITIES: &[&str] = &[
    // The Nordic set
    "copenhagen", "københavn", "aarhus", "odense", "aalborg", "esbjerg", "kastrup", "billund",
    "oslo", "bergen", "trondheim", "stavanger", "tromsø", "gardermoen",
    "stockholm", "göteborg", "gothenburg", "malmö", "arlanda", "bromma",
    "helsinki", "vantaa", "tampere", "turku",
    "reykjavík", "reykjavik", "keflavík", "keflavik",
    // Central and Western Europe
    "berlin", "münchen", "munich", "hamburg", "frankfurt", "cologne",
    "paris", "lyon", "marseille",
    "amsterdam", "rotterdam", "schiphol",
    "brussels", "bruxelles", "antwerp",
    "london", "manchester", "heathrow", "gatwick",
    "madrid", "barcelona", "lisbon",
    "rome", "milano", "milan",
    "vienna", "zurich", "geneva", "prague",
    "warsaw", "warszawa", "krakow", "gdansk",
    "tallinn", "riga", "vilnius",
];

const OFFICIAL_TOKENS: &[&str] = &[
    "politi", "police", "forsvar", "defense", "defence", "myndighed", "authority",
    "authorities", "luftfartsverket", "notam",
];
