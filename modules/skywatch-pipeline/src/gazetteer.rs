use std::collections::HashMap;

use deunicode::deunicode;

use skywatch_common::AssetType;

/// How trustworthy an entry's coordinate is. City-center fallbacks must not
/// drive spatial clustering — consolidation suppresses merges at them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationPrecision {
    /// Facility coordinate (runway midpoint, harbor basin, base gate).
    Exact,
    /// Generic city-center placeholder.
    CityFallback,
}

#[derive(Debug, Clone)]
pub struct GazetteerEntry {
    pub name: &'static str,
    pub lat: f64,
    pub lon: f64,
    pub country: &'static str,
    pub asset_type: AssetType,
    pub precision: LocationPrecision,
    pub aliases: &'static [&'static str],
}

/// Curated name -> coordinate lookup for airports, harbors and military
/// bases. Read-only after construction; lookups are case- and
/// diacritic-insensitive ("København", "Kastrup" and "Copenhagen Airport"
/// all resolve to the same runway coordinate).
pub struct Gazetteer {
    by_key: HashMap<String, usize>,
    entries: Vec<GazetteerEntry>,
}

fn lookup_key(name: &str) -> String {
    deunicode(name).to_lowercase().trim().to_string()
}

impl Gazetteer {
    pub fn with_defaults() -> Self {
        Self::from_entries(default_entries())
    }

    pub fn from_entries(entries: Vec<GazetteerEntry>) -> Self {
        let mut by_key = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            by_key.insert(lookup_key(entry.name), idx);
            for alias in entry.aliases {
                by_key.insert(lookup_key(alias), idx);
            }
        }
        Self { by_key, entries }
    }

    pub fn lookup(&self, name: &str) -> Option<&GazetteerEntry> {
        self.by_key.get(&lookup_key(name)).map(|&i| &self.entries[i])
    }

    /// Scan free text for any known place name or alias. Returns the first
    /// exact-precision match, falling back to a city placeholder if that is
    /// all the text mentions.
    pub fn find_in_text(&self, text: &str) -> Option<&GazetteerEntry> {
        let folded = lookup_key(text);
        let mut fallback: Option<&GazetteerEntry> = None;
        for entry in &self.entries {
            let mut names = vec![entry.name];
            names.extend_from_slice(entry.aliases);
            for name in names {
                if contains_word(&folded, &lookup_key(name)) {
                    match entry.precision {
                        LocationPrecision::Exact => return Some(entry),
                        LocationPrecision::CityFallback => {
                            fallback.get_or_insert(entry);
                        }
                    }
                }
            }
        }
        fallback
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Word-boundary containment on pre-folded text.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let abs = start + pos;
        let before_ok = abs == 0
            || !haystack[..abs]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let after = abs + needle.len();
        let after_ok = after >= haystack.len()
            || !haystack[after..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = abs + needle.len();
        if start >= haystack.len() {
            break;
        }
    }
    false
}

fn default_entries() -> Vec<GazetteerEntry> {
    use AssetType::*;
    use LocationPrecision::*;
    vec![
        // --- Denmark ---
        GazetteerEntry { name: "Copenhagen Airport", lat: 55.6181, lon: 12.6508, country: "DK", asset_type: Airport, precision: Exact, aliases: &["Kastrup", "Københavns Lufthavn", "CPH"] },
        GazetteerEntry { name: "Aalborg Airport", lat: 57.0928, lon: 9.8492, country: "DK", asset_type: Airport, precision: Exact, aliases: &["Aalborg Lufthavn"] },
        GazetteerEntry { name: "Billund Airport", lat: 55.7403, lon: 9.1518, country: "DK", asset_type: Airport, precision: Exact, aliases: &["Billund Lufthavn"] },
        GazetteerEntry { name: "Aarhus Airport", lat: 56.3000, lon: 10.6190, country: "DK", asset_type: Airport, precision: Exact, aliases: &["Tirstrup"] },
        GazetteerEntry { name: "Esbjerg Airport", lat: 55.5257, lon: 8.5534, country: "DK", asset_type: Airport, precision: Exact, aliases: &[] },
        GazetteerEntry { name: "Roskilde Airport", lat: 55.5856, lon: 12.1314, country: "DK", asset_type: Airport, precision: Exact, aliases: &["Roskilde Lufthavn"] },
        GazetteerEntry { name: "Port of Copenhagen", lat: 55.6936, lon: 12.6009, country: "DK", asset_type: Harbor, precision: Exact, aliases: &["Københavns Havn"] },
        GazetteerEntry { name: "Port of Esbjerg", lat: 55.4640, lon: 8.4413, country: "DK", asset_type: Harbor, precision: Exact, aliases: &["Esbjerg Havn"] },
        GazetteerEntry { name: "Karup Air Base", lat: 56.2975, lon: 9.1246, country: "DK", asset_type: Military, precision: Exact, aliases: &["Flyvestation Karup"] },
        GazetteerEntry { name: "Skrydstrup Air Base", lat: 55.2214, lon: 9.2638, country: "DK", asset_type: Military, precision: Exact, aliases: &["Flyvestation Skrydstrup", "Fighter Wing Skrydstrup"] },
        GazetteerEntry { name: "Copenhagen", lat: 55.6761, lon: 12.5683, country: "DK", asset_type: Other, precision: CityFallback, aliases: &["København"] },
        GazetteerEntry { name: "Aalborg", lat: 57.0488, lon: 9.9217, country: "DK", asset_type: Other, precision: CityFallback, aliases: &[] },
        // --- Norway ---
        GazetteerEntry { name: "Oslo Airport", lat: 60.1939, lon: 11.1004, country: "NO", asset_type: Airport, precision: Exact, aliases: &["Gardermoen", "Oslo Lufthavn", "OSL"] },
        GazetteerEntry { name: "Bergen Airport", lat: 60.2936, lon: 5.2181, country: "NO", asset_type: Airport, precision: Exact, aliases: &["Flesland"] },
        GazetteerEntry { name: "Stavanger Airport", lat: 58.8767, lon: 5.6378, country: "NO", asset_type: Airport, precision: Exact, aliases: &["Sola"] },
        GazetteerEntry { name: "Trondheim Airport", lat: 63.4578, lon: 10.9240, country: "NO", asset_type: Airport, precision: Exact, aliases: &["Værnes"] },
        GazetteerEntry { name: "Ørland Air Base", lat: 63.6989, lon: 9.6040, country: "NO", asset_type: Military, precision: Exact, aliases: &["Ørland flystasjon"] },
        GazetteerEntry { name: "Port of Oslo", lat: 59.9050, lon: 10.7370, country: "NO", asset_type: Harbor, precision: Exact, aliases: &["Oslo Havn"] },
        GazetteerEntry { name: "Oslo", lat: 59.9139, lon: 10.7522, country: "NO", asset_type: Other, precision: CityFallback, aliases: &[] },
        // --- Sweden ---
        GazetteerEntry { name: "Stockholm Arlanda Airport", lat: 59.6519, lon: 17.9186, country: "SE", asset_type: Airport, precision: Exact, aliases: &["Arlanda", "ARN"] },
        GazetteerEntry { name: "Stockholm Bromma Airport", lat: 59.3544, lon: 17.9416, country: "SE", asset_type: Airport, precision: Exact, aliases: &["Bromma"] },
        GazetteerEntry { name: "Gothenburg Landvetter Airport", lat: 57.6628, lon: 12.2798, country: "SE", asset_type: Airport, precision: Exact, aliases: &["Landvetter"] },
        GazetteerEntry { name: "Malmö Airport", lat: 55.5363, lon: 13.3762, country: "SE", asset_type: Airport, precision: Exact, aliases: &["Sturup"] },
        GazetteerEntry { name: "Port of Gothenburg", lat: 57.6858, lon: 11.8477, country: "SE", asset_type: Harbor, precision: Exact, aliases: &["Göteborgs hamn"] },
        GazetteerEntry { name: "Stockholm", lat: 59.3293, lon: 18.0686, country: "SE", asset_type: Other, precision: CityFallback, aliases: &[] },
        // --- Finland ---
        GazetteerEntry { name: "Helsinki-Vantaa Airport", lat: 60.3172, lon: 24.9633, country: "FI", asset_type: Airport, precision: Exact, aliases: &["Helsinki-Vantaa", "Helsingin lentokenttä", "HEL"] },
        GazetteerEntry { name: "Helsinki", lat: 60.1699, lon: 24.9384, country: "FI", asset_type: Other, precision: CityFallback, aliases: &[] },
        // --- Iceland ---
        GazetteerEntry { name: "Keflavík Airport", lat: 63.9850, lon: -22.6056, country: "IS", asset_type: Airport, precision: Exact, aliases: &["Keflavik"] },
        // --- Wider Europe ---
        GazetteerEntry { name: "Amsterdam Schiphol Airport", lat: 52.3105, lon: 4.7683, country: "NL", asset_type: Airport, precision: Exact, aliases: &["Schiphol", "AMS"] },
        GazetteerEntry { name: "Brussels Airport", lat: 50.9010, lon: 4.4856, country: "BE", asset_type: Airport, precision: Exact, aliases: &["Zaventem"] },
        GazetteerEntry { name: "Frankfurt Airport", lat: 50.0379, lon: 8.5622, country: "DE", asset_type: Airport, precision: Exact, aliases: &["Flughafen Frankfurt", "FRA"] },
        GazetteerEntry { name: "Munich Airport", lat: 48.3538, lon: 11.7861, country: "DE", asset_type: Airport, precision: Exact, aliases: &["Flughafen München", "MUC"] },
        GazetteerEntry { name: "Warsaw Chopin Airport", lat: 52.1657, lon: 20.9671, country: "PL", asset_type: Airport, precision: Exact, aliases: &["Okęcie"] },
        GazetteerEntry { name: "Vilnius Airport", lat: 54.6341, lon: 25.2858, country: "LT", asset_type: Airport, precision: Exact, aliases: &[] },
        GazetteerEntry { name: "Riga Airport", lat: 56.9236, lon: 23.9711, country: "LV", asset_type: Airport, precision: Exact, aliases: &[] },
        GazetteerEntry { name: "Tallinn Airport", lat: 59.4133, lon: 24.8328, country: "EE", asset_type: Airport, precision: Exact, aliases: &["Lennart Meri"] },
        GazetteerEntry { name: "Port of Rotterdam", lat: 51.9480, lon: 4.1420, country: "NL", asset_type: Harbor, precision: Exact, aliases: &[] },
        GazetteerEntry { name: "Port of Hamburg", lat: 53.5136, lon: 9.9370, country: "DE", asset_type: Harbor, precision: Exact, aliases: &["Hamburger Hafen"] },
        GazetteerEntry { name: "Ramstein Air Base", lat: 49.4369, lon: 7.6003, country: "DE", asset_type: Military, precision: Exact, aliases: &[] },
    ]
}
