//! Layer-one gate: satire-domain blacklist and temporal window.
//!
//! Cheap by construction — no database, no network. Runs before the
//! classifier and catches the bulk of junk candidates.

use chrono::{DateTime, Duration, Utc};

use skywatch_common::extract_domain;

/// Verified satire/parody domains across Europe. Substring match against the
/// host so section paths like `nrk.no/satiriks` are covered.
const SATIRE_DOMAINS: &[&str] = &[
    // Denmark
    "rokokoposten.dk",
    "dukop.dk",
    "dentandepresse.dk",
    // Norway
    "nrk.no/satiriks",
    "satiriks.no",
    "nytidsvikernesatt.no",
    // Sweden
    "diktatorn.se",
    "nyheter24.se/satir",
    "nyheter24.se/humor",
    // Finland
    "lehti.fi/satire",
    // Germany
    "der-postillon.com",
    "titanic-magazin.de",
    "die-partei.de",
    "der-gazetteur.de",
    // France / Belgium
    "legorafi.fr",
    "nordpresse.be",
    "nordactu.be",
    "lejdd.fr/satire",
    "lemondedroite.fr",
    // UK / Ireland / US-global
    "newsthump.com",
    "thedailymash.co.uk",
    "theonion.com",
    "private-eye.co.uk",
    "thepoke.co.uk",
    "waterfordwhispersnews.com",
    // Netherlands
    "speld.nl",
    "deonderbroek.nl",
    "debetoging.nl",
    // Spain
    "elmundotoday.com",
    // Italy
    "lercio.it",
    "spinoza.it",
    // Poland
    "aszdziennik.pl",
    "pieniadz.pl",
    // Austria / Switzerland
    "tagespresse.com",
    "dietagespresse.com",
    "derbund.ch/satire",
    // Czech Republic
    "skolapodbinohem.cz",
    // Portugal
    "inimigo.pt",
    // Greece
    "thekoulouri.com",
];

/// Returns the matched blacklist entry if the URL belongs to a known satire
/// outlet.
pub fn satire_match(url: &str) -> Option<&'static str> {
    if url.is_empty() {
        return None;
    }
    let lower = url.to_lowercase();
    let domain = extract_domain(&lower);
    SATIRE_DOMAINS.iter().copied().find(|entry| {
        if entry.contains('/') {
            // Section blacklists match against the full URL
            lower.contains(entry)
        } else {
            domain == *entry || domain.ends_with(&format!(".{entry}"))
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemporalRejection {
    Future { occurred_at: DateTime<Utc> },
    TooOld { age_days: i64, max_age_days: i64 },
}

impl std::fmt::Display for TemporalRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemporalRejection::Future { occurred_at } => {
                write!(f, "future date: {}", occurred_at.to_rfc3339())
            }
            TemporalRejection::TooOld { age_days, max_age_days } => {
                write!(f, "too old: {age_days} days (max: {max_age_days})")
            }
        }
    }
}

/// Reject events more than one day in the future or older than
/// `max_age_days`. `now` is injected so the check stays a pure function.
pub fn check_temporal(
    occurred_at: DateTime<Utc>,
    now: DateTime<Utc>,
    max_age_days: i64,
) -> Result<(), TemporalRejection> {
    if occurred_at > now + Duration::days(1) {
        return Err(TemporalRejection::Future { occurred_at });
    }
    let age_days = (now - occurred_at).num_days();
    if age_days > max_age_days {
        return Err(TemporalRejection::TooOld { age_days, max_age_days });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satire_domain_matches() {
        assert_eq!(
            satire_match("https://der-postillon.com/drone-aliens"),
            Some("der-postillon.com")
        );
        assert_eq!(
            satire_match("https://www.rokokoposten.dk/artikel/1"),
            Some("rokokoposten.dk")
        );
    }

    #[test]
    fn satire_section_matches_by_path() {
        assert_eq!(
            satire_match("https://nrk.no/satiriks/drone-story"),
            Some("nrk.no/satiriks")
        );
        // The real newsroom on the same domain is fine
        assert_eq!(satire_match("https://nrk.no/nyheter/drone-story"), None);
    }

    #[test]
    fn legitimate_domains_pass() {
        assert_eq!(satire_match("https://politi.dk/news/drone"), None);
        assert_eq!(satire_match("https://www.dr.dk/nyheder/drone"), None);
        assert_eq!(satire_match(""), None);
    }

    #[test]
    fn domain_match_is_not_substring_prefix() {
        // "theonion.com" must not match "nottheonion.commentary.dk"
        assert_eq!(satire_match("https://nottheonion.commentary.dk/x"), None);
    }

    #[test]
    fn subdomain_of_satire_domain_matches() {
        assert_eq!(
            satire_match("https://www.der-postillon.com/x"),
            Some("der-postillon.com")
        );
    }

    #[test]
    fn temporal_accepts_recent() {
        let now = Utc::now();
        assert!(check_temporal(now - Duration::hours(5), now, 60).is_ok());
    }

    #[test]
    fn temporal_accepts_slightly_future() {
        // Timezone slop: up to one day ahead is tolerated
        let now = Utc::now();
        assert!(check_temporal(now + Duration::hours(20), now, 60).is_ok());
    }

    #[test]
    fn temporal_rejects_far_future() {
        let now = Utc::now();
        let r = check_temporal(now + Duration::days(2), now, 60);
        assert!(matches!(r, Err(TemporalRejection::Future { .. })));
    }

    #[test]
    fn temporal_rejects_too_old() {
        let now = Utc::now();
        let r = check_temporal(now - Duration::days(61), now, 60);
        assert_eq!(
            r,
            Err(TemporalRejection::TooOld { age_days: 61, max_age_days: 60 })
        );
    }

    #[test]
    fn temporal_respects_configured_max_age() {
        let now = Utc::now();
        assert!(check_temporal(now - Duration::days(61), now, 90).is_ok());
        assert!(check_temporal(now - Duration::days(91), now, 90).is_err());
    }
}
