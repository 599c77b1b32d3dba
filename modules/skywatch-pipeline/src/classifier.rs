//! Incident classification: is this text an actual drone incident, or
//! policy news, a defense deployment, an exercise, or mere discussion?

use std::sync::OnceLock;

use regex::Regex;

use skywatch_common::IncidentCategory;

#[derive(Debug, Clone)]
pub struct Classification {
    pub is_incident: bool,
    pub confidence: f32,
    pub category: IncidentCategory,
    pub reason: String,
}

/// Whole-word drone keywords across the source languages. "dronning"
/// (Danish for queen) never matches because the alternation is word-bounded.
const DRONE_KEYWORDS: &[&str] = &[
    "drone", "drones", "dron", "droner", "dronen", "drönare", "dronare",
    "drooni", "droonit", "lennokki", "drohne", "drohnen",
    "uav", "uavs", "uas", "unmanned", "luftfartøj", "ubemannet luftfartøy",
];

/// Sighting/observation markers.
const OBSERVATION_MARKERS: &[&str] = &[
    "sighted", "observed", "spotted", "detected", "seen", "filmed", "recorded",
    "suspect", "intrusion", "incursion", "breach", "violation",
    "set", "observeret", "opdaget", "spottet", "detekteret", "mistænk",
    "sett", "observert", "oppdaget",
    "sedd", "observerad", "upptäckt",
    "gesichtet", "beobachtet", "entdeckt",
    "vu", "observé", "détecté",
];

/// Operational impact markers.
const IMPACT_MARKERS: &[&str] = &[
    "closed", "closure", "shut down", "grounded", "diverted", "suspended",
    "disruption", "disrupted", "interrupted", "evacuated", "evacuation", "emergency",
    "lukket", "lukning", "omdirigeret", "suspenderet", "forstyrrelse",
    "stengt", "stenging",
    "stängd", "stängning", "störning",
    "geschlossen", "sperrung", "störung",
    "fermé", "fermeture", "perturbation",
];

/// Authority response markers.
const RESPONSE_MARKERS: &[&str] = &[
    "investigating", "investigation", "searching", "responding",
    "politi", "police", "authorities", "polizei",
    "undersøger", "undersøgelse", "efterforskning", "søger", "reagerer",
    "myndigheder", "myndigheter",
];

/// Delivery/commercial/royalty tokens — drone mentions that are never
/// airspace incidents.
const COMMERCIAL_TOKENS: &[&str] = &[
    "levering", "delivery", "amazon", "pakke", "package",
    "tilladelse", "permission", "godkendt", "approved",
    "dronning", "kronprins", "royal", "kongelig",
    "bryllup", "wedding",
];

/// Policy/announcement phrases (regulation news, not incidents).
const POLICY_PHRASES: &[&str] = &[
    "announced", "announcement", "annonceret", "annonserer", "annonsert",
    "proposed", "proposal", "forslag", "foreslår", "foreslået", "föreslår",
    "will be called", "plans to", "planer om", "vows to", "lover at",
    "drone ban", "droneforbud", "drönareförbud", "drohnenverbot",
    "no-fly zone", "flight restriction",
    "new regulation", "ny regulering", "nye regler",
    "will impose", "vil indføre",
    "in connection with", "i forbindelse med",
    "eu-formandskab", "eu presidency", "summit",
    "giver nyt", "giver nye", "kommer til byen",
    "drone wall", "eastern flank watch",
];

/// Defense-posture phrases (deployments and capabilities, not incidents).
const DEFENSE_PHRASES: &[&str] = &[
    "rushed to", "sent to", "deployed to", "deployed to defend",
    "defend against", "forsvare mod", "forsvare imod",
    "military assets", "militære aktiver",
    "frigate", "fregat", "troops", "tropper", "styrker",
    "anti-drone system", "anti-drone systems", "radars", "increased security",
    "bolster defense", "styrke forsvar", "øge sikkerheden",
    "navy ship", "naval vessel", "warship",
    "military equipment", "militært udstyr",
];

/// Exercise/drill markers across the source languages.
const SIMULATION_TOKENS: &[&str] = &[
    "exercise", "drill", "training", "simulation", "simulated", "mock",
    "rehearsal", "test flight", "demonstration",
    "øvelse", "træning", "simulering", "testflyvning", "træningsøvelse",
    "trening", "testflyging", "treningsøvelse",
    "övning", "träning", "testflygning", "träningsövning",
    "harjoitus", "simulaatio", "koulutus", "testilento",
    "übung", "manöver", "testflug",
    "exercice", "entraînement", "manœuvre", "vol test",
    "oefening", "simulatie", "testvlucht",
    "ejercicio", "simulación", "entrenamiento", "maniobra", "vuelo de prueba",
    "esercitazione", "simulazione", "addestramento", "volo di prova",
    "ćwiczenia", "symulacja", "szkolenie", "lot testowy",
];

/// Foreign-event tokens checked here as well as in the geographic analyzer:
/// the classifier sees text before coordinates are trusted.
const INTERNATIONAL_TOKENS: &[&str] = &[
    "ukraina", "ukraine", "kiev", "kyiv", "odesa",
    "russia", "rusland", "moscow", "moskva",
    "middle east", "mellemøsten", "israel", "gaza",
    "china", "kina", "beijing",
    "united states", "usa", "washington", "new york",
];

fn drone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternation = DRONE_KEYWORDS
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?i)\b({alternation})\b")).expect("drone keyword regex")
    })
}

fn contains_any(text: &str, tokens: &[&'static str]) -> Option<&'static str> {
    tokens.iter().find(|t| text.contains(*t)).copied()
}

/// Classify a report. `title` and `narrative` are already sanitized.
pub fn classify(title: &str, narrative: &str) -> Classification {
    let text = format!("{} {}", title, narrative).to_lowercase();

    if !drone_re().is_match(&text) {
        return rejected(IncidentCategory::NotDrone, 0.9, "no drone keyword");
    }

    if let Some(tok) = contains_any(&text, SIMULATION_TOKENS) {
        return rejected(
            IncidentCategory::Simulation,
            0.85,
            &format!("simulation marker: '{tok}'"),
        );
    }

    if let Some(tok) = contains_any(&text, COMMERCIAL_TOKENS) {
        return rejected(
            IncidentCategory::NotDrone,
            0.85,
            &format!("commercial/royalty token: '{tok}'"),
        );
    }

    if let Some(tok) = contains_any(&text, POLICY_PHRASES) {
        return rejected(
            IncidentCategory::Policy,
            0.85,
            &format!("policy phrase: '{tok}'"),
        );
    }

    if let Some(tok) = contains_any(&text, DEFENSE_PHRASES) {
        return rejected(
            IncidentCategory::Defense,
            0.85,
            &format!("defense-posture phrase: '{tok}'"),
        );
    }

    if let Some(tok) = contains_any(&text, INTERNATIONAL_TOKENS) {
        return rejected(
            IncidentCategory::Foreign,
            0.8,
            &format!("foreign location: '{tok}'"),
        );
    }

    let has_observation = contains_any(&text, OBSERVATION_MARKERS).is_some();
    let has_impact = contains_any(&text, IMPACT_MARKERS).is_some();
    let has_response = contains_any(&text, RESPONSE_MARKERS).is_some();

    if !(has_observation || has_impact || has_response) {
        // Drone mention without any incident marker — discussion piece.
        // Low confidence on purpose: this is the band the AI adjudicator
        // re-examines.
        return rejected(
            IncidentCategory::Discussion,
            0.6,
            "drone mention without observation, impact or response markers",
        );
    }

    let mut confidence: f32 = 0.8;
    if text.contains("politi") || text.contains("police") {
        confidence += 0.1;
    }
    if text.contains("airport") || text.contains("lufthavn") || text.contains("flyplass")
        || text.contains("flygplats") || text.contains("lentokenttä")
    {
        confidence += 0.05;
    }

    Classification {
        is_incident: true,
        confidence: confidence.min(1.0),
        category: IncidentCategory::Incident,
        reason: marker_summary(has_observation, has_impact, has_response),
    }
}

fn rejected(category: IncidentCategory, confidence: f32, reason: &str) -> Classification {
    Classification {
        is_incident: false,
        confidence,
        category,
        reason: reason.to_string(),
    }
}

fn marker_summary(obs: bool, impact: bool, resp: bool) -> String {
    let mut markers = Vec::new();
    if obs {
        markers.push("observation");
    }
    if impact {
        markers.push("impact");
    }
    if resp {
        markers.push("response");
    }
    format!("incident markers: {}", markers.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_closure_is_incident() {
        let c = classify(
            "Copenhagen Airport - Major Drone Disruption",
            "2-3 large drones observed in controlled airspace forcing nearly 4-hour suspension of flights.",
        );
        assert!(c.is_incident);
        assert_eq!(c.category, IncidentCategory::Incident);
        assert!(c.confidence >= 0.8);
    }

    #[test]
    fn sighting_with_police_response_is_incident() {
        let c = classify(
            "Drone spotted over Heathrow Airport",
            "A drone was sighted near the runway, police investigating.",
        );
        assert!(c.is_incident);
        // base 0.8 + police 0.1 + airport 0.05
        assert!((c.confidence - 0.95).abs() < 0.001);
    }

    #[test]
    fn policy_announcement_rejected() {
        let c = classify(
            "New drone restrictions announced for Oslo",
            "Norway announces new temporary flight restrictions for drones around government buildings.",
        );
        assert!(!c.is_incident);
        assert_eq!(c.category, IncidentCategory::Policy);
    }

    #[test]
    fn danish_droneforbud_rejected_as_policy() {
        let c = classify(
            "Mange ministre kommer til byen - giver nyt droneforbud",
            "Flyver man med drone, skal man være ekstra opmærksom i Horsens-området.",
        );
        assert!(!c.is_incident);
        assert_eq!(c.category, IncidentCategory::Policy);
    }

    #[test]
    fn military_exercise_rejected_as_simulation() {
        let c = classify(
            "Counter-drone exercise at Karup",
            "The air base conducted a planned training exercise with simulated drone intrusions.",
        );
        assert!(!c.is_incident);
        assert_eq!(c.category, IncidentCategory::Simulation);
    }

    #[test]
    fn danish_ovelse_rejected_as_simulation() {
        let c = classify(
            "Drone-øvelse ved lufthavnen",
            "Politiet gennemfører en øvelse med droner.",
        );
        assert_eq!(c.category, IncidentCategory::Simulation);
    }

    #[test]
    fn delivery_news_rejected() {
        let c = classify(
            "Amazon drone delivery trial expands",
            "Package delivery by drone was approved for the region.",
        );
        assert!(!c.is_incident);
        assert_eq!(c.category, IncidentCategory::NotDrone);
    }

    #[test]
    fn queen_story_not_drone() {
        let c = classify(
            "Dronning Margrethe fejrer jubilæum",
            "Dronningen holder tale i aften.",
        );
        assert!(!c.is_incident);
        assert_eq!(c.category, IncidentCategory::NotDrone);
        assert_eq!(c.reason, "no drone keyword");
    }

    #[test]
    fn defense_deployment_rejected() {
        let c = classify(
            "Frigate rushed to Baltic amid drone fears",
            "Military assets deployed to defend against possible drone incursions.",
        );
        assert!(!c.is_incident);
        assert_eq!(c.category, IncidentCategory::Defense);
    }

    #[test]
    fn foreign_event_rejected() {
        let c = classify(
            "Drone strikes reported in Ukraine",
            "Explosions heard after drones were observed over Kyiv.",
        );
        assert!(!c.is_incident);
        assert_eq!(c.category, IncidentCategory::Foreign);
    }

    #[test]
    fn bare_mention_is_discussion_with_low_confidence() {
        let c = classify("The future of drones", "An essay on what drones mean for cities.");
        assert!(!c.is_incident);
        assert_eq!(c.category, IncidentCategory::Discussion);
        assert!(c.confidence < 0.7, "discussion must fall in the AI re-check band");
    }

    #[test]
    fn no_drone_keyword_rejected() {
        let c = classify("Airport closed by storm", "High winds grounded all flights.");
        assert_eq!(c.category, IncidentCategory::NotDrone);
    }

    #[test]
    fn confidence_never_exceeds_one() {
        let c = classify(
            "Police close airport after drone sighted",
            "Politi lukket lufthavn after drone observed by police near the airport.",
        );
        assert!(c.confidence <= 1.0);
    }
}
