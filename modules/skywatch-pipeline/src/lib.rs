pub mod adjudicator;
pub mod classifier;
pub mod consolidate;
pub mod dedup;
pub mod embedding;
pub mod fuzzy;
pub mod gate;
pub mod gazetteer;
pub mod geography;
pub mod quotes;
pub mod textcheck;

pub use adjudicator::{AiAdjudicator, ClassificationVerdict, DuplicateVerdict};
pub use classifier::{classify, Classification};
pub use consolidate::{consolidate, evidence_score, has_official_quote, merge};
pub use dedup::{resolve, tier1_match, DedupOutcome, MatchTier, Tier1Match};
pub use embedding::{embedding_text, tier2_band, Tier2Band, EMBEDDING_DIM};
pub use gate::{check_temporal, satire_match, TemporalRejection};
pub use gazetteer::{Gazetteer, GazetteerEntry, LocationPrecision};
pub use geography::{GeoAnalysis, GeoScope};
pub use textcheck::{validate_narrative, validate_title, TextRejection};
