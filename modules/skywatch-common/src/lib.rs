pub mod config;
pub mod error;
pub mod geo;
pub mod types;

pub use config::{Config, ScopeKind};
pub use error::SkywatchError;
pub use geo::*;
pub use types::*;
