use std::env;

/// Which geographic scope the analyzer and store trigger enforce.
/// Operators wanting the narrower Nordic deployment flip `GEO_SCOPE=nordic`;
/// bounds and keyword lists swap together, nothing is hard-coded downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    European,
    Nordic,
}

impl std::str::FromStr for ScopeKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "european" => Ok(Self::European),
            "nordic" => Ok(Self::Nordic),
            other => Err(format!("unknown ScopeKind: {other}")),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres (PostGIS + pgvector)
    pub database_url: String,

    // Ingest auth. Kept optional: a missing token is a *server* error
    // surfaced as 500 at request time, not a startup crash.
    pub ingest_token: Option<String>,

    // AI provider (optional — absence disables AI adjudication and Tier-3)
    pub openrouter_api_key: Option<String>,

    // CORS exact-origin allow-list
    pub allowed_origins: Vec<String>,

    // Sliding-window rate limit
    pub rate_limit_max_requests: usize,
    pub rate_limit_window_secs: u64,

    // Temporal gate
    pub max_age_days: i64,

    // Geographic scope
    pub scope: ScopeKind,

    // Web server
    pub api_host: String,
    pub api_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing or malformed.
    pub fn from_env() -> Self {
        let database_url = required_env("DATABASE_URL");
        if !database_url.starts_with("postgresql://") && !database_url.starts_with("postgres://") {
            panic!("DATABASE_URL must use the postgres:// or postgresql:// scheme");
        }

        let allowed_origins: Vec<String> = env::var("ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            database_url,
            ingest_token: env::var("INGEST_TOKEN").ok().filter(|t| !t.is_empty()),
            openrouter_api_key: env::var("OPENROUTER_API_KEY")
                .or_else(|_| env::var("OPENAI_API_KEY"))
                .ok()
                .filter(|k| !k.is_empty()),
            allowed_origins,
            rate_limit_max_requests: env::var("RATE_LIMIT_MAX_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            max_age_days: env::var("MAX_AGE_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            scope: env::var("GEO_SCOPE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(ScopeKind::European),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env::var("API_PORT")
                .or_else(|_| env::var("PORT"))
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("API_PORT must be a number"),
        }
    }

    /// Log presence and length of each sensitive value without the value itself.
    pub fn log_redacted(&self) {
        let vars = [
            ("DATABASE_URL", Some(self.database_url.as_str())),
            ("INGEST_TOKEN", self.ingest_token.as_deref()),
            ("OPENROUTER_API_KEY", self.openrouter_api_key.as_deref()),
        ];
        for (name, value) in vars {
            match value {
                Some(v) => tracing::info!("{name} = ({} chars)", v.len()),
                None => tracing::info!("{name} = (unset)"),
            }
        }
        tracing::info!(
            scope = ?self.scope,
            max_age_days = self.max_age_days,
            origins = self.allowed_origins.len(),
            "config loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_kind_parses() {
        assert_eq!("european".parse::<ScopeKind>().unwrap(), ScopeKind::European);
        assert_eq!("nordic".parse::<ScopeKind>().unwrap(), ScopeKind::Nordic);
        assert!("atlantic".parse::<ScopeKind>().is_err());
    }
}
