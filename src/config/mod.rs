use crate::constants::{
    DEFAULT_ASSIGN_TICK_SECS, DEFAULT_DEADLINE_TICK_SECS, DEFAULT_MAX_RETRIES,
    DEFAULT_PRESENCE_TTL_SECS, DEFAULT_SCORE_THRESHOLD, DEFAULT_SLA_MINUTES,
    DEFAULT_VIOLATIONS_BEFORE_SUSPENSION, DEFAULT_WARNINGS_BEFORE_VIOLATION, DEFAULT_WARNING_MARKS,
};
use crate::{DispatchError, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Tunables for the dispatch and SLA-enforcement policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub sla_minutes: i64,
    pub warning_marks: Vec<i64>,
    pub presence_ttl_secs: u64,
    pub assign_tick_secs: u64,
    pub deadline_tick_secs: u64,
    pub max_retries: u32,
    pub warnings_before_violation: u8,
    pub violations_before_suspension: u8,
    pub score_threshold: f64,
}

/// HTTP/WebSocket transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub enable_auth: bool,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dispatch: DispatchConfig,
    pub api: ApiConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("Loaded .env file from: {:?}", path),
            Err(e) => tracing::debug!("No .env file loaded: {}", e),
        }

        let sla_minutes = env_parse("SLA_MINUTES", DEFAULT_SLA_MINUTES)?;
        if sla_minutes <= 0 {
            return Err(DispatchError::Configuration(
                "SLA_MINUTES must be positive".to_string(),
            ));
        }

        let warning_marks = match env::var("WARNING_MARKS") {
            Ok(raw) => parse_warning_marks(&raw)?,
            Err(_) => DEFAULT_WARNING_MARKS.to_vec(),
        };

        let presence_ttl_secs = env_parse("PRESENCE_TTL_SECS", DEFAULT_PRESENCE_TTL_SECS)?;
        let assign_tick_secs = env_parse("ASSIGN_TICK_SECS", DEFAULT_ASSIGN_TICK_SECS)?;
        let deadline_tick_secs = env_parse("DEADLINE_TICK_SECS", DEFAULT_DEADLINE_TICK_SECS)?;
        let max_retries = env_parse("MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
        let warnings_before_violation =
            env_parse("WARNINGS_BEFORE_VIOLATION", DEFAULT_WARNINGS_BEFORE_VIOLATION)?;
        let violations_before_suspension = env_parse(
            "VIOLATIONS_BEFORE_SUSPENSION",
            DEFAULT_VIOLATIONS_BEFORE_SUSPENSION,
        )?;
        let score_threshold = env_parse("SCORE_THRESHOLD", DEFAULT_SCORE_THRESHOLD)?;
        if !(0.0..=1.0).contains(&score_threshold) {
            return Err(DispatchError::Configuration(
                "SCORE_THRESHOLD must be between 0.0 and 1.0".to_string(),
            ));
        }

        let dispatch = DispatchConfig {
            sla_minutes,
            warning_marks,
            presence_ttl_secs,
            assign_tick_secs,
            deadline_tick_secs,
            max_retries,
            warnings_before_violation,
            violations_before_suspension,
            score_threshold,
        };

        // SECURITY: authentication is always enforced; a missing or weak key
        // is a fail-fast configuration error rather than a silent bypass.
        let api_key = env::var("API_KEY").ok();
        match &api_key {
            Some(key) if key.trim().is_empty() => {
                return Err(DispatchError::Configuration(
                    "API_KEY cannot be blank".to_string(),
                ));
            }
            Some(key) if key.len() < 32 => {
                return Err(DispatchError::Configuration(
                    "API_KEY must be at least 32 characters".to_string(),
                ));
            }
            None => {
                return Err(DispatchError::Configuration(
                    "API_KEY environment variable is required".to_string(),
                ));
            }
            Some(_) => {
                tracing::info!("API authentication configured with secure key");
            }
        }

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let api = ApiConfig {
            host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_parse("API_PORT", 3000u16)?,
            api_key,
            enable_auth: true,
            allowed_origins,
        };

        Ok(Config { dispatch, api })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| DispatchError::Configuration(format!("{key} is not a valid value"))),
        Err(_) => Ok(default),
    }
}

fn parse_warning_marks(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(|s| {
            s.trim()
                .parse::<i64>()
                .map_err(|_| DispatchError::Configuration(format!("invalid WARNING_MARKS entry: {s}")))
        })
        .collect()
}

#[cfg(test)]
mod tests;
