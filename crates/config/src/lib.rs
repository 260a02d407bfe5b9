//! Environment-derived configuration for the study-plan scheduler backend.

use serde::Deserialize;
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// JWT secret used to verify caller identity on authenticated requests
    pub jwt_secret: String,
    /// Address to bind the server to
    pub bind_address: String,

    /// Base URL of the generative-model gateway
    pub llm_base_url: String,
    /// API key for the generative-model gateway
    pub llm_api_key: String,
    /// Model identifier passed to the gateway
    pub llm_model: String,
    /// Per-call timeout for the generative-model gateway, in seconds
    pub llm_timeout_seconds: u64,

    /// Per-user topic extraction quota for non-elevated users (§4.3 point 3)
    pub daily_topic_quota: i64,
    /// Age, in seconds, after which a running extraction is considered stale
    pub extraction_stale_seconds: i64,
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env_var("DATABASE_URL")?,
            jwt_secret: env_var("JWT_SECRET")?,
            bind_address: env_var_or("BIND_ADDRESS", "0.0.0.0:8080"),

            llm_base_url: env_var_or("LLM_BASE_URL", "https://api.anthropic.com/v1"),
            llm_api_key: env_var_or("LLM_API_KEY", ""),
            llm_model: env_var_or("LLM_MODEL", "claude-3-5-sonnet-latest"),
            llm_timeout_seconds: env_var_parsed_or("LLM_TIMEOUT_SECONDS", 30)?,

            daily_topic_quota: env_var_parsed_or("DAILY_TOPIC_QUOTA", 500)?,
            extraction_stale_seconds: env_var_parsed_or("EXTRACTION_STALE_SECONDS", 300)?,
        })
    }
}

fn env_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_var_parsed_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_or_uses_default_when_unset() {
        let val = env_var_or("STUDY_SCHEDULER_TEST_UNSET_STR", "fallback");
        assert_eq!(val, "fallback");
    }

    #[test]
    fn env_var_parsed_or_uses_default_when_unset() {
        let val: u64 = env_var_parsed_or("STUDY_SCHEDULER_TEST_UNSET_INT", 30).unwrap();
        assert_eq!(val, 30);
    }

    #[test]
    fn env_var_parsed_or_rejects_non_numeric() {
        // SAFETY: test-only process-local env mutation, not shared across threads here.
        unsafe {
            env::set_var("STUDY_SCHEDULER_TEST_BAD_INT", "not-a-number");
        }
        let result: Result<u64, ConfigError> =
            env_var_parsed_or("STUDY_SCHEDULER_TEST_BAD_INT", 30);
        assert!(result.is_err());
        unsafe {
            env::remove_var("STUDY_SCHEDULER_TEST_BAD_INT");
        }
    }
}
