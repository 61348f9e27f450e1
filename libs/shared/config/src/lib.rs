use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub bind_port: u16,
    /// Minutes of consultation time budgeted per token. Drives both the
    /// expected arrival time stamped at issuance and the live ETA shown to
    /// waiting patients.
    pub token_interval_minutes: u32,
    /// Upper bound on any single document store operation.
    pub store_timeout_ms: u64,
    /// How many times a retryable store failure is attempted before the
    /// request is surfaced as unavailable.
    pub store_retry_attempts: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_address: env::var("CLINIC_BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            bind_port: parse_var("CLINIC_BIND_PORT", 3000),
            token_interval_minutes: parse_var("CLINIC_TOKEN_INTERVAL_MINUTES", 5),
            store_timeout_ms: parse_var("CLINIC_STORE_TIMEOUT_MS", 2000),
            store_retry_attempts: parse_var("CLINIC_STORE_RETRY_ATTEMPTS", 3),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 3000,
            token_interval_minutes: 5,
            store_timeout_ms: 2000,
            store_retry_attempts: 3,
        }
    }
}

fn parse_var<T: std::str::FromStr + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
