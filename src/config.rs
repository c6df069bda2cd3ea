// Engine configuration
// Upstream endpoints, retry constants, pricing and scheduling; read-only once loaded

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub upstream: UpstreamConfig,
    pub retry: RetryConfig,
    pub pricing: PricingConfig,
    pub orchestration: OrchestrationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub token_id: String,
    pub end_user_ip: String,
    pub search_path: String,
    pub fare_quote_path: String,
    pub book_path: String,
    pub ticket_path: String,
    pub timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            token_id: String::new(),
            end_user_ip: "127.0.0.1".to_string(),
            search_path: "/Search".to_string(),
            fare_quote_path: "/FareQuote".to_string(),
            book_path: "/Book".to_string(),
            ticket_path: "/Ticket".to_string(),
            timeout_ms: 60_000,
        }
    }
}

impl UpstreamConfig {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_factor: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub currency: String,
    // Applied once per orchestration run, never per leg
    pub platform_fee: Decimal,
    pub price_change_tolerance: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            platform_fee: Decimal::ZERO,
            price_change_tolerance: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegScheduling {
    #[default]
    Sequential,
    Concurrent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    pub scheduling: LegScheduling,
    pub deadline_ms: Option<u64>,
}

impl OrchestrationConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match reqwest::Url::parse(&self.upstream.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(invalid(
                    "upstream.base_url",
                    format!("unsupported URL scheme: {}", url.scheme()),
                ))
            }
            Err(e) => return Err(invalid("upstream.base_url", format!("invalid URL: {}", e))),
        }

        if self.upstream.timeout_ms == 0 {
            return Err(invalid("upstream.timeout_ms", "must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1".to_string()));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(invalid(
                "retry.max_delay_ms",
                "must not be below retry.initial_delay_ms".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(invalid("retry.jitter_factor", "must be within 0.0..=1.0".to_string()));
        }
        if self.pricing.currency.trim().is_empty() {
            return Err(invalid("pricing.currency", "cannot be empty".to_string()));
        }
        if self.pricing.platform_fee.is_sign_negative() {
            return Err(invalid("pricing.platform_fee", "cannot be negative".to_string()));
        }
        if self.pricing.price_change_tolerance.is_sign_negative() {
            return Err(invalid(
                "pricing.price_change_tolerance",
                "cannot be negative".to_string(),
            ));
        }
        if self.orchestration.deadline_ms == Some(0) {
            return Err(invalid("orchestration.deadline_ms", "must be positive".to_string()));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason,
    }
}
