//! Configuration: `herald.toml` plus `HERALD_*` environment overrides.
//!
//! Nested keys use a double underscore in the environment, e.g.
//! `HERALD_RETRY__MAX_ATTEMPTS=3` or `HERALD_TRIGGERS__SECRET=...`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::app::EngineSettings;
use crate::error::{HeraldError, Result};
use crate::queue::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "herald.toml";
pub const ENV_PREFIX: &str = "HERALD_";

/// Deployment environment. Destructive admin operations are refused in
/// production.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub introspection: IntrospectionConfig,
    #[serde(default)]
    pub triggers: TriggerConfig,
    #[serde(default)]
    pub operators: OperatorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("herald.db")
}

/// The external publishing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Base URL. When unset the CLI falls back to the scripted (offline) API.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Token used for every owner.
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_ms: default_request_timeout_ms(),
            access_token: None,
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    600_000
}

fn default_max_attempts() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_stale_claim_after_secs")]
    pub stale_claim_after_secs: u64,
    /// Finished jobs older than this are eligible for `purge`.
    #[serde(default = "default_job_retention_secs")]
    pub job_retention_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            stale_claim_after_secs: default_stale_claim_after_secs(),
            job_retention_secs: default_job_retention_secs(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}

fn default_stale_claim_after_secs() -> u64 {
    300
}

fn default_job_retention_secs() -> u64 {
    7 * 24 * 3600
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrospectionConfig {
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for IntrospectionConfig {
    fn default() -> Self {
        Self {
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_max_page_size() -> usize {
    100
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorConfig {
    #[serde(default)]
    pub token: Option<String>,
}

impl HeraldConfig {
    /// Defaults, then `path` (missing file is fine), then `HERALD_*` vars.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(HeraldConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Self::from_figment(Self::figment(path))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: HeraldConfig = figment
            .extract()
            .map_err(|e| HeraldError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sweep.batch_size == 0 {
            return Err(HeraldError::Configuration(
                "sweep.batch_size must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_ms == 0 || self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(HeraldError::Configuration(
                "retry delays must satisfy 0 < base_delay_ms <= max_delay_ms".to_string(),
            ));
        }
        if self.sweep.stale_claim_after_secs.saturating_mul(1000) <= self.publish.request_timeout_ms {
            return Err(HeraldError::Configuration(
                "sweep.stale_claim_after_secs must exceed publish.request_timeout_ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
            self.retry.max_attempts,
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.publish.request_timeout_ms)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.sweep.job_retention_secs)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            retry: self.retry_policy(),
            batch_size: self.sweep.batch_size,
            publish_timeout: self.request_timeout(),
            stale_claim_after: Duration::from_secs(self.sweep.stale_claim_after_secs),
            max_page_size: self.introspection.max_page_size,
            environment: self.environment,
            trigger_secret: self.triggers.secret.clone(),
            operator_token: self.operators.token.clone(),
        }
    }
}
