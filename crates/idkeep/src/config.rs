//! File configuration for a workload's identity settings.

use idkeep_cache::{CredentialCache, CredentialCacheBuilder, CredentialFetcher, RefreshOptions};
use idkeep_core::{Error, Identity, Result};
use idkeep_verify::ChainValidatorBuilder;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Identity settings for one workload.
///
/// ```toml
/// expected_identity = "spiffe://example.org/ns/prod/sa/api"
///
/// [refresh]
/// renew_threshold_fraction = 0.2
/// not_before_skew_tolerance_secs = 300
/// fetch_timeout_secs = 30
///
/// [validator]
/// skew_tolerance_secs = 300
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdkeepConfig {
    /// Identity this workload must hold.
    pub expected_identity: Identity,

    /// Credential refresh tuning.
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Peer validation tuning.
    #[serde(default)]
    pub validator: ValidatorConfig,
}

/// Refresh settings. Out-of-range values fall back to defaults when converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Refresh once this fraction of the lifetime or less remains (default: 0.2).
    #[serde(default = "default_renew_threshold")]
    pub renew_threshold_fraction: f64,

    /// Tolerated future `notBefore` in seconds (default: 300).
    #[serde(default = "default_skew_secs")]
    pub not_before_skew_tolerance_secs: u64,

    /// Upper bound on one fetch in seconds (default: 30).
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

/// Peer validation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Clock-skew tolerance in seconds (default: 300).
    #[serde(default = "default_skew_secs")]
    pub skew_tolerance_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            renew_threshold_fraction: default_renew_threshold(),
            not_before_skew_tolerance_secs: default_skew_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            skew_tolerance_secs: default_skew_secs(),
        }
    }
}

impl IdkeepConfig {
    /// Defaults for everything except the expected identity.
    #[must_use]
    pub fn new(expected_identity: Identity) -> Self {
        Self {
            expected_identity,
            refresh: RefreshConfig::default(),
            validator: ValidatorConfig::default(),
        }
    }

    /// Load config from a TOML file.
    ///
    /// There is no usable default: the expected identity must come from
    /// somewhere, so a missing file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), identity = %config.expected_identity, "Loaded config");
        Ok(config)
    }

    /// Parse config from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Runtime refresh options.
    #[must_use]
    pub fn refresh_options(&self) -> RefreshOptions {
        RefreshOptions::new()
            .renew_threshold_fraction(self.refresh.renew_threshold_fraction)
            .not_before_skew_tolerance(Duration::from_secs(
                self.refresh.not_before_skew_tolerance_secs,
            ))
            .fetch_timeout(Duration::from_secs(self.refresh.fetch_timeout_secs))
    }

    /// Cache builder for the expected identity with these refresh options.
    pub fn cache_builder(&self, fetcher: Arc<dyn CredentialFetcher>) -> CredentialCacheBuilder {
        CredentialCache::builder(self.expected_identity.clone(), fetcher)
            .options(self.refresh_options())
    }

    /// Validator builder with the configured skew; add a bundle source before building.
    pub fn validator_builder(&self) -> ChainValidatorBuilder {
        ChainValidatorBuilder::new()
            .skew_tolerance(Duration::from_secs(self.validator.skew_tolerance_secs))
    }
}

// Default value functions for serde.
const fn default_renew_threshold() -> f64 {
    idkeep_cache::DEFAULT_RENEW_THRESHOLD_FRACTION
}

const fn default_skew_secs() -> u64 {
    300
}

const fn default_fetch_timeout_secs() -> u64 {
    30
}
