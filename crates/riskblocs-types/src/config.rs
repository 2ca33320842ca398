//! Configuration for RiskBlocs services and tools.
//!
//! Every section has a `Default` built from [`crate::constants`], and every
//! field is `#[serde(default)]`, so a config file only lists what it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{constants, Result, RiskblocsError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskblocsConfig {
    pub backend: BackendConfig,
    pub ingest: IngestConfig,
    pub report: ReportConfig,
}

impl RiskblocsConfig {
    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RiskblocsError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a JSON config document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text)
            .map_err(|e| RiskblocsError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings that would make a service misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.ingest.batch_size == 0 {
            return Err(RiskblocsError::Configuration(
                "ingest.batch_size must be > 0".into(),
            ));
        }
        if self.ingest.header_scan_rows == 0 {
            return Err(RiskblocsError::Configuration(
                "ingest.header_scan_rows must be > 0".into(),
            ));
        }
        if self.backend.tape_bucket.trim().is_empty() {
            return Err(RiskblocsError::Configuration(
                "backend.tape_bucket must not be empty".into(),
            ));
        }
        if self.backend.signed_url_ttl_secs <= 0 {
            return Err(RiskblocsError::Configuration(
                "backend.signed_url_ttl_secs must be positive".into(),
            ));
        }
        if self.report.esma_no_data.trim().is_empty() {
            return Err(RiskblocsError::Configuration(
                "report.esma_no_data must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Hosted backend connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL used when building signed storage URLs.
    pub url: String,
    /// Bucket for raw uploaded tapes.
    pub tape_bucket: String,
    /// Shared secret for signing storage URLs.
    pub signing_secret: String,
    pub signed_url_ttl_secs: i64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: constants::DEFAULT_BACKEND_URL.to_string(),
            tape_bucket: constants::DEFAULT_TAPE_BUCKET.to_string(),
            signing_secret: String::new(),
            signed_url_ttl_secs: constants::DEFAULT_SIGNED_URL_TTL_SECS,
        }
    }
}

/// Loan-tape ingestion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Rows per backend insert call.
    pub batch_size: usize,
    /// Pause between insert batches.
    pub batch_delay_ms: u64,
    /// Leading rows searched for the header row.
    pub header_scan_rows: usize,
    /// Data rows read before the rest of the sheet is ignored.
    pub max_rows: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: constants::DEFAULT_BATCH_SIZE,
            batch_delay_ms: constants::DEFAULT_BATCH_DELAY_MS,
            header_scan_rows: constants::DEFAULT_HEADER_SCAN_ROWS,
            max_rows: constants::DEFAULT_MAX_ROWS,
        }
    }
}

/// Report generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Code written for missing values in ESMA templates (`ND1`..`ND5`).
    pub esma_no_data: String,
    /// Currency used when a loan carries none.
    pub currency: String,
    /// Remaining term assumed by cashflow projection when a loan has none.
    pub default_remaining_term_months: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            esma_no_data: constants::DEFAULT_ESMA_NO_DATA.to_string(),
            currency: constants::DEFAULT_CURRENCY.to_string(),
            default_remaining_term_months: constants::DEFAULT_REMAINING_TERM_MONTHS,
        }
    }
}
