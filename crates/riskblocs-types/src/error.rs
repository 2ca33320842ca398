//! Error types for RiskBlocs.
//!
//! All errors use the `RB_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Loan-tape ingestion errors
//! - 2xx: PDF extraction errors
//! - 3xx: Filter / analytics errors
//! - 4xx: Structuring errors
//! - 5xx: Matched-market errors
//! - 6xx: Backend / storage errors
//! - 7xx: Report errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{DatasetId, NdaId, OfferId};

/// Central error enum for all RiskBlocs operations.
#[derive(Debug, Error)]
pub enum RiskblocsError {
    // =================================================================
    // Ingestion Errors (1xx)
    // =================================================================
    /// The uploaded file extension is not a supported spreadsheet format.
    #[error("RB_ERR_100: Unsupported file format: {extension}")]
    UnsupportedFormat { extension: String },

    /// No worksheet exposes a header for every required loan field.
    #[error("RB_ERR_101: Missing required columns: {}", .missing.join(", "))]
    MissingRequiredColumns { missing: Vec<String> },

    /// The workbook could not be opened or a sheet could not be read.
    #[error("RB_ERR_102: Workbook read failed: {reason}")]
    WorkbookRead { reason: String },

    /// Parsing finished without a single retained loan.
    #[error("RB_ERR_103: Loan tape contains no usable rows")]
    EmptyTape,

    // =================================================================
    // PDF Errors (2xx)
    // =================================================================
    /// The input does not look like a PDF document.
    #[error("RB_ERR_200: Invalid PDF: {reason}")]
    InvalidPdf { reason: String },

    /// No text-showing operators were found in any content stream.
    #[error("RB_ERR_201: PDF contains no extractable text")]
    PdfNoText,

    // =================================================================
    // Filter / Analytics Errors (3xx)
    // =================================================================
    /// A filter bound could not be parsed or is inconsistent.
    #[error("RB_ERR_300: Invalid filter: {reason}")]
    InvalidFilter { reason: String },

    /// Exposure cap or limit configuration is unusable.
    #[error("RB_ERR_301: Invalid exposure setting: {reason}")]
    InvalidExposure { reason: String },

    /// A filter selected no loans where at least one was required.
    #[error("RB_ERR_302: Filter selected no loans")]
    EmptySelection,

    // =================================================================
    // Structuring Errors (4xx)
    // =================================================================
    /// The tranche structure is malformed.
    #[error("RB_ERR_400: Invalid tranche structure: {reason}")]
    InvalidStructure { reason: String },

    /// Cashflow assumptions are out of range.
    #[error("RB_ERR_401: Invalid cashflow assumptions: {reason}")]
    InvalidAssumptions { reason: String },

    // =================================================================
    // Matched-Market Errors (5xx)
    // =================================================================
    /// The session is not allowed to perform this action.
    #[error("RB_ERR_500: Forbidden: {reason}")]
    Forbidden { reason: String },

    /// NDA or offer status change not permitted from the current state.
    #[error("RB_ERR_501: Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The action requires an executed NDA between the parties.
    #[error("RB_ERR_502: Executed NDA required")]
    NdaRequired,

    /// The offer failed validation.
    #[error("RB_ERR_503: Invalid offer: {reason}")]
    InvalidOffer { reason: String },

    /// The NDA does not exist.
    #[error("RB_ERR_504: NDA not found: {0}")]
    NdaNotFound(NdaId),

    /// The offer does not exist.
    #[error("RB_ERR_505: Offer not found: {0}")]
    OfferNotFound(OfferId),

    // =================================================================
    // Backend / Storage Errors (6xx)
    // =================================================================
    /// The dataset does not exist (or is not visible to the caller).
    #[error("RB_ERR_600: Dataset not found: {0}")]
    DatasetNotFound(DatasetId),

    /// The backend rejected a table operation.
    #[error("RB_ERR_601: Backend error: {reason}")]
    Backend { reason: String },

    /// A storage bucket operation failed.
    #[error("RB_ERR_602: Storage error: {reason}")]
    Storage { reason: String },

    /// A signed URL token did not verify.
    #[error("RB_ERR_603: Signed URL token invalid")]
    SignatureInvalid,

    /// A signed URL is past its expiry.
    #[error("RB_ERR_604: Signed URL expired")]
    SignedUrlExpired,

    // =================================================================
    // Report Errors (7xx)
    // =================================================================
    /// Report generation or CSV encoding failed.
    #[error("RB_ERR_700: Report error: {reason}")]
    Report { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("RB_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("RB_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("RB_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("RB_ERR_903: I/O error: {0}")]
    Io(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, RiskblocsError>;

// Conversion from std::io::Error
impl From<std::io::Error> for RiskblocsError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RiskblocsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
