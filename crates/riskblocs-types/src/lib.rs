//! # riskblocs-types
//!
//! Shared types, errors, and configuration for **RiskBlocs**.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`UserId`], [`DatasetId`], [`NdaId`], [`OfferId`], [`StructureId`]
//! - **Loan model**: [`LoanRecord`], [`LoanField`], [`FieldKind`], [`FieldValue`]
//! - **Dataset model**: [`Dataset`]
//! - **Structuring**: [`TrancheSpec`], [`TrancheStructure`]
//! - **Matched market**: [`Nda`], [`Offer`], [`InvestorResponse`], [`TransactionSnapshot`], [`TransactionStage`]
//! - **Exposure limits**: [`ExposureLimit`], [`ExposureDimension`], [`ExposureBreach`]
//! - **Configuration**: [`RiskblocsConfig`], [`BackendConfig`], [`IngestConfig`], [`ReportConfig`]
//! - **Errors**: [`RiskblocsError`] with `RB_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod exposure;
pub mod ids;
pub mod loan;
pub mod market;
pub mod structure;

// Re-export all primary types at crate root for ergonomic imports:
//   use riskblocs_types::{LoanRecord, Dataset, Offer, ...};

pub use config::*;
pub use dataset::*;
pub use error::*;
pub use exposure::*;
pub use ids::*;
pub use loan::*;
pub use market::*;
pub use structure::*;

// Constants are accessed via `riskblocs_types::constants::FOO`
// (not re-exported to avoid name collisions).
