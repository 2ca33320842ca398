//! # riskblocs-report
//!
//! Everything that leaves the system as a file:
//!
//! - [`csv_export`]: loan-level CSV in the canonical column order, quoted
//!   per RFC 4180 so embedded commas, quotes and newlines survive
//! - [`esma`]: ESMA residential loan-level template (`RREL` codes)
//! - [`investor`]: pool summary, stratifications, tranche sizing and
//!   waterfall totals as JSON or sectioned CSV

pub mod csv_export;
pub mod esma;
pub mod investor;

pub use csv_export::{LOAN_EXPORT_HEADERS, export_loans, import_loans, write_loans};
pub use esma::{ESMA_RRE_FIELDS, EsmaField, EsmaSource, esma_report};
pub use investor::{InvestorReport, Stratification, WaterfallTotals};

use riskblocs_types::RiskblocsError;

pub(crate) fn report_err(err: impl std::fmt::Display) -> RiskblocsError {
    RiskblocsError::Report {
        reason: err.to_string(),
    }
}
