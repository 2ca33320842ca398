//! # riskblocs-analytics
//!
//! **Pure analytics over loan records.** Nothing here performs I/O or
//! holds state between calls: same loans in, same numbers out.
//!
//! - [`filter`]: conjunctive range and set filters behind the filter panels
//! - [`exposure`]: exposure-cap transform and concentration limits
//! - [`stats`]: pool summary and stratification tables
//! - [`tranching`]: note sizing, attachment points, credit enhancement
//! - [`cashflow`]: pool projection and sequential-pay waterfall

pub mod cashflow;
pub mod exposure;
pub mod filter;
pub mod stats;
pub mod tranching;

pub use cashflow::{
    CashflowAssumptions, PoolPeriod, TrancheResult, WaterfallPeriod, WaterfallResult,
    project_pool, run_waterfall,
};
pub use exposure::{Concentration, cap_balances, check_limits, concentrations};
pub use filter::{FilterCriteria, NumericRange};
pub use stats::{PortfolioSummary, StratRow, Stratifier, stratify};
pub use tranching::{TrancheSizing, size_tranches};
