//! Exposure (concentration) limits applied to a loan pool.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{LoanField, LoanRecord};

/// The attribute a concentration is measured along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExposureDimension {
    Region,
    AssetClass,
    Borrower,
    Currency,
}

impl ExposureDimension {
    #[must_use]
    pub fn field(self) -> LoanField {
        match self {
            Self::Region => LoanField::Region,
            Self::AssetClass => LoanField::AssetClass,
            Self::Borrower => LoanField::BorrowerId,
            Self::Currency => LoanField::Currency,
        }
    }

    /// Grouping key of a loan along this dimension.
    ///
    /// Loans without a borrower id are their own borrower; other missing
    /// attributes group under `"UNKNOWN"`.
    #[must_use]
    pub fn key_of(self, loan: &LoanRecord) -> String {
        match self {
            Self::Region => loan.region.clone(),
            Self::AssetClass => loan.asset_class.clone(),
            Self::Borrower => Some(
                loan.borrower_id
                    .clone()
                    .unwrap_or_else(|| loan.loan_id.clone()),
            ),
            Self::Currency => loan.currency.clone(),
        }
        .map_or_else(|| "UNKNOWN".to_string(), |k| k.trim().to_uppercase())
    }
}

impl std::fmt::Display for ExposureDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Region => write!(f, "REGION"),
            Self::AssetClass => write!(f, "ASSET_CLASS"),
            Self::Borrower => write!(f, "BORROWER"),
            Self::Currency => write!(f, "CURRENCY"),
        }
    }
}

/// Maximum share of pool balance any single key may hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureLimit {
    pub dimension: ExposureDimension,
    /// Percent of total pool balance.
    pub max_share_pct: Decimal,
}

/// A key whose share of the pool exceeds its limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureBreach {
    pub dimension: ExposureDimension,
    pub key: String,
    pub balance: Decimal,
    pub share_pct: Decimal,
    pub limit_pct: Decimal,
}

impl std::fmt::Display for ExposureBreach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} holds {}% of pool, limit {}%",
            self.dimension,
            self.key,
            self.share_pct.round_dp(2),
            self.limit_pct
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_normalises_case_and_whitespace() {
        let loan = LoanRecord::dummy("L1", 10, 100).with_region("  south ");
        assert_eq!(ExposureDimension::Region.key_of(&loan), "SOUTH");
    }

    #[test]
    fn borrower_falls_back_to_loan_id() {
        let loan = LoanRecord::dummy("l-9", 10, 100);
        assert_eq!(ExposureDimension::Borrower.key_of(&loan), "L-9");
    }

    #[test]
    fn missing_attribute_groups_as_unknown() {
        let mut loan = LoanRecord::dummy("L1", 10, 100);
        loan.asset_class = None;
        assert_eq!(ExposureDimension::AssetClass.key_of(&loan), "UNKNOWN");
    }

    #[test]
    fn breach_display() {
        let breach = ExposureBreach {
            dimension: ExposureDimension::Region,
            key: "NORTH".into(),
            balance: Decimal::new(600, 0),
            share_pct: Decimal::new(60, 0),
            limit_pct: Decimal::new(25, 0),
        };
        assert_eq!(breach.to_string(), "REGION NORTH holds 60% of pool, limit 25%");
    }
}
