//! Dataset rows: a named, user-owned grouping of uploaded loan records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{DatasetId, UserId};

/// A stored dataset. Loans are kept in a separate table keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub owner: UserId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub loan_count: usize,
    pub total_balance: Decimal,
    /// Original file name of the uploaded tape (empty for filtered copies).
    pub source_file: String,
    /// SHA-256 hex digest of the uploaded file, if the dataset came from one.
    pub file_digest: Option<String>,
    /// Source dataset when this row was produced by a filtered copy.
    pub parent: Option<DatasetId>,
}

impl Dataset {
    #[must_use]
    pub fn new(owner: UserId, name: impl Into<String>) -> Self {
        Self {
            id: DatasetId::new(),
            owner,
            name: name.into(),
            created_at: Utc::now(),
            loan_count: 0,
            total_balance: Decimal::ZERO,
            source_file: String::new(),
            file_digest: None,
            parent: None,
        }
    }

    #[must_use]
    pub fn is_filtered_copy(&self) -> bool {
        self.parent.is_some()
    }

    /// One-line description for listings and logs.
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!(
            "{} [{}] {} loans, balance {}",
            self.name,
            self.id,
            self.loan_count,
            self.total_balance.round_dp(crate::constants::MONEY_PRECISION),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_dataset_is_empty_original() {
        let ds = Dataset::new(UserId::new(), "Q3 tape");
        assert_eq!(ds.loan_count, 0);
        assert_eq!(ds.total_balance, Decimal::ZERO);
        assert!(!ds.is_filtered_copy());
    }

    #[test]
    fn summary_line_rounds_balance() {
        let mut ds = Dataset::new(UserId::new(), "Q3 tape");
        ds.loan_count = 2;
        ds.total_balance = Decimal::new(1_234_567, 3);
        let line = ds.summary_line();
        assert!(line.starts_with("Q3 tape [ds:"));
        assert!(line.ends_with("2 loans, balance 1234.57"), "Got: {line}");
    }
}
