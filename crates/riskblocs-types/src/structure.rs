//! Tranche structures: how a securitised pool is sliced by seniority.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{DatasetId, Result, RiskblocsError, StructureId};

/// One slice of the capital structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrancheSpec {
    /// Class name, e.g. "A", "B", "Equity".
    pub name: String,
    /// Share of the pool balance, in percent.
    pub size_pct: Decimal,
    /// Annual coupon, in percent. Zero for an equity / residual tranche.
    pub coupon_pct: Decimal,
}

impl TrancheSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, size_pct: Decimal, coupon_pct: Decimal) -> Self {
        Self {
            name: name.into(),
            size_pct,
            coupon_pct,
        }
    }
}

/// Tranches ordered senior first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrancheStructure {
    pub id: StructureId,
    pub dataset_id: Option<DatasetId>,
    pub tranches: Vec<TrancheSpec>,
}

impl TrancheStructure {
    #[must_use]
    pub fn new(tranches: Vec<TrancheSpec>) -> Self {
        Self {
            id: StructureId::new(),
            dataset_id: None,
            tranches,
        }
    }

    /// Check that the structure can be sized against a pool.
    ///
    /// # Errors
    /// `InvalidStructure` when empty, when a name repeats, when a size is not
    /// positive, when a coupon is negative, or when sizes do not sum to 100.
    pub fn validate(&self) -> Result<()> {
        if self.tranches.is_empty() {
            return Err(invalid("structure has no tranches"));
        }
        let mut seen = std::collections::HashSet::new();
        for t in &self.tranches {
            if t.name.trim().is_empty() {
                return Err(invalid("tranche name is blank"));
            }
            if !seen.insert(t.name.as_str()) {
                return Err(invalid(&format!("duplicate tranche name {}", t.name)));
            }
            if t.size_pct <= Decimal::ZERO {
                return Err(invalid(&format!("tranche {} size must be positive", t.name)));
            }
            if t.coupon_pct.is_sign_negative() {
                return Err(invalid(&format!("tranche {} coupon is negative", t.name)));
            }
        }
        let total = self.total_size_pct();
        if total != Decimal::ONE_HUNDRED {
            return Err(invalid(&format!("tranche sizes sum to {total}, expected 100")));
        }
        Ok(())
    }

    #[must_use]
    pub fn total_size_pct(&self) -> Decimal {
        self.tranches.iter().map(|t| t.size_pct).sum()
    }
}

fn invalid(reason: &str) -> RiskblocsError {
    RiskblocsError::InvalidStructure {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_class() -> TrancheStructure {
        TrancheStructure::new(vec![
            TrancheSpec::new("A", Decimal::new(80, 0), Decimal::new(350, 2)),
            TrancheSpec::new("B", Decimal::new(15, 0), Decimal::new(600, 2)),
            TrancheSpec::new("Equity", Decimal::new(5, 0), Decimal::ZERO),
        ])
    }

    #[test]
    fn valid_structure_passes() {
        three_class().validate().unwrap();
    }

    #[test]
    fn sizes_must_sum_to_hundred() {
        let mut s = three_class();
        s.tranches[2].size_pct = Decimal::new(4, 0);
        let err = s.validate().unwrap_err();
        assert!(format!("{err}").contains("sum to 99"), "Got: {err}");
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut s = three_class();
        s.tranches[1].name = "A".into();
        assert!(matches!(s.validate(), Err(RiskblocsError::InvalidStructure { .. })));
    }

    #[test]
    fn empty_structure_rejected() {
        assert!(TrancheStructure::new(vec![]).validate().is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let s = three_class();
        let json = serde_json::to_string(&s).unwrap();
        let back: TrancheStructure = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
