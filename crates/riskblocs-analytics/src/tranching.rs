//! Tranche sizing against a pool balance.
//!
//! Tranches are ordered senior first. A tranche's attachment point is the
//! share of the pool beneath it, which is also its credit enhancement.

use riskblocs_types::constants::MONEY_PRECISION;
use riskblocs_types::{Result, RiskblocsError, TrancheStructure};
use rust_decimal::Decimal;
use serde::Serialize;

/// A sized tranche.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrancheSizing {
    pub name: String,
    pub size_pct: Decimal,
    pub coupon_pct: Decimal,
    pub notional: Decimal,
    /// Percent of pool at which losses start to reach this tranche.
    pub attachment_pct: Decimal,
    /// Percent of pool at which this tranche is wiped out.
    pub detachment_pct: Decimal,
    /// Subordination beneath this tranche, percent of pool.
    pub credit_enhancement_pct: Decimal,
}

/// Size every tranche of `structure` against `pool_balance`.
///
/// Notionals are rounded to cents; the most junior tranche absorbs the
/// rounding so notionals always sum to the pool balance.
///
/// # Errors
/// `InvalidStructure` if the structure fails validation or the pool
/// balance is not positive.
pub fn size_tranches(pool_balance: Decimal, structure: &TrancheStructure) -> Result<Vec<TrancheSizing>> {
    structure.validate()?;
    if pool_balance <= Decimal::ZERO {
        return Err(RiskblocsError::InvalidStructure {
            reason: format!("pool balance must be positive, got {pool_balance}"),
        });
    }

    let last = structure.tranches.len() - 1;
    let mut senior_pct = Decimal::ZERO;
    let mut allocated = Decimal::ZERO;
    let mut out = Vec::with_capacity(structure.tranches.len());

    for (i, spec) in structure.tranches.iter().enumerate() {
        let detachment_pct = Decimal::ONE_HUNDRED - senior_pct;
        let attachment_pct = detachment_pct - spec.size_pct;
        let notional = if i == last {
            pool_balance - allocated
        } else {
            (pool_balance * spec.size_pct / Decimal::ONE_HUNDRED).round_dp(MONEY_PRECISION)
        };
        allocated += notional;
        senior_pct += spec.size_pct;

        out.push(TrancheSizing {
            name: spec.name.clone(),
            size_pct: spec.size_pct,
            coupon_pct: spec.coupon_pct,
            notional,
            attachment_pct,
            detachment_pct,
            credit_enhancement_pct: attachment_pct,
        });
    }

    tracing::debug!(
        structure = %structure.id,
        tranches = out.len(),
        %pool_balance,
        "Sized tranches"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use riskblocs_types::TrancheSpec;
    use rust_decimal_macros::dec;

    use super::*;

    fn abc() -> TrancheStructure {
        TrancheStructure::new(vec![
            TrancheSpec::new("A", dec!(80), dec!(4)),
            TrancheSpec::new("B", dec!(15), dec!(6.5)),
            TrancheSpec::new("Equity", dec!(5), dec!(0)),
        ])
    }

    #[test]
    fn attachment_and_enhancement() {
        let sized = size_tranches(dec!(1_000_000), &abc()).unwrap();
        assert_eq!(sized[0].notional, dec!(800000));
        assert_eq!(sized[0].attachment_pct, dec!(20));
        assert_eq!(sized[0].detachment_pct, dec!(100));
        assert_eq!(sized[1].attachment_pct, dec!(5));
        assert_eq!(sized[1].detachment_pct, dec!(20));
        assert_eq!(sized[2].attachment_pct, dec!(0));
        assert_eq!(sized[2].credit_enhancement_pct, dec!(0));
    }

    #[test]
    fn junior_tranche_absorbs_rounding() {
        let s = TrancheStructure::new(vec![
            TrancheSpec::new("A", dec!(33.33), dec!(3)),
            TrancheSpec::new("B", dec!(33.33), dec!(4)),
            TrancheSpec::new("C", dec!(33.34), dec!(5)),
        ]);
        let pool = dec!(100.01);
        let sized = size_tranches(pool, &s).unwrap();
        let total: Decimal = sized.iter().map(|t| t.notional).sum();
        assert_eq!(total, pool);
        assert_eq!(sized[0].notional, dec!(33.33));
    }

    #[test]
    fn rejects_bad_structure_and_pool() {
        let bad = TrancheStructure::new(vec![TrancheSpec::new("A", dec!(90), dec!(3))]);
        assert!(size_tranches(dec!(100), &bad).is_err());
        assert!(size_tranches(Decimal::ZERO, &abc()).is_err());
    }
}
