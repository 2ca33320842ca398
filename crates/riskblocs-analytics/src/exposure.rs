//! Exposure caps and concentration limits.

use std::collections::BTreeMap;

use riskblocs_types::{
    ExposureBreach, ExposureDimension, ExposureLimit, LoanRecord, Result, RiskblocsError,
};
use rust_decimal::Decimal;
use serde::Serialize;

/// Balance held by one key along a dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Concentration {
    pub key: String,
    pub loan_count: usize,
    pub balance: Decimal,
    /// Percent of total pool balance.
    pub share_pct: Decimal,
}

/// Apply the exposure-cap toggle: every balance becomes `min(balance, cap)`.
///
/// # Errors
/// `InvalidExposure` if `cap` is not positive.
pub fn cap_balances(loans: &[LoanRecord], cap: Decimal) -> Result<Vec<LoanRecord>> {
    if cap <= Decimal::ZERO {
        return Err(RiskblocsError::InvalidExposure {
            reason: format!("exposure cap must be positive, got {cap}"),
        });
    }
    let mut capped = 0usize;
    let out = loans
        .iter()
        .map(|loan| {
            let mut loan = loan.clone();
            if loan.current_balance > cap {
                loan.current_balance = cap;
                capped += 1;
            }
            loan
        })
        .collect();
    tracing::debug!(%cap, capped, loans = loans.len(), "Applied exposure cap");
    Ok(out)
}

/// Pool share per key, largest share first, ties by key.
#[must_use]
pub fn concentrations(loans: &[LoanRecord], dimension: ExposureDimension) -> Vec<Concentration> {
    let mut groups: BTreeMap<String, (usize, Decimal)> = BTreeMap::new();
    let mut total = Decimal::ZERO;
    for loan in loans {
        let entry = groups.entry(dimension.key_of(loan)).or_default();
        entry.0 += 1;
        entry.1 += loan.current_balance;
        total += loan.current_balance;
    }

    let mut rows: Vec<Concentration> = groups
        .into_iter()
        .map(|(key, (loan_count, balance))| Concentration {
            key,
            loan_count,
            balance,
            share_pct: share_of(balance, total),
        })
        .collect();
    rows.sort_by(|a, b| b.share_pct.cmp(&a.share_pct).then_with(|| a.key.cmp(&b.key)));
    rows
}

/// Every key whose share exceeds its limit, in limit order.
#[must_use]
pub fn check_limits(loans: &[LoanRecord], limits: &[ExposureLimit]) -> Vec<ExposureBreach> {
    let mut breaches = Vec::new();
    for limit in limits {
        for c in concentrations(loans, limit.dimension) {
            if c.share_pct > limit.max_share_pct {
                breaches.push(ExposureBreach {
                    dimension: limit.dimension,
                    key: c.key,
                    balance: c.balance,
                    share_pct: c.share_pct,
                    limit_pct: limit.max_share_pct,
                });
            }
        }
    }
    if !breaches.is_empty() {
        tracing::warn!(breaches = breaches.len(), "Exposure limits breached");
    }
    breaches
}

pub(crate) fn share_of(part: Decimal, total: Decimal) -> Decimal {
    if total.is_zero() {
        Decimal::ZERO
    } else {
        part * Decimal::ONE_HUNDRED / total
    }
}
