//! Pool cashflow projection and a sequential-pay note waterfall.
//!
//! ## Projection
//!
//! Each loan amortises monthly as a level-pay annuity over its remaining
//! term. Every month, in this order:
//!
//! 1. `defaults = balance × MDR`, the defaulted amount stops paying
//! 2. interest and scheduled principal on the performing balance
//! 3. `prepayments = (performing − scheduled) × SMM`
//!
//! MDR and SMM are the monthly equivalents of the annual CDR and CPR:
//! `1 − (1 − annual)^(1/12)`. A defaulted amount loses `severity` and the
//! rest comes back as a recovery in the same month.
//!
//! ## Waterfall
//!
//! Interest collections pay note coupons senior → junior and the rest is
//! excess spread. Principal collections (scheduled, prepaid, recovered)
//! retire notes senior → junior. Losses write notes down junior → senior.

use riskblocs_types::constants::DEFAULT_REMAINING_TERM_MONTHS;
use riskblocs_types::{LoanRecord, Result, RiskblocsError};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::tranching::TrancheSizing;

const MONTHS_PER_YEAR: Decimal = dec!(12);
const RATE_DIVISOR: Decimal = dec!(1200);

/// Projection scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CashflowAssumptions {
    /// Annual conditional prepayment rate, percent.
    pub cpr_pct: Decimal,
    /// Annual conditional default rate, percent.
    pub cdr_pct: Decimal,
    /// Share of a defaulted balance that is lost, percent.
    pub severity_pct: Decimal,
    /// Projection horizon.
    pub months: u32,
    /// Term used for loans whose remaining term is unknown.
    pub default_remaining_term_months: u32,
}

impl Default for CashflowAssumptions {
    fn default() -> Self {
        Self {
            cpr_pct: dec!(5),
            cdr_pct: dec!(1),
            severity_pct: dec!(40),
            months: 360,
            default_remaining_term_months: DEFAULT_REMAINING_TERM_MONTHS,
        }
    }
}

impl CashflowAssumptions {
    /// # Errors
    /// `InvalidAssumptions` if a rate is outside `[0, 100)`, severity is
    /// outside `[0, 100]`, or a horizon is zero.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("cpr_pct", self.cpr_pct), ("cdr_pct", self.cdr_pct)] {
            if value < Decimal::ZERO || value >= Decimal::ONE_HUNDRED {
                return Err(invalid(format!("{name} must be in [0, 100), got {value}")));
            }
        }
        if self.severity_pct < Decimal::ZERO || self.severity_pct > Decimal::ONE_HUNDRED {
            return Err(invalid(format!(
                "severity_pct must be in [0, 100], got {}",
                self.severity_pct
            )));
        }
        if self.months == 0 {
            return Err(invalid("months must be positive".to_string()));
        }
        if self.default_remaining_term_months == 0 {
            return Err(invalid("default_remaining_term_months must be positive".to_string()));
        }
        Ok(())
    }

    /// Single monthly mortality.
    #[must_use]
    pub fn smm(&self) -> Decimal {
        monthly_rate(self.cpr_pct)
    }

    /// Monthly default rate.
    #[must_use]
    pub fn mdr(&self) -> Decimal {
        monthly_rate(self.cdr_pct)
    }
}

fn invalid(reason: String) -> RiskblocsError {
    RiskblocsError::InvalidAssumptions { reason }
}

fn monthly_rate(annual_pct: Decimal) -> Decimal {
    if annual_pct.is_zero() {
        return Decimal::ZERO;
    }
    let survival = Decimal::ONE - annual_pct / Decimal::ONE_HUNDRED;
    Decimal::ONE - survival.powd(Decimal::ONE / MONTHS_PER_YEAR)
}

/// Annuity payment for `balance` at monthly rate `r` over `n` months.
fn level_payment(balance: Decimal, r: Decimal, n: u32) -> Decimal {
    if r.is_zero() {
        return balance / Decimal::from(n);
    }
    match (Decimal::ONE + r).checked_powi(i64::from(n)) {
        // B·r / (1 - (1+r)^-n): dividing first keeps long, high-rate terms in range.
        Some(growth) if growth > Decimal::ONE => {
            let discount = Decimal::ONE - Decimal::ONE / growth;
            (balance * r).checked_div(discount).unwrap_or(balance * r)
        }
        _ => balance * r,
    }
}

/// Aggregated pool cashflows for one month.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolPeriod {
    /// 1-based month.
    pub period: u32,
    pub opening_balance: Decimal,
    pub defaults: Decimal,
    pub interest: Decimal,
    pub scheduled_principal: Decimal,
    pub prepayments: Decimal,
    pub losses: Decimal,
    pub recoveries: Decimal,
    pub closing_balance: Decimal,
}

impl PoolPeriod {
    /// Cash available to retire notes.
    #[must_use]
    pub fn principal_collections(&self) -> Decimal {
        self.scheduled_principal + self.prepayments + self.recoveries
    }
}

struct LoanState {
    balance: Decimal,
    monthly_rate: Decimal,
    remaining: u32,
}

/// Project pool cashflows month by month until the horizon or payoff.
///
/// # Errors
/// `InvalidAssumptions` if the assumptions fail validation.
pub fn project_pool(loans: &[LoanRecord], assumptions: &CashflowAssumptions) -> Result<Vec<PoolPeriod>> {
    assumptions.validate()?;
    let smm = assumptions.smm();
    let mdr = assumptions.mdr();
    let severity = assumptions.severity_pct / Decimal::ONE_HUNDRED;

    let mut states: Vec<LoanState> = loans
        .iter()
        .filter(|l| l.current_balance > Decimal::ZERO)
        .map(|l| LoanState {
            balance: l.current_balance,
            monthly_rate: l.interest_rate / RATE_DIVISOR,
            remaining: l
                .remaining_term_months
                .filter(|n| *n > 0)
                .unwrap_or(assumptions.default_remaining_term_months),
        })
        .collect();

    let mut periods = Vec::new();
    for period in 1..=assumptions.months {
        let mut p = PoolPeriod {
            period,
            ..PoolPeriod::default()
        };
        for s in states.iter_mut().filter(|s| s.balance > Decimal::ZERO && s.remaining > 0) {
            p.opening_balance += s.balance;

            let defaults = s.balance * mdr;
            let performing = s.balance - defaults;
            let interest = performing * s.monthly_rate;
            let payment = level_payment(performing, s.monthly_rate, s.remaining);
            let mut scheduled = (payment - interest).max(Decimal::ZERO).min(performing);
            s.remaining -= 1;
            if s.remaining == 0 {
                scheduled = performing;
            }
            let prepayments = (performing - scheduled) * smm;
            s.balance = performing - scheduled - prepayments;

            let loss = defaults * severity;
            p.defaults += defaults;
            p.interest += interest;
            p.scheduled_principal += scheduled;
            p.prepayments += prepayments;
            p.losses += loss;
            p.recoveries += defaults - loss;
            p.closing_balance += s.balance;
        }
        if p.opening_balance.is_zero() {
            break;
        }
        periods.push(p);
    }

    tracing::debug!(
        loans = loans.len(),
        periods = periods.len(),
        %smm,
        %mdr,
        "Projected pool cashflows"
    );
    Ok(periods)
}

/// Per-tranche totals over the whole projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrancheResult {
    pub name: String,
    pub opening_notional: Decimal,
    pub interest_paid: Decimal,
    /// Coupon due but not covered by interest collections.
    pub interest_shortfall: Decimal,
    pub principal_paid: Decimal,
    pub losses: Decimal,
    pub ending_balance: Decimal,
}

/// Note balances after one month of the waterfall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaterfallPeriod {
    pub period: u32,
    pub interest_available: Decimal,
    pub principal_available: Decimal,
    pub losses: Decimal,
    /// Senior first, after payments and write-downs.
    pub tranche_balances: Vec<Decimal>,
    pub excess_spread: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaterfallResult {
    pub periods: Vec<WaterfallPeriod>,
    pub tranches: Vec<TrancheResult>,
    pub total_excess_spread: Decimal,
}

/// Run pool cashflows through a sequential-pay structure.
#[must_use]
pub fn run_waterfall(pool: &[PoolPeriod], sizing: &[TrancheSizing]) -> WaterfallResult {
    let mut tranches: Vec<TrancheResult> = sizing
        .iter()
        .map(|t| TrancheResult {
            name: t.name.clone(),
            opening_notional: t.notional,
            interest_paid: Decimal::ZERO,
            interest_shortfall: Decimal::ZERO,
            principal_paid: Decimal::ZERO,
            losses: Decimal::ZERO,
            ending_balance: t.notional,
        })
        .collect();
    let mut periods = Vec::with_capacity(pool.len());
    let mut total_excess_spread = Decimal::ZERO;

    for p in pool {
        let mut interest = p.interest;
        for (t, spec) in tranches.iter_mut().zip(sizing) {
            let due = t.ending_balance * spec.coupon_pct / RATE_DIVISOR;
            let paid = due.min(interest);
            interest -= paid;
            t.interest_paid += paid;
            t.interest_shortfall += due - paid;
        }

        let mut principal = p.principal_collections();
        for t in &mut tranches {
            let paid = principal.min(t.ending_balance);
            principal -= paid;
            t.principal_paid += paid;
            t.ending_balance -= paid;
        }

        let mut loss = p.losses;
        for t in tranches.iter_mut().rev() {
            let written = loss.min(t.ending_balance);
            loss -= written;
            t.losses += written;
            t.ending_balance -= written;
        }

        // Principal left once every note is retired is released with the spread.
        let excess_spread = interest + principal;
        total_excess_spread += excess_spread;
        periods.push(WaterfallPeriod {
            period: p.period,
            interest_available: p.interest,
            principal_available: p.principal_collections(),
            losses: p.losses,
            tranche_balances: tranches.iter().map(|t| t.ending_balance).collect(),
            excess_spread,
        });
    }

    WaterfallResult {
        periods,
        tranches,
        total_excess_spread,
    }
}
