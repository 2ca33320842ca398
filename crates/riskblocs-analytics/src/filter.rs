//! Loan filters.
//!
//! A [`FilterCriteria`] is a pure conjunction: a loan passes when it
//! satisfies every active predicate. A loan that lacks a field fails any
//! active predicate on that field.

use std::collections::BTreeSet;
use std::str::FromStr;

use riskblocs_types::{LoanField, LoanRecord, Result, RiskblocsError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Inclusive numeric range; a `None` bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl NumericRange {
    #[must_use]
    pub fn new(min: Option<Decimal>, max: Option<Decimal>) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn at_least(min: Decimal) -> Self {
        Self::new(Some(min), None)
    }

    #[must_use]
    pub fn at_most(max: Decimal) -> Self {
        Self::new(None, Some(max))
    }

    /// Build a range from the two text boxes of a filter panel.
    ///
    /// A blank box leaves that side open.
    ///
    /// # Errors
    /// `InvalidFilter` if a box holds something other than a number, or
    /// if `min > max`.
    pub fn from_inputs(min_text: &str, max_text: &str) -> Result<Self> {
        let range = Self::new(parse_bound(min_text)?, parse_bound(max_text)?);
        if let (Some(min), Some(max)) = (range.min, range.max) {
            if min > max {
                return Err(RiskblocsError::InvalidFilter {
                    reason: format!("minimum {min} exceeds maximum {max}"),
                });
            }
        }
        Ok(range)
    }

    /// Whether either bound is set.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    #[must_use]
    pub fn contains(&self, value: Decimal) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

fn parse_bound(text: &str) -> Result<Option<Decimal>> {
    let cleaned: String = text
        .trim()
        .trim_end_matches('%')
        .chars()
        .filter(|c| !matches!(c, ',' | '_' | ' '))
        .collect();
    if cleaned.is_empty() {
        return Ok(None);
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map(Some)
        .map_err(|_| RiskblocsError::InvalidFilter {
            reason: format!("{:?} is not a number", text.trim()),
        })
}

/// Fields that carry a numeric range in [`FilterCriteria`].
pub const RANGE_FIELDS: [LoanField; 7] = [
    LoanField::CurrentBalance,
    LoanField::InterestRate,
    LoanField::Ltv,
    LoanField::CreditScore,
    LoanField::RemainingTerm,
    LoanField::Dti,
    LoanField::DaysPastDue,
];

/// The state of the filter panels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub balance: NumericRange,
    pub interest_rate: NumericRange,
    pub ltv: NumericRange,
    pub credit_score: NumericRange,
    pub remaining_term: NumericRange,
    pub dti: NumericRange,
    pub days_past_due: NumericRange,
    /// Upper-cased accepted regions; empty means any.
    pub regions: BTreeSet<String>,
    pub asset_classes: BTreeSet<String>,
    pub currencies: BTreeSet<String>,
}

impl FilterCriteria {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the range for one of [`RANGE_FIELDS`].
    ///
    /// # Errors
    /// `InvalidFilter` if `field` has no range control.
    pub fn set_range(&mut self, field: LoanField, range: NumericRange) -> Result<()> {
        let slot = match field {
            LoanField::CurrentBalance => &mut self.balance,
            LoanField::InterestRate => &mut self.interest_rate,
            LoanField::Ltv => &mut self.ltv,
            LoanField::CreditScore => &mut self.credit_score,
            LoanField::RemainingTerm => &mut self.remaining_term,
            LoanField::Dti => &mut self.dti,
            LoanField::DaysPastDue => &mut self.days_past_due,
            other => {
                return Err(RiskblocsError::InvalidFilter {
                    reason: format!("no range filter on {other}"),
                });
            }
        };
        *slot = range;
        Ok(())
    }

    /// Builder form of [`Self::set_range`].
    ///
    /// # Errors
    /// `InvalidFilter` if `field` has no range control.
    pub fn with_range(mut self, field: LoanField, range: NumericRange) -> Result<Self> {
        self.set_range(field, range)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.regions = normalise_set(regions);
        self
    }

    #[must_use]
    pub fn with_asset_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.asset_classes = normalise_set(classes);
        self
    }

    #[must_use]
    pub fn with_currencies<I, S>(mut self, currencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.currencies = normalise_set(currencies);
        self
    }

    /// Range filters paired with the field they constrain.
    pub fn ranges(&self) -> impl Iterator<Item = (LoanField, &NumericRange)> {
        RANGE_FIELDS.into_iter().zip([
            &self.balance,
            &self.interest_rate,
            &self.ltv,
            &self.credit_score,
            &self.remaining_term,
            &self.dti,
            &self.days_past_due,
        ])
    }

    fn sets(&self) -> [(LoanField, &BTreeSet<String>); 3] {
        [
            (LoanField::Region, &self.regions),
            (LoanField::AssetClass, &self.asset_classes),
            (LoanField::Currency, &self.currencies),
        ]
    }

    /// No predicate is active; every loan passes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges().all(|(_, r)| !r.is_active()) && self.sets().iter().all(|(_, s)| s.is_empty())
    }

    #[must_use]
    pub fn matches(&self, loan: &LoanRecord) -> bool {
        let ranges_ok = self
            .ranges()
            .filter(|(_, r)| r.is_active())
            .all(|(field, range)| loan.numeric(field).is_some_and(|v| range.contains(v)));
        if !ranges_ok {
            return false;
        }
        self.sets()
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .all(|(field, set)| match loan.field_value(*field) {
                riskblocs_types::FieldValue::Text(v) => set.contains(&v.trim().to_uppercase()),
                _ => false,
            })
    }

    /// Loans passing the filter, in input order.
    #[must_use]
    pub fn apply(&self, loans: &[LoanRecord]) -> Vec<LoanRecord> {
        let kept: Vec<LoanRecord> = loans.iter().filter(|l| self.matches(l)).cloned().collect();
        tracing::debug!(input = loans.len(), kept = kept.len(), "Applied loan filter");
        kept
    }
}

fn normalise_set<I, S>(items: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}
