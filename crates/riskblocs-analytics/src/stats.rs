//! Pool summary and stratification tables.

use std::collections::BTreeMap;

use riskblocs_types::{ExposureDimension, LoanField, LoanRecord};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::exposure::share_of;

/// Headline figures for a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortfolioSummary {
    pub loan_count: usize,
    pub total_balance: Decimal,
    pub average_balance: Decimal,
    pub min_balance: Decimal,
    pub max_balance: Decimal,
    /// Balance-weighted, percent.
    pub wa_interest_rate: Option<Decimal>,
    /// Balance-weighted, months.
    pub wa_remaining_term: Option<Decimal>,
    pub wa_ltv: Option<Decimal>,
    pub wa_credit_score: Option<Decimal>,
    pub delinquent_count: usize,
    pub delinquent_balance: Decimal,
}

impl PortfolioSummary {
    #[must_use]
    pub fn from_loans(loans: &[LoanRecord]) -> Self {
        if loans.is_empty() {
            return Self::default();
        }
        let total_balance: Decimal = loans.iter().map(|l| l.current_balance).sum();
        let delinquent: Vec<&LoanRecord> = loans.iter().filter(|l| l.is_delinquent()).collect();
        Self {
            loan_count: loans.len(),
            total_balance,
            average_balance: total_balance / Decimal::from(loans.len()),
            min_balance: loans.iter().map(|l| l.current_balance).min().unwrap_or_default(),
            max_balance: loans.iter().map(|l| l.current_balance).max().unwrap_or_default(),
            wa_interest_rate: weighted_average(loans, LoanField::InterestRate),
            wa_remaining_term: weighted_average(loans, LoanField::RemainingTerm),
            wa_ltv: weighted_average(loans, LoanField::Ltv),
            wa_credit_score: weighted_average(loans, LoanField::CreditScore),
            delinquent_count: delinquent.len(),
            delinquent_balance: delinquent.iter().map(|l| l.current_balance).sum(),
        }
    }
}

/// Balance-weighted average of `field` over the loans that carry it.
#[must_use]
pub fn weighted_average(loans: &[LoanRecord], field: LoanField) -> Option<Decimal> {
    weighted_over(loans, field)
}

fn weighted_over<'a>(
    loans: impl IntoIterator<Item = &'a LoanRecord>,
    field: LoanField,
) -> Option<Decimal> {
    let mut weight = Decimal::ZERO;
    let mut sum = Decimal::ZERO;
    for loan in loans {
        if let Some(v) = loan.numeric(field) {
            weight += loan.current_balance;
            sum += loan.current_balance * v;
        }
    }
    (!weight.is_zero()).then(|| sum / weight)
}

/// How a stratification table groups loans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stratifier {
    /// Numeric buckets split at ascending `bounds`: `< b0`, `b0 - b1`, …, `>= bn`.
    Buckets { field: LoanField, bounds: Vec<Decimal> },
    /// One row per key of a categorical dimension.
    Category(ExposureDimension),
}

impl Stratifier {
    #[must_use]
    pub fn balance(bounds: Vec<Decimal>) -> Self {
        Self::Buckets {
            field: LoanField::CurrentBalance,
            bounds,
        }
    }

    #[must_use]
    pub fn rate(bounds: Vec<Decimal>) -> Self {
        Self::Buckets {
            field: LoanField::InterestRate,
            bounds,
        }
    }

    #[must_use]
    pub fn ltv(bounds: Vec<Decimal>) -> Self {
        Self::Buckets {
            field: LoanField::Ltv,
            bounds,
        }
    }

    /// Short title for report headings.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::Buckets { field, .. } => field.column_name().to_string(),
            Self::Category(dimension) => dimension.field().column_name().to_string(),
        }
    }
}

/// One row of a stratification table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StratRow {
    pub label: String,
    pub loan_count: usize,
    pub balance: Decimal,
    /// Percent of pool balance.
    pub share_pct: Decimal,
    pub wa_interest_rate: Option<Decimal>,
}

const UNKNOWN: &str = "UNKNOWN";

/// Group `loans` into a stratification table.
///
/// Bucket tables list every bucket, empty or not, plus an `UNKNOWN` row
/// when some loans lack the field. Category tables are ordered by balance,
/// largest first.
#[must_use]
pub fn stratify(loans: &[LoanRecord], stratifier: &Stratifier) -> Vec<StratRow> {
    let total: Decimal = loans.iter().map(|l| l.current_balance).sum();
    match stratifier {
        Stratifier::Buckets { field, bounds } => {
            let mut bounds = bounds.clone();
            bounds.sort();
            bounds.dedup();
            let labels = bucket_labels(&bounds);
            let mut groups: Vec<Vec<&LoanRecord>> = vec![Vec::new(); labels.len()];
            let mut unknown = Vec::new();
            for loan in loans {
                match loan.numeric(*field) {
                    Some(v) => groups[bounds.partition_point(|b| *b <= v)].push(loan),
                    None => unknown.push(loan),
                }
            }
            let mut rows: Vec<StratRow> = labels
                .into_iter()
                .zip(groups)
                .map(|(label, members)| row(label, &members, total))
                .collect();
            if !unknown.is_empty() {
                rows.push(row(UNKNOWN.to_string(), &unknown, total));
            }
            rows
        }
        Stratifier::Category(dimension) => {
            let mut groups: BTreeMap<String, Vec<&LoanRecord>> = BTreeMap::new();
            for loan in loans {
                groups.entry(dimension.key_of(loan)).or_default().push(loan);
            }
            let mut rows: Vec<StratRow> = groups
                .into_iter()
                .map(|(label, members)| row(label, &members, total))
                .collect();
            rows.sort_by(|a, b| b.balance.cmp(&a.balance).then_with(|| a.label.cmp(&b.label)));
            rows
        }
    }
}

fn bucket_labels(bounds: &[Decimal]) -> Vec<String> {
    let Some((first, last)) = bounds.first().zip(bounds.last()) else {
        return vec!["ALL".to_string()];
    };
    let mut labels = vec![format!("< {first}")];
    labels.extend(bounds.windows(2).map(|w| format!("{} - {}", w[0], w[1])));
    labels.push(format!(">= {last}"));
    labels
}

fn row(label: String, members: &[&LoanRecord], total: Decimal) -> StratRow {
    let balance: Decimal = members.iter().map(|l| l.current_balance).sum();
    StratRow {
        label,
        loan_count: members.len(),
        balance,
        share_pct: share_of(balance, total),
        wa_interest_rate: weighted_over(members.iter().copied(), LoanField::InterestRate),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn pool() -> Vec<LoanRecord> {
        let mut delinquent = LoanRecord::dummy("D", 100, 600).with_ltv(95);
        delinquent.days_past_due = Some(45);
        vec![
            LoanRecord::dummy("A", 300, 200).with_ltv(50),
            LoanRecord::dummy("B", 100, 400).with_region("South"),
            LoanRecord::dummy("C", 500, 300).with_ltv(70),
            delinquent,
        ]
    }

    #[test]
    fn summary_figures() {
        let s = PortfolioSummary::from_loans(&pool());
        assert_eq!(s.loan_count, 4);
        assert_eq!(s.total_balance, dec!(1000));
        assert_eq!(s.average_balance, dec!(250));
        assert_eq!(s.min_balance, dec!(100));
        assert_eq!(s.max_balance, dec!(500));
        // (300*2 + 100*4 + 500*3 + 100*6) / 1000
        assert_eq!(s.wa_interest_rate, Some(dec!(3.1)));
        assert_eq!(s.wa_remaining_term, Some(dec!(120)));
        // LTV only over A, C, D: (300*50 + 500*70 + 100*95) / 900
        assert_eq!(s.wa_ltv.map(|v| v.round_dp(4)), Some(dec!(66.1111)));
        assert_eq!(s.wa_credit_score, None);
        assert_eq!(s.delinquent_count, 1);
        assert_eq!(s.delinquent_balance, dec!(100));
    }

    #[test]
    fn empty_pool_summary() {
        let s = PortfolioSummary::from_loans(&[]);
        assert_eq!(s.loan_count, 0);
        assert_eq!(s.wa_interest_rate, None);
    }

    #[test]
    fn balance_buckets_include_empty_rows() {
        let rows = stratify(&pool(), &Stratifier::balance(vec![dec!(500), dec!(200)]));
        let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["< 200", "200 - 500", ">= 500"]);
        let counts: Vec<usize> = rows.iter().map(|r| r.loan_count).collect();
        assert_eq!(counts, vec![2, 1, 1]);
        assert_eq!(rows[2].share_pct, dec!(50));
    }

    #[test]
    fn unknown_bucket_for_missing_field() {
        let rows = stratify(&pool(), &Stratifier::ltv(vec![dec!(60), dec!(80)]));
        assert_eq!(rows.last().map(|r| r.label.as_str()), Some("UNKNOWN"));
        assert_eq!(rows.last().map(|r| r.loan_count), Some(1));
        let total: usize = rows.iter().map(|r| r.loan_count).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn category_rows_by_balance() {
        let rows = stratify(&pool(), &Stratifier::Category(ExposureDimension::Region));
        assert_eq!(rows[0].label, "NORTH");
        assert_eq!(rows[0].balance, dec!(900));
        assert_eq!(rows[1].label, "SOUTH");
        assert_eq!(rows[1].wa_interest_rate, Some(dec!(4)));
    }

    #[test]
    fn no_bounds_is_one_bucket() {
        let rows = stratify(&pool(), &Stratifier::rate(vec![]));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label, "ALL");
        assert_eq!(rows[0].share_pct, dec!(100));
    }
}
