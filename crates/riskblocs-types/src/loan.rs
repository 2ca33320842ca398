//! Loan-level records as read from an uploaded loan tape.
//!
//! Rates and ratios (`interest_rate`, `ltv`, `dti`) are stored in percent:
//! `5.25` means 5.25 %. Money amounts are in the tape's currency.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a canonical field is coerced from a spreadsheet cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    Money,
    Percent,
    Integer,
    Date,
}

/// Canonical loan-tape fields, in export column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum LoanField {
    LoanId,
    BorrowerId,
    OriginalBalance,
    CurrentBalance,
    InterestRate,
    OriginalTerm,
    RemainingTerm,
    Ltv,
    CreditScore,
    Dti,
    OriginationDate,
    MaturityDate,
    Region,
    AssetClass,
    DaysPastDue,
    Currency,
}

impl LoanField {
    /// Every field, in the documented export order.
    pub const ALL: [LoanField; 16] = [
        Self::LoanId,
        Self::BorrowerId,
        Self::OriginalBalance,
        Self::CurrentBalance,
        Self::InterestRate,
        Self::OriginalTerm,
        Self::RemainingTerm,
        Self::Ltv,
        Self::CreditScore,
        Self::Dti,
        Self::OriginationDate,
        Self::MaturityDate,
        Self::Region,
        Self::AssetClass,
        Self::DaysPastDue,
        Self::Currency,
    ];

    #[must_use]
    pub fn kind(self) -> FieldKind {
        match self {
            Self::LoanId | Self::BorrowerId | Self::Region | Self::AssetClass | Self::Currency => {
                FieldKind::Text
            }
            Self::OriginalBalance | Self::CurrentBalance => FieldKind::Money,
            Self::InterestRate | Self::Ltv | Self::Dti => FieldKind::Percent,
            Self::OriginalTerm | Self::RemainingTerm | Self::CreditScore | Self::DaysPastDue => {
                FieldKind::Integer
            }
            Self::OriginationDate | Self::MaturityDate => FieldKind::Date,
        }
    }

    /// Fields without which a tape row cannot be retained.
    #[must_use]
    pub fn is_required(self) -> bool {
        matches!(self, Self::CurrentBalance | Self::InterestRate)
    }

    /// Snake-case column name used in CSV exports.
    #[must_use]
    pub fn column_name(self) -> &'static str {
        match self {
            Self::LoanId => "loan_id",
            Self::BorrowerId => "borrower_id",
            Self::OriginalBalance => "original_balance",
            Self::CurrentBalance => "current_balance",
            Self::InterestRate => "interest_rate",
            Self::OriginalTerm => "original_term_months",
            Self::RemainingTerm => "remaining_term_months",
            Self::Ltv => "ltv",
            Self::CreditScore => "credit_score",
            Self::Dti => "dti",
            Self::OriginationDate => "origination_date",
            Self::MaturityDate => "maturity_date",
            Self::Region => "region",
            Self::AssetClass => "asset_class",
            Self::DaysPastDue => "days_past_due",
            Self::Currency => "currency",
        }
    }

    /// Look a field up by its export column name.
    #[must_use]
    pub fn from_column_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.column_name() == name)
    }

    #[must_use]
    pub fn required_fields() -> Vec<LoanField> {
        Self::ALL.into_iter().filter(|f| f.is_required()).collect()
    }
}

impl std::fmt::Display for LoanField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column_name())
    }
}

/// Typed view of one field of a [`LoanRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Decimal(Decimal),
    Integer(u32),
    Date(NaiveDate),
    Missing,
}

impl FieldValue<'_> {
    /// Numeric view used by range filters and weighted averages.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(d) => Some(*d),
            Self::Integer(i) => Some(Decimal::from(*i)),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

/// One loan from a tape. Only `current_balance` and `interest_rate` are
/// guaranteed; every other attribute is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub loan_id: String,
    pub borrower_id: Option<String>,
    pub original_balance: Option<Decimal>,
    pub current_balance: Decimal,
    /// Percent, e.g. `5.25`.
    pub interest_rate: Decimal,
    pub original_term_months: Option<u32>,
    pub remaining_term_months: Option<u32>,
    /// Loan-to-value, percent.
    pub ltv: Option<Decimal>,
    pub credit_score: Option<u32>,
    /// Debt-to-income, percent.
    pub dti: Option<Decimal>,
    pub origination_date: Option<NaiveDate>,
    pub maturity_date: Option<NaiveDate>,
    pub region: Option<String>,
    pub asset_class: Option<String>,
    pub days_past_due: Option<u32>,
    pub currency: Option<String>,
}

impl LoanRecord {
    /// A record with only the mandatory attributes set.
    #[must_use]
    pub fn new(loan_id: impl Into<String>, current_balance: Decimal, interest_rate: Decimal) -> Self {
        Self {
            loan_id: loan_id.into(),
            borrower_id: None,
            original_balance: None,
            current_balance,
            interest_rate,
            original_term_months: None,
            remaining_term_months: None,
            ltv: None,
            credit_score: None,
            dti: None,
            origination_date: None,
            maturity_date: None,
            region: None,
            asset_class: None,
            days_past_due: None,
            currency: None,
        }
    }

    #[must_use]
    pub fn field_value(&self, field: LoanField) -> FieldValue<'_> {
        fn text(v: Option<&String>) -> FieldValue<'_> {
            v.map_or(FieldValue::Missing, |s| FieldValue::Text(s))
        }
        fn dec(v: Option<Decimal>) -> FieldValue<'static> {
            v.map_or(FieldValue::Missing, FieldValue::Decimal)
        }
        fn int(v: Option<u32>) -> FieldValue<'static> {
            v.map_or(FieldValue::Missing, FieldValue::Integer)
        }
        fn date(v: Option<NaiveDate>) -> FieldValue<'static> {
            v.map_or(FieldValue::Missing, FieldValue::Date)
        }

        match field {
            LoanField::LoanId => FieldValue::Text(&self.loan_id),
            LoanField::BorrowerId => text(self.borrower_id.as_ref()),
            LoanField::OriginalBalance => dec(self.original_balance),
            LoanField::CurrentBalance => FieldValue::Decimal(self.current_balance),
            LoanField::InterestRate => FieldValue::Decimal(self.interest_rate),
            LoanField::OriginalTerm => int(self.original_term_months),
            LoanField::RemainingTerm => int(self.remaining_term_months),
            LoanField::Ltv => dec(self.ltv),
            LoanField::CreditScore => int(self.credit_score),
            LoanField::Dti => dec(self.dti),
            LoanField::OriginationDate => date(self.origination_date),
            LoanField::MaturityDate => date(self.maturity_date),
            LoanField::Region => text(self.region.as_ref()),
            LoanField::AssetClass => text(self.asset_class.as_ref()),
            LoanField::DaysPastDue => int(self.days_past_due),
            LoanField::Currency => text(self.currency.as_ref()),
        }
    }

    /// Numeric value of `field`, if the field is numeric and present.
    #[must_use]
    pub fn numeric(&self, field: LoanField) -> Option<Decimal> {
        self.field_value(field).as_decimal()
    }

    #[must_use]
    pub fn is_delinquent(&self) -> bool {
        self.days_past_due.is_some_and(|d| d > 0)
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl LoanRecord {
    pub fn dummy(loan_id: &str, balance: i64, rate_bps: i64) -> Self {
        let mut loan = Self::new(loan_id, Decimal::new(balance, 0), Decimal::new(rate_bps, 2));
        loan.remaining_term_months = Some(120);
        loan.region = Some("North".to_string());
        loan.asset_class = Some("RRE".to_string());
        loan.currency = Some("EUR".to_string());
        loan
    }

    #[must_use]
    pub fn with_region(mut self, region: &str) -> Self {
        self.region = Some(region.to_string());
        self
    }

    #[must_use]
    pub fn with_ltv(mut self, ltv: i64) -> Self {
        self.ltv = Some(Decimal::new(ltv, 0));
        self
    }

    #[must_use]
    pub fn with_term(mut self, months: u32) -> Self {
        self.remaining_term_months = Some(months);
        self
    }
}
