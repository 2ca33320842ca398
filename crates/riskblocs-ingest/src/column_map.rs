//! Header synonym table: spreadsheet column headers → canonical loan fields.
//!
//! Headers are normalised (lowercase, every run of non-alphanumerics
//! collapsed to one space) and tested against an ordered list of anchored
//! patterns. The first pattern that matches decides the column's field.
//! A field keeps the first column that claimed it; later claimants are
//! ignored.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use riskblocs_types::LoanField;

/// Ordered synonym table. More specific patterns precede generic ones
/// (`original balance` before `balance`, `remaining term` before `term`).
static SYNONYMS: Lazy<Vec<(LoanField, Regex)>> = Lazy::new(|| {
    let table: &[(LoanField, &str)] = &[
        (LoanField::LoanId, r"^(loan|account|facility|contract|deal|receivable)( (id|identifier|number|no|nr|ref|reference|code))$"),
        (LoanField::LoanId, r"^(id|loan|unique (loan )?identifier|loan identifier)$"),
        (LoanField::BorrowerId, r"^(borrower|obligor|customer|client|debtor)( (id|identifier|number|no|nr|ref|reference|code))?$"),
        (LoanField::OriginalBalance, r"^(original|orig|initial|origination|opening) (loan )?(principal )?(balance|amount|principal|bal)$"),
        (LoanField::OriginalBalance, r"^(loan amount|amount financed|original principal|granted amount)$"),
        (LoanField::CurrentBalance, r"^(current|outstanding|remaining|cur|os) (loan )?(principal )?(balance|amount|principal|bal)( (eur|usd|gbp))?$"),
        (LoanField::CurrentBalance, r"^(balance|outstanding|principal|principal balance|outstanding principal|exposure|ead|bal)( (eur|usd|gbp))?$"),
        (LoanField::InterestRate, r"^(current |nominal |note |contractual )?(interest )?rate( pct| percent)?$"),
        (LoanField::InterestRate, r"^(interest|coupon|apr|int rate|coupon rate|current coupon)( pct| percent)?$"),
        (LoanField::RemainingTerm, r"^(remaining|residual|rem) (loan )?(term|tenor|maturity|months)( months| mths| m)?$"),
        (LoanField::RemainingTerm, r"^months (to|until) maturity$"),
        (LoanField::OriginalTerm, r"^(original|orig|initial) (loan )?(term|tenor)( months| mths| m)?$"),
        (LoanField::OriginalTerm, r"^(term|tenor|tenure|duration)( months| mths| in months)?$"),
        (LoanField::Ltv, r"^(current |original |orig |indexed )?(ltv|cltv)( pct| ratio)?$"),
        (LoanField::Ltv, r"^(current |original )?loan to value( ratio)?( pct)?$"),
        (LoanField::CreditScore, r"^(fico|beacon|bureau|credit|internal|risk)( credit)? (score|rating)$"),
        (LoanField::CreditScore, r"^(fico|score|credit score|fico score)$"),
        (LoanField::Dti, r"^(dti|debt to income)( ratio| pct)?$"),
        (LoanField::OriginationDate, r"^(origination|orig|origin|start|issue|disbursement|drawdown|booking|funding|inception) (date|dt)$"),
        (LoanField::OriginationDate, r"^date of (origination|disbursement|issue)$"),
        (LoanField::MaturityDate, r"^(final |legal |scheduled )?(maturity|end|expiry|expiration) (date|dt)$"),
        (LoanField::MaturityDate, r"^maturity$"),
        (LoanField::DaysPastDue, r"^(dpd|days past due|days in arrears|arrears days|days delinquent|delinquency days)$"),
        (LoanField::DaysPastDue, r"^(past due|arrears)( days)?$"),
        (LoanField::Region, r"^(property |borrower |obligor )?(region|state|province|county|country|geography|geographic region|location)$"),
        (LoanField::Region, r"^nuts( 3)?( code)?$"),
        (LoanField::AssetClass, r"^(asset class|asset type|product|product type|loan type|collateral type|property type|sector|segment)$"),
        (LoanField::Currency, r"^(currency|ccy|currency code|denomination)$"),
    ];
    table
        .iter()
        .map(|(field, pattern)| (*field, Regex::new(pattern).expect("valid header synonym regex")))
        .collect()
});

static NON_ALNUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid normalisation regex"));

/// Lowercase, collapse punctuation and whitespace into single spaces.
#[must_use]
pub fn normalize_header(raw: &str) -> String {
    NON_ALNUM_RE
        .replace_all(&raw.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// The field a single header names, if any.
#[must_use]
pub fn match_header(raw: &str) -> Option<LoanField> {
    let header = normalize_header(raw);
    if header.is_empty() {
        return None;
    }
    SYNONYMS
        .iter()
        .find(|(_, re)| re.is_match(&header))
        .map(|(field, _)| *field)
}

/// Result of mapping one header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMapping {
    columns: BTreeMap<LoanField, usize>,
    /// Column indices whose field had already been claimed.
    duplicates: Vec<usize>,
}

impl HeaderMapping {
    /// Map a header row. `headers[i]` is the text of column `i`.
    #[must_use]
    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> Self {
        let mut mapping = Self::default();
        for (idx, header) in headers.iter().enumerate() {
            let Some(field) = match_header(header.as_ref()) else {
                continue;
            };
            if mapping.columns.contains_key(&field) {
                mapping.duplicates.push(idx);
            } else {
                mapping.columns.insert(field, idx);
            }
        }
        mapping
    }

    #[must_use]
    pub fn column(&self, field: LoanField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    #[must_use]
    pub fn matched_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn missing_required(&self) -> Vec<LoanField> {
        LoanField::required_fields()
            .into_iter()
            .filter(|f| !self.columns.contains_key(f))
            .collect()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_required().is_empty()
    }

    #[must_use]
    pub fn duplicates(&self) -> &[usize] {
        &self.duplicates
    }

    /// Mapped fields with their column index, in field order.
    pub fn iter(&self) -> impl Iterator<Item = (LoanField, usize)> + '_ {
        self.columns.iter().map(|(f, c)| (*f, *c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalisation() {
        assert_eq!(normalize_header("  Current_Balance (EUR) "), "current balance eur");
        assert_eq!(normalize_header("Loan-To-Value %"), "loan to value");
        assert_eq!(normalize_header("***"), "");
    }

    #[test]
    fn common_synonyms() {
        let cases = [
            ("Loan ID", LoanField::LoanId),
            ("Account No.", LoanField::LoanId),
            ("Borrower Ref", LoanField::BorrowerId),
            ("Original Principal Balance", LoanField::OriginalBalance),
            ("Loan Amount", LoanField::OriginalBalance),
            ("Outstanding Balance", LoanField::CurrentBalance),
            ("Current Principal Balance (EUR)", LoanField::CurrentBalance),
            ("Balance", LoanField::CurrentBalance),
            ("Interest Rate %", LoanField::InterestRate),
            ("Coupon", LoanField::InterestRate),
            ("Remaining Term (months)", LoanField::RemainingTerm),
            ("Original Term", LoanField::OriginalTerm),
            ("Term", LoanField::OriginalTerm),
            ("Current LTV", LoanField::Ltv),
            ("Loan to Value Ratio", LoanField::Ltv),
            ("FICO Score", LoanField::CreditScore),
            ("DTI", LoanField::Dti),
            ("Origination Date", LoanField::OriginationDate),
            ("Maturity Date", LoanField::MaturityDate),
            ("Days Past Due", LoanField::DaysPastDue),
            ("Property Region", LoanField::Region),
            ("Product Type", LoanField::AssetClass),
            ("CCY", LoanField::Currency),
        ];
        for (header, expected) in cases {
            assert_eq!(match_header(header), Some(expected), "header {header:?}");
        }
    }

    #[test]
    fn unrelated_headers_do_not_match() {
        for header in ["Notes", "Comments", "Originator Name", "", "Remaining Term Flag"] {
            assert_eq!(match_header(header), None, "header {header:?}");
        }
    }

    #[test]
    fn first_column_wins_for_a_field() {
        let headers = ["Loan ID", "Outstanding Balance", "Balance", "Rate"];
        let mapping = HeaderMapping::from_headers(&headers);
        assert_eq!(mapping.column(LoanField::CurrentBalance), Some(1));
        assert_eq!(mapping.duplicates(), &[2]);
        assert!(mapping.is_complete());
        assert_eq!(mapping.matched_count(), 3);
    }

    #[test]
    fn missing_required_reported() {
        let mapping = HeaderMapping::from_headers(&["Loan ID", "Balance"]);
        assert_eq!(mapping.missing_required(), vec![LoanField::InterestRate]);
        assert!(!mapping.is_complete());
    }
}
