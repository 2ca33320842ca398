//! ESMA residential real estate loan-level template (Annex 2, `RREL`).
//!
//! Only the fields a loan tape can fill are emitted. Every other cell that
//! has no value carries the configured no-data code (`ND1`..`ND5`).

use chrono::NaiveDate;
use riskblocs_types::constants::{MONEY_PRECISION, RATE_PRECISION};
use riskblocs_types::{FieldKind, FieldValue, LoanField, LoanRecord, ReportConfig, Result};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::report_err;

/// Where a template column takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EsmaSource {
    Loan(LoanField),
    CutOffDate,
}

/// One template column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EsmaField {
    pub code: &'static str,
    pub name: &'static str,
    pub source: EsmaSource,
}

const fn loan(code: &'static str, name: &'static str, field: LoanField) -> EsmaField {
    EsmaField {
        code,
        name,
        source: EsmaSource::Loan(field),
    }
}

/// Emitted columns, in template order.
pub const ESMA_RRE_FIELDS: [EsmaField; 14] = [
    loan("RREL2", "Original Underlying Exposure Identifier", LoanField::LoanId),
    loan("RREL3", "New Underlying Exposure Identifier", LoanField::LoanId),
    loan("RREL4", "Original Obligor Identifier", LoanField::BorrowerId),
    EsmaField {
        code: "RREL6",
        name: "Data Cut-Off Date",
        source: EsmaSource::CutOffDate,
    },
    loan("RREL11", "Geographic Region - Obligor", LoanField::Region),
    loan("RREL23", "Origination Date", LoanField::OriginationDate),
    loan("RREL24", "Maturity Date", LoanField::MaturityDate),
    loan("RREL25", "Original Term", LoanField::OriginalTerm),
    loan("RREL28", "Currency Denomination", LoanField::Currency),
    loan("RREL29", "Original Principal Balance", LoanField::OriginalBalance),
    loan("RREL30", "Current Principal Balance", LoanField::CurrentBalance),
    loan("RREL43", "Current Interest Rate", LoanField::InterestRate),
    loan("RREL69", "Number Of Days In Arrears", LoanField::DaysPastDue),
    loan("RREL71", "Current Loan-To-Value", LoanField::Ltv),
];

/// Render `loans` as an ESMA template CSV with the code row as header.
///
/// Dates are ISO-8601, amounts carry two decimals and rates four, rounded
/// half away from zero.
pub fn esma_report(loans: &[LoanRecord], cut_off: NaiveDate, config: &ReportConfig) -> Result<String> {
    let mut out = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    out.write_record(ESMA_RRE_FIELDS.iter().map(|f| f.code))
        .map_err(report_err)?;

    let mut no_data = 0usize;
    for loan in loans {
        let row: Vec<String> = ESMA_RRE_FIELDS
            .iter()
            .map(|f| match f.source {
                EsmaSource::CutOffDate => iso(cut_off),
                EsmaSource::Loan(field) => render(loan, field, config).unwrap_or_else(|| {
                    no_data += 1;
                    config.esma_no_data.clone()
                }),
            })
            .collect();
        out.write_record(&row).map_err(report_err)?;
    }

    let bytes = out.into_inner().map_err(report_err)?;
    tracing::info!(
        loans = loans.len(),
        columns = ESMA_RRE_FIELDS.len(),
        no_data,
        %cut_off,
        "Generated ESMA loan-level report"
    );
    String::from_utf8(bytes).map_err(report_err)
}

fn render(loan: &LoanRecord, field: LoanField, config: &ReportConfig) -> Option<String> {
    match (field.kind(), loan.field_value(field)) {
        (_, FieldValue::Missing) if field == LoanField::Currency => Some(config.currency.clone()),
        (_, FieldValue::Missing) => None,
        (_, FieldValue::Text(s)) => Some(s.to_string()),
        (_, FieldValue::Integer(i)) => Some(i.to_string()),
        (_, FieldValue::Date(d)) => Some(iso(d)),
        (FieldKind::Percent, FieldValue::Decimal(d)) => Some(fixed(d, RATE_PRECISION)),
        (_, FieldValue::Decimal(d)) => Some(fixed(d, MONEY_PRECISION)),
    }
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn fixed(value: Decimal, dp: u32) -> String {
    let mut v = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    v.rescale(dp);
    v.to_string()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn cut_off() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
    }

    #[test]
    fn codes_are_unique() {
        let mut codes: Vec<&str> = ESMA_RRE_FIELDS.iter().map(|f| f.code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), ESMA_RRE_FIELDS.len());
        assert!(codes.iter().all(|c| c.starts_with("RREL")));
    }

    #[test]
    fn renders_values_and_no_data() {
        let mut l = LoanRecord::dummy("L1", 150_000, 3125);
        l.current_balance = dec!(150000.5);
        l.interest_rate = dec!(3.12345);
        l.ltv = Some(dec!(80));
        l.origination_date = NaiveDate::from_ymd_opt(2020, 1, 15);
        l.currency = None;

        let text = esma_report(&[l], cut_off(), &ReportConfig::default()).unwrap();
        let lines: Vec<&str> = text.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("RREL2,RREL3,RREL4,RREL6,"));

        let cells: Vec<&str> = lines[1].split(',').collect();
        let at = |code: &str| cells[ESMA_RRE_FIELDS.iter().position(|f| f.code == code).unwrap()];
        assert_eq!(at("RREL2"), "L1");
        assert_eq!(at("RREL4"), "ND2");
        assert_eq!(at("RREL6"), "2024-03-31");
        assert_eq!(at("RREL23"), "2020-01-15");
        assert_eq!(at("RREL24"), "ND2");
        assert_eq!(at("RREL28"), "EUR");
        assert_eq!(at("RREL30"), "150000.50");
        assert_eq!(at("RREL43"), "3.1235");
        assert_eq!(at("RREL71"), "80.0000");
    }

    #[test]
    fn no_data_code_is_configurable() {
        let config = ReportConfig {
            esma_no_data: "ND5".into(),
            ..ReportConfig::default()
        };
        let text = esma_report(&[LoanRecord::dummy("X", 1, 100)], cut_off(), &config).unwrap();
        assert!(text.contains(",ND5,"));
        assert!(!text.contains("ND2"));
    }

    #[test]
    fn empty_pool_is_header_only() {
        let text = esma_report(&[], cut_off(), &ReportConfig::default()).unwrap();
        assert_eq!(text.matches("\r\n").count(), 1);
    }
}
