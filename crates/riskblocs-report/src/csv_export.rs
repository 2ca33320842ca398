//! Loan-level CSV export and re-import.
//!
//! Output is RFC 4180: CRLF line endings, fields quoted only when they
//! contain a comma, quote, CR or LF, and embedded quotes doubled. Missing
//! optional values are empty cells.

use std::io::Write;
use std::str::FromStr;

use chrono::NaiveDate;
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use riskblocs_types::{FieldValue, LoanField, LoanRecord, Result, RiskblocsError};
use rust_decimal::Decimal;

use crate::report_err;

/// Export header row; the column names of [`LoanField::ALL`], in order.
pub const LOAN_EXPORT_HEADERS: [&str; 16] = [
    "loan_id",
    "borrower_id",
    "original_balance",
    "current_balance",
    "interest_rate",
    "original_term_months",
    "remaining_term_months",
    "ltv",
    "credit_score",
    "dti",
    "origination_date",
    "maturity_date",
    "region",
    "asset_class",
    "days_past_due",
    "currency",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Write `loans` as CSV to `writer`.
pub fn write_loans<W: Write>(writer: W, loans: &[LoanRecord]) -> Result<()> {
    let mut out = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::CRLF)
        .from_writer(writer);
    out.write_record(LOAN_EXPORT_HEADERS).map_err(report_err)?;
    for loan in loans {
        out.write_record(LoanField::ALL.iter().map(|f| cell(loan, *f)))
            .map_err(report_err)?;
    }
    out.flush()?;
    tracing::debug!(rows = loans.len(), "Exported loans to CSV");
    Ok(())
}

/// Export `loans` to an in-memory CSV document.
pub fn export_loans(loans: &[LoanRecord]) -> Result<String> {
    let mut buf = Vec::new();
    write_loans(&mut buf, loans)?;
    String::from_utf8(buf).map_err(report_err)
}

fn cell(loan: &LoanRecord, field: LoanField) -> String {
    match loan.field_value(field) {
        FieldValue::Text(s) => s.to_string(),
        FieldValue::Decimal(d) => d.to_string(),
        FieldValue::Integer(i) => i.to_string(),
        FieldValue::Date(d) => d.format(DATE_FORMAT).to_string(),
        FieldValue::Missing => String::new(),
    }
}

/// Read back a document produced by [`export_loans`].
///
/// Columns are matched by name, so reordered or extra columns are fine.
/// Empty optional cells read as missing.
///
/// # Errors
/// `Report` if a required column is absent, a required cell is blank, or
/// a cell does not parse.
pub fn import_loans(text: &str) -> Result<Vec<LoanRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers().map_err(report_err)?.clone();
    let columns: Vec<Option<LoanField>> = headers
        .iter()
        .map(|h| LoanField::from_column_name(h.trim()))
        .collect();

    let missing: Vec<&str> = LoanField::required_fields()
        .into_iter()
        .filter(|f| !columns.contains(&Some(*f)))
        .map(LoanField::column_name)
        .collect();
    if !missing.is_empty() {
        return Err(RiskblocsError::Report {
            reason: format!("missing columns: {}", missing.join(", ")),
        });
    }

    let mut loans = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(report_err)?;
        // Header is line 1.
        let line = index + 2;
        let mut loan = LoanRecord::new(format!("ROW-{line}"), Decimal::ZERO, Decimal::ZERO);
        let mut filled = Vec::new();
        for (value, field) in record.iter().zip(&columns) {
            let Some(field) = field else { continue };
            if value.is_empty() {
                continue;
            }
            set_field(&mut loan, *field, value).map_err(|reason| RiskblocsError::Report {
                reason: format!("line {line}, {field}: {reason}"),
            })?;
            filled.push(*field);
        }
        // Required cells have no empty form.
        if let Some(blank) = LoanField::required_fields()
            .into_iter()
            .find(|f| !filled.contains(f))
        {
            return Err(RiskblocsError::Report {
                reason: format!("line {line}, {blank}: blank"),
            });
        }
        loans.push(loan);
    }
    Ok(loans)
}

fn set_field(loan: &mut LoanRecord, field: LoanField, value: &str) -> std::result::Result<(), String> {
    let decimal = || Decimal::from_str(value).map_err(|e| format!("{value:?}: {e}"));
    let integer = || value.parse::<u32>().map_err(|e| format!("{value:?}: {e}"));
    let date = || NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| format!("{value:?}: {e}"));

    match field {
        LoanField::LoanId => loan.loan_id = value.to_string(),
        LoanField::BorrowerId => loan.borrower_id = Some(value.to_string()),
        LoanField::OriginalBalance => loan.original_balance = Some(decimal()?),
        LoanField::CurrentBalance => loan.current_balance = decimal()?,
        LoanField::InterestRate => loan.interest_rate = decimal()?,
        LoanField::OriginalTerm => loan.original_term_months = Some(integer()?),
        LoanField::RemainingTerm => loan.remaining_term_months = Some(integer()?),
        LoanField::Ltv => loan.ltv = Some(decimal()?),
        LoanField::CreditScore => loan.credit_score = Some(integer()?),
        LoanField::Dti => loan.dti = Some(decimal()?),
        LoanField::OriginationDate => loan.origination_date = Some(date()?),
        LoanField::MaturityDate => loan.maturity_date = Some(date()?),
        LoanField::Region => loan.region = Some(value.to_string()),
        LoanField::AssetClass => loan.asset_class = Some(value.to_string()),
        LoanField::DaysPastDue => loan.days_past_due = Some(integer()?),
        LoanField::Currency => loan.currency = Some(value.to_string()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn headers_follow_field_order() {
        let names: Vec<&str> = LoanField::ALL.iter().map(|f| f.column_name()).collect();
        assert_eq!(names, LOAN_EXPORT_HEADERS);
    }

    #[test]
    fn one_line_per_record_plus_header() {
        let loans = vec![
            LoanRecord::dummy("A", 100, 350),
            LoanRecord::dummy("B", 200, 425),
        ];
        let text = export_loans(&loans).unwrap();
        let lines: Vec<&str> = text.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], LOAN_EXPORT_HEADERS.join(","));
        assert_eq!(lines[1], "A,,,100,3.50,,120,,,,,,North,RRE,,EUR");
    }

    #[test]
    fn awkward_text_is_quoted() {
        let mut loan = LoanRecord::dummy("L,1", 100, 300);
        loan.region = Some("North \"Coast\"".into());
        loan.asset_class = Some("line1\nline2".into());
        let text = export_loans(&[loan.clone()]).unwrap();
        assert!(text.contains("\"L,1\""));
        assert!(text.contains("\"North \"\"Coast\"\"\""));
        assert!(text.contains("\"line1\nline2\""));
        assert_eq!(import_loans(&text).unwrap(), vec![loan]);
    }

    #[test]
    fn dates_and_optionals_round_trip() {
        let mut loan = LoanRecord::dummy("D", 250_000, 199);
        loan.origination_date = NaiveDate::from_ymd_opt(2019, 2, 28);
        loan.maturity_date = NaiveDate::from_ymd_opt(2049, 2, 28);
        loan.ltv = Some(dec!(79.95));
        loan.credit_score = Some(712);
        loan.days_past_due = Some(0);
        loan.borrower_id = Some("B-9".into());
        let text = export_loans(&[loan.clone()]).unwrap();
        assert!(text.contains("2019-02-28"));
        assert_eq!(import_loans(&text).unwrap(), vec![loan]);
    }

    #[test]
    fn import_requires_balance_and_rate() {
        let err = import_loans("loan_id,current_balance\r\nA,100\r\n").unwrap_err();
        assert!(err.to_string().contains("interest_rate"), "{err}");
    }

    #[test]
    fn import_reports_bad_cells() {
        let err = import_loans("loan_id,current_balance,interest_rate\r\nA,abc,3\r\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 2"), "{msg}");
        assert!(msg.contains("current_balance"), "{msg}");
    }

    #[test]
    fn import_rejects_blank_required_cells() {
        let err = import_loans("loan_id,current_balance,interest_rate\r\nA,,\r\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 2, current_balance: blank"), "{msg}");

        let err = import_loans("loan_id,current_balance,interest_rate\r\nA,100,3\r\nB,100,\r\n")
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 3, interest_rate: blank"), "{msg}");
    }

    #[test]
    fn import_accepts_reordered_and_extra_columns() {
        let loans = import_loans("note,interest_rate,loan_id,current_balance\r\nx,4.5,Z,10\r\n").unwrap();
        assert_eq!(loans[0].loan_id, "Z");
        assert_eq!(loans[0].interest_rate, dec!(4.5));
        assert_eq!(loans[0].current_balance, dec!(10));
    }
}
