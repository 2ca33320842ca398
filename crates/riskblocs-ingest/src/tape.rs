//! Loan-tape parser: selected worksheet → [`LoanRecord`]s plus warnings.
//!
//! ## Row rules
//!
//! - Fully blank rows are skipped silently.
//! - A required field that is blank or unparseable rejects the row.
//! - A non-positive current balance drops the row (counted, not warned).
//! - An optional field that is unparseable is left empty and warned.
//! - A missing loan id is synthesised as `ROW-<n>` from the sheet row.

use std::collections::HashSet;

use riskblocs_types::{IngestConfig, LoanField, LoanRecord, Result, RiskblocsError};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::coerce::{
    CellValue, Coerced, parse_date, parse_decimal, parse_integer, parse_percent, parse_text,
};
use crate::column_map::HeaderMapping;
use crate::workbook::{Workbook, file_digest};

static EMPTY_CELL: CellValue = CellValue::Empty;

/// A problem found on one spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowWarning {
    /// 1-based row number as shown by spreadsheet software.
    pub row: usize,
    pub field: Option<LoanField>,
    pub message: String,
    /// Whether the row was excluded because of this problem.
    pub rejected: bool,
}

impl std::fmt::Display for RowWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.field {
            Some(field) => write!(f, "row {} [{}]: {}", self.row, field, self.message),
            None => write!(f, "row {}: {}", self.row, self.message),
        }
    }
}

/// Everything produced by parsing one tape.
#[derive(Debug, Clone)]
pub struct ParsedTape {
    pub sheet_name: String,
    /// 1-based header row number.
    pub header_row: usize,
    pub mapping: HeaderMapping,
    pub loans: Vec<LoanRecord>,
    pub warnings: Vec<RowWarning>,
    /// Rows excluded for a missing or unparseable required field.
    pub rejected_rows: usize,
    /// Rows excluded for a balance ≤ 0.
    pub dropped_non_positive: usize,
    /// Non-blank data rows inspected.
    pub total_rows: usize,
    /// Data rows beyond `max_rows` were ignored.
    pub truncated: bool,
    pub file_digest: Option<String>,
}

impl ParsedTape {
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    #[must_use]
    pub fn total_balance(&self) -> Decimal {
        self.loans.iter().map(|l| l.current_balance).sum()
    }
}

enum RowOutcome {
    Loan(LoanRecord),
    Rejected,
    NonPositive,
}

/// Parses loan tapes according to an [`IngestConfig`].
pub struct TapeParser {
    config: IngestConfig,
}

impl TapeParser {
    #[must_use]
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    /// Parse an uploaded file held in memory.
    pub fn parse_bytes(&self, bytes: &[u8], file_name: &str) -> Result<ParsedTape> {
        let workbook = Workbook::from_bytes(bytes, file_name)?;
        let mut tape = self.parse_workbook(&workbook)?;
        tape.file_digest = Some(file_digest(bytes));
        Ok(tape)
    }

    /// Parse an already loaded workbook.
    ///
    /// # Errors
    /// - `MissingRequiredColumns` if no sheet maps every required field
    /// - `EmptyTape` if no row survives
    pub fn parse_workbook(&self, workbook: &Workbook) -> Result<ParsedTape> {
        let selection = workbook.select_sheet(self.config.header_scan_rows)?;
        let sheet = &workbook.sheets[selection.sheet_index];
        let mapping = selection.mapping;

        let mut loans = Vec::new();
        let mut warnings = Vec::new();
        let mut rejected_rows = 0;
        let mut dropped_non_positive = 0;
        let mut total_rows = 0;
        let mut seen_ids = HashSet::new();

        let data_rows = sheet.rows.iter().enumerate().skip(selection.header_row + 1);
        let available = sheet.rows.len().saturating_sub(selection.header_row + 1);
        let truncated = available > self.config.max_rows;
        if truncated {
            tracing::warn!(
                sheet = %sheet.name,
                available,
                max_rows = self.config.max_rows,
                "Loan tape exceeds row limit; trailing rows ignored"
            );
        }

        for (index, row) in data_rows.take(self.config.max_rows) {
            if row.iter().all(CellValue::is_blank) {
                continue;
            }
            total_rows += 1;
            let row_number = index + 1;
            match parse_row(&mapping, row, row_number, &mut warnings) {
                RowOutcome::Loan(loan) => {
                    if !seen_ids.insert(loan.loan_id.clone()) {
                        warnings.push(RowWarning {
                            row: row_number,
                            field: Some(LoanField::LoanId),
                            message: format!("duplicate loan id {}", loan.loan_id),
                            rejected: false,
                        });
                    }
                    loans.push(loan);
                }
                RowOutcome::Rejected => rejected_rows += 1,
                RowOutcome::NonPositive => dropped_non_positive += 1,
            }
        }

        if loans.is_empty() {
            return Err(RiskblocsError::EmptyTape);
        }

        tracing::info!(
            sheet = %sheet.name,
            header_row = selection.header_row + 1,
            loans = loans.len(),
            rejected_rows,
            dropped_non_positive,
            warnings = warnings.len(),
            "Parsed loan tape"
        );

        Ok(ParsedTape {
            sheet_name: sheet.name.clone(),
            header_row: selection.header_row + 1,
            mapping,
            loans,
            warnings,
            rejected_rows,
            dropped_non_positive,
            total_rows,
            truncated,
            file_digest: None,
        })
    }
}

fn parse_row(
    mapping: &HeaderMapping,
    row: &[CellValue],
    row_number: usize,
    warnings: &mut Vec<RowWarning>,
) -> RowOutcome {
    let cell = |field: LoanField| cell_for(mapping, row, field);

    let balance = parse_decimal(cell(LoanField::CurrentBalance));
    let rate = parse_percent(cell(LoanField::InterestRate));

    if let Coerced::Value(b) = balance {
        if b <= Decimal::ZERO {
            return RowOutcome::NonPositive;
        }
    }

    let mut reject = |field: LoanField, message: String| {
        warnings.push(RowWarning {
            row: row_number,
            field: Some(field),
            message,
            rejected: true,
        });
    };
    let balance = required(balance, LoanField::CurrentBalance, &mut reject);
    let rate = required(rate, LoanField::InterestRate, &mut reject);
    let (Some(balance), Some(rate)) = (balance, rate) else {
        return RowOutcome::Rejected;
    };

    let loan_id = parse_text(cell(LoanField::LoanId))
        .value()
        .unwrap_or_else(|| format!("ROW-{row_number}"));
    let mut loan = LoanRecord::new(loan_id, balance, rate);

    let mut warn = |field: LoanField, raw: String| {
        warnings.push(RowWarning {
            row: row_number,
            field: Some(field),
            message: format!("unparseable value {raw:?} left empty"),
            rejected: false,
        });
    };

    loan.borrower_id = optional(parse_text(cell(LoanField::BorrowerId)), LoanField::BorrowerId, &mut warn);
    loan.original_balance = optional(
        parse_decimal(cell(LoanField::OriginalBalance)),
        LoanField::OriginalBalance,
        &mut warn,
    );
    loan.original_term_months = optional(
        parse_integer(cell(LoanField::OriginalTerm)),
        LoanField::OriginalTerm,
        &mut warn,
    );
    loan.remaining_term_months = optional(
        parse_integer(cell(LoanField::RemainingTerm)),
        LoanField::RemainingTerm,
        &mut warn,
    );
    loan.ltv = optional(parse_percent(cell(LoanField::Ltv)), LoanField::Ltv, &mut warn);
    loan.credit_score = optional(
        parse_integer(cell(LoanField::CreditScore)),
        LoanField::CreditScore,
        &mut warn,
    );
    loan.dti = optional(parse_percent(cell(LoanField::Dti)), LoanField::Dti, &mut warn);
    loan.origination_date = optional(
        parse_date(cell(LoanField::OriginationDate)),
        LoanField::OriginationDate,
        &mut warn,
    );
    loan.maturity_date = optional(
        parse_date(cell(LoanField::MaturityDate)),
        LoanField::MaturityDate,
        &mut warn,
    );
    loan.region = optional(parse_text(cell(LoanField::Region)), LoanField::Region, &mut warn);
    loan.asset_class = optional(
        parse_text(cell(LoanField::AssetClass)),
        LoanField::AssetClass,
        &mut warn,
    );
    loan.days_past_due = optional(
        parse_integer(cell(LoanField::DaysPastDue)),
        LoanField::DaysPastDue,
        &mut warn,
    );
    loan.currency = optional(parse_text(cell(LoanField::Currency)), LoanField::Currency, &mut warn)
        .map(|c| c.to_uppercase());

    RowOutcome::Loan(loan)
}

fn cell_for<'a>(mapping: &HeaderMapping, row: &'a [CellValue], field: LoanField) -> &'a CellValue {
    mapping
        .column(field)
        .and_then(|c| row.get(c))
        .unwrap_or(&EMPTY_CELL)
}

fn required<T>(
    value: Coerced<T>,
    field: LoanField,
    reject: &mut impl FnMut(LoanField, String),
) -> Option<T> {
    match value {
        Coerced::Value(v) => Some(v),
        Coerced::Empty => {
            reject(field, "required value is blank".to_string());
            None
        }
        Coerced::Invalid(raw) => {
            reject(field, format!("required value {raw:?} is not a number"));
            None
        }
    }
}

fn optional<T>(
    value: Coerced<T>,
    field: LoanField,
    warn: &mut impl FnMut(LoanField, String),
) -> Option<T> {
    match value {
        Coerced::Value(v) => Some(v),
        Coerced::Empty => None,
        Coerced::Invalid(raw) => {
            warn(field, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::NaiveDate;

    use super::*;

    fn row(cells: &[&str]) -> Vec<CellValue> {
        cells.iter().map(|c| CellValue::from(*c)).collect()
    }

    fn parser() -> TapeParser {
        TapeParser::new(IngestConfig::default())
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parses_typed_fields() {
        let wb = Workbook::single(
            "Loans",
            vec![
                row(&["Loan ID", "Outstanding Balance", "Interest Rate", "LTV", "Remaining Term", "Origination Date", "Region", "CCY"]),
                row(&["A-1", "250,000.00", "3.75%", "0.8", "240", "15/01/2020", "North", "eur"]),
            ],
        );
        let tape = parser().parse_workbook(&wb).unwrap();
        assert_eq!(tape.loans.len(), 1);
        assert_eq!(tape.header_row, 1);
        let loan = &tape.loans[0];
        assert_eq!(loan.loan_id, "A-1");
        assert_eq!(loan.current_balance, dec("250000"));
        assert_eq!(loan.interest_rate, dec("3.75"));
        assert_eq!(loan.ltv, Some(dec("80")));
        assert_eq!(loan.remaining_term_months, Some(240));
        assert_eq!(loan.origination_date, NaiveDate::from_ymd_opt(2020, 1, 15));
        assert_eq!(loan.region.as_deref(), Some("North"));
        assert_eq!(loan.currency.as_deref(), Some("EUR"));
        assert_eq!(tape.warning_count(), 0);
    }

    #[test]
    fn non_positive_balances_are_dropped() {
        let wb = Workbook::single(
            "Loans",
            vec![
                row(&["Balance", "Rate"]),
                row(&["100", "4"]),
                row(&["0", "4"]),
                row(&["-5", "4"]),
            ],
        );
        let tape = parser().parse_workbook(&wb).unwrap();
        assert_eq!(tape.loans.len(), 1);
        assert_eq!(tape.dropped_non_positive, 2);
        assert_eq!(tape.warning_count(), 0);
    }

    #[test]
    fn unparseable_required_field_rejects_row_with_warning() {
        let wb = Workbook::single(
            "Loans",
            vec![
                row(&["Loan ID", "Balance", "Rate"]),
                row(&["L1", "abc", "4"]),
                row(&["L2", "100", ""]),
                row(&["L3", "100", "4"]),
            ],
        );
        let tape = parser().parse_workbook(&wb).unwrap();
        assert_eq!(tape.loans.len(), 1);
        assert_eq!(tape.loans[0].loan_id, "L3");
        assert_eq!(tape.rejected_rows, 2);
        assert_eq!(tape.warning_count(), 2);
        assert!(tape.warnings.iter().all(|w| w.rejected));
        assert_eq!(tape.warnings[0].row, 2);
        assert_eq!(tape.warnings[0].field, Some(LoanField::CurrentBalance));
        assert_eq!(tape.warnings[1].field, Some(LoanField::InterestRate));
    }

    #[test]
    fn unparseable_optional_field_is_left_empty_not_zero() {
        let wb = Workbook::single(
            "Loans",
            vec![row(&["Balance", "Rate", "LTV"]), row(&["100", "4", "high"])],
        );
        let tape = parser().parse_workbook(&wb).unwrap();
        assert_eq!(tape.loans[0].ltv, None);
        assert_eq!(tape.warning_count(), 1);
        assert!(!tape.warnings[0].rejected);
        assert_eq!(tape.rejected_rows, 0);
    }

    #[test]
    fn missing_loan_id_is_synthesised_from_row_number() {
        let wb = Workbook::single(
            "Loans",
            vec![row(&["Title"]), row(&["Balance", "Rate"]), row(&[]), row(&["100", "4"])],
        );
        let tape = parser().parse_workbook(&wb).unwrap();
        assert_eq!(tape.loans[0].loan_id, "ROW-4");
        assert_eq!(tape.total_rows, 1);
    }

    #[test]
    fn duplicate_ids_are_kept_and_warned() {
        let wb = Workbook::single(
            "Loans",
            vec![row(&["Loan ID", "Balance", "Rate"]), row(&["L1", "1", "1"]), row(&["L1", "2", "1"])],
        );
        let tape = parser().parse_workbook(&wb).unwrap();
        assert_eq!(tape.loans.len(), 2);
        assert_eq!(tape.warning_count(), 1);
        assert!(tape.warnings[0].message.contains("duplicate"));
    }

    #[test]
    fn all_rows_unusable_is_empty_tape() {
        let wb = Workbook::single("Loans", vec![row(&["Balance", "Rate"]), row(&["0", "4"])]);
        assert!(matches!(parser().parse_workbook(&wb), Err(RiskblocsError::EmptyTape)));
    }

    #[test]
    fn max_rows_truncates() {
        let mut rows = vec![row(&["Balance", "Rate"])];
        rows.extend((1..=5).map(|i| row(&[&i.to_string(), "3"])));
        let wb = Workbook::single("Loans", rows);
        let cfg = IngestConfig {
            max_rows: 3,
            ..IngestConfig::default()
        };
        let tape = TapeParser::new(cfg).parse_workbook(&wb).unwrap();
        assert_eq!(tape.loans.len(), 3);
        assert!(tape.truncated);
    }

    #[test]
    fn parse_bytes_records_digest() {
        let csv = b"Loan ID,Balance,Rate\nL1,100,4\n";
        let tape = parser().parse_bytes(csv, "pool.csv").unwrap();
        assert_eq!(tape.file_digest.as_deref(), Some(file_digest(csv).as_str()));
        assert_eq!(tape.total_balance(), dec("100"));
    }

    #[test]
    fn warning_display() {
        let w = RowWarning {
            row: 7,
            field: Some(LoanField::Ltv),
            message: "bad".into(),
            rejected: false,
        };
        assert_eq!(w.to_string(), "row 7 [ltv]: bad");
    }
}
