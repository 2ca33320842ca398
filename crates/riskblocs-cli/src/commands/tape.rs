//! `parse` and `filter`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use riskblocs_analytics::{FilterCriteria, NumericRange, PortfolioSummary, cap_balances};
use riskblocs_ingest::{ParsedTape, RowWarning};
use riskblocs_report::write_loans;
use riskblocs_types::{LoanField, LoanRecord, RiskblocsConfig, RiskblocsError};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{emit, read_tape};

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Loan tape (.csv, .xlsx, .xls, .xlsm, .ods)
    pub file: PathBuf,

    /// Print the parse report as JSON
    #[arg(long)]
    pub json: bool,
}

/// What `parse` reports about a tape.
#[derive(Debug, Serialize)]
struct ParseReport<'a> {
    file: String,
    sheet: &'a str,
    header_row: usize,
    total_rows: usize,
    kept: usize,
    rejected_rows: usize,
    dropped_non_positive: usize,
    truncated: bool,
    file_digest: Option<&'a str>,
    summary: PortfolioSummary,
    warnings: &'a [RowWarning],
}

impl<'a> ParseReport<'a> {
    fn new(path: &Path, tape: &'a ParsedTape) -> Self {
        Self {
            file: path.display().to_string(),
            sheet: &tape.sheet_name,
            header_row: tape.header_row,
            total_rows: tape.total_rows,
            kept: tape.loans.len(),
            rejected_rows: tape.rejected_rows,
            dropped_non_positive: tape.dropped_non_positive,
            truncated: tape.truncated,
            file_digest: tape.file_digest.as_deref(),
            summary: PortfolioSummary::from_loans(&tape.loans),
            warnings: &tape.warnings,
        }
    }

    fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "file:       {}", self.file);
        let _ = writeln!(out, "sheet:      {} (header row {})", self.sheet, self.header_row);
        let _ = writeln!(
            out,
            "rows:       {} read, {} kept, {} rejected, {} dropped (balance <= 0)",
            self.total_rows, self.kept, self.rejected_rows, self.dropped_non_positive
        );
        let _ = writeln!(out, "balance:    {}", self.summary.total_balance.round_dp(2));
        if let Some(rate) = self.summary.wa_interest_rate {
            let _ = writeln!(out, "wa rate:    {}%", rate.round_dp(4));
        }
        if self.truncated {
            let _ = writeln!(out, "truncated:  rows past the configured limit were ignored");
        }
        for w in self.warnings {
            let field = w.field.map_or("-", LoanField::column_name);
            let tag = if w.rejected { "rejected" } else { "warning" };
            let _ = writeln!(out, "  row {:>5} [{tag}] {field}: {}", w.row, w.message);
        }
        out
    }
}

pub fn parse(config: &RiskblocsConfig, args: &ParseArgs) -> Result<()> {
    let tape = read_tape(config, &args.file)?;
    let report = ParseReport::new(&args.file, &tape);
    let text = if args.json {
        serde_json::to_string_pretty(&report)? + "\n"
    } else {
        report.to_text()
    };
    emit(None, &text)
}

#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Loan tape
    pub file: PathBuf,

    #[arg(long)]
    pub min_balance: Option<String>,
    #[arg(long)]
    pub max_balance: Option<String>,
    /// Interest rate floor, percent
    #[arg(long)]
    pub min_rate: Option<String>,
    #[arg(long)]
    pub max_rate: Option<String>,
    #[arg(long)]
    pub min_ltv: Option<String>,
    #[arg(long)]
    pub max_ltv: Option<String>,
    /// Remaining term floor, months
    #[arg(long)]
    pub min_term: Option<String>,
    #[arg(long)]
    pub max_term: Option<String>,
    #[arg(long)]
    pub min_score: Option<String>,
    #[arg(long)]
    pub max_score: Option<String>,
    #[arg(long)]
    pub min_dti: Option<String>,
    #[arg(long)]
    pub max_dti: Option<String>,
    #[arg(long)]
    pub min_dpd: Option<String>,
    #[arg(long)]
    pub max_dpd: Option<String>,

    /// Keep only these regions (repeatable, case-insensitive)
    #[arg(long = "region")]
    pub regions: Vec<String>,
    #[arg(long = "asset-class")]
    pub asset_classes: Vec<String>,
    #[arg(long = "currency")]
    pub currencies: Vec<String>,

    /// Cap every selected balance at this amount
    #[arg(long)]
    pub cap: Option<Decimal>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl FilterArgs {
    fn criteria(&self) -> Result<FilterCriteria> {
        let bounds = [
            (LoanField::CurrentBalance, &self.min_balance, &self.max_balance),
            (LoanField::InterestRate, &self.min_rate, &self.max_rate),
            (LoanField::Ltv, &self.min_ltv, &self.max_ltv),
            (LoanField::RemainingTerm, &self.min_term, &self.max_term),
            (LoanField::CreditScore, &self.min_score, &self.max_score),
            (LoanField::Dti, &self.min_dti, &self.max_dti),
            (LoanField::DaysPastDue, &self.min_dpd, &self.max_dpd),
        ];

        let mut criteria = FilterCriteria::new();
        for (field, min, max) in bounds {
            let range = NumericRange::from_inputs(
                min.as_deref().unwrap_or_default(),
                max.as_deref().unwrap_or_default(),
            )?;
            criteria.set_range(field, range)?;
        }
        if !self.regions.is_empty() {
            criteria = criteria.with_regions(&self.regions);
        }
        if !self.asset_classes.is_empty() {
            criteria = criteria.with_asset_classes(&self.asset_classes);
        }
        if !self.currencies.is_empty() {
            criteria = criteria.with_currencies(&self.currencies);
        }
        Ok(criteria)
    }
}

/// Apply the filter and optional cap to a parsed pool.
fn select(args: &FilterArgs, loans: &[LoanRecord]) -> Result<Vec<LoanRecord>> {
    let criteria = args.criteria()?;
    let mut selected = criteria.apply(loans);
    if selected.is_empty() {
        return Err(RiskblocsError::EmptySelection.into());
    }
    if let Some(cap) = args.cap {
        selected = cap_balances(&selected, cap)?;
    }
    tracing::info!(
        pool = loans.len(),
        selected = selected.len(),
        capped = args.cap.is_some(),
        "Filtered loan tape"
    );
    Ok(selected)
}

pub fn filter(config: &RiskblocsConfig, args: &FilterArgs) -> Result<()> {
    let tape = read_tape(config, &args.file)?;
    let selected = select(args, &tape.loans)?;
    match &args.output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_loans(std::io::BufWriter::new(file), &selected)?;
            tracing::info!(path = %path.display(), rows = selected.len(), "Wrote filtered tape");
        }
        None => write_loans(std::io::stdout().lock(), &selected)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use riskblocs_report::import_loans;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::commands::fixtures;

    #[test]
    fn text_report_lists_rejections() {
        let (_dir, path) = fixtures::tape_file();
        let tape = read_tape(&RiskblocsConfig::default(), &path).unwrap();
        let text = ParseReport::new(&path, &tape).to_text();
        assert!(text.contains("3 kept, 1 rejected, 1 dropped"), "{text}");
        assert!(text.contains("[rejected] interest_rate"), "{text}");
        assert!(text.contains("balance:    750000"), "{text}");
    }

    #[test]
    fn json_report_carries_counts() {
        let (_dir, path) = fixtures::tape_file();
        let tape = read_tape(&RiskblocsConfig::default(), &path).unwrap();
        let json = serde_json::to_value(ParseReport::new(&path, &tape)).unwrap();
        assert_eq!(json["kept"], 3);
        assert_eq!(json["dropped_non_positive"], 1);
        assert_eq!(json["summary"]["loan_count"], 3);
    }

    #[test]
    fn filter_writes_selection() {
        let (dir, path) = fixtures::tape_file();
        let out = dir.path().join("selected.csv");
        let args = FilterArgs {
            file: path,
            max_rate: Some("4".into()),
            regions: vec!["north".into()],
            cap: Some(dec!(300000)),
            output: Some(out.clone()),
            ..FilterArgs::default()
        };
        filter(&RiskblocsConfig::default(), &args).unwrap();

        let loans = import_loans(&std::fs::read_to_string(out).unwrap()).unwrap();
        let balances: Vec<Decimal> = loans.iter().map(|l| l.current_balance).collect();
        assert_eq!(balances, [dec!(100000), dec!(300000)]);
    }

    #[test]
    fn empty_selection_is_an_error() {
        let loans = vec![LoanRecord::dummy("A", 100, 300)];
        let args = FilterArgs {
            min_balance: Some("1000".into()),
            ..FilterArgs::default()
        };
        let err = select(&args, &loans).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RiskblocsError>(),
            Some(RiskblocsError::EmptySelection)
        ));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let args = FilterArgs {
            min_ltv: Some("90".into()),
            max_ltv: Some("50".into()),
            ..FilterArgs::default()
        };
        assert!(args.criteria().is_err());
    }
}
