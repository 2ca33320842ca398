//! `esma`, `report` and `pdf`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use riskblocs_analytics::CashflowAssumptions;
use riskblocs_ingest::PdfScraper;
use riskblocs_report::{InvestorReport, esma_report};
use riskblocs_types::{Dataset, RiskblocsConfig, TrancheSpec, TrancheStructure, UserId};
use rust_decimal::Decimal;

use super::{emit, read_tape};

#[derive(Args, Debug)]
pub struct EsmaArgs {
    /// Loan tape
    pub file: PathBuf,

    /// Data cut-off date (YYYY-MM-DD)
    #[arg(long)]
    pub cut_off: NaiveDate,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn esma(config: &RiskblocsConfig, args: &EsmaArgs) -> Result<()> {
    let tape = read_tape(config, &args.file)?;
    let text = esma_report(&tape.loans, args.cut_off, &config.report)?;
    emit(args.output.as_deref(), &text)
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Args, Debug, Default)]
pub struct ReportArgs {
    /// Loan tape
    pub file: PathBuf,

    /// JSON array of tranches: `[{"name": "A", "size_pct": "85", "coupon_pct": "3"}, ...]`
    #[arg(long)]
    pub structure: Option<PathBuf>,

    /// Annual prepayment rate, percent
    #[arg(long)]
    pub cpr: Option<Decimal>,
    /// Annual default rate, percent
    #[arg(long)]
    pub cdr: Option<Decimal>,
    /// Loss severity, percent
    #[arg(long)]
    pub severity: Option<Decimal>,
    /// Projection horizon in months
    #[arg(long)]
    pub months: Option<u32>,

    #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
    pub format: ReportFormat,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ReportArgs {
    fn scenario_given(&self) -> bool {
        self.cpr.is_some() || self.cdr.is_some() || self.severity.is_some() || self.months.is_some()
    }

    /// Waterfall assumptions; present whenever a structure or any
    /// scenario flag is given.
    fn assumptions(&self, config: &RiskblocsConfig) -> Option<CashflowAssumptions> {
        if self.structure.is_none() && !self.scenario_given() {
            return None;
        }
        let defaults = CashflowAssumptions::default();
        Some(CashflowAssumptions {
            cpr_pct: self.cpr.unwrap_or(defaults.cpr_pct),
            cdr_pct: self.cdr.unwrap_or(defaults.cdr_pct),
            severity_pct: self.severity.unwrap_or(defaults.severity_pct),
            months: self.months.unwrap_or(defaults.months),
            default_remaining_term_months: config.report.default_remaining_term_months,
        })
    }
}

fn load_structure(path: &Path) -> Result<TrancheStructure> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let tranches: Vec<TrancheSpec> = serde_json::from_str(&text)
        .with_context(|| format!("invalid tranche structure in {}", path.display()))?;
    Ok(TrancheStructure::new(tranches))
}

fn build_report(config: &RiskblocsConfig, args: &ReportArgs) -> Result<InvestorReport> {
    let tape = read_tape(config, &args.file)?;
    let structure = args.structure.as_deref().map(load_structure).transpose()?;
    let assumptions = args.assumptions(config);

    let name = args
        .file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut dataset = Dataset::new(UserId::new(), name);
    dataset.loan_count = tape.loans.len();
    dataset.total_balance = tape.total_balance();
    dataset.file_digest.clone_from(&tape.file_digest);

    Ok(InvestorReport::build(
        &dataset,
        &tape.loans,
        structure.as_ref(),
        assumptions.as_ref(),
    )?)
}

pub fn report(config: &RiskblocsConfig, args: &ReportArgs) -> Result<()> {
    let report = build_report(config, args)?;
    let text = match args.format {
        ReportFormat::Json => report.to_json()? + "\n",
        ReportFormat::Csv => report.to_csv_sections()?,
    };
    emit(args.output.as_deref(), &text)
}

pub fn pdf(file: &Path) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let extraction = PdfScraper::new()
        .extract(&bytes)
        .with_context(|| format!("failed to scrape {}", file.display()))?;
    emit(None, &(serde_json::to_string_pretty(&extraction)? + "\n"))
}
