//! Investor report: what a prospective buyer sees for one dataset.

use chrono::{DateTime, Utc};
use riskblocs_analytics::{
    CashflowAssumptions, PortfolioSummary, StratRow, Stratifier, TrancheResult, TrancheSizing,
    project_pool, run_waterfall, size_tranches, stratify,
};
use riskblocs_types::{
    Dataset, DatasetId, ExposureDimension, LoanRecord, Result, RiskblocsError, TrancheStructure,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::report_err;

/// One titled stratification table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stratification {
    pub title: String,
    pub rows: Vec<StratRow>,
}

/// Whole-horizon totals of a waterfall run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaterfallTotals {
    pub assumptions: CashflowAssumptions,
    pub periods: usize,
    pub pool_interest: Decimal,
    pub pool_principal: Decimal,
    pub pool_losses: Decimal,
    pub tranches: Vec<TrancheResult>,
    pub total_excess_spread: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestorReport {
    pub dataset_id: DatasetId,
    pub dataset_name: String,
    pub generated_at: DateTime<Utc>,
    pub summary: PortfolioSummary,
    pub stratifications: Vec<Stratification>,
    pub tranches: Vec<TrancheSizing>,
    pub waterfall: Option<WaterfallTotals>,
}

fn standard_stratifiers() -> Vec<Stratifier> {
    vec![
        Stratifier::balance(vec![
            dec!(50000),
            dec!(100000),
            dec!(250000),
            dec!(500000),
            dec!(1000000),
        ]),
        Stratifier::rate(vec![dec!(2), dec!(3), dec!(4), dec!(5), dec!(6)]),
        Stratifier::ltv(vec![dec!(50), dec!(60), dec!(70), dec!(80), dec!(90), dec!(100)]),
        Stratifier::Category(ExposureDimension::Region),
        Stratifier::Category(ExposureDimension::AssetClass),
    ]
}

impl InvestorReport {
    /// Assemble the report.
    ///
    /// Tranches are sized when a structure is given; the waterfall runs
    /// when assumptions are given as well.
    ///
    /// # Errors
    /// - `InvalidStructure` for a bad structure, or assumptions without one
    /// - `InvalidAssumptions` for out-of-range assumptions
    pub fn build(
        dataset: &Dataset,
        loans: &[LoanRecord],
        structure: Option<&TrancheStructure>,
        assumptions: Option<&CashflowAssumptions>,
    ) -> Result<Self> {
        let summary = PortfolioSummary::from_loans(loans);
        let stratifications = standard_stratifiers()
            .iter()
            .map(|s| Stratification {
                title: s.title(),
                rows: stratify(loans, s),
            })
            .collect();

        let tranches = match structure {
            Some(structure) => size_tranches(summary.total_balance, structure)?,
            None => Vec::new(),
        };

        let waterfall = match (structure, assumptions) {
            (Some(_), Some(assumptions)) => {
                let pool = project_pool(loans, assumptions)?;
                let result = run_waterfall(&pool, &tranches);
                Some(WaterfallTotals {
                    assumptions: assumptions.clone(),
                    periods: pool.len(),
                    pool_interest: pool.iter().map(|p| p.interest).sum(),
                    pool_principal: pool.iter().map(|p| p.principal_collections()).sum(),
                    pool_losses: pool.iter().map(|p| p.losses).sum(),
                    tranches: result.tranches,
                    total_excess_spread: result.total_excess_spread,
                })
            }
            (None, Some(_)) => {
                return Err(RiskblocsError::InvalidStructure {
                    reason: "a waterfall needs a tranche structure".into(),
                });
            }
            _ => None,
        };

        tracing::info!(
            dataset = %dataset.id,
            loans = summary.loan_count,
            tranches = tranches.len(),
            waterfall = waterfall.is_some(),
            "Built investor report"
        );
        Ok(Self {
            dataset_id: dataset.id,
            dataset_name: dataset.name.clone(),
            generated_at: Utc::now(),
            summary,
            stratifications,
            tranches,
            waterfall,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The report as CSV sections, each introduced by a `[title]` line and
    /// separated by a blank line.
    pub fn to_csv_sections(&self) -> Result<String> {
        let mut sections = Vec::new();

        let s = &self.summary;
        let opt = |v: Option<Decimal>| v.map(|d| d.round_dp(4).to_string()).unwrap_or_default();
        sections.push(section(
            "Summary",
            &["metric", "value"],
            vec![
                vec!["dataset".into(), self.dataset_name.clone()],
                vec!["loan_count".into(), s.loan_count.to_string()],
                vec!["total_balance".into(), s.total_balance.round_dp(2).to_string()],
                vec!["average_balance".into(), s.average_balance.round_dp(2).to_string()],
                vec!["min_balance".into(), s.min_balance.to_string()],
                vec!["max_balance".into(), s.max_balance.to_string()],
                vec!["wa_interest_rate".into(), opt(s.wa_interest_rate)],
                vec!["wa_remaining_term".into(), opt(s.wa_remaining_term)],
                vec!["wa_ltv".into(), opt(s.wa_ltv)],
                vec!["wa_credit_score".into(), opt(s.wa_credit_score)],
                vec!["delinquent_count".into(), s.delinquent_count.to_string()],
                vec!["delinquent_balance".into(), s.delinquent_balance.to_string()],
            ],
        )?);

        for strat in &self.stratifications {
            sections.push(section(
                &format!("Stratification: {}", strat.title),
                &["bucket", "loan_count", "balance", "share_pct", "wa_interest_rate"],
                strat
                    .rows
                    .iter()
                    .map(|r| {
                        vec![
                            r.label.clone(),
                            r.loan_count.to_string(),
                            r.balance.to_string(),
                            r.share_pct.round_dp(2).to_string(),
                            opt(r.wa_interest_rate),
                        ]
                    })
                    .collect(),
            )?);
        }

        if !self.tranches.is_empty() {
            sections.push(section(
                "Tranches",
                &[
                    "name",
                    "size_pct",
                    "coupon_pct",
                    "notional",
                    "attachment_pct",
                    "detachment_pct",
                    "credit_enhancement_pct",
                ],
                self.tranches
                    .iter()
                    .map(|t| {
                        vec![
                            t.name.clone(),
                            t.size_pct.to_string(),
                            t.coupon_pct.to_string(),
                            t.notional.to_string(),
                            t.attachment_pct.to_string(),
                            t.detachment_pct.to_string(),
                            t.credit_enhancement_pct.to_string(),
                        ]
                    })
                    .collect(),
            )?);
        }

        if let Some(w) = &self.waterfall {
            sections.push(section(
                "Waterfall",
                &[
                    "tranche",
                    "opening_notional",
                    "interest_paid",
                    "interest_shortfall",
                    "principal_paid",
                    "losses",
                    "ending_balance",
                ],
                w.tranches
                    .iter()
                    .map(|t| {
                        vec![
                            t.name.clone(),
                            t.opening_notional.round_dp(2).to_string(),
                            t.interest_paid.round_dp(2).to_string(),
                            t.interest_shortfall.round_dp(2).to_string(),
                            t.principal_paid.round_dp(2).to_string(),
                            t.losses.round_dp(2).to_string(),
                            t.ending_balance.round_dp(2).to_string(),
                        ]
                    })
                    .collect(),
            )?);
        }

        Ok(sections.join("\r\n"))
    }
}

fn section(title: &str, header: &[&str], rows: Vec<Vec<String>>) -> Result<String> {
    let mut out = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    out.write_record([format!("[{title}]")]).map_err(report_err)?;
    out.write_record(header).map_err(report_err)?;
    for row in rows {
        out.write_record(&row).map_err(report_err)?;
    }
    let bytes = out.into_inner().map_err(report_err)?;
    String::from_utf8(bytes).map_err(report_err)
}

#[cfg(test)]
mod tests {
    use riskblocs_types::{TrancheSpec, UserId};

    use super::*;

    fn pool() -> Vec<LoanRecord> {
        vec![
            LoanRecord::dummy("A", 80_000, 300).with_ltv(55),
            LoanRecord::dummy("B", 120_000, 450).with_region("South").with_ltv(85),
            LoanRecord::dummy("C", 300_000, 250).with_term(240),
        ]
    }

    fn structure() -> TrancheStructure {
        TrancheStructure::new(vec![
            TrancheSpec::new("A", dec!(85), dec!(3)),
            TrancheSpec::new("Z", dec!(15), dec!(0)),
        ])
    }

    #[test]
    fn summary_and_standard_tables() {
        let ds = Dataset::new(UserId::new(), "Pool");
        let report = InvestorReport::build(&ds, &pool(), None, None).unwrap();
        assert_eq!(report.summary.loan_count, 3);
        assert_eq!(report.summary.total_balance, dec!(500000));
        assert_eq!(report.stratifications.len(), 5);
        assert!(report.tranches.is_empty());
        assert!(report.waterfall.is_none());
        for strat in &report.stratifications {
            let n: usize = strat.rows.iter().map(|r| r.loan_count).sum();
            assert_eq!(n, 3, "{}", strat.title);
        }
    }

    #[test]
    fn waterfall_totals_with_structure() {
        let ds = Dataset::new(UserId::new(), "Pool");
        let assumptions = CashflowAssumptions {
            months: 24,
            ..CashflowAssumptions::default()
        };
        let report = InvestorReport::build(&ds, &pool(), Some(&structure()), Some(&assumptions)).unwrap();
        assert_eq!(report.tranches.len(), 2);
        assert_eq!(report.tranches[0].notional, dec!(425000));
        let w = report.waterfall.as_ref().unwrap();
        assert_eq!(w.periods, 24);
        assert_eq!(w.tranches.len(), 2);
        assert!(w.pool_interest > Decimal::ZERO);
        assert!(w.pool_losses > Decimal::ZERO);
    }

    #[test]
    fn assumptions_without_structure_are_rejected() {
        let ds = Dataset::new(UserId::new(), "Pool");
        let err = InvestorReport::build(&ds, &pool(), None, Some(&CashflowAssumptions::default()));
        assert!(matches!(err, Err(RiskblocsError::InvalidStructure { .. })));
    }

    #[test]
    fn csv_sections_and_json() {
        let ds = Dataset::new(UserId::new(), "Pool, \"2024\"");
        let report = InvestorReport::build(&ds, &pool(), Some(&structure()), None).unwrap();
        let csv = report.to_csv_sections().unwrap();
        assert!(csv.starts_with("[Summary]\r\nmetric,value\r\n"));
        assert!(csv.contains("dataset,\"Pool, \"\"2024\"\"\""));
        assert!(csv.contains("\r\n\r\n[Stratification: region]\r\n"));
        assert!(csv.contains("[Tranches]"));
        assert!(!csv.contains("[Waterfall]"));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["summary"]["loan_count"], 3);
        assert_eq!(json["tranches"][1]["name"], "Z");
    }
}
