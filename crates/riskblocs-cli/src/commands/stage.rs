//! `stage`: resolve a deal snapshot given on the command line.

use anyhow::Result;
use clap::{Args, ValueEnum};
use riskblocs_market::resolve_stage;
use riskblocs_types::{
    InvestorResponse, NdaStatus, OfferStatus, OfferType, TransactionSnapshot, TransactionStage,
};
use rust_decimal::Decimal;

use super::emit;

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum NdaArg {
    Requested,
    Sent,
    Executed,
    Rejected,
}

impl From<NdaArg> for NdaStatus {
    fn from(arg: NdaArg) -> Self {
        match arg {
            NdaArg::Requested => Self::Requested,
            NdaArg::Sent => Self::Sent,
            NdaArg::Executed => Self::Executed,
            NdaArg::Rejected => Self::Rejected,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ResponseArg {
    Interested,
    Declined,
    IndicativeOffer,
    FirmOffer,
}

impl From<ResponseArg> for InvestorResponse {
    fn from(arg: ResponseArg) -> Self {
        match arg {
            ResponseArg::Interested => Self::Interested,
            ResponseArg::Declined => Self::Declined,
            ResponseArg::IndicativeOffer => Self::IndicativeOffer,
            ResponseArg::FirmOffer => Self::FirmOffer,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OfferTypeArg {
    Indicative,
    Firm,
}

impl From<OfferTypeArg> for OfferType {
    fn from(arg: OfferTypeArg) -> Self {
        match arg {
            OfferTypeArg::Indicative => Self::Indicative,
            OfferTypeArg::Firm => Self::Firm,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OfferStatusArg {
    Submitted,
    Accepted,
    Rejected,
    Withdrawn,
}

impl From<OfferStatusArg> for OfferStatus {
    fn from(arg: OfferStatusArg) -> Self {
        match arg {
            OfferStatusArg::Submitted => Self::Submitted,
            OfferStatusArg::Accepted => Self::Accepted,
            OfferStatusArg::Rejected => Self::Rejected,
            OfferStatusArg::Withdrawn => Self::Withdrawn,
        }
    }
}

#[derive(Args, Debug, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct StageArgs {
    #[arg(long, value_enum)]
    pub nda: Option<NdaArg>,

    #[arg(long, value_enum)]
    pub response: Option<ResponseArg>,

    /// Price of the latest live offer, percent of par
    #[arg(long)]
    pub price: Option<Decimal>,

    #[arg(long, value_enum)]
    pub offer_type: Option<OfferTypeArg>,

    #[arg(long, value_enum)]
    pub offer_status: Option<OfferStatusArg>,

    /// The investor has opened the loan data
    #[arg(long)]
    pub data_accessed: bool,

    #[arg(long)]
    pub closed: bool,

    /// Print the snapshot and stage as JSON
    #[arg(long)]
    pub json: bool,
}

impl StageArgs {
    fn snapshot(&self) -> TransactionSnapshot {
        TransactionSnapshot {
            nda_status: self.nda.map(Into::into),
            response: self.response.map(Into::into),
            data_accessed: self.data_accessed,
            submitted_price: self.price,
            offer_type: self.offer_type.map(Into::into),
            offer_status: self.offer_status.map(Into::into),
            closed: self.closed,
        }
    }

    fn resolve(&self) -> TransactionStage {
        resolve_stage(&self.snapshot())
    }
}

pub fn run(args: &StageArgs) -> Result<()> {
    let snapshot = args.snapshot();
    let stage = args.resolve();
    let text = if args.json {
        let value = serde_json::json!({ "snapshot": snapshot, "stage": stage.label() });
        serde_json::to_string_pretty(&value)? + "\n"
    } else {
        format!("{stage}\n")
    };
    emit(None, &text)
}
