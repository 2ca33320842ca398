//! Transaction stage resolution.
//!
//! Each stage has a trigger over the snapshot's fields. The resolved stage
//! is the highest-priority stage whose trigger fires, so adding evidence of
//! a later stage can only move a transaction forward.

use riskblocs_types::{
    InvestorResponse, NdaStatus, OfferStatus, OfferType, TransactionSnapshot, TransactionStage,
};

/// Map a snapshot to its stage. Priority, highest first:
///
/// | stage                      | trigger                                      |
/// |----------------------------|----------------------------------------------|
/// | Closed                     | `closed`                                     |
/// | Offer Accepted             | offer status accepted                        |
/// | Declined                   | response declined, or offer rejected         |
/// | Firm Offer Submitted       | firm response, or live firm offer with price |
/// | Indicative Offer Submitted | indicative response, or any other live price |
/// | Due Diligence              | NDA executed and data accessed               |
/// | NDA Executed               | NDA executed                                 |
/// | NDA Requested              | NDA requested or sent                        |
/// | Interest Expressed         | response interested                          |
/// | Listed                     | always                                       |
#[must_use]
pub fn resolve_stage(s: &TransactionSnapshot) -> TransactionStage {
    let live_price = s.submitted_price.is_some();
    let nda_executed = s.nda_status == Some(NdaStatus::Executed);

    let triggers = [
        (s.closed, TransactionStage::Closed),
        (
            s.offer_status == Some(OfferStatus::Accepted),
            TransactionStage::OfferAccepted,
        ),
        (
            s.response == Some(InvestorResponse::Declined)
                || s.offer_status == Some(OfferStatus::Rejected),
            TransactionStage::Declined,
        ),
        (
            s.response == Some(InvestorResponse::FirmOffer)
                || (live_price && s.offer_type == Some(OfferType::Firm)),
            TransactionStage::FirmOfferSubmitted,
        ),
        (
            s.response == Some(InvestorResponse::IndicativeOffer) || live_price,
            TransactionStage::IndicativeOfferSubmitted,
        ),
        (nda_executed && s.data_accessed, TransactionStage::DueDiligence),
        (nda_executed, TransactionStage::NdaExecuted),
        (
            matches!(s.nda_status, Some(NdaStatus::Requested | NdaStatus::Sent)),
            TransactionStage::NdaRequested,
        ),
        (
            s.response == Some(InvestorResponse::Interested),
            TransactionStage::InterestExpressed,
        ),
    ];

    triggers
        .into_iter()
        .filter_map(|(fired, stage)| fired.then_some(stage))
        .max()
        .unwrap_or(TransactionStage::Listed)
}
