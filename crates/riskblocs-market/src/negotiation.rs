//! NDA and offer negotiation between an issuer and its investors.
//!
//! NDA lifecycle: `Requested → Sent → Executed | Rejected`, with
//! `Requested → Executed | Rejected` allowed directly. Offers are priced
//! in percent of par; an investor holds at most one open offer per
//! dataset and a firm offer needs an executed NDA.

use std::collections::BTreeSet;

use chrono::Utc;
use riskblocs_types::constants::MAX_OFFER_PRICE_PCT;
use riskblocs_types::{
    DatasetId, Engagement, InvestorResponse, Nda, NdaId, NdaStatus, Offer, OfferId, OfferStatus,
    OfferType, Result, RiskblocsError, Session, TransactionSnapshot, TransactionStage, UserId,
};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::backend::Backend;
use crate::datasets::require_issuer;
use crate::stage::resolve_stage;

/// One issuer/investor pair on an issuer's pipeline board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineEntry {
    pub dataset_id: DatasetId,
    pub dataset_name: String,
    pub investor: UserId,
    pub stage: TransactionStage,
}

/// Negotiation workflow over a [`Backend`].
pub struct MarketService<'a, B: Backend + ?Sized> {
    backend: &'a mut B,
}

impl<'a, B: Backend + ?Sized> MarketService<'a, B> {
    #[must_use]
    pub fn new(backend: &'a mut B) -> Self {
        Self { backend }
    }

    // -----------------------------------------------------------------------
    // NDAs
    // -----------------------------------------------------------------------

    /// Ask the dataset's issuer for an NDA.
    ///
    /// An open or executed NDA for the pair is returned unchanged; after a
    /// rejection a fresh request is created.
    pub fn request_nda(&mut self, session: &Session, dataset: DatasetId) -> Result<Nda> {
        require_investor(session, "request an NDA")?;
        let ds = self.backend.get_dataset(dataset)?;
        if let Some(existing) = self.backend.latest_nda(dataset, session.user_id)? {
            if existing.status != NdaStatus::Rejected {
                return Ok(existing);
            }
        }
        let now = Utc::now();
        let nda = Nda {
            id: NdaId::new(),
            dataset_id: dataset,
            issuer: ds.owner,
            investor: session.user_id,
            status: NdaStatus::Requested,
            requested_at: now,
            updated_at: now,
        };
        self.backend.upsert_nda(nda.clone())?;
        tracing::info!(nda = %nda.id, %dataset, investor = %session.user_id, "NDA requested");
        Ok(nda)
    }

    pub fn send_nda(&mut self, session: &Session, id: NdaId) -> Result<Nda> {
        self.transition_nda(session, id, NdaStatus::Sent)
    }

    pub fn execute_nda(&mut self, session: &Session, id: NdaId) -> Result<Nda> {
        self.transition_nda(session, id, NdaStatus::Executed)
    }

    pub fn reject_nda(&mut self, session: &Session, id: NdaId) -> Result<Nda> {
        self.transition_nda(session, id, NdaStatus::Rejected)
    }

    fn transition_nda(&mut self, session: &Session, id: NdaId, next: NdaStatus) -> Result<Nda> {
        require_issuer(session, "change NDA status")?;
        let mut nda = self.backend.get_nda(id)?;
        if nda.issuer != session.user_id {
            return Err(RiskblocsError::Forbidden {
                reason: format!("NDA {id} belongs to another issuer"),
            });
        }
        if !nda.status.can_transition_to(next) {
            return Err(RiskblocsError::InvalidTransition {
                from: nda.status.to_string(),
                to: next.to_string(),
            });
        }
        let from = nda.status;
        nda.status = next;
        nda.updated_at = Utc::now();
        self.backend.upsert_nda(nda.clone())?;
        tracing::info!(nda = %id, %from, to = %next, "NDA status changed");
        Ok(nda)
    }

    // -----------------------------------------------------------------------
    // Responses
    // -----------------------------------------------------------------------

    /// Record the investor's interest in, or refusal of, a listing.
    ///
    /// Offer responses are set only by [`Self::submit_offer`], which holds
    /// firm offers to the executed-NDA rule.
    ///
    /// # Errors
    /// `InvalidOffer` for `IndicativeOffer` or `FirmOffer`.
    pub fn respond(
        &mut self,
        session: &Session,
        dataset: DatasetId,
        response: InvestorResponse,
    ) -> Result<Engagement> {
        require_investor(session, "respond to a listing")?;
        if matches!(
            response,
            InvestorResponse::IndicativeOffer | InvestorResponse::FirmOffer
        ) {
            return Err(RiskblocsError::InvalidOffer {
                reason: format!("{response} is recorded by submitting an offer"),
            });
        }
        self.backend.get_dataset(dataset)?;
        let engagement = self.set_response(dataset, session.user_id, response)?;
        tracing::info!(%dataset, investor = %session.user_id, %response, "Investor responded");
        Ok(engagement)
    }

    fn set_response(
        &mut self,
        dataset: DatasetId,
        investor: UserId,
        response: InvestorResponse,
    ) -> Result<Engagement> {
        let mut engagement = self
            .backend
            .get_engagement(dataset, investor)?
            .unwrap_or_else(|| Engagement::new(dataset, investor));
        engagement.response = Some(response);
        engagement.updated_at = Utc::now();
        self.backend.upsert_engagement(engagement.clone())?;
        Ok(engagement)
    }

    // -----------------------------------------------------------------------
    // Offers
    // -----------------------------------------------------------------------

    /// Submit an offer at `price_pct` percent of par.
    ///
    /// Any open offer from the same investor on the dataset is withdrawn.
    ///
    /// # Errors
    /// - `InvalidOffer` unless `0 < price_pct <= 200`
    /// - `NdaRequired` for a firm offer without an executed NDA
    pub fn submit_offer(
        &mut self,
        session: &Session,
        dataset: DatasetId,
        offer_type: OfferType,
        price_pct: Decimal,
    ) -> Result<Offer> {
        require_investor(session, "submit offers")?;
        validate_price(price_pct)?;
        self.backend.get_dataset(dataset)?;
        if offer_type == OfferType::Firm && !self.nda_executed(dataset, session.user_id)? {
            return Err(RiskblocsError::NdaRequired);
        }

        let now = Utc::now();
        for mut open in self
            .backend
            .offers_from(dataset, session.user_id)?
            .into_iter()
            .filter(Offer::is_open)
        {
            open.status = OfferStatus::Withdrawn;
            open.decided_at = Some(now);
            tracing::debug!(offer = %open.id, "Superseded open offer withdrawn");
            self.backend.upsert_offer(open)?;
        }

        let offer = Offer {
            id: OfferId::new(),
            dataset_id: dataset,
            investor: session.user_id,
            offer_type,
            price_pct,
            status: OfferStatus::Submitted,
            submitted_at: now,
            decided_at: None,
        };
        self.backend.upsert_offer(offer.clone())?;
        let response = match offer_type {
            OfferType::Indicative => InvestorResponse::IndicativeOffer,
            OfferType::Firm => InvestorResponse::FirmOffer,
        };
        self.set_response(dataset, session.user_id, response)?;
        tracing::info!(
            offer = %offer.id,
            %dataset,
            investor = %session.user_id,
            %offer_type,
            %price_pct,
            "Offer submitted"
        );
        Ok(offer)
    }

    pub fn accept_offer(&mut self, session: &Session, id: OfferId) -> Result<Offer> {
        self.decide_offer(session, id, OfferStatus::Accepted)
    }

    pub fn reject_offer(&mut self, session: &Session, id: OfferId) -> Result<Offer> {
        self.decide_offer(session, id, OfferStatus::Rejected)
    }

    fn decide_offer(&mut self, session: &Session, id: OfferId, next: OfferStatus) -> Result<Offer> {
        require_issuer(session, "decide on offers")?;
        let offer = self.backend.get_offer(id)?;
        let dataset = self.backend.get_dataset(offer.dataset_id)?;
        if dataset.owner != session.user_id {
            return Err(RiskblocsError::Forbidden {
                reason: format!("offer {id} is on another issuer's dataset"),
            });
        }
        self.close_offer(offer, next)
    }

    /// Withdraw the session's own open offer.
    pub fn withdraw_offer(&mut self, session: &Session, id: OfferId) -> Result<Offer> {
        require_investor(session, "withdraw offers")?;
        let offer = self.backend.get_offer(id)?;
        if offer.investor != session.user_id {
            return Err(RiskblocsError::Forbidden {
                reason: format!("offer {id} belongs to another investor"),
            });
        }
        let (dataset, investor) = (offer.dataset_id, offer.investor);
        let offer = self.close_offer(offer, OfferStatus::Withdrawn)?;
        self.set_response(dataset, investor, InvestorResponse::Interested)?;
        Ok(offer)
    }

    fn close_offer(&mut self, mut offer: Offer, next: OfferStatus) -> Result<Offer> {
        if !offer.is_open() {
            return Err(RiskblocsError::InvalidTransition {
                from: offer.status.to_string(),
                to: next.to_string(),
            });
        }
        offer.status = next;
        offer.decided_at = Some(Utc::now());
        self.backend.upsert_offer(offer.clone())?;
        tracing::info!(offer = %offer.id, status = %next, "Offer decided");
        Ok(offer)
    }

    // -----------------------------------------------------------------------
    // Closing
    // -----------------------------------------------------------------------

    /// Mark the transaction with `investor` closed.
    ///
    /// # Errors
    /// `InvalidTransition` unless the investor's latest offer is accepted.
    pub fn close(&mut self, session: &Session, dataset: DatasetId, investor: UserId) -> Result<Engagement> {
        require_issuer(session, "close transactions")?;
        let ds = self.backend.get_dataset(dataset)?;
        if ds.owner != session.user_id {
            return Err(RiskblocsError::Forbidden {
                reason: format!("dataset {dataset} belongs to another issuer"),
            });
        }
        let accepted = self
            .backend
            .offers_from(dataset, investor)?
            .last()
            .is_some_and(|o| o.status == OfferStatus::Accepted);
        if !accepted {
            return Err(RiskblocsError::InvalidTransition {
                from: self.stage(dataset, investor)?.to_string(),
                to: TransactionStage::Closed.to_string(),
            });
        }
        let now = Utc::now();
        let mut engagement = self
            .backend
            .get_engagement(dataset, investor)?
            .unwrap_or_else(|| Engagement::new(dataset, investor));
        engagement.closed_at = Some(now);
        engagement.updated_at = now;
        self.backend.upsert_engagement(engagement.clone())?;
        tracing::info!(%dataset, %investor, "Transaction closed");
        Ok(engagement)
    }

    // -----------------------------------------------------------------------
    // Stage tracking
    // -----------------------------------------------------------------------

    /// Current stage inputs for one issuer/investor pair.
    ///
    /// Offer fields come from the investor's latest offer; a withdrawn
    /// offer carries no price.
    pub fn snapshot(&self, dataset: DatasetId, investor: UserId) -> Result<TransactionSnapshot> {
        let nda = self.backend.latest_nda(dataset, investor)?;
        let engagement = self.backend.get_engagement(dataset, investor)?;
        let offer = self.backend.offers_from(dataset, investor)?.pop();
        Ok(TransactionSnapshot {
            nda_status: nda.map(|n| n.status),
            response: engagement.as_ref().and_then(|e| e.response),
            data_accessed: engagement.as_ref().is_some_and(|e| e.data_accessed_at.is_some()),
            submitted_price: offer
                .as_ref()
                .filter(|o| o.status != OfferStatus::Withdrawn)
                .map(|o| o.price_pct),
            offer_type: offer.as_ref().map(|o| o.offer_type),
            offer_status: offer.as_ref().map(|o| o.status),
            closed: engagement.is_some_and(|e| e.closed_at.is_some()),
        })
    }

    pub fn stage(&self, dataset: DatasetId, investor: UserId) -> Result<TransactionStage> {
        Ok(resolve_stage(&self.snapshot(dataset, investor)?))
    }

    /// Every investor touching one of the issuer's datasets, with stage.
    pub fn pipeline(&self, session: &Session) -> Result<Vec<PipelineEntry>> {
        require_issuer(session, "view the pipeline")?;
        let mut entries = Vec::new();
        for ds in self.backend.datasets_by_owner(session.user_id)? {
            let mut investors = BTreeSet::new();
            investors.extend(self.backend.ndas_for_dataset(ds.id)?.into_iter().map(|n| n.investor));
            investors.extend(self.backend.offers_for_dataset(ds.id)?.into_iter().map(|o| o.investor));
            investors.extend(
                self.backend
                    .engagements_for_dataset(ds.id)?
                    .into_iter()
                    .map(|e| e.investor),
            );
            for investor in investors {
                entries.push(PipelineEntry {
                    dataset_id: ds.id,
                    dataset_name: ds.name.clone(),
                    investor,
                    stage: self.stage(ds.id, investor)?,
                });
            }
        }
        Ok(entries)
    }

    fn nda_executed(&self, dataset: DatasetId, investor: UserId) -> Result<bool> {
        Ok(self
            .backend
            .latest_nda(dataset, investor)?
            .is_some_and(|n| n.status == NdaStatus::Executed))
    }
}

fn require_investor(session: &Session, action: &str) -> Result<()> {
    if session.is_issuer() {
        Err(RiskblocsError::Forbidden {
            reason: format!("only investors may {action}"),
        })
    } else {
        Ok(())
    }
}

fn validate_price(price_pct: Decimal) -> Result<()> {
    if price_pct <= Decimal::ZERO {
        return Err(RiskblocsError::InvalidOffer {
            reason: format!("price must be positive, got {price_pct}"),
        });
    }
    if price_pct > Decimal::from(MAX_OFFER_PRICE_PCT) {
        return Err(RiskblocsError::InvalidOffer {
            reason: format!("price {price_pct} exceeds {MAX_OFFER_PRICE_PCT}% of par"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use riskblocs_types::Dataset;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::backend::MemoryBackend;

    struct Fixture {
        backend: MemoryBackend,
        issuer: Session,
        investor: Session,
        dataset: DatasetId,
    }

    fn fixture() -> Fixture {
        let mut backend = MemoryBackend::new();
        let issuer = Session::issuer(UserId::new());
        let ds = Dataset::new(issuer.user_id, "Q3");
        let dataset = ds.id;
        backend.insert_dataset(ds).unwrap();
        Fixture {
            backend,
            issuer,
            investor: Session::investor(UserId::new()),
            dataset,
        }
    }

    #[test]
    fn nda_lifecycle() {
        let mut f = fixture();
        let mut market = MarketService::new(&mut f.backend);
        let nda = market.request_nda(&f.investor, f.dataset).unwrap();
        assert_eq!(nda.status, NdaStatus::Requested);
        assert_eq!(nda.issuer, f.issuer.user_id);

        // Repeat request returns the same row.
        assert_eq!(market.request_nda(&f.investor, f.dataset).unwrap().id, nda.id);

        assert_eq!(market.send_nda(&f.issuer, nda.id).unwrap().status, NdaStatus::Sent);
        assert_eq!(market.execute_nda(&f.issuer, nda.id).unwrap().status, NdaStatus::Executed);

        let err = market.reject_nda(&f.issuer, nda.id).unwrap_err();
        assert!(matches!(
            err,
            RiskblocsError::InvalidTransition { ref from, ref to } if from == "EXECUTED" && to == "REJECTED"
        ));
    }

    #[test]
    fn only_the_owning_issuer_moves_an_nda() {
        let mut f = fixture();
        let mut market = MarketService::new(&mut f.backend);
        let nda = market.request_nda(&f.investor, f.dataset).unwrap();
        let rival = Session::issuer(UserId::new());
        assert!(matches!(market.send_nda(&rival, nda.id), Err(RiskblocsError::Forbidden { .. })));
        assert!(matches!(market.send_nda(&f.investor, nda.id), Err(RiskblocsError::Forbidden { .. })));
        assert!(matches!(
            market.send_nda(&f.issuer, NdaId::new()),
            Err(RiskblocsError::NdaNotFound(_))
        ));
    }

    #[test]
    fn rejected_nda_can_be_requested_again() {
        let mut f = fixture();
        let mut market = MarketService::new(&mut f.backend);
        let first = market.request_nda(&f.investor, f.dataset).unwrap();
        market.reject_nda(&f.issuer, first.id).unwrap();
        let second = market.request_nda(&f.investor, f.dataset).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(market.snapshot(f.dataset, f.investor.user_id).unwrap().nda_status, Some(NdaStatus::Requested));
    }

    #[test]
    fn offer_price_bounds() {
        let mut f = fixture();
        let mut market = MarketService::new(&mut f.backend);
        for bad in [dec!(0), dec!(-1), dec!(200.01)] {
            assert!(matches!(
                market.submit_offer(&f.investor, f.dataset, OfferType::Indicative, bad),
                Err(RiskblocsError::InvalidOffer { .. })
            ));
        }
        assert!(market
            .submit_offer(&f.investor, f.dataset, OfferType::Indicative, dec!(200))
            .is_ok());
    }

    #[test]
    fn firm_offer_needs_executed_nda() {
        let mut f = fixture();
        let mut market = MarketService::new(&mut f.backend);
        assert!(matches!(
            market.submit_offer(&f.investor, f.dataset, OfferType::Firm, dec!(97)),
            Err(RiskblocsError::NdaRequired)
        ));
        let nda = market.request_nda(&f.investor, f.dataset).unwrap();
        market.execute_nda(&f.issuer, nda.id).unwrap();
        let offer = market
            .submit_offer(&f.investor, f.dataset, OfferType::Firm, dec!(97))
            .unwrap();
        assert_eq!(offer.status, OfferStatus::Submitted);
        assert_eq!(
            market.stage(f.dataset, f.investor.user_id).unwrap(),
            TransactionStage::FirmOfferSubmitted
        );
    }

    #[test]
    fn new_offer_withdraws_the_open_one() {
        let mut f = fixture();
        let investor = f.investor.user_id;
        let mut market = MarketService::new(&mut f.backend);
        let first = market
            .submit_offer(&f.investor, f.dataset, OfferType::Indicative, dec!(95))
            .unwrap();
        let second = market
            .submit_offer(&f.investor, f.dataset, OfferType::Indicative, dec!(96.5))
            .unwrap();
        drop(market);
        let offers = f.backend.offers_from(f.dataset, investor).unwrap();
        assert_eq!(offers.len(), 2);
        assert_eq!(offers.iter().filter(|o| o.is_open()).count(), 1);
        assert_eq!(f.backend.get_offer(first.id).unwrap().status, OfferStatus::Withdrawn);
        assert!(f.backend.get_offer(second.id).unwrap().is_open());
    }

    #[test]
    fn decided_offers_are_final() {
        let mut f = fixture();
        let mut market = MarketService::new(&mut f.backend);
        let offer = market
            .submit_offer(&f.investor, f.dataset, OfferType::Indicative, dec!(99))
            .unwrap();
        market.reject_offer(&f.issuer, offer.id).unwrap();
        assert!(matches!(
            market.accept_offer(&f.issuer, offer.id),
            Err(RiskblocsError::InvalidTransition { .. })
        ));
        assert!(market.withdraw_offer(&f.investor, offer.id).is_err());
        assert_eq!(market.stage(f.dataset, f.investor.user_id).unwrap(), TransactionStage::Declined);
    }

    #[test]
    fn withdrawn_offer_drops_back_to_interest() {
        let mut f = fixture();
        let mut market = MarketService::new(&mut f.backend);
        let offer = market
            .submit_offer(&f.investor, f.dataset, OfferType::Indicative, dec!(99))
            .unwrap();
        market.withdraw_offer(&f.investor, offer.id).unwrap();
        let snapshot = market.snapshot(f.dataset, f.investor.user_id).unwrap();
        assert_eq!(snapshot.submitted_price, None);
        assert_eq!(resolve_stage(&snapshot), TransactionStage::InterestExpressed);
    }

    #[test]
    fn close_requires_accepted_offer() {
        let mut f = fixture();
        let investor = f.investor.user_id;
        let mut market = MarketService::new(&mut f.backend);
        market.respond(&f.investor, f.dataset, InvestorResponse::Interested).unwrap();
        let err = market.close(&f.issuer, f.dataset, investor).unwrap_err();
        assert!(matches!(
            err,
            RiskblocsError::InvalidTransition { ref from, .. } if from == "Interest Expressed"
        ));

        let offer = market
            .submit_offer(&f.investor, f.dataset, OfferType::Indicative, dec!(98))
            .unwrap();
        market.accept_offer(&f.issuer, offer.id).unwrap();
        assert_eq!(market.stage(f.dataset, investor).unwrap(), TransactionStage::OfferAccepted);
        market.close(&f.issuer, f.dataset, investor).unwrap();
        assert_eq!(market.stage(f.dataset, investor).unwrap(), TransactionStage::Closed);
    }

    #[test]
    fn offer_responses_need_an_actual_offer() {
        let mut f = fixture();
        let investor = f.investor.user_id;
        let mut market = MarketService::new(&mut f.backend);
        assert!(matches!(
            market.submit_offer(&f.investor, f.dataset, OfferType::Firm, dec!(99)),
            Err(RiskblocsError::NdaRequired)
        ));
        for response in [InvestorResponse::FirmOffer, InvestorResponse::IndicativeOffer] {
            assert!(matches!(
                market.respond(&f.investor, f.dataset, response),
                Err(RiskblocsError::InvalidOffer { .. })
            ));
        }
        let snapshot = market.snapshot(f.dataset, investor).unwrap();
        assert_eq!(snapshot.nda_status, None);
        assert_eq!(snapshot.response, None);
        assert_eq!(resolve_stage(&snapshot), TransactionStage::Listed);
    }

    #[test]
    fn pipeline_lists_each_counterparty() {
        let mut f = fixture();
        let other = Session::investor(UserId::new());
        let mut market = MarketService::new(&mut f.backend);
        market.respond(&f.investor, f.dataset, InvestorResponse::Interested).unwrap();
        market.request_nda(&other, f.dataset).unwrap();

        let board = market.pipeline(&f.issuer).unwrap();
        assert_eq!(board.len(), 2);
        let stage_of = |user: UserId| board.iter().find(|e| e.investor == user).map(|e| e.stage);
        assert_eq!(stage_of(f.investor.user_id), Some(TransactionStage::InterestExpressed));
        assert_eq!(stage_of(other.user_id), Some(TransactionStage::NdaRequested));
        assert!(market.pipeline(&f.investor).is_err());
    }
}
