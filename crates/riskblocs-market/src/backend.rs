//! Backend port: tables, storage bucket and server-side functions.
//!
//! Every method returns a `Result` because the real backend is remote.
//! Row-level rules (who may read what) live in the services, not here.

use std::collections::BTreeMap;

use riskblocs_analytics::{FilterCriteria, cap_balances};
use riskblocs_types::{
    Dataset, DatasetId, Engagement, LoanRecord, Nda, NdaId, Offer, OfferId, Result,
    RiskblocsError, UserId,
};
use rust_decimal::Decimal;

/// Table, storage and RPC surface of the hosted backend.
pub trait Backend {
    // -----------------------------------------------------------------------
    // datasets
    // -----------------------------------------------------------------------

    fn insert_dataset(&mut self, dataset: Dataset) -> Result<()>;

    /// # Errors
    /// `DatasetNotFound` if no row has this id.
    fn get_dataset(&self, id: DatasetId) -> Result<Dataset>;

    /// Every dataset, oldest first.
    fn list_datasets(&self) -> Result<Vec<Dataset>>;

    fn datasets_by_owner(&self, owner: UserId) -> Result<Vec<Dataset>> {
        Ok(self
            .list_datasets()?
            .into_iter()
            .filter(|d| d.owner == owner)
            .collect())
    }

    /// Delete a dataset together with its loans, NDAs, offers and
    /// engagements.
    fn delete_dataset(&mut self, id: DatasetId) -> Result<()>;

    // -----------------------------------------------------------------------
    // loans
    // -----------------------------------------------------------------------

    /// Append a batch of loans to a dataset, returning the rows written.
    fn insert_loans(&mut self, dataset: DatasetId, loans: &[LoanRecord]) -> Result<usize>;

    fn select_loans(&self, dataset: DatasetId) -> Result<Vec<LoanRecord>>;

    fn delete_loans(&mut self, dataset: DatasetId) -> Result<usize>;

    // -----------------------------------------------------------------------
    // NDAs, offers, engagements
    // -----------------------------------------------------------------------

    fn upsert_nda(&mut self, nda: Nda) -> Result<()>;

    /// # Errors
    /// `NdaNotFound` if no row has this id.
    fn get_nda(&self, id: NdaId) -> Result<Nda>;

    fn ndas_for_dataset(&self, dataset: DatasetId) -> Result<Vec<Nda>>;

    fn upsert_offer(&mut self, offer: Offer) -> Result<()>;

    /// # Errors
    /// `OfferNotFound` if no row has this id.
    fn get_offer(&self, id: OfferId) -> Result<Offer>;

    fn offers_for_dataset(&self, dataset: DatasetId) -> Result<Vec<Offer>>;

    fn upsert_engagement(&mut self, engagement: Engagement) -> Result<()>;

    fn get_engagement(&self, dataset: DatasetId, investor: UserId) -> Result<Option<Engagement>>;

    fn engagements_for_dataset(&self, dataset: DatasetId) -> Result<Vec<Engagement>>;

    /// Most recent NDA between `investor` and the dataset's issuer.
    fn latest_nda(&self, dataset: DatasetId, investor: UserId) -> Result<Option<Nda>> {
        Ok(self
            .ndas_for_dataset(dataset)?
            .into_iter()
            .filter(|n| n.investor == investor)
            .max_by_key(|n| (n.requested_at, n.id)))
    }

    /// Offers from `investor` on a dataset, oldest first.
    fn offers_from(&self, dataset: DatasetId, investor: UserId) -> Result<Vec<Offer>> {
        let mut offers: Vec<Offer> = self
            .offers_for_dataset(dataset)?
            .into_iter()
            .filter(|o| o.investor == investor)
            .collect();
        offers.sort_by_key(|o| (o.submitted_at, o.id));
        Ok(offers)
    }

    // -----------------------------------------------------------------------
    // storage
    // -----------------------------------------------------------------------

    fn put_object(&mut self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<()>;

    /// # Errors
    /// `Storage` if the object does not exist.
    fn get_object(&self, bucket: &str, path: &str) -> Result<Vec<u8>>;

    fn object_exists(&self, bucket: &str, path: &str) -> Result<bool>;

    /// Remove an object. Removing a missing object is not an error.
    fn remove_object(&mut self, bucket: &str, path: &str) -> Result<()>;

    // -----------------------------------------------------------------------
    // RPC
    // -----------------------------------------------------------------------

    /// Server-side "copy filtered dataset": select the source's loans
    /// matching `criteria`, optionally cap balances, and store them under
    /// the new `copy` row with `parent` pointing at the source.
    ///
    /// # Errors
    /// `EmptySelection` if nothing matches; nothing is written then.
    fn copy_filtered_dataset(
        &mut self,
        source: DatasetId,
        criteria: &FilterCriteria,
        cap: Option<Decimal>,
        mut copy: Dataset,
    ) -> Result<Dataset> {
        let mut loans = criteria.apply(&self.select_loans(source)?);
        if loans.is_empty() {
            return Err(RiskblocsError::EmptySelection);
        }
        if let Some(cap) = cap {
            loans = cap_balances(&loans, cap)?;
        }
        copy.parent = Some(source);
        copy.loan_count = loans.len();
        copy.total_balance = loans.iter().map(|l| l.current_balance).sum();
        self.insert_dataset(copy.clone())?;
        self.insert_loans(copy.id, &loans)?;
        Ok(copy)
    }
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

/// In-process backend. Rows live in ordered maps keyed by id, so listings
/// come back in creation order.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    datasets: BTreeMap<DatasetId, Dataset>,
    loans: BTreeMap<DatasetId, Vec<LoanRecord>>,
    ndas: BTreeMap<NdaId, Nda>,
    offers: BTreeMap<OfferId, Offer>,
    engagements: BTreeMap<(DatasetId, UserId), Engagement>,
    objects: BTreeMap<(String, String), Vec<u8>>,
    /// Largest loan batch accepted per insert, like a request-size limit.
    max_insert_rows: Option<usize>,
    /// Reject dataset and object deletes, like a revoked delete grant.
    deletes_fail: bool,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject loan inserts larger than `rows`.
    #[must_use]
    pub fn with_max_insert_rows(mut self, rows: usize) -> Self {
        self.max_insert_rows = Some(rows);
        self
    }

    /// Reject every dataset and object delete.
    #[must_use]
    pub fn with_failing_deletes(mut self) -> Self {
        self.deletes_fail = true;
        self
    }

    fn check_delete(&self, what: &str) -> Result<()> {
        if self.deletes_fail {
            return Err(RiskblocsError::Storage {
                reason: format!("delete of {what} not permitted"),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn dataset_count(&self) -> usize {
        self.datasets.len()
    }

    #[must_use]
    pub fn loan_count(&self) -> usize {
        self.loans.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

impl Backend for MemoryBackend {
    fn insert_dataset(&mut self, dataset: Dataset) -> Result<()> {
        if self.datasets.contains_key(&dataset.id) {
            return Err(RiskblocsError::Backend {
                reason: format!("duplicate dataset id {}", dataset.id),
            });
        }
        self.datasets.insert(dataset.id, dataset);
        Ok(())
    }

    fn get_dataset(&self, id: DatasetId) -> Result<Dataset> {
        self.datasets
            .get(&id)
            .cloned()
            .ok_or(RiskblocsError::DatasetNotFound(id))
    }

    fn list_datasets(&self) -> Result<Vec<Dataset>> {
        Ok(self.datasets.values().cloned().collect())
    }

    fn delete_dataset(&mut self, id: DatasetId) -> Result<()> {
        self.check_delete("dataset rows")?;
        if self.datasets.remove(&id).is_none() {
            return Err(RiskblocsError::DatasetNotFound(id));
        }
        let loans = self.loans.remove(&id).map_or(0, |l| l.len());
        self.ndas.retain(|_, n| n.dataset_id != id);
        self.offers.retain(|_, o| o.dataset_id != id);
        self.engagements.retain(|(ds, _), _| *ds != id);
        tracing::debug!(dataset = %id, loans, "Deleted dataset rows");
        Ok(())
    }

    fn insert_loans(&mut self, dataset: DatasetId, loans: &[LoanRecord]) -> Result<usize> {
        if !self.datasets.contains_key(&dataset) {
            return Err(RiskblocsError::DatasetNotFound(dataset));
        }
        if let Some(max) = self.max_insert_rows {
            if loans.len() > max {
                return Err(RiskblocsError::Backend {
                    reason: format!("insert of {} rows exceeds limit of {max}", loans.len()),
                });
            }
        }
        self.loans.entry(dataset).or_default().extend_from_slice(loans);
        Ok(loans.len())
    }

    fn select_loans(&self, dataset: DatasetId) -> Result<Vec<LoanRecord>> {
        if !self.datasets.contains_key(&dataset) {
            return Err(RiskblocsError::DatasetNotFound(dataset));
        }
        Ok(self.loans.get(&dataset).cloned().unwrap_or_default())
    }

    fn delete_loans(&mut self, dataset: DatasetId) -> Result<usize> {
        Ok(self.loans.remove(&dataset).map_or(0, |l| l.len()))
    }

    fn upsert_nda(&mut self, nda: Nda) -> Result<()> {
        if !self.datasets.contains_key(&nda.dataset_id) {
            return Err(RiskblocsError::DatasetNotFound(nda.dataset_id));
        }
        self.ndas.insert(nda.id, nda);
        Ok(())
    }

    fn get_nda(&self, id: NdaId) -> Result<Nda> {
        self.ndas.get(&id).cloned().ok_or(RiskblocsError::NdaNotFound(id))
    }

    fn ndas_for_dataset(&self, dataset: DatasetId) -> Result<Vec<Nda>> {
        Ok(self
            .ndas
            .values()
            .filter(|n| n.dataset_id == dataset)
            .cloned()
            .collect())
    }

    fn upsert_offer(&mut self, offer: Offer) -> Result<()> {
        if !self.datasets.contains_key(&offer.dataset_id) {
            return Err(RiskblocsError::DatasetNotFound(offer.dataset_id));
        }
        self.offers.insert(offer.id, offer);
        Ok(())
    }

    fn get_offer(&self, id: OfferId) -> Result<Offer> {
        self.offers
            .get(&id)
            .cloned()
            .ok_or(RiskblocsError::OfferNotFound(id))
    }

    fn offers_for_dataset(&self, dataset: DatasetId) -> Result<Vec<Offer>> {
        Ok(self
            .offers
            .values()
            .filter(|o| o.dataset_id == dataset)
            .cloned()
            .collect())
    }

    fn upsert_engagement(&mut self, engagement: Engagement) -> Result<()> {
        if !self.datasets.contains_key(&engagement.dataset_id) {
            return Err(RiskblocsError::DatasetNotFound(engagement.dataset_id));
        }
        self.engagements
            .insert((engagement.dataset_id, engagement.investor), engagement);
        Ok(())
    }

    fn get_engagement(&self, dataset: DatasetId, investor: UserId) -> Result<Option<Engagement>> {
        Ok(self.engagements.get(&(dataset, investor)).cloned())
    }

    fn engagements_for_dataset(&self, dataset: DatasetId) -> Result<Vec<Engagement>> {
        Ok(self
            .engagements
            .values()
            .filter(|e| e.dataset_id == dataset)
            .cloned()
            .collect())
    }

    fn put_object(&mut self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<()> {
        if bucket.is_empty() || path.is_empty() {
            return Err(RiskblocsError::Storage {
                reason: "bucket and path must not be empty".into(),
            });
        }
        self.objects
            .insert((bucket.to_string(), path.to_string()), bytes);
        Ok(())
    }

    fn get_object(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        self.objects
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| RiskblocsError::Storage {
                reason: format!("object not found: {bucket}/{path}"),
            })
    }

    fn object_exists(&self, bucket: &str, path: &str) -> Result<bool> {
        Ok(self
            .objects
            .contains_key(&(bucket.to_string(), path.to_string())))
    }

    fn remove_object(&mut self, bucket: &str, path: &str) -> Result<()> {
        self.check_delete(path)?;
        self.objects.remove(&(bucket.to_string(), path.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use riskblocs_analytics::NumericRange;
    use riskblocs_types::{LoanField, NdaStatus, OfferStatus, OfferType};
    use rust_decimal_macros::dec;

    use super::*;

    fn seeded() -> (MemoryBackend, Dataset) {
        let mut backend = MemoryBackend::new();
        let ds = Dataset::new(UserId::new(), "tape");
        backend.insert_dataset(ds.clone()).unwrap();
        backend
            .insert_loans(
                ds.id,
                &[
                    LoanRecord::dummy("A", 100, 300),
                    LoanRecord::dummy("B", 900, 500),
                    LoanRecord::dummy("C", 400, 700),
                ],
            )
            .unwrap();
        (backend, ds)
    }

    #[test]
    fn missing_dataset_is_not_found() {
        let backend = MemoryBackend::new();
        let id = DatasetId::new();
        assert!(matches!(
            backend.get_dataset(id),
            Err(RiskblocsError::DatasetNotFound(got)) if got == id
        ));
        assert!(backend.select_loans(id).is_err());
    }

    #[test]
    fn insert_limit_rejects_large_batches() {
        let mut backend = MemoryBackend::new().with_max_insert_rows(2);
        let ds = Dataset::new(UserId::new(), "tape");
        backend.insert_dataset(ds.clone()).unwrap();
        let three = vec![LoanRecord::dummy("A", 1, 1); 3];
        assert!(matches!(
            backend.insert_loans(ds.id, &three),
            Err(RiskblocsError::Backend { .. })
        ));
        assert_eq!(backend.insert_loans(ds.id, &three[..2]).unwrap(), 2);
    }

    #[test]
    fn delete_cascades() {
        let (mut backend, ds) = seeded();
        let investor = UserId::new();
        let now = Utc::now();
        backend
            .upsert_nda(Nda {
                id: NdaId::new(),
                dataset_id: ds.id,
                issuer: ds.owner,
                investor,
                status: NdaStatus::Requested,
                requested_at: now,
                updated_at: now,
            })
            .unwrap();
        backend
            .upsert_offer(Offer {
                id: OfferId::new(),
                dataset_id: ds.id,
                investor,
                offer_type: OfferType::Indicative,
                price_pct: dec!(98.5),
                status: OfferStatus::Submitted,
                submitted_at: now,
                decided_at: None,
            })
            .unwrap();
        backend
            .upsert_engagement(Engagement::new(ds.id, investor))
            .unwrap();

        backend.delete_dataset(ds.id).unwrap();
        assert_eq!(backend.dataset_count(), 0);
        assert_eq!(backend.loan_count(), 0);
        assert!(backend.ndas_for_dataset(ds.id).unwrap().is_empty());
        assert!(backend.offers_for_dataset(ds.id).unwrap().is_empty());
        assert!(backend.get_engagement(ds.id, investor).unwrap().is_none());
        assert!(backend.delete_dataset(ds.id).is_err());
    }

    #[test]
    fn copy_filtered_sets_parent_and_totals() {
        let (mut backend, ds) = seeded();
        let criteria = FilterCriteria::new()
            .with_range(LoanField::CurrentBalance, NumericRange::at_least(dec!(400)))
            .unwrap();
        let copy = Dataset::new(ds.owner, "large loans");
        let copy = backend
            .copy_filtered_dataset(ds.id, &criteria, Some(dec!(500)), copy)
            .unwrap();
        assert_eq!(copy.parent, Some(ds.id));
        assert_eq!(copy.loan_count, 2);
        assert_eq!(copy.total_balance, dec!(900));
        let loans = backend.select_loans(copy.id).unwrap();
        assert_eq!(loans[0].loan_id, "B");
        assert_eq!(loans[0].current_balance, dec!(500));
        // Source untouched.
        assert_eq!(backend.select_loans(ds.id).unwrap()[1].current_balance, dec!(900));
    }

    #[test]
    fn copy_with_no_match_writes_nothing() {
        let (mut backend, ds) = seeded();
        let criteria = FilterCriteria::new()
            .with_range(LoanField::CurrentBalance, NumericRange::at_least(dec!(10_000)))
            .unwrap();
        let err = backend
            .copy_filtered_dataset(ds.id, &criteria, None, Dataset::new(ds.owner, "none"))
            .unwrap_err();
        assert!(matches!(err, RiskblocsError::EmptySelection));
        assert_eq!(backend.dataset_count(), 1);
    }

    #[test]
    fn objects_round_trip() {
        let mut backend = MemoryBackend::new();
        backend.put_object("tapes", "u/d/f.csv", b"a;b".to_vec()).unwrap();
        assert!(backend.object_exists("tapes", "u/d/f.csv").unwrap());
        assert_eq!(backend.get_object("tapes", "u/d/f.csv").unwrap(), b"a;b");
        backend.remove_object("tapes", "u/d/f.csv").unwrap();
        assert!(!backend.object_exists("tapes", "u/d/f.csv").unwrap());
        assert!(backend.get_object("tapes", "u/d/f.csv").is_err());
        assert!(backend.put_object("", "x", Vec::new()).is_err());
    }
}
