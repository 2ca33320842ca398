//! Dataset lifecycle: upload, listing, loan access, filtered copies,
//! deletion and raw-tape downloads.
//!
//! Issuers own datasets. Investors see every listing but read loans only
//! once an NDA with the owner is executed; each such read is recorded on
//! the investor's engagement row.

use chrono::Utc;
use riskblocs_analytics::FilterCriteria;
use riskblocs_ingest::{BatchUploader, RowWarning, TapeParser};
use riskblocs_types::{
    Dataset, DatasetId, Engagement, LoanRecord, NdaStatus, Result, RiskblocsConfig,
    RiskblocsError, Session,
};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::backend::Backend;
use crate::storage::{SignedUrl, UrlSigner};

/// Result of a tape upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub dataset: Dataset,
    pub warnings: Vec<RowWarning>,
    /// Rows rejected for an unparseable required field.
    pub rejected: usize,
    /// Rows dropped for a non-positive balance.
    pub dropped: usize,
    pub batches: usize,
}

/// Dataset operations on behalf of a [`Session`].
pub struct DatasetService<'a, B: Backend + ?Sized> {
    backend: &'a mut B,
    parser: TapeParser,
    uploader: BatchUploader,
    signer: UrlSigner,
    bucket: String,
}

impl<'a, B: Backend + ?Sized> DatasetService<'a, B> {
    /// # Errors
    /// `Configuration` for a zero batch size or a non-positive URL ttl.
    pub fn new(backend: &'a mut B, config: &RiskblocsConfig) -> Result<Self> {
        Ok(Self {
            backend,
            parser: TapeParser::new(config.ingest.clone()),
            uploader: BatchUploader::from_config(&config.ingest)?,
            signer: UrlSigner::from_config(&config.backend)?,
            bucket: config.backend.tape_bucket.clone(),
        })
    }

    /// Parse a tape and store it as a new dataset owned by the session.
    ///
    /// The raw file goes to `<owner>/<dataset>/<file_name>` in the tape
    /// bucket, then the dataset row, then the loans in batches. If any
    /// write fails, everything written so far is removed again.
    ///
    /// # Errors
    /// - `Forbidden` for investor sessions
    /// - parser errors (`MissingRequiredColumns`, `EmptyTape`, ...)
    /// - backend or storage errors
    pub fn upload_tape(
        &mut self,
        session: &Session,
        name: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<UploadOutcome> {
        require_issuer(session, "upload a loan tape")?;
        let name = name.trim();
        if name.is_empty() {
            return Err(RiskblocsError::Backend {
                reason: "dataset name must not be empty".into(),
            });
        }
        let file_name = base_name(file_name);

        let tape = self.parser.parse_bytes(bytes, file_name)?;

        let mut dataset = Dataset::new(session.user_id, name);
        dataset.source_file = file_name.to_string();
        dataset.file_digest.clone_from(&tape.file_digest);
        dataset.loan_count = tape.loans.len();
        dataset.total_balance = tape.total_balance();

        let path = object_path(&dataset);
        self.backend.put_object(&self.bucket, &path, bytes.to_vec())?;
        if let Err(e) = self.backend.insert_dataset(dataset.clone()) {
            self.roll_back(None, &path);
            return Err(e);
        }

        let backend = &mut *self.backend;
        let id = dataset.id;
        let mut sink = |batch: &[LoanRecord]| backend.insert_loans(id, batch);
        let report = match self.uploader.upload(&tape.loans, &mut sink) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(dataset = %id, error = %e, "Upload failed; rolling back");
                self.roll_back(Some(id), &path);
                return Err(e);
            }
        };

        tracing::info!(
            dataset = %id,
            owner = %session.user_id,
            loans = dataset.loan_count,
            warnings = tape.warning_count(),
            rejected = tape.rejected_rows,
            dropped = tape.dropped_non_positive,
            "Uploaded loan tape"
        );
        Ok(UploadOutcome {
            dataset,
            warnings: tape.warnings,
            rejected: tape.rejected_rows,
            dropped: tape.dropped_non_positive,
            batches: report.batches,
        })
    }

    /// Best-effort cleanup after a failed upload. Cleanup failures are
    /// logged; the caller still reports the error that caused the rollback.
    fn roll_back(&mut self, dataset: Option<DatasetId>, path: &str) {
        if let Some(id) = dataset {
            if let Err(e) = self.backend.delete_dataset(id) {
                tracing::error!(dataset = %id, error = %e, "Rollback left dataset rows behind");
            }
        }
        if let Err(e) = self.backend.remove_object(&self.bucket, path) {
            tracing::error!(bucket = %self.bucket, path, error = %e, "Rollback left raw file behind");
        }
    }

    /// Issuers see their own datasets; investors see every listing.
    pub fn list(&self, session: &Session) -> Result<Vec<Dataset>> {
        if session.is_issuer() {
            self.backend.datasets_by_owner(session.user_id)
        } else {
            self.backend.list_datasets()
        }
    }

    /// Dataset metadata. Another issuer's dataset reads as not found.
    pub fn get(&self, session: &Session, id: DatasetId) -> Result<Dataset> {
        let dataset = self.backend.get_dataset(id)?;
        if session.is_issuer() && dataset.owner != session.user_id {
            return Err(RiskblocsError::DatasetNotFound(id));
        }
        Ok(dataset)
    }

    /// Loan rows of a dataset.
    ///
    /// # Errors
    /// - `DatasetNotFound` for another issuer's dataset
    /// - `NdaRequired` for an investor without an executed NDA
    pub fn loans(&mut self, session: &Session, id: DatasetId) -> Result<Vec<LoanRecord>> {
        let dataset = self.get(session, id)?;
        self.authorize_data_access(session, &dataset)?;
        let loans = self.backend.select_loans(id)?;
        if !session.is_issuer() {
            self.record_access(&dataset, session)?;
        }
        Ok(loans)
    }

    /// Store the loans of `id` matching `criteria` as a new dataset owned
    /// by the session, optionally capping each balance.
    ///
    /// # Errors
    /// - `Forbidden` unless the session owns the source
    /// - `EmptySelection` if nothing matches
    pub fn copy_filtered(
        &mut self,
        session: &Session,
        id: DatasetId,
        criteria: &FilterCriteria,
        cap: Option<Decimal>,
        name: &str,
    ) -> Result<Dataset> {
        let source = self.owned(session, id, "copy")?;
        let copy = Dataset::new(session.user_id, name.trim());
        let copy = self.backend.copy_filtered_dataset(source.id, criteria, cap, copy)?;
        tracing::info!(
            source = %source.id,
            dataset = %copy.id,
            loans = copy.loan_count,
            of = source.loan_count,
            capped = cap.is_some(),
            "Copied filtered dataset"
        );
        Ok(copy)
    }

    /// Delete a dataset, its dependent rows and its raw file.
    pub fn delete(&mut self, session: &Session, id: DatasetId) -> Result<()> {
        let dataset = self.owned(session, id, "delete")?;
        self.backend.delete_dataset(id)?;
        if !dataset.source_file.is_empty() {
            self.backend.remove_object(&self.bucket, &object_path(&dataset))?;
        }
        tracing::info!(dataset = %id, "Deleted dataset");
        Ok(())
    }

    /// Signed URL for the raw uploaded file.
    ///
    /// # Errors
    /// - access errors as for [`Self::loans`]
    /// - `Storage` for filtered copies, which have no file
    pub fn download_url(&mut self, session: &Session, id: DatasetId) -> Result<SignedUrl> {
        let dataset = self.get(session, id)?;
        self.authorize_data_access(session, &dataset)?;
        let path = object_path(&dataset);
        if dataset.source_file.is_empty() || !self.backend.object_exists(&self.bucket, &path)? {
            return Err(RiskblocsError::Storage {
                reason: format!("dataset {id} has no stored file"),
            });
        }
        if !session.is_issuer() {
            self.record_access(&dataset, session)?;
        }
        Ok(self.signer.sign(&self.bucket, &path, Utc::now()))
    }

    // -----------------------------------------------------------------------
    // helpers
    // -----------------------------------------------------------------------

    fn owned(&self, session: &Session, id: DatasetId, action: &str) -> Result<Dataset> {
        let dataset = self.backend.get_dataset(id)?;
        if dataset.owner != session.user_id {
            return Err(RiskblocsError::Forbidden {
                reason: format!("only the owner may {action} dataset {id}"),
            });
        }
        Ok(dataset)
    }

    fn authorize_data_access(&self, session: &Session, dataset: &Dataset) -> Result<()> {
        if dataset.owner == session.user_id {
            return Ok(());
        }
        let executed = self
            .backend
            .latest_nda(dataset.id, session.user_id)?
            .is_some_and(|n| n.status == NdaStatus::Executed);
        if executed {
            Ok(())
        } else {
            Err(RiskblocsError::NdaRequired)
        }
    }

    fn record_access(&mut self, dataset: &Dataset, session: &Session) -> Result<()> {
        let mut engagement = self
            .backend
            .get_engagement(dataset.id, session.user_id)?
            .unwrap_or_else(|| Engagement::new(dataset.id, session.user_id));
        if engagement.data_accessed_at.is_none() {
            let now = Utc::now();
            engagement.data_accessed_at = Some(now);
            engagement.updated_at = now;
            self.backend.upsert_engagement(engagement)?;
            tracing::debug!(dataset = %dataset.id, investor = %session.user_id, "Recorded data access");
        }
        Ok(())
    }
}

pub(crate) fn require_issuer(session: &Session, action: &str) -> Result<()> {
    if session.is_issuer() {
        Ok(())
    } else {
        Err(RiskblocsError::Forbidden {
            reason: format!("only issuers may {action}"),
        })
    }
}

fn object_path(dataset: &Dataset) -> String {
    format!("{}/{}/{}", dataset.owner, dataset.id.0, dataset.source_file)
}

/// Last path component of an uploaded file name.
fn base_name(file_name: &str) -> &str {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("tape")
}

#[cfg(test)]
mod tests {
    use riskblocs_types::UserId;

    use super::*;
    use crate::backend::MemoryBackend;

    const TAPE: &str = "Loan ID,Current Balance,Interest Rate,Region\n\
                        L1,100000,3.5%,North\n\
                        L2,250000,4.25%,South\n\
                        L3,0,5%,East\n\
                        L4,80000,n/a,West\n";

    fn config() -> RiskblocsConfig {
        let mut config = RiskblocsConfig::default();
        config.ingest.batch_delay_ms = 0;
        config.ingest.batch_size = 1;
        config.backend.signing_secret = "test-secret".into();
        config
    }

    #[test]
    fn upload_stores_file_row_and_loans() {
        let mut backend = MemoryBackend::new();
        let issuer = Session::issuer(UserId::new());
        let outcome = DatasetService::new(&mut backend, &config())
            .unwrap()
            .upload_tape(&issuer, "Q3 book", "C:\\tapes\\q3.csv", TAPE.as_bytes())
            .unwrap();

        assert_eq!(outcome.dataset.loan_count, 2);
        assert_eq!(outcome.dataset.source_file, "q3.csv");
        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.batches, 2);
        assert!(outcome.dataset.file_digest.is_some());
        assert_eq!(backend.loan_count(), 2);
        assert_eq!(backend.object_count(), 1);
        let path = object_path(&outcome.dataset);
        assert!(path.ends_with("/q3.csv"));
        assert!(backend.object_exists("loan-tapes", &path).unwrap());
    }

    #[test]
    fn investors_cannot_upload() {
        let mut backend = MemoryBackend::new();
        let investor = Session::investor(UserId::new());
        let err = DatasetService::new(&mut backend, &config())
            .unwrap()
            .upload_tape(&investor, "x", "x.csv", TAPE.as_bytes())
            .unwrap_err();
        assert!(matches!(err, RiskblocsError::Forbidden { .. }));
        assert_eq!(backend.object_count(), 0);
    }

    #[test]
    fn failed_batch_rolls_back() {
        let mut backend = MemoryBackend::new().with_max_insert_rows(1);
        let mut cfg = config();
        cfg.ingest.batch_size = 2;
        let issuer = Session::issuer(UserId::new());
        let err = DatasetService::new(&mut backend, &cfg)
            .unwrap()
            .upload_tape(&issuer, "Q3", "q3.csv", TAPE.as_bytes())
            .unwrap_err();
        assert!(matches!(err, RiskblocsError::Backend { .. }));
        assert_eq!(backend.dataset_count(), 0);
        assert_eq!(backend.loan_count(), 0);
        assert_eq!(backend.object_count(), 0);
    }

    #[test]
    fn failed_rollback_keeps_the_upload_error() {
        let mut backend = MemoryBackend::new()
            .with_max_insert_rows(1)
            .with_failing_deletes();
        let mut cfg = config();
        cfg.ingest.batch_size = 2;
        let issuer = Session::issuer(UserId::new());
        let err = DatasetService::new(&mut backend, &cfg)
            .unwrap()
            .upload_tape(&issuer, "Q3", "q3.csv", TAPE.as_bytes())
            .unwrap_err();
        match err {
            RiskblocsError::Backend { reason } => assert!(reason.contains("exceeds limit"), "{reason}"),
            other => panic!("expected the insert error, got {other:?}"),
        }
        // Cleanup could not run, so the partial upload is still there.
        assert_eq!(backend.dataset_count(), 1);
        assert_eq!(backend.object_count(), 1);
    }

    #[test]
    fn invalid_config_fails_construction() {
        let mut backend = MemoryBackend::new();
        let mut cfg = config();
        cfg.ingest.batch_size = 0;
        assert!(matches!(
            DatasetService::new(&mut backend, &cfg),
            Err(RiskblocsError::Configuration(_))
        ));
        let mut cfg = config();
        cfg.backend.signed_url_ttl_secs = 0;
        assert!(DatasetService::new(&mut backend, &cfg).is_err());
    }

    #[test]
    fn unparseable_tape_writes_nothing() {
        let mut backend = MemoryBackend::new();
        let issuer = Session::issuer(UserId::new());
        let err = DatasetService::new(&mut backend, &config())
            .unwrap()
            .upload_tape(&issuer, "bad", "bad.csv", b"Name,Colour\nx,blue\n")
            .unwrap_err();
        assert!(matches!(err, RiskblocsError::MissingRequiredColumns { .. }));
        assert_eq!(backend.object_count(), 0);
    }

    #[test]
    fn other_issuers_see_nothing() {
        let mut backend = MemoryBackend::new();
        let owner = Session::issuer(UserId::new());
        let rival = Session::issuer(UserId::new());
        let cfg = config();
        let mut svc = DatasetService::new(&mut backend, &cfg).unwrap();
        let ds = svc.upload_tape(&owner, "Q3", "q3.csv", TAPE.as_bytes()).unwrap().dataset;

        assert!(svc.list(&rival).unwrap().is_empty());
        assert_eq!(svc.list(&owner).unwrap().len(), 1);
        assert!(matches!(svc.get(&rival, ds.id), Err(RiskblocsError::DatasetNotFound(_))));
        assert!(matches!(svc.delete(&rival, ds.id), Err(RiskblocsError::Forbidden { .. })));
        assert_eq!(svc.loans(&owner, ds.id).unwrap().len(), 2);
    }

    #[test]
    fn delete_removes_file() {
        let mut backend = MemoryBackend::new();
        let owner = Session::issuer(UserId::new());
        let cfg = config();
        let mut svc = DatasetService::new(&mut backend, &cfg).unwrap();
        let ds = svc.upload_tape(&owner, "Q3", "q3.csv", TAPE.as_bytes()).unwrap().dataset;
        svc.delete(&owner, ds.id).unwrap();
        assert_eq!(backend.dataset_count(), 0);
        assert_eq!(backend.object_count(), 0);
    }

    #[test]
    fn base_name_strips_directories() {
        assert_eq!(base_name("a/b/c.xlsx"), "c.xlsx");
        assert_eq!(base_name("C:\\x\\y.csv"), "y.csv");
        assert_eq!(base_name("plain.xls"), "plain.xls");
        assert_eq!(base_name("dir/"), "tape");
    }
}
