//! Batched bulk inserts.
//!
//! Large tapes are written to the backend in consecutive fixed-size
//! chunks with a fixed pause between chunks, so one upload never floods
//! the backend with a single oversized request.

use std::time::Duration;

use riskblocs_types::{IngestConfig, Result, RiskblocsError};

/// Destination for one batch of rows.
pub trait BatchSink<T> {
    /// Insert `batch`, returning the number of rows written.
    fn insert_batch(&mut self, batch: &[T]) -> Result<usize>;
}

impl<T, F> BatchSink<T> for F
where
    F: FnMut(&[T]) -> Result<usize>,
{
    fn insert_batch(&mut self, batch: &[T]) -> Result<usize> {
        self(batch)
    }
}

/// Outcome of an upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub batches: usize,
    pub inserted: usize,
}

/// Splits items into fixed-size batches and feeds them to a [`BatchSink`].
#[derive(Debug, Clone)]
pub struct BatchUploader {
    batch_size: usize,
    delay: Duration,
}

impl BatchUploader {
    /// # Errors
    /// `Configuration` if `batch_size` is zero.
    pub fn new(batch_size: usize, delay: Duration) -> Result<Self> {
        if batch_size == 0 {
            return Err(RiskblocsError::Configuration(
                "batch_size must be > 0".into(),
            ));
        }
        Ok(Self { batch_size, delay })
    }

    /// Uploader using the configured batch size and delay.
    ///
    /// # Errors
    /// `Configuration` if the configured batch size is zero.
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        Self::new(config.batch_size, Duration::from_millis(config.batch_delay_ms))
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Insert `items` batch by batch.
    ///
    /// Sleeps between batches, never after the last one. The first sink
    /// error stops the upload and is returned; earlier batches stay written.
    pub fn upload<T>(&self, items: &[T], sink: &mut impl BatchSink<T>) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let total = items.len().div_ceil(self.batch_size);

        for (index, chunk) in items.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            match sink.insert_batch(chunk) {
                Ok(n) => {
                    report.batches += 1;
                    report.inserted += n;
                    tracing::debug!(batch = index + 1, total, rows = n, "Inserted batch");
                }
                Err(e) => {
                    tracing::warn!(
                        batch = index + 1,
                        total,
                        inserted = report.inserted,
                        error = %e,
                        "Batch insert failed"
                    );
                    return Err(e);
                }
            }
        }

        tracing::info!(
            batches = report.batches,
            inserted = report.inserted,
            "Bulk upload complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn splits_into_fixed_batches() {
        let items: Vec<u32> = (0..1_234).collect();
        let mut sizes = Vec::new();
        let mut sink = |batch: &[u32]| -> Result<usize> {
            sizes.push(batch.len());
            Ok(batch.len())
        };
        let report = BatchUploader::new(500, Duration::ZERO)
            .unwrap()
            .upload(&items, &mut sink)
            .unwrap();
        assert_eq!(sizes, vec![500, 500, 234]);
        assert_eq!(report, BatchReport { batches: 3, inserted: 1_234 });
    }

    #[test]
    fn empty_input_makes_no_calls() {
        let mut calls = 0;
        let mut sink = |_: &[u8]| -> Result<usize> {
            calls += 1;
            Ok(0)
        };
        let items: Vec<u8> = Vec::new();
        let report = BatchUploader::new(10, Duration::ZERO)
            .unwrap()
            .upload(&items, &mut sink)
            .unwrap();
        assert_eq!(calls, 0);
        assert_eq!(report, BatchReport::default());
    }

    #[test]
    fn sink_error_aborts_remaining_batches() {
        let items = [1, 2, 3, 4, 5];
        let mut seen = Vec::new();
        let mut sink = |batch: &[i32]| -> Result<usize> {
            if batch[0] == 3 {
                return Err(RiskblocsError::Backend {
                    reason: "timeout".into(),
                });
            }
            seen.extend_from_slice(batch);
            Ok(batch.len())
        };
        let err = BatchUploader::new(2, Duration::ZERO)
            .unwrap()
            .upload(&items, &mut sink)
            .unwrap_err();
        assert!(matches!(err, RiskblocsError::Backend { .. }));
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn delay_only_between_batches() {
        let delay = Duration::from_millis(100);
        let mut sink = |b: &[u8]| -> Result<usize> { Ok(b.len()) };

        let start = Instant::now();
        BatchUploader::new(10, delay).unwrap().upload(&[0u8; 5], &mut sink).unwrap();
        assert!(start.elapsed() < delay, "single batch must not sleep");

        let start = Instant::now();
        BatchUploader::new(2, delay).unwrap().upload(&[0u8; 5], &mut sink).unwrap();
        assert!(start.elapsed() >= delay * 2);
    }

    #[test]
    fn from_config_uses_settings() {
        let cfg = IngestConfig {
            batch_size: 7,
            batch_delay_ms: 0,
            ..IngestConfig::default()
        };
        assert_eq!(BatchUploader::from_config(&cfg).unwrap().batch_size(), 7);
    }

    #[test]
    fn zero_batch_size_is_a_configuration_error() {
        let err = BatchUploader::new(0, Duration::ZERO).unwrap_err();
        assert!(matches!(err, RiskblocsError::Configuration(_)));

        let cfg = IngestConfig {
            batch_size: 0,
            ..IngestConfig::default()
        };
        assert!(matches!(
            BatchUploader::from_config(&cfg),
            Err(RiskblocsError::Configuration(_))
        ));
    }
}
