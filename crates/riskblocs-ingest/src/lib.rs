//! # riskblocs-ingest
//!
//! **Ingestion plane**: turns user-supplied files into typed loan records.
//!
//! ## Pipeline
//!
//! ```text
//! bytes → Workbook (calamine / csv) → select_sheet (header scoring)
//!       → HeaderMapping (synonym regex table) → per-row coercion
//!       → ParsedTape { loans, warnings } → BatchUploader → backend
//! ```
//!
//! Numeric cells that do not parse are never read as zero: a required
//! field rejects its row, an optional field is left empty, and both are
//! reported as warnings.
//!
//! The [`pdf`] module is a separate, best-effort scraper for pool-level
//! figures in offering documents and investor reports.

pub mod batch;
pub mod coerce;
pub mod column_map;
pub mod pdf;
pub mod tape;
pub mod workbook;

pub use batch::{BatchReport, BatchSink, BatchUploader};
pub use coerce::{CellValue, Coerced};
pub use column_map::HeaderMapping;
pub use pdf::{ExtractedTranche, PdfExtraction, PdfScraper};
pub use tape::{ParsedTape, RowWarning, TapeParser};
pub use workbook::{file_digest, Sheet, SheetSelection, Workbook};
