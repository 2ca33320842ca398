//! # riskblocs-market
//!
//! **Matched market**: everything that touches stored rows.
//!
//! ## Layers
//!
//! ```text
//! DatasetService ─┐                      ┌─ tables  (datasets, loans, NDAs,
//!                 ├──> Backend (trait) ──┤           offers, engagements)
//! MarketService ──┘                      ├─ storage (raw tapes, signed URLs)
//!                                        └─ RPC     (copy filtered dataset)
//! ```
//!
//! The services hold the workflow rules (who may see loans, which NDA
//! transitions are legal, when a firm offer is allowed). The [`Backend`]
//! trait is the seam to the hosted table/storage service; [`MemoryBackend`]
//! implements it in process for tests and the CLI.
//!
//! [`resolve_stage`] is a pure function from a [`TransactionSnapshot`]
//! to the pipeline label shown to both sides.
//!
//! [`TransactionSnapshot`]: riskblocs_types::TransactionSnapshot

pub mod backend;
pub mod datasets;
pub mod negotiation;
pub mod stage;
pub mod storage;

pub use backend::{Backend, MemoryBackend};
pub use datasets::{DatasetService, UploadOutcome};
pub use negotiation::{MarketService, PipelineEntry};
pub use stage::resolve_stage;
pub use storage::{SignedUrl, UrlSigner};
