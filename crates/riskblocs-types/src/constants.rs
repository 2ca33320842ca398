//! System-wide constants for RiskBlocs.

/// Decimal places kept for money amounts in reports.
pub const MONEY_PRECISION: u32 = 2;

/// Decimal places kept for rates and percentages in reports.
pub const RATE_PRECISION: u32 = 4;

/// Rows inserted per backend call during a bulk upload.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Pause between two consecutive upload batches, in milliseconds.
pub const DEFAULT_BATCH_DELAY_MS: u64 = 100;

/// Number of leading rows inspected when looking for the header row.
pub const DEFAULT_HEADER_SCAN_ROWS: usize = 25;

/// Upper bound on data rows read from a single tape.
pub const DEFAULT_MAX_ROWS: usize = 250_000;

/// Remaining term assumed for cashflow projection when a loan carries none.
pub const DEFAULT_REMAINING_TERM_MONTHS: u32 = 240;

/// Storage bucket holding raw uploaded tapes.
pub const DEFAULT_TAPE_BUCKET: &str = "loan-tapes";

/// Lifetime of a signed download URL, in seconds.
pub const DEFAULT_SIGNED_URL_TTL_SECS: i64 = 3600;

/// Base URL of the hosted backend used when none is configured.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:54321";

/// No-data code written into ESMA reports for missing values.
pub const DEFAULT_ESMA_NO_DATA: &str = "ND2";

/// Reporting currency used when a tape carries none.
pub const DEFAULT_CURRENCY: &str = "EUR";

/// Highest offer price accepted, in percent of par.
pub const MAX_OFFER_PRICE_PCT: u32 = 200;

/// Fragment kerning (thousandths of text space) that reads as a word gap in `TJ` arrays.
pub const PDF_TJ_SPACE_THRESHOLD: i64 = -200;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Product name.
pub const PRODUCT_NAME: &str = "RiskBlocs";
