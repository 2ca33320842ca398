//! Matched-market rows: sessions, NDAs, investor responses, offers, and
//! the transaction stage derived from them.
//!
//! Issuers list datasets; investors express interest, sign NDAs to see
//! loan-level data, and submit indicative or firm offers. Nothing here
//! enforces the workflow; `riskblocs-market` does, reading and writing
//! these rows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{DatasetId, NdaId, OfferId, UserId};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Which side of the market an account is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Issuer,
    Investor,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Issuer => write!(f, "ISSUER"),
            Self::Investor => write!(f, "INVESTOR"),
        }
    }
}

/// The authenticated caller of a service operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub role: Role,
}

impl Session {
    #[must_use]
    pub fn issuer(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Issuer,
        }
    }

    #[must_use]
    pub fn investor(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Investor,
        }
    }

    #[must_use]
    pub fn is_issuer(&self) -> bool {
        self.role == Role::Issuer
    }
}

// ---------------------------------------------------------------------------
// NDA
// ---------------------------------------------------------------------------

/// Lifecycle of a non-disclosure agreement.
///
/// ```text
/// REQUESTED → SENT → EXECUTED
///     │         │
///     └─────────┴──→ REJECTED
/// ```
/// `REQUESTED → EXECUTED` is allowed when the issuer countersigns directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NdaStatus {
    Requested,
    Sent,
    Executed,
    Rejected,
}

impl NdaStatus {
    #[must_use]
    pub fn can_transition_to(self, next: NdaStatus) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::Sent | Self::Executed | Self::Rejected)
                | (Self::Sent, Self::Executed | Self::Rejected)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Rejected)
    }
}

impl std::fmt::Display for NdaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "REQUESTED"),
            Self::Sent => write!(f, "SENT"),
            Self::Executed => write!(f, "EXECUTED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// An NDA between the issuer of a dataset and one investor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nda {
    pub id: NdaId,
    pub dataset_id: DatasetId,
    pub issuer: UserId,
    pub investor: UserId,
    pub status: NdaStatus,
    pub requested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Investor engagement
// ---------------------------------------------------------------------------

/// An investor's stated reaction to a listed dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvestorResponse {
    Interested,
    Declined,
    IndicativeOffer,
    FirmOffer,
}

impl std::fmt::Display for InvestorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interested => write!(f, "INTERESTED"),
            Self::Declined => write!(f, "DECLINED"),
            Self::IndicativeOffer => write!(f, "INDICATIVE_OFFER"),
            Self::FirmOffer => write!(f, "FIRM_OFFER"),
        }
    }
}

/// Per (dataset, investor) flags that are not NDAs or offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub dataset_id: DatasetId,
    pub investor: UserId,
    pub response: Option<InvestorResponse>,
    /// First time the investor read loan-level data.
    pub data_accessed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Engagement {
    #[must_use]
    pub fn new(dataset_id: DatasetId, investor: UserId) -> Self {
        Self {
            dataset_id,
            investor,
            response: None,
            data_accessed_at: None,
            closed_at: None,
            updated_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Offer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferType {
    Indicative,
    Firm,
}

impl std::fmt::Display for OfferType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Indicative => write!(f, "INDICATIVE"),
            Self::Firm => write!(f, "FIRM"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferStatus {
    Submitted,
    Accepted,
    Rejected,
    Withdrawn,
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::Accepted => write!(f, "ACCEPTED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Withdrawn => write!(f, "WITHDRAWN"),
        }
    }
}

/// A price offer on a dataset. `price_pct` is in percent of par.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub dataset_id: DatasetId,
    pub investor: UserId,
    pub offer_type: OfferType,
    pub price_pct: Decimal,
    pub status: OfferStatus,
    pub submitted_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Offer {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == OfferStatus::Submitted
    }
}

// ---------------------------------------------------------------------------
// Transaction stage
// ---------------------------------------------------------------------------

/// Everything stage resolution looks at for one (dataset, investor) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSnapshot {
    pub nda_status: Option<NdaStatus>,
    pub response: Option<InvestorResponse>,
    pub data_accessed: bool,
    /// Price of the most recent non-withdrawn offer.
    pub submitted_price: Option<Decimal>,
    pub offer_type: Option<OfferType>,
    pub offer_status: Option<OfferStatus>,
    pub closed: bool,
}

/// The ten transaction stages, declared in ascending priority.
///
/// `Ord` follows priority: when several stages' conditions hold, the
/// greatest one is the resolved stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum TransactionStage {
    Listed,
    InterestExpressed,
    NdaRequested,
    NdaExecuted,
    DueDiligence,
    IndicativeOfferSubmitted,
    FirmOfferSubmitted,
    Declined,
    OfferAccepted,
    Closed,
}

impl TransactionStage {
    pub const ALL: [TransactionStage; 10] = [
        Self::Listed,
        Self::InterestExpressed,
        Self::NdaRequested,
        Self::NdaExecuted,
        Self::DueDiligence,
        Self::IndicativeOfferSubmitted,
        Self::FirmOfferSubmitted,
        Self::Declined,
        Self::OfferAccepted,
        Self::Closed,
    ];

    /// Human-readable label shown in deal pipelines.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Listed => "Listed",
            Self::InterestExpressed => "Interest Expressed",
            Self::NdaRequested => "NDA Requested",
            Self::NdaExecuted => "NDA Executed",
            Self::DueDiligence => "Due Diligence",
            Self::IndicativeOfferSubmitted => "Indicative Offer Submitted",
            Self::FirmOfferSubmitted => "Firm Offer Submitted",
            Self::Declined => "Declined",
            Self::OfferAccepted => "Offer Accepted",
            Self::Closed => "Closed",
        }
    }

    /// 1-based position in the priority order.
    #[must_use]
    pub fn rank(self) -> u8 {
        // Declaration order is priority order.
        self as u8 + 1
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Declined | Self::Closed)
    }
}

impl std::fmt::Display for TransactionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
