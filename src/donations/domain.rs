use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} {}", $label, self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier assigned by the entity store on first insert.
    ListingId,
    "listing"
);
entity_id!(ClaimId, "claim");
entity_id!(
    /// Directory identifier for a donating organisation.
    DonorId,
    "donor"
);
entity_id!(NgoId, "ngo");

/// Lifecycle of a listing. Only the edges in [`ListingStatus::can_transition_to`] exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Open,
    Claimed,
    Collected,
    Cancelled,
}

impl ListingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ListingStatus::Open => "OPEN",
            ListingStatus::Claimed => "CLAIMED",
            ListingStatus::Collected => "COLLECTED",
            ListingStatus::Cancelled => "CANCELLED",
        }
    }

    /// Case-insensitive parse of the wire label.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Some(Self::Open),
            "CLAIMED" => Some(Self::Claimed),
            "COLLECTED" => Some(Self::Collected),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub const fn can_transition_to(self, next: ListingStatus) -> bool {
        matches!(
            (self, next),
            (ListingStatus::Open, ListingStatus::Claimed)
                | (ListingStatus::Claimed, ListingStatus::Collected)
                | (ListingStatus::Open, ListingStatus::Cancelled)
                | (ListingStatus::Claimed, ListingStatus::Cancelled)
        )
    }

    /// COLLECTED and CANCELLED have no outgoing edges.
    pub const fn is_terminal(self) -> bool {
        matches!(self, ListingStatus::Collected | ListingStatus::Cancelled)
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Denied,
    PickedUp,
}

impl ClaimStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "PENDING",
            ClaimStatus::Approved => "APPROVED",
            ClaimStatus::Denied => "DENIED",
            ClaimStatus::PickedUp => "PICKED_UP",
        }
    }

    /// PENDING and APPROVED claims still hold the listing.
    pub const fn is_active(self) -> bool {
        matches!(self, ClaimStatus::Pending | ClaimStatus::Approved)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Raw listing payload as submitted by a donor, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSubmission {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub quantity: i64,
    pub unit: String,
    pub expires_at: DateTime<Utc>,
    pub city: String,
}

/// Validated listing contents awaiting an id from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingDraft {
    pub donor_id: DonorId,
    pub title: String,
    pub description: String,
    pub quantity: u32,
    pub unit: String,
    pub expires_at: DateTime<Utc>,
    pub city: String,
}

/// A donor's offer of surplus food.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub donor_id: DonorId,
    pub title: String,
    pub description: String,
    pub quantity: u32,
    pub unit: String,
    pub expires_at: DateTime<Utc>,
    pub city: String,
    pub status: ListingStatus,
}

impl Listing {
    pub(crate) fn from_draft(id: ListingId, draft: ListingDraft) -> Self {
        Self {
            id,
            donor_id: draft.donor_id,
            title: draft.title,
            description: draft.description,
            quantity: draft.quantity,
            unit: draft.unit,
            expires_at: draft.expires_at,
            city: draft.city,
            status: ListingStatus::Open,
        }
    }
}

/// Claim request as received from an NGO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub listing_id: ListingId,
    pub ngo_id: NgoId,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimDraft {
    pub listing_id: ListingId,
    pub ngo_id: NgoId,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An NGO's request to receive a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub listing_id: ListingId,
    pub ngo_id: NgoId,
    pub status: ClaimStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Claim {
    pub(crate) fn from_draft(id: ClaimId, draft: ClaimDraft) -> Self {
        Self {
            id,
            listing_id: draft.listing_id,
            ngo_id: draft.ngo_id,
            status: ClaimStatus::Pending,
            note: draft.note,
            created_at: draft.created_at,
        }
    }
}
