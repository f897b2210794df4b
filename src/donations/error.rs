use chrono::{DateTime, Utc};

use super::directory::DirectoryError;
use super::domain::{ClaimId, DonorId, ListingId, ListingStatus, NgoId};
use super::identity::{IdentityError, Role};
use super::store::{EntityKind, StoreError};

/// Rejected input; the caller must change the request before retrying.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("expires_at must be in the future (got {expires_at}, now {now})")]
    ExpiryNotInFuture {
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },
    #[error("quantity must be a positive integer (got {0})")]
    NonPositiveQuantity(i64),
    #[error("quantity {0} exceeds the supported maximum of {}", u32::MAX)]
    QuantityTooLarge(i64),
    #[error("{0} is not registered in the directory")]
    UnknownDonor(DonorId),
    #[error("unknown listing status '{0}'")]
    UnknownStatus(String),
}

/// Losing outcomes of state-machine and arbitration checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("listing not open: {listing} is {status}")]
    ListingNotOpen {
        listing: ListingId,
        status: ListingStatus,
    },
    #[error("duplicate claim: {ngo} already claimed {listing}")]
    DuplicateClaim { listing: ListingId, ngo: NgoId },
    #[error("{listing} is {actual}, caller expected {expected}")]
    StaleStatus {
        listing: ListingId,
        expected: ListingStatus,
        actual: ListingStatus,
    },
    #[error("{listing} cannot move from {from} to {to}")]
    IllegalTransition {
        listing: ListingId,
        from: ListingStatus,
        to: ListingStatus,
    },
    #[error("{listing} has no active claim")]
    NoActiveClaim { listing: ListingId },
}

/// The record a lookup failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Missing {
    #[error("{0}")]
    Listing(ListingId),
    #[error("{0}")]
    Claim(ClaimId),
    #[error("{0}")]
    Ngo(NgoId),
}

/// Coarse classification used by transports to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Unauthenticated,
    Unauthorized,
    Unavailable,
}

impl ErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Unavailable => "unavailable",
        }
    }
}

/// Error returned by every donation operation.
#[derive(Debug, thiserror::Error)]
pub enum DonationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} not found")]
    NotFound(Missing),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error("caller is not authenticated")]
    Unauthenticated,
    #[error("role {actual} may not perform this action (requires {required})")]
    Unauthorized { required: Role, actual: Role },
    #[error("entity store failure: {0}")]
    Store(StoreError),
    #[error("directory failure: {0}")]
    Directory(DirectoryError),
}

impl DonationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DonationError::Validation(_) => ErrorKind::Validation,
            DonationError::NotFound(_) => ErrorKind::NotFound,
            DonationError::Conflict(_) => ErrorKind::Conflict,
            DonationError::Unauthenticated => ErrorKind::Unauthenticated,
            DonationError::Unauthorized { .. } => ErrorKind::Unauthorized,
            DonationError::Store(_) | DonationError::Directory(_) => ErrorKind::Unavailable,
        }
    }
}

impl From<StoreError> for DonationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound {
                kind: EntityKind::Listing,
                id,
            } => Self::NotFound(Missing::Listing(ListingId(id))),
            StoreError::NotFound {
                kind: EntityKind::Claim,
                id,
            } => Self::NotFound(Missing::Claim(ClaimId(id))),
            other => Self::Store(other),
        }
    }
}

impl From<DirectoryError> for DonationError {
    fn from(value: DirectoryError) -> Self {
        match value {
            DirectoryError::NgoNotFound(id) => Self::NotFound(Missing::Ngo(id)),
            DirectoryError::DonorNotFound(id) => Self::Validation(ValidationError::UnknownDonor(id)),
            other => Self::Directory(other),
        }
    }
}

impl From<IdentityError> for DonationError {
    fn from(value: IdentityError) -> Self {
        match value {
            IdentityError::Unauthenticated => Self::Unauthenticated,
            IdentityError::Forbidden { required, actual } => {
                Self::Unauthorized { required, actual }
            }
        }
    }
}
