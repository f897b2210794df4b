//! Surplus-food donation coordination: listing lifecycle, claim arbitration, and discovery.
//!
//! Donor/NGO records and caller authentication belong to external collaborators, consumed
//! through the [`DirectoryService`] and [`IdentityProvider`] traits.

pub mod claims;
pub mod clock;
pub mod directory;
pub mod domain;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod router;
pub mod search;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use claims::{ClaimArbitrator, Pickup};
pub use clock::{Clock, FixedClock, SystemClock};
pub use directory::{DirectoryError, DirectoryService, Donor, Ngo};
pub use domain::{
    Claim, ClaimId, ClaimRequest, ClaimStatus, DonorId, Listing, ListingId, ListingStatus,
    ListingSubmission, NgoId,
};
pub use error::{ConflictError, DonationError, ErrorKind, Missing, ValidationError};
pub use identity::{IdentityError, IdentityProvider, Principal, Role};
pub use lifecycle::ListingLifecycle;
pub use router::donation_router;
pub use search::{ListingFilter, ListingSearch, SearchParams};
pub use service::DonationService;
pub use store::{EntityKind, EntityStore, MemoryEntityStore, StoreError, StoreTransaction};
