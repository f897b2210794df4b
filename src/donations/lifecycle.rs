use std::sync::Arc;

use tracing::info;

use super::clock::Clock;
use super::directory::DirectoryService;
use super::domain::{
    Claim, ClaimStatus, DonorId, Listing, ListingDraft, ListingId, ListingStatus, ListingSubmission,
};
use super::error::{ConflictError, DonationError, ValidationError};
use super::store::{EntityStore, StoreTransaction};

/// Owns listing creation and every listing status change.
pub struct ListingLifecycle<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    clock: Arc<dyn Clock>,
}

impl<S, D> ListingLifecycle<S, D>
where
    S: EntityStore + 'static,
    D: DirectoryService + 'static,
{
    pub fn new(store: Arc<S>, directory: Arc<D>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            directory,
            clock,
        }
    }

    /// Validate a donor submission and store it as an OPEN listing.
    pub fn create_listing(
        &self,
        donor_id: DonorId,
        submission: ListingSubmission,
    ) -> Result<Listing, DonationError> {
        let ListingSubmission {
            title,
            description,
            quantity,
            unit,
            expires_at,
            city,
        } = submission;

        let quantity = positive_quantity(quantity)?;
        let now = self.clock.now();
        if expires_at <= now {
            return Err(ValidationError::ExpiryNotInFuture { expires_at, now }.into());
        }

        self.directory.resolve_donor(donor_id)?;

        let listing = self.store.insert_listing(ListingDraft {
            donor_id,
            title,
            description,
            quantity,
            unit,
            expires_at,
            city,
        })?;

        info!(listing = %listing.id, donor = %donor_id, city = %listing.city, "listing published");
        Ok(listing)
    }

    /// Move a listing from the status the caller observed to `next`.
    pub fn transition(
        &self,
        listing_id: ListingId,
        expected: ListingStatus,
        next: ListingStatus,
    ) -> Result<Listing, DonationError> {
        let (listing, _) = self.store.transaction(listing_id, |txn| {
            apply_transition(txn, listing_id, expected, next)
        })?;

        info!(listing = %listing_id, from = %expected, to = %next, "listing transitioned");
        Ok(listing)
    }

    /// Withdraw an OPEN or CLAIMED listing.
    pub fn cancel(&self, listing_id: ListingId) -> Result<Listing, DonationError> {
        let (listing, released) = self.store.transaction(
            listing_id,
            |txn| -> Result<(Listing, Option<Claim>), DonationError> {
                let current = txn.listing(listing_id)?.status;
                apply_transition(txn, listing_id, current, ListingStatus::Cancelled)
            },
        )?;

        info!(
            listing = %listing_id,
            denied_claim = ?released.map(|claim| claim.id),
            "listing cancelled"
        );
        Ok(listing)
    }

    pub fn get(&self, listing_id: ListingId) -> Result<Listing, DonationError> {
        Ok(self.store.listing(listing_id)?)
    }

    /// Every listing regardless of status, ordered by id.
    pub fn all(&self) -> Result<Vec<Listing>, DonationError> {
        let mut listings: Vec<Listing> = self.store.query_listings(|_| true)?.collect();
        listings.sort_by_key(|listing| listing.id);
        Ok(listings)
    }
}

fn positive_quantity(raw: i64) -> Result<u32, ValidationError> {
    if raw <= 0 {
        return Err(ValidationError::NonPositiveQuantity(raw));
    }
    u32::try_from(raw).map_err(|_| ValidationError::QuantityTooLarge(raw))
}

/// Apply one state-machine edge inside an open transaction on the listing's key.
///
/// Fails with a conflict when the stored status differs from `expected` (the caller lost a
/// race) or when `expected -> next` is not an edge. Leaving CLAIMED settles the active claim
/// in the same transaction: COLLECTED marks it PICKED_UP and requires one to exist,
/// CANCELLED marks it DENIED. The settled claim is returned alongside the listing.
pub(crate) fn apply_transition(
    txn: &mut dyn StoreTransaction,
    listing_id: ListingId,
    expected: ListingStatus,
    next: ListingStatus,
) -> Result<(Listing, Option<Claim>), DonationError> {
    let mut listing = txn.listing(listing_id)?;

    if listing.status != expected {
        return Err(ConflictError::StaleStatus {
            listing: listing_id,
            expected,
            actual: listing.status,
        }
        .into());
    }

    if !expected.can_transition_to(next) {
        return Err(ConflictError::IllegalTransition {
            listing: listing_id,
            from: expected,
            to: next,
        }
        .into());
    }

    let settled = if expected == ListingStatus::Claimed {
        settle_active_claim(txn, listing_id, next)?
    } else {
        None
    };

    listing.status = next;
    Ok((txn.put_listing(listing)?, settled))
}

fn settle_active_claim(
    txn: &mut dyn StoreTransaction,
    listing_id: ListingId,
    next: ListingStatus,
) -> Result<Option<Claim>, DonationError> {
    let settled_status = match next {
        ListingStatus::Collected => ClaimStatus::PickedUp,
        ListingStatus::Cancelled => ClaimStatus::Denied,
        ListingStatus::Open | ListingStatus::Claimed => return Ok(None),
    };

    let active = txn
        .claims_for_listing(listing_id)?
        .into_iter()
        .find(|claim| claim.status.is_active());

    match active {
        Some(mut claim) => {
            claim.status = settled_status;
            Ok(Some(txn.put_claim(claim)?))
        }
        None if next == ListingStatus::Collected => Err(ConflictError::NoActiveClaim {
            listing: listing_id,
        }
        .into()),
        None => Ok(None),
    }
}
