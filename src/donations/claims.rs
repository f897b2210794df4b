//! Claim arbitration.
//!
//! A claim and the OPEN -> CLAIMED flip of its listing are written in one transaction on
//! the listing's key. The listing status is re-read inside that transaction, so when two
//! NGOs race for the same listing the second transaction to take the key sees CLAIMED and
//! fails with a conflict instead of writing a second claim.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::directory::DirectoryService;
use super::domain::{
    Claim, ClaimDraft, ClaimId, ClaimRequest, Listing, ListingId, ListingStatus,
};
use super::error::{ConflictError, DonationError};
use super::lifecycle::apply_transition;
use super::store::EntityStore;

/// Result of a confirmed pickup: the collected listing and the claim that received it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pickup {
    pub listing: Listing,
    pub claim: Claim,
}

pub struct ClaimArbitrator<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    clock: Arc<dyn Clock>,
}

impl<S, D> ClaimArbitrator<S, D>
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

    /// Record a PENDING claim and mark the listing CLAIMED, or fail without writing anything.
    pub fn submit_claim(&self, request: ClaimRequest) -> Result<Claim, DonationError> {
        let ClaimRequest {
            listing_id,
            ngo_id,
            note,
        } = request;

        self.store.listing(listing_id)?;
        self.directory.resolve_ngo(ngo_id)?;
        let created_at = self.clock.now();

        let outcome = self.store.transaction(listing_id, |txn| -> Result<Claim, DonationError> {
            let listing = txn.listing(listing_id)?;
            if listing.status != ListingStatus::Open {
                return Err(ConflictError::ListingNotOpen {
                    listing: listing_id,
                    status: listing.status,
                }
                .into());
            }

            if txn
                .claims_for_listing(listing_id)?
                .iter()
                .any(|existing| existing.ngo_id == ngo_id)
            {
                return Err(ConflictError::DuplicateClaim {
                    listing: listing_id,
                    ngo: ngo_id,
                }
                .into());
            }

            let claim = txn.insert_claim(ClaimDraft {
                listing_id,
                ngo_id,
                note,
                created_at,
            })?;
            apply_transition(txn, listing_id, ListingStatus::Open, ListingStatus::Claimed)?;
            Ok(claim)
        });

        match &outcome {
            Ok(claim) => {
                info!(claim = %claim.id, listing = %listing_id, ngo = %ngo_id, "claim granted")
            }
            Err(DonationError::Conflict(reason)) => {
                debug!(listing = %listing_id, ngo = %ngo_id, %reason, "claim rejected")
            }
            Err(err) => {
                warn!(listing = %listing_id, ngo = %ngo_id, error = %err, "claim submission failed")
            }
        }
        outcome
    }

    /// Hand a CLAIMED listing to its claimant: claim -> PICKED_UP, listing -> COLLECTED.
    pub fn confirm_pickup(&self, listing_id: ListingId) -> Result<Pickup, DonationError> {
        let pickup = self.store.transaction(listing_id, |txn| -> Result<Pickup, DonationError> {
            let (listing, claim) = apply_transition(
                txn,
                listing_id,
                ListingStatus::Claimed,
                ListingStatus::Collected,
            )?;
            let claim = claim.ok_or(ConflictError::NoActiveClaim {
                listing: listing_id,
            })?;
            Ok(Pickup { listing, claim })
        })?;

        info!(listing = %listing_id, claim = %pickup.claim.id, "pickup confirmed");
        Ok(pickup)
    }

    pub fn claim(&self, claim_id: ClaimId) -> Result<Claim, DonationError> {
        Ok(self.store.claim(claim_id)?)
    }

    /// Claims recorded against a listing, oldest first.
    pub fn claims_for_listing(&self, listing_id: ListingId) -> Result<Vec<Claim>, DonationError> {
        self.store.listing(listing_id)?;
        let mut claims: Vec<Claim> = self
            .store
            .query_claims(move |claim| claim.listing_id == listing_id)?
            .collect();
        claims.sort_by_key(|claim| claim.id);
        Ok(claims)
    }
}
