use std::sync::Arc;

use super::claims::ClaimArbitrator;
use super::clock::{Clock, SystemClock};
use super::directory::DirectoryService;
use super::error::DonationError;
use super::identity::{IdentityProvider, Principal, Role};
use super::lifecycle::ListingLifecycle;
use super::search::ListingSearch;
use super::store::EntityStore;

/// Service composing the lifecycle manager, claim arbitrator, and search facade over one
/// shared store, plus the identity provider the transport uses to authorize callers.
pub struct DonationService<S, D, I> {
    listings: ListingLifecycle<S, D>,
    claims: ClaimArbitrator<S, D>,
    search: ListingSearch<S>,
    identity: Arc<I>,
}

impl<S, D, I> DonationService<S, D, I>
where
    S: EntityStore + 'static,
    D: DirectoryService + 'static,
    I: IdentityProvider + 'static,
{
    pub fn new(store: Arc<S>, directory: Arc<D>, identity: Arc<I>) -> Self {
        Self::with_clock(store, directory, identity, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<S>,
        directory: Arc<D>,
        identity: Arc<I>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            listings: ListingLifecycle::new(store.clone(), directory.clone(), clock.clone()),
            claims: ClaimArbitrator::new(store.clone(), directory, clock),
            search: ListingSearch::new(store),
            identity,
        }
    }

    pub fn listings(&self) -> &ListingLifecycle<S, D> {
        &self.listings
    }

    pub fn claims(&self) -> &ClaimArbitrator<S, D> {
        &self.claims
    }

    pub fn search(&self) -> &ListingSearch<S> {
        &self.search
    }

    /// Authenticate a bearer credential and require `role`.
    ///
    /// Only the role is checked. The returned principal's subject is not matched against
    /// the `donor_id` or `ngo_id` the request acts for, so any DONOR credential may act for
    /// any donor and any NGO credential for any NGO.
    pub fn authorize(
        &self,
        credential: Option<&str>,
        role: Role,
    ) -> Result<Principal, DonationError> {
        let credential = credential.ok_or(DonationError::Unauthenticated)?;
        let principal = self.identity.authenticate(credential)?;
        principal.require(role)?;
        Ok(principal)
    }
}
