use std::collections::HashMap;
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::donations::clock::FixedClock;
use crate::donations::directory::{DirectoryError, DirectoryService, Donor, Ngo};
use crate::donations::domain::{
    Claim, ClaimDraft, ClaimId, ClaimRequest, DonorId, Listing, ListingDraft, ListingId,
    ListingSubmission, NgoId,
};
use crate::donations::identity::{IdentityError, IdentityProvider, Principal, Role};
use crate::donations::store::{
    EntityStore, MemoryEntityStore, Query, StoreError, StoreTransaction,
};
use crate::donations::DonationService;

pub(super) const DONOR: DonorId = DonorId(1);
pub(super) const DONOR_TOKEN: &str = "donor-token";
pub(super) const NGO_TOKEN: &str = "ngo-token";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn submission(city: &str) -> ListingSubmission {
    ListingSubmission {
        title: "Surplus bread".to_string(),
        description: "Day-old loaves from the morning bake".to_string(),
        quantity: 40,
        unit: "loaves".to_string(),
        expires_at: now() + Duration::days(1),
        city: city.to_string(),
    }
}

#[derive(Default)]
pub(super) struct MemoryDirectory {
    donors: HashMap<DonorId, Donor>,
    ngos: HashMap<NgoId, Ngo>,
}

impl MemoryDirectory {
    pub(super) fn with_donor(mut self, id: DonorId, name: &str) -> Self {
        self.donors.insert(
            id,
            Donor {
                id,
                name: name.to_string(),
                city: "Durban".to_string(),
                contact_email: format!("donor{}@example.org", id.0),
            },
        );
        self
    }

    pub(super) fn with_ngos(mut self, count: u64) -> Self {
        for raw in 1..=count {
            let id = NgoId(raw);
            self.ngos.insert(
                id,
                Ngo {
                    id,
                    name: format!("Community Kitchen {raw}"),
                    city: "Durban".to_string(),
                    contact_email: format!("kitchen{raw}@example.org"),
                },
            );
        }
        self
    }
}

impl DirectoryService for MemoryDirectory {
    fn resolve_donor(&self, id: DonorId) -> Result<Donor, DirectoryError> {
        self.donors
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::DonorNotFound(id))
    }

    fn resolve_ngo(&self, id: NgoId) -> Result<Ngo, DirectoryError> {
        self.ngos
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::NgoNotFound(id))
    }
}

pub(super) struct TokenIdentity {
    principals: HashMap<String, Principal>,
}

impl Default for TokenIdentity {
    fn default() -> Self {
        let mut principals = HashMap::new();
        principals.insert(
            DONOR_TOKEN.to_string(),
            Principal {
                subject: "market@example.org".to_string(),
                role: Role::Donor,
            },
        );
        principals.insert(
            NGO_TOKEN.to_string(),
            Principal {
                subject: "kitchen1@example.org".to_string(),
                role: Role::Ngo,
            },
        );
        Self { principals }
    }
}

impl IdentityProvider for TokenIdentity {
    fn authenticate(&self, credential: &str) -> Result<Principal, IdentityError> {
        self.principals
            .get(credential)
            .cloned()
            .ok_or(IdentityError::Unauthenticated)
    }
}

pub(super) fn directory() -> Arc<MemoryDirectory> {
    Arc::new(
        MemoryDirectory::default()
            .with_donor(DONOR, "Durban Fresh Market")
            .with_ngos(16),
    )
}

pub(super) type TestService<S> = DonationService<S, MemoryDirectory, TokenIdentity>;

pub(super) fn service_over<S>(store: Arc<S>) -> TestService<S>
where
    S: EntityStore + 'static,
{
    DonationService::with_clock(
        store,
        directory(),
        Arc::new(TokenIdentity::default()),
        Arc::new(FixedClock(now())),
    )
}

pub(super) fn build_service() -> (TestService<MemoryEntityStore>, Arc<MemoryEntityStore>) {
    let store = Arc::new(MemoryEntityStore::new());
    (service_over(store.clone()), store)
}

pub(super) fn open_listing(service: &TestService<impl EntityStore + 'static>) -> Listing {
    service
        .listings()
        .create_listing(DONOR, submission("Durban"))
        .expect("listing is created")
}

/// An OPEN listing claimed through arbitration by `ngo`, with its pending claim.
pub(super) fn claimed_listing(
    service: &TestService<impl EntityStore + 'static>,
    ngo: u64,
) -> (Listing, Claim) {
    let listing = open_listing(service);
    let claim = service
        .claims()
        .submit_claim(ClaimRequest {
            listing_id: listing.id,
            ngo_id: NgoId(ngo),
            note: None,
        })
        .expect("claim is granted");
    (listing, claim)
}

/// Store whose transactions fail on the listing write, after the claim has been staged.
#[derive(Default)]
pub(super) struct SabotagedStore {
    pub(super) inner: MemoryEntityStore,
}

struct SabotagedTransaction<'a> {
    inner: &'a mut dyn StoreTransaction,
}

impl StoreTransaction for SabotagedTransaction<'_> {
    fn listing(&mut self, id: ListingId) -> Result<Listing, StoreError> {
        self.inner.listing(id)
    }

    fn claims_for_listing(&mut self, id: ListingId) -> Result<Vec<Claim>, StoreError> {
        self.inner.claims_for_listing(id)
    }

    fn insert_claim(&mut self, draft: ClaimDraft) -> Result<Claim, StoreError> {
        self.inner.insert_claim(draft)
    }

    fn put_listing(&mut self, _listing: Listing) -> Result<Listing, StoreError> {
        Err(StoreError::Unavailable("listing write timed out".to_string()))
    }

    fn put_claim(&mut self, claim: Claim) -> Result<Claim, StoreError> {
        self.inner.put_claim(claim)
    }
}

impl EntityStore for SabotagedStore {
    fn listing(&self, id: ListingId) -> Result<Listing, StoreError> {
        self.inner.listing(id)
    }

    fn claim(&self, id: ClaimId) -> Result<Claim, StoreError> {
        self.inner.claim(id)
    }

    fn insert_listing(&self, draft: ListingDraft) -> Result<Listing, StoreError> {
        self.inner.insert_listing(draft)
    }

    fn query_listings<F>(&self, predicate: F) -> Result<Query<Listing>, StoreError>
    where
        F: Fn(&Listing) -> bool + Send + 'static,
    {
        self.inner.query_listings(predicate)
    }

    fn query_claims<F>(&self, predicate: F) -> Result<Query<Claim>, StoreError>
    where
        F: Fn(&Claim) -> bool + Send + 'static,
    {
        self.inner.query_claims(predicate)
    }

    fn transaction<T, E, F>(&self, key: ListingId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.inner.transaction(key, |txn| {
            let mut sabotaged = SabotagedTransaction { inner: txn };
            work(&mut sabotaged)
        })
    }
}

pub(super) struct UnavailableStore;

fn offline() -> StoreError {
    StoreError::Unavailable("database offline".to_string())
}

impl EntityStore for UnavailableStore {
    fn listing(&self, _id: ListingId) -> Result<Listing, StoreError> {
        Err(offline())
    }

    fn claim(&self, _id: ClaimId) -> Result<Claim, StoreError> {
        Err(offline())
    }

    fn insert_listing(&self, _draft: ListingDraft) -> Result<Listing, StoreError> {
        Err(offline())
    }

    fn query_listings<F>(&self, _predicate: F) -> Result<Query<Listing>, StoreError>
    where
        F: Fn(&Listing) -> bool + Send + 'static,
    {
        Err(offline())
    }

    fn query_claims<F>(&self, _predicate: F) -> Result<Query<Claim>, StoreError>
    where
        F: Fn(&Claim) -> bool + Send + 'static,
    {
        Err(offline())
    }

    fn transaction<T, E, F>(&self, _key: ListingId, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        Err(offline().into())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
