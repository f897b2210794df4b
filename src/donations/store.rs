//! Entity store for listings and claims.
//!
//! Multi-entity mutations go through [`EntityStore::transaction`], which is scoped to one
//! listing key: transactions on the same listing serialize, transactions on different
//! listings run in parallel. Writes made through the transaction handle are staged and
//! only become visible when the closure returns `Ok`; an error or a panic discards them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::domain::{Claim, ClaimDraft, ClaimId, Listing, ListingDraft, ListingId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Listing,
    Claim,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Listing => f.write_str("listing"),
            EntityKind::Claim => f.write_str("claim"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: u64 },
    #[error("transaction scoped to {key} cannot touch {touched}")]
    OutOfScope { key: ListingId, touched: ListingId },
    #[error("entity store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    fn listing_missing(id: ListingId) -> Self {
        Self::NotFound {
            kind: EntityKind::Listing,
            id: id.0,
        }
    }

    fn claim_missing(id: ClaimId) -> Self {
        Self::NotFound {
            kind: EntityKind::Claim,
            id: id.0,
        }
    }
}

/// Finite, single-pass result of a store query.
pub type Query<T> = Box<dyn Iterator<Item = T> + Send>;

/// Handle passed to a transaction closure. Reads observe the transaction's own staged writes.
pub trait StoreTransaction {
    fn listing(&mut self, id: ListingId) -> Result<Listing, StoreError>;
    fn claims_for_listing(&mut self, id: ListingId) -> Result<Vec<Claim>, StoreError>;
    fn insert_claim(&mut self, draft: ClaimDraft) -> Result<Claim, StoreError>;
    fn put_listing(&mut self, listing: Listing) -> Result<Listing, StoreError>;
    fn put_claim(&mut self, claim: Claim) -> Result<Claim, StoreError>;
}

/// Storage abstraction so the lifecycle and arbitration services can be exercised in isolation.
pub trait EntityStore: Send + Sync {
    fn listing(&self, id: ListingId) -> Result<Listing, StoreError>;
    fn claim(&self, id: ClaimId) -> Result<Claim, StoreError>;
    /// Assigns a fresh id; the listing starts OPEN.
    fn insert_listing(&self, draft: ListingDraft) -> Result<Listing, StoreError>;
    fn query_listings<F>(&self, predicate: F) -> Result<Query<Listing>, StoreError>
    where
        F: Fn(&Listing) -> bool + Send + 'static;
    fn query_claims<F>(&self, predicate: F) -> Result<Query<Claim>, StoreError>
    where
        F: Fn(&Claim) -> bool + Send + 'static;
    /// Run `work` under the lock for `key`, committing its writes only if it returns `Ok`.
    /// Fails with `NotFound` when `key` is not a stored listing.
    fn transaction<T, E, F>(&self, key: ListingId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    listings: BTreeMap<ListingId, Listing>,
    claims: BTreeMap<ClaimId, Claim>,
    claims_by_listing: HashMap<ListingId, Vec<ClaimId>>,
}

/// In-process store with per-listing locks and staged commits.
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    tables: RwLock<Tables>,
    key_locks: Mutex<HashMap<ListingId, Arc<Mutex<()>>>>,
    listing_sequence: AtomicU64,
    claim_sequence: AtomicU64,
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Unavailable("store lock poisoned by a panicked writer".to_string())
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(poisoned)
    }

    /// Lock for an existing listing. Unknown keys fail before a lock entry is created.
    fn key_lock(&self, key: ListingId) -> Result<Arc<Mutex<()>>, StoreError> {
        if !self.read()?.listings.contains_key(&key) {
            return Err(StoreError::listing_missing(key));
        }
        let mut locks = self.key_locks.lock().map_err(poisoned)?;
        Ok(locks.entry(key).or_default().clone())
    }

    fn next_listing_id(&self) -> ListingId {
        ListingId(self.listing_sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn next_claim_id(&self) -> ClaimId {
        ClaimId(self.claim_sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl EntityStore for MemoryEntityStore {
    fn listing(&self, id: ListingId) -> Result<Listing, StoreError> {
        self.read()?
            .listings
            .get(&id)
            .cloned()
            .ok_or(StoreError::listing_missing(id))
    }

    fn claim(&self, id: ClaimId) -> Result<Claim, StoreError> {
        self.read()?
            .claims
            .get(&id)
            .cloned()
            .ok_or(StoreError::claim_missing(id))
    }

    fn insert_listing(&self, draft: ListingDraft) -> Result<Listing, StoreError> {
        let listing = Listing::from_draft(self.next_listing_id(), draft);
        self.write()?.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    fn query_listings<F>(&self, predicate: F) -> Result<Query<Listing>, StoreError>
    where
        F: Fn(&Listing) -> bool + Send + 'static,
    {
        let snapshot: Vec<Listing> = self.read()?.listings.values().cloned().collect();
        Ok(Box::new(
            snapshot.into_iter().filter(move |listing| predicate(listing)),
        ))
    }

    fn query_claims<F>(&self, predicate: F) -> Result<Query<Claim>, StoreError>
    where
        F: Fn(&Claim) -> bool + Send + 'static,
    {
        let snapshot: Vec<Claim> = self.read()?.claims.values().cloned().collect();
        Ok(Box::new(
            snapshot.into_iter().filter(move |claim| predicate(claim)),
        ))
    }

    fn transaction<T, E, F>(&self, key: ListingId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let lock = self.key_lock(key)?;
        // The unit mutex guards no data, so a poisoned guard is still a valid lock.
        let _held = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut txn = MemoryTransaction::new(self, key);
        let value = work(&mut txn)?;
        txn.commit()?;
        Ok(value)
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryEntityStore,
    key: ListingId,
    listings: BTreeMap<ListingId, Listing>,
    claims: BTreeMap<ClaimId, Claim>,
}

impl<'a> MemoryTransaction<'a> {
    fn new(store: &'a MemoryEntityStore, key: ListingId) -> Self {
        Self {
            store,
            key,
            listings: BTreeMap::new(),
            claims: BTreeMap::new(),
        }
    }

    fn in_scope(&self, touched: ListingId) -> Result<(), StoreError> {
        if touched == self.key {
            Ok(())
        } else {
            Err(StoreError::OutOfScope {
                key: self.key,
                touched,
            })
        }
    }

    fn commit(self) -> Result<(), StoreError> {
        if self.listings.is_empty() && self.claims.is_empty() {
            return Ok(());
        }

        let staged_listings = self.listings.len();
        let staged_claims = self.claims.len();
        let mut tables = self.store.write()?;
        for (id, listing) in self.listings {
            tables.listings.insert(id, listing);
        }
        for (id, claim) in self.claims {
            let listing_id = claim.listing_id;
            if tables.claims.insert(id, claim).is_none() {
                tables
                    .claims_by_listing
                    .entry(listing_id)
                    .or_default()
                    .push(id);
            }
        }

        debug!(
            key = %self.key,
            listings = staged_listings,
            claims = staged_claims,
            "transaction committed"
        );
        Ok(())
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn listing(&mut self, id: ListingId) -> Result<Listing, StoreError> {
        self.in_scope(id)?;
        if let Some(staged) = self.listings.get(&id) {
            return Ok(staged.clone());
        }
        self.store.listing(id)
    }

    fn claims_for_listing(&mut self, id: ListingId) -> Result<Vec<Claim>, StoreError> {
        self.in_scope(id)?;
        let mut claims: BTreeMap<ClaimId, Claim> = BTreeMap::new();
        {
            let tables = self.store.read()?;
            if let Some(ids) = tables.claims_by_listing.get(&id) {
                for claim in ids.iter().filter_map(|claim_id| tables.claims.get(claim_id)) {
                    claims.insert(claim.id, claim.clone());
                }
            }
        }
        for (claim_id, staged) in &self.claims {
            if staged.listing_id == id {
                claims.insert(*claim_id, staged.clone());
            }
        }
        Ok(claims.into_values().collect())
    }

    fn insert_claim(&mut self, draft: ClaimDraft) -> Result<Claim, StoreError> {
        self.in_scope(draft.listing_id)?;
        let claim = Claim::from_draft(self.store.next_claim_id(), draft);
        self.claims.insert(claim.id, claim.clone());
        Ok(claim)
    }

    fn put_listing(&mut self, listing: Listing) -> Result<Listing, StoreError> {
        self.in_scope(listing.id)?;
        if !self.listings.contains_key(&listing.id)
            && !self.store.read()?.listings.contains_key(&listing.id)
        {
            return Err(StoreError::listing_missing(listing.id));
        }
        self.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    fn put_claim(&mut self, claim: Claim) -> Result<Claim, StoreError> {
        self.in_scope(claim.listing_id)?;
        if !self.claims.contains_key(&claim.id) {
            let committed = self.store.read()?.claims.get(&claim.id).cloned();
            match committed {
                Some(existing) if existing.listing_id == claim.listing_id => {}
                Some(existing) => {
                    return Err(StoreError::OutOfScope {
                        key: self.key,
                        touched: existing.listing_id,
                    })
                }
                None => return Err(StoreError::claim_missing(claim.id)),
            }
        }
        self.claims.insert(claim.id, claim.clone());
        Ok(claim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::donations::domain::{ClaimStatus, DonorId, ListingStatus, NgoId};
    use chrono::{TimeZone, Utc};

    fn draft(city: &str) -> ListingDraft {
        ListingDraft {
            donor_id: DonorId(1),
            title: "Bread".to_string(),
            description: String::new(),
            quantity: 12,
            unit: "loaves".to_string(),
            expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            city: city.to_string(),
        }
    }

    fn claim_draft(listing_id: ListingId, ngo: u64) -> ClaimDraft {
        ClaimDraft {
            listing_id,
            ngo_id: NgoId(ngo),
            note: None,
            created_at: Utc.with_ymd_and_hms(2029, 12, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn insert_assigns_sequential_ids_and_open_status() {
        let store = MemoryEntityStore::new();
        let first = store.insert_listing(draft("Durban")).unwrap();
        let second = store.insert_listing(draft("Durban")).unwrap();
        assert_eq!(first.id, ListingId(1));
        assert_eq!(second.id, ListingId(2));
        assert_eq!(first.status, ListingStatus::Open);
        assert_eq!(store.listing(first.id).unwrap(), first);
    }

    #[test]
    fn get_reports_missing_entities() {
        let store = MemoryEntityStore::new();
        assert_eq!(
            store.listing(ListingId(9)),
            Err(StoreError::NotFound {
                kind: EntityKind::Listing,
                id: 9
            })
        );
        assert_eq!(
            store.claim(ClaimId(2)),
            Err(StoreError::NotFound {
                kind: EntityKind::Claim,
                id: 2
            })
        );
    }

    #[test]
    fn query_filters_lazily_over_snapshot() {
        let store = MemoryEntityStore::new();
        store.insert_listing(draft("Durban")).unwrap();
        store.insert_listing(draft("Pretoria")).unwrap();
        store.insert_listing(draft("Durban")).unwrap();

        let durban: Vec<ListingId> = store
            .query_listings(|listing| listing.city == "Durban")
            .unwrap()
            .map(|listing| listing.id)
            .collect();
        assert_eq!(durban, vec![ListingId(1), ListingId(3)]);
    }

    #[test]
    fn transaction_commits_all_staged_writes_together() {
        let store = MemoryEntityStore::new();
        let listing = store.insert_listing(draft("Durban")).unwrap();

        let claim = store
            .transaction(listing.id, |txn| -> Result<Claim, StoreError> {
                let claim = txn.insert_claim(claim_draft(listing.id, 5))?;
                let mut staged = txn.listing(listing.id)?;
                staged.status = ListingStatus::Claimed;
                txn.put_listing(staged)?;
                assert_eq!(txn.listing(listing.id)?.status, ListingStatus::Claimed);
                assert_eq!(txn.claims_for_listing(listing.id)?.len(), 1);
                Ok(claim)
            })
            .unwrap();

        assert_eq!(store.claim(claim.id).unwrap().status, ClaimStatus::Pending);
        assert_eq!(
            store.listing(listing.id).unwrap().status,
            ListingStatus::Claimed
        );
    }

    #[test]
    fn failed_transaction_leaves_no_writes() {
        let store = MemoryEntityStore::new();
        let listing = store.insert_listing(draft("Durban")).unwrap();

        let result = store.transaction(listing.id, |txn| -> Result<(), StoreError> {
            txn.insert_claim(claim_draft(listing.id, 5))?;
            Err(StoreError::Unavailable("disk full".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(store.query_claims(|_| true).unwrap().count(), 0);
        assert_eq!(store.listing(listing.id).unwrap().status, ListingStatus::Open);
    }

    #[test]
    fn panicking_transaction_leaves_no_writes_and_releases_the_key() {
        let store = MemoryEntityStore::new();
        let listing = store.insert_listing(draft("Durban")).unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = store.transaction(listing.id, |txn| -> Result<(), StoreError> {
                txn.insert_claim(claim_draft(listing.id, 5))?;
                panic!("worker crashed mid-transaction");
            });
        }));
        assert!(outcome.is_err());
        assert_eq!(store.query_claims(|_| true).unwrap().count(), 0);

        let claims = store
            .transaction(listing.id, |txn| txn.claims_for_listing(listing.id))
            .unwrap();
        assert!(claims.is_empty());
    }

    #[test]
    fn transaction_rejects_keys_outside_its_scope() {
        let store = MemoryEntityStore::new();
        let scoped = store.insert_listing(draft("Durban")).unwrap();
        let other = store.insert_listing(draft("Durban")).unwrap();

        let result = store.transaction(scoped.id, |txn| txn.listing(other.id));
        assert_eq!(
            result,
            Err(StoreError::OutOfScope {
                key: scoped.id,
                touched: other.id
            })
        );
    }

    #[test]
    fn transactions_on_unknown_listings_do_not_grow_the_lock_table() {
        let store = MemoryEntityStore::new();
        let listing = store.insert_listing(draft("Durban")).unwrap();

        for raw in 1000..1500 {
            let id = ListingId(raw);
            let result = store.transaction(id, |txn| txn.listing(id));
            assert_eq!(result, Err(StoreError::listing_missing(id)));
        }
        assert_eq!(store.key_locks.lock().unwrap().len(), 0);

        store
            .transaction(listing.id, |txn| txn.listing(listing.id))
            .unwrap();
        assert_eq!(store.key_locks.lock().unwrap().len(), 1);
    }

    #[test]
    fn put_requires_an_assigned_id() {
        let store = MemoryEntityStore::new();
        let listing = store.insert_listing(draft("Durban")).unwrap();
        let phantom = Listing {
            id: ListingId(40),
            ..listing
        };

        let result = store.transaction(phantom.id, |txn| txn.put_listing(phantom.clone()));
        assert_eq!(
            result,
            Err(StoreError::NotFound {
                kind: EntityKind::Listing,
                id: 40
            })
        );
    }
}
