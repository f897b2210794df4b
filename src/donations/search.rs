use std::sync::Arc;

use serde::Deserialize;

use super::domain::{Listing, ListingStatus};
use super::error::{DonationError, ValidationError};
use super::store::EntityStore;

/// Raw discovery parameters as they arrive on the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub city: Option<String>,
    pub status: Option<String>,
}

/// Typed discovery filter. `status: None` means "any status".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFilter {
    pub city: Option<String>,
    pub status: Option<ListingStatus>,
}

impl Default for ListingFilter {
    fn default() -> Self {
        Self {
            city: None,
            status: Some(ListingStatus::Open),
        }
    }
}

impl ListingFilter {
    pub fn in_city(city: impl Into<String>) -> Self {
        Self {
            city: Some(city.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: Option<ListingStatus>) -> Self {
        self.status = status;
        self
    }

    /// An absent status means OPEN; an explicitly empty one drops the status filter.
    pub fn from_params(params: SearchParams) -> Result<Self, ValidationError> {
        let city = params
            .city
            .map(|city| city.trim().to_string())
            .filter(|city| !city.is_empty());

        let status = match params.status {
            None => Some(ListingStatus::Open),
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(
                ListingStatus::parse(&raw).ok_or(ValidationError::UnknownStatus(raw))?,
            ),
        };

        Ok(Self { city, status })
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        self.city
            .as_deref()
            .map_or(true, |city| listing.city == city)
            && self.status.map_or(true, |status| listing.status == status)
    }
}

/// Read-only discovery over the entity store.
pub struct ListingSearch<S> {
    store: Arc<S>,
}

impl<S> ListingSearch<S>
where
    S: EntityStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Listings matching `filter`, ordered by id.
    pub fn search(&self, filter: &ListingFilter) -> Result<Vec<Listing>, DonationError> {
        let filter = filter.clone();
        let mut listings: Vec<Listing> = self
            .store
            .query_listings(move |listing| filter.matches(listing))?
            .collect();
        listings.sort_by_key(|listing| listing.id);
        Ok(listings)
    }
}
