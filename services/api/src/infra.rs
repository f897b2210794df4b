use food_rescue::config::AccessTokenGrant;
use food_rescue::donations::{
    DirectoryError, DirectoryService, DonationService, Donor, DonorId, IdentityError,
    IdentityProvider, MemoryEntityStore, Ngo, NgoId, Principal,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ApiService =
    DonationService<MemoryEntityStore, InMemoryDirectory, ConfiguredIdentityProvider>;

/// Registration payload shared by donors and NGOs.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Registration {
    pub(crate) name: String,
    pub(crate) city: String,
    pub(crate) contact_email: String,
}

#[derive(Default)]
struct Directory {
    donors: BTreeMap<DonorId, Donor>,
    ngos: BTreeMap<NgoId, Ngo>,
}

/// Process-local donor and NGO registry backing the directory routes.
#[derive(Default)]
pub(crate) struct InMemoryDirectory {
    records: Mutex<Directory>,
}

impl InMemoryDirectory {
    fn lock(&self) -> Result<MutexGuard<'_, Directory>, DirectoryError> {
        self.records
            .lock()
            .map_err(|_| DirectoryError::Unavailable("directory mutex poisoned".to_string()))
    }

    pub(crate) fn register_donor(&self, registration: Registration) -> Result<Donor, DirectoryError> {
        let mut guard = self.lock()?;
        let id = DonorId(guard.donors.len() as u64 + 1);
        let donor = Donor {
            id,
            name: registration.name,
            city: registration.city,
            contact_email: registration.contact_email,
        };
        guard.donors.insert(id, donor.clone());
        Ok(donor)
    }

    pub(crate) fn register_ngo(&self, registration: Registration) -> Result<Ngo, DirectoryError> {
        let mut guard = self.lock()?;
        let id = NgoId(guard.ngos.len() as u64 + 1);
        let ngo = Ngo {
            id,
            name: registration.name,
            city: registration.city,
            contact_email: registration.contact_email,
        };
        guard.ngos.insert(id, ngo.clone());
        Ok(ngo)
    }

    pub(crate) fn donors(&self) -> Result<Vec<Donor>, DirectoryError> {
        Ok(self.lock()?.donors.values().cloned().collect())
    }

    pub(crate) fn ngos(&self) -> Result<Vec<Ngo>, DirectoryError> {
        Ok(self.lock()?.ngos.values().cloned().collect())
    }
}

impl DirectoryService for InMemoryDirectory {
    fn resolve_donor(&self, id: DonorId) -> Result<Donor, DirectoryError> {
        self.lock()?
            .donors
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::DonorNotFound(id))
    }

    fn resolve_ngo(&self, id: NgoId) -> Result<Ngo, DirectoryError> {
        self.lock()?
            .ngos
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::NgoNotFound(id))
    }
}

/// Identity provider seeded from `APP_ACCESS_TOKENS` at startup.
#[derive(Debug, Default)]
pub(crate) struct ConfiguredIdentityProvider {
    principals: HashMap<String, Principal>,
}

impl ConfiguredIdentityProvider {
    pub(crate) fn from_grants(grants: &[AccessTokenGrant]) -> Self {
        let principals = grants
            .iter()
            .map(|grant| {
                let principal = Principal {
                    subject: grant.subject.clone(),
                    role: grant.role,
                };
                (grant.token.clone(), principal)
            })
            .collect();
        Self { principals }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }
}

impl IdentityProvider for ConfiguredIdentityProvider {
    fn authenticate(&self, credential: &str) -> Result<Principal, IdentityError> {
        self.principals
            .get(credential)
            .cloned()
            .ok_or(IdentityError::Unauthenticated)
    }
}
