use serde::{Deserialize, Serialize};

use super::domain::{DonorId, NgoId};

/// Directory record for a donating organisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donor {
    pub id: DonorId,
    pub name: String,
    pub city: String,
    pub contact_email: String,
}

/// Directory record for a receiving NGO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ngo {
    pub id: NgoId,
    pub name: String,
    pub city: String,
    pub contact_email: String,
}

/// Resolves donor and NGO identities owned by an external directory.
pub trait DirectoryService: Send + Sync {
    fn resolve_donor(&self, id: DonorId) -> Result<Donor, DirectoryError>;
    fn resolve_ngo(&self, id: NgoId) -> Result<Ngo, DirectoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("{0} not found")]
    DonorNotFound(DonorId),
    #[error("{0} not found")]
    NgoNotFound(NgoId),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}
