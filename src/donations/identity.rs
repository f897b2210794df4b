//! Identity Provider seam. The core never verifies credentials itself; it asks an
//! injected provider who the caller is and checks the reported role.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Donor,
    Ngo,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Donor => "donor",
            Role::Ngo => "ngo",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "donor" => Some(Self::Donor),
            "ngo" => Some(Self::Ngo),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Authenticated caller as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    pub role: Role,
}

impl Principal {
    pub fn require(&self, role: Role) -> Result<(), IdentityError> {
        if self.role == role {
            Ok(())
        } else {
            Err(IdentityError::Forbidden {
                required: role,
                actual: self.role,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("credential was missing, expired, or unknown")]
    Unauthenticated,
    #[error("role {actual} lacks permission (requires {required})")]
    Forbidden { required: Role, actual: Role },
}

pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, credential: &str) -> Result<Principal, IdentityError>;
}
