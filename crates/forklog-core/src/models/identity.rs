//! Identity model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account id of a real (non-anonymous) signed-in user.
///
/// Remote ledger calls take an `&AccountId`, so they cannot be issued for
/// anonymous or unauthenticated sessions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "account id must not be empty".to_string(),
            ));
        }
        if id.contains('/') {
            return Err(crate::Error::InvalidInput(format!(
                "account id must not contain '/': {id}"
            )));
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who owns the data right now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Identity {
    #[default]
    Unauthenticated,
    Anonymous,
    Real(AccountId),
}

impl Identity {
    pub fn real(account_id: impl Into<String>) -> crate::Result<Self> {
        Ok(Self::Real(AccountId::new(account_id)?))
    }

    /// Account id when this identity participates in remote sync.
    #[must_use]
    pub const fn account_id(&self) -> Option<&AccountId> {
        match self {
            Self::Real(account_id) => Some(account_id),
            Self::Unauthenticated | Self::Anonymous => None,
        }
    }

    #[must_use]
    pub const fn is_real(&self) -> bool {
        matches!(self, Self::Real(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => f.write_str("unauthenticated"),
            Self::Anonymous => f.write_str("anonymous"),
            Self::Real(account_id) => write!(f, "account:{account_id}"),
        }
    }
}
