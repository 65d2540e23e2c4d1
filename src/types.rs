use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[repr(transparent)]
pub struct Username(pub String);

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored password hash, either `salt.hash` (both base64url) or a PHC-encoded argon2 string.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[repr(transparent)]
pub struct PasswordRecord(pub String);

impl fmt::Debug for PasswordRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordRecord(..)")
    }
}

/// The payload signed inside every token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub username: Username,
    pub issued_at: DateTime<Utc>,
}

impl Claims {
    pub fn new(username: Username, issued_at: DateTime<Utc>) -> Self {
        Self {
            username,
            issued_at,
        }
    }

    /// Claims for a token issued right now.
    pub fn issue(username: Username) -> Self {
        Self::new(username, Utc::now())
    }
}

/// The identity handed to downstream handlers once a request has been authenticated.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: Username,
    pub issued_at: DateTime<Utc>,
    /// The bearer token the client presented.
    pub token: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("username", &self.username)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}
