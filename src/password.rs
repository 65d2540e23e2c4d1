use std::str::FromStr;

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::{
    constant_time::bytes_equal,
    error::{AuthError, UnknownPasswordScheme},
    token::{base64url_decode, base64url_encode, split_token},
    types::PasswordRecord,
};

pub const SALT_LEN: usize = 32;

const ARGON2_PREFIX: &str = "$argon2";

/// Upper bound on the encoded salt and hash segments of an argon2 record.
const MAX_ARGON2_SEGMENT_LEN: usize = 128;

/// How new password records are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PasswordScheme {
    /// `base64url(salt).base64url(sha256(salt || password))`
    #[default]
    Salted,
    /// PHC-encoded argon2 string.
    Argon2,
}

impl PasswordScheme {
    fn of(record: &PasswordRecord) -> Self {
        if record.0.starts_with(ARGON2_PREFIX) {
            PasswordScheme::Argon2
        } else {
            PasswordScheme::Salted
        }
    }
}

impl FromStr for PasswordScheme {
    type Err = UnknownPasswordScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("salted") {
            Ok(PasswordScheme::Salted)
        } else if s.eq_ignore_ascii_case("argon2") {
            Ok(PasswordScheme::Argon2)
        } else {
            Err(UnknownPasswordScheme(s.to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordHasher {
    scheme: PasswordScheme,
}

impl PasswordHasher {
    pub fn new(scheme: PasswordScheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> PasswordScheme {
        self.scheme
    }

    /// Hash `password` under a freshly generated salt.
    pub fn hash(&self, password: &str) -> Result<PasswordRecord, AuthError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.try_fill_bytes(&mut salt)?;

        let record = match self.scheme {
            PasswordScheme::Salted => {
                let hash = salted_digest(&salt, password);
                format!("{}.{}", base64url_encode(&salt), base64url_encode(&hash))
            }
            PasswordScheme::Argon2 => {
                argon2::hash_encoded(password.as_bytes(), &salt, &Default::default())?
            }
        };

        Ok(PasswordRecord(record))
    }

    /// Check `password` against a stored record.
    ///
    /// Records of either scheme are accepted regardless of the configured one.
    /// A missing, truncated or otherwise unreadable record never matches.
    pub fn verify(&self, password: &str, record: Option<&PasswordRecord>) -> bool {
        let Some(record) = record else {
            return false;
        };

        match PasswordScheme::of(record) {
            PasswordScheme::Argon2 => {
                has_issued_argon2_params(&record.0)
                    && argon2::verify_encoded(&record.0, password.as_bytes()).unwrap_or(false)
            }
            PasswordScheme::Salted => {
                let Some((salt, hash)) = split_token(&record.0) else {
                    return false;
                };
                match (base64url_decode(salt), base64url_decode(hash)) {
                    (Some(salt), Some(hash)) => {
                        bytes_equal(&hash, &salted_digest(&salt, password))
                    }
                    _ => false,
                }
            }
        }
    }

    /// Whether `record` was produced by a scheme other than the configured one.
    pub fn needs_rehash(&self, record: &PasswordRecord) -> bool {
        PasswordScheme::of(record) != self.scheme
    }
}

/// Whether `encoded` carries exactly the variant, version and cost parameters
/// that [`PasswordHasher::hash`] writes. The costs of any other record come
/// from stored data and are never handed to argon2.
fn has_issued_argon2_params(encoded: &str) -> bool {
    let config = argon2::Config::default();
    let version = format!("v={}", config.version.as_u32());
    let params = format!(
        "m={},t={},p={}",
        config.mem_cost, config.time_cost, config.lanes
    );
    let segment_ok = |segment: Option<&str>| {
        segment.is_some_and(|s| !s.is_empty() && s.len() <= MAX_ARGON2_SEGMENT_LEN)
    };

    let mut parts = encoded.split('$');
    parts.next() == Some("")
        && parts.next() == Some(config.variant.as_lowercase_str())
        && parts.next() == Some(version.as_str())
        && parts.next() == Some(params.as_str())
        && segment_ok(parts.next())
        && segment_ok(parts.next())
        && parts.next().is_none()
}

fn salted_digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}
