use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

use crate::{
    constant_time::bytes_equal,
    error::{AuthError, TokenError},
    types::Claims,
};

type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of a token signature.
pub const SIGNATURE_LEN: usize = 32;

/// Signs and verifies bearer tokens of the form `base64url(payload).base64url(hmac(payload))`.
///
/// The secret is hashed with SHA-512 and the digest, which is exactly one
/// HMAC-SHA256 block wide, keys the MAC. Only the keyed MAC state is kept; the
/// secret itself is never stored, so it cannot leak through this type.
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        let key = Sha512::digest(secret.as_bytes());
        Self {
            mac: <HmacSha256 as Mac>::new(&key),
        }
    }

    pub fn sign(&self, bytes: &[u8]) -> [u8; SIGNATURE_LEN] {
        let mut mac = self.mac.clone();
        mac.update(bytes);
        mac.finalize().into_bytes().into()
    }

    pub fn verify(&self, bytes: &[u8], signature: &[u8]) -> bool {
        bytes_equal(signature, &self.sign(bytes))
    }

    /// Sign an arbitrary payload and wrap it into a token.
    pub fn generate_token_from_bytes(&self, payload: &[u8]) -> String {
        let signature = self.sign(payload);
        format!(
            "{}.{}",
            base64url_encode(payload),
            base64url_encode(&signature)
        )
    }

    pub fn generate_token(&self, claims: &Claims) -> Result<String, AuthError> {
        let payload = serde_json::to_vec(claims)?;
        Ok(self.generate_token_from_bytes(&payload))
    }

    /// Check the token's signature and return the claims it carries.
    ///
    /// Expiry is not checked here; see [`crate::AuthenticationGate`].
    pub fn decode_and_verify(&self, token: &str) -> Result<Claims, TokenError> {
        let (payload, signature) = split_token(token).ok_or(TokenError::Malformed)?;

        let payload = base64url_decode(payload).ok_or(TokenError::Malformed)?;
        let signature = base64url_decode(signature).ok_or(TokenError::Malformed)?;

        if !self.verify(&payload, &signature) {
            return Err(TokenError::BadSignature);
        }

        serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenCodec { .. }")
    }
}

/// base64url without padding.
pub fn base64url_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Inverse of [`base64url_encode`].
/// Returns `None` for anything outside the unpadded base64url alphabet.
pub fn base64url_decode(s: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(s).ok()
}

/// Split `x.y` where both halves are non-empty runs of base64url characters.
pub(crate) fn split_token(s: &str) -> Option<(&str, &str)> {
    let (left, right) = s.split_once('.')?;
    if is_base64url(left) && is_base64url(right) {
        Some((left, right))
    } else {
        None
    }
}

fn is_base64url(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
