//! Per-request authentication.
//!
//! The gate is a small state machine driven purely by the current time, the
//! raw `Authorization` header values and the token codec:
//!
//! ```text
//! Start -> HeaderExtracted -> TokenParsed -> SignatureVerified -> ExpiryChecked -> Authenticated
//!   \______________\_______________\_______________\__________________\__________-> Rejected(reason)
//! ```
//!
//! Nothing is retained between requests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    error::RejectReason,
    token::TokenCodec,
    types::{Claims, Identity},
};

/// Tokens older than this are rejected unless configured otherwise.
pub const DEFAULT_TOKEN_EXPIRY: Duration = Duration::from_secs(10 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Bearer,
    Token,
}

/// A parsed `Authorization` header value: `(Bearer|Token) <credentials>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationHeader<'a> {
    pub scheme: Scheme,
    pub credentials: &'a str,
}

impl<'a> AuthorizationHeader<'a> {
    pub fn parse(value: &'a str) -> Option<Self> {
        let (scheme, credentials) = value.split_once(' ')?;
        let scheme = match scheme {
            "Bearer" => Scheme::Bearer,
            "Token" => Scheme::Token,
            _ => return None,
        };

        if credentials.is_empty() || credentials.contains(|c| c == '\r' || c == '\n') {
            return None;
        }

        Some(Self {
            scheme,
            credentials,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState<'a> {
    Start,
    HeaderExtracted(&'a [u8]),
    TokenParsed(&'a str),
    SignatureVerified { claims: Claims, token: &'a str },
    ExpiryChecked { claims: Claims, token: &'a str },
    Authenticated(Identity),
    Rejected(RejectReason),
}

impl GateState<'_> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GateState::Authenticated(_) | GateState::Rejected(_))
    }
}

#[derive(Debug, Clone)]
pub struct AuthenticationGate {
    codec: TokenCodec,
    expiry: Duration,
}

impl AuthenticationGate {
    pub fn new(codec: TokenCodec, expiry: Duration) -> Self {
        Self { codec, expiry }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Run the gate to completion over every `Authorization` header value sent with a request.
    pub fn authenticate<'a>(
        &self,
        header_values: &[&'a [u8]],
        now: DateTime<Utc>,
    ) -> Result<Identity, RejectReason> {
        let mut state = GateState::Start;
        loop {
            state = match state {
                GateState::Authenticated(identity) => return Ok(identity),
                GateState::Rejected(reason) => {
                    debug!(%reason, "request rejected by authentication gate");
                    return Err(reason);
                }
                state => self.step(state, header_values, now),
            };
        }
    }

    /// Advance by one transition. Terminal states are returned unchanged.
    pub fn step<'a>(
        &self,
        state: GateState<'a>,
        header_values: &[&'a [u8]],
        now: DateTime<Utc>,
    ) -> GateState<'a> {
        match state {
            GateState::Start => match header_values {
                [value] => GateState::HeaderExtracted(*value),
                _ => GateState::Rejected(RejectReason::MissingOrAmbiguousHeader),
            },
            GateState::HeaderExtracted(value) => match std::str::from_utf8(value)
                .ok()
                .and_then(AuthorizationHeader::parse)
            {
                Some(header) => GateState::TokenParsed(header.credentials),
                None => GateState::Rejected(RejectReason::MalformedHeader),
            },
            GateState::TokenParsed(token) => match self.codec.decode_and_verify(token) {
                Ok(claims) => GateState::SignatureVerified { claims, token },
                Err(err) => GateState::Rejected(err.into()),
            },
            GateState::SignatureVerified { claims, token } => {
                // A token issued in the future has no age yet.
                let age = (now - claims.issued_at).to_std().unwrap_or_default();
                if age >= self.expiry {
                    GateState::Rejected(RejectReason::Expired)
                } else {
                    GateState::ExpiryChecked { claims, token }
                }
            }
            GateState::ExpiryChecked { claims, token } => GateState::Authenticated(Identity {
                username: claims.username,
                issued_at: claims.issued_at,
                token: token.to_string(),
            }),
            terminal => terminal,
        }
    }
}
