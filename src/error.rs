use warp::reject::Reject;

/// Why a token failed to decode.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
}

/// Why the authentication gate turned a request away.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    #[error("authorization header is missing or was sent more than once")]
    MissingOrAmbiguousHeader,
    #[error("authorization header is not of the form `Bearer <token>` or `Token <token>`")]
    MalformedHeader,
    #[error("token is malformed")]
    MalformedToken,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token has expired")]
    Expired,
}

impl From<TokenError> for RejectReason {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => RejectReason::MalformedToken,
            TokenError::BadSignature => RejectReason::BadSignature,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("an account with that username already exists")]
    UsernameAlreadyTaken,
    #[error("username or password incorrect")]
    LoginFailed,
    #[error("invalid input: {}", .0.join("; "))]
    InvalidInput(Vec<String>),
    #[error("user does not exist")]
    UserNotFound,
    #[error("request is not authenticated: {0}")]
    Unauthenticated(RejectReason),
    #[error("secure random source unavailable")]
    Entropy {
        #[from]
        source: rand::Error,
    },
    #[error("error encoding token claims")]
    TokenEncoding {
        #[from]
        source: serde_json::Error,
    },
    #[error("error hashing password")]
    Hashing {
        #[from]
        source: argon2::Error,
    },
    #[error("error during database operation")]
    DatabaseError {
        #[from]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl From<RejectReason> for AuthError {
    fn from(reason: RejectReason) -> Self {
        AuthError::Unauthenticated(reason)
    }
}

impl Reject for AuthError {}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown password scheme {0:?}, expected `salted` or `argon2`")]
pub struct UnknownPasswordScheme(pub String);

/// Errors that abort startup.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),
    #[error("environment variable {name} has an invalid value: {value:?}")]
    InvalidVar { name: &'static str, value: String },
    #[error("the token secret must not be empty")]
    EmptySecret,
}
