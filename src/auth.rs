use std::{env, error::Error, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    error::{AuthError, ConfigError, RejectReason},
    gate::{AuthenticationGate, DEFAULT_TOKEN_EXPIRY},
    password::{PasswordHasher, PasswordScheme},
    token::TokenCodec,
    types::{Claims, Identity, PasswordRecord, Username},
};

pub type BoxError = Box<dyn Error + Send + Sync>;

#[async_trait]
pub trait UserDatabase: Send + Sync + 'static {
    /// Store `record` for `username` unless that username is already taken.
    /// Returns whether a new user was created; an existing record is left untouched.
    async fn create_user_if_not_exists(
        &mut self,
        username: &Username,
        record: &PasswordRecord,
    ) -> Result<bool, BoxError>;

    /// Retrieve the stored password record for `username`, if there is such a user.
    async fn retrieve_password(
        &self,
        username: &Username,
    ) -> Result<Option<PasswordRecord>, BoxError>;

    /// Replace the password record of an existing user. Returns false if the user is unknown.
    async fn update_password(
        &mut self,
        username: &Username,
        record: &PasswordRecord,
    ) -> Result<bool, BoxError>;
}

#[derive(Clone)]
pub struct AuthConfig {
    /// The secret used to sign auth tokens.
    /// If the secret changes, all currently issued tokens stop verifying.
    pub secret: String,
    /// How long auth tokens remain valid after they were issued.
    /// After this interval, the client will have to re-login.
    pub token_expiry: Duration,
    /// How newly set passwords are hashed. Existing records of either scheme keep verifying.
    pub password_scheme: PasswordScheme,
    pub database_connection: Arc<Mutex<dyn UserDatabase>>,
}

impl AuthConfig {
    pub fn new(
        secret: impl Into<String>,
        database_connection: Arc<Mutex<dyn UserDatabase>>,
    ) -> Self {
        Self {
            secret: secret.into(),
            token_expiry: DEFAULT_TOKEN_EXPIRY,
            password_scheme: PasswordScheme::default(),
            database_connection,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// `SECRET_KEY` is required. `TOKEN_EXPIRY_SECS` defaults to ten days and
    /// `PASSWORD_SCHEME` (`salted` or `argon2`) to `salted`.
    pub fn from_env(
        database_connection: Arc<Mutex<dyn UserDatabase>>,
    ) -> Result<Self, ConfigError> {
        let secret =
            env::var("SECRET_KEY").map_err(|_| ConfigError::MissingVar("SECRET_KEY"))?;
        let mut config = Self::new(secret, database_connection);

        if let Ok(value) = env::var("TOKEN_EXPIRY_SECS") {
            let secs = value.parse::<u64>().map_err(|_| ConfigError::InvalidVar {
                name: "TOKEN_EXPIRY_SECS",
                value: value.clone(),
            })?;
            config.token_expiry = Duration::from_secs(secs);
        }

        if let Ok(value) = env::var("PASSWORD_SCHEME") {
            config.password_scheme = value.parse().map_err(|_| ConfigError::InvalidVar {
                name: "PASSWORD_SCHEME",
                value: value.clone(),
            })?;
        }

        Ok(config)
    }
}

pub(crate) struct AuthInternal {
    gate: AuthenticationGate,
    hasher: PasswordHasher,
    database_connection: Arc<Mutex<dyn UserDatabase>>,
}

impl AuthInternal {
    pub fn hash(&self, password: &str) -> Result<PasswordRecord, AuthError> {
        self.hasher.hash(password)
    }

    pub fn verify_hash(&self, password: &str, record: Option<&PasswordRecord>) -> bool {
        self.hasher.verify(password, record)
    }

    pub fn needs_rehash(&self, record: &PasswordRecord) -> bool {
        self.hasher.needs_rehash(record)
    }

    pub fn generate_token(&self, username: &Username) -> Result<String, AuthError> {
        self.gate
            .codec()
            .generate_token(&Claims::issue(username.clone()))
    }

    pub fn authenticate(
        &self,
        header_values: &[&[u8]],
        now: DateTime<Utc>,
    ) -> Result<Identity, RejectReason> {
        self.gate.authenticate(header_values, now)
    }

    pub async fn create_user_if_not_exists(
        &self,
        username: &Username,
        record: &PasswordRecord,
    ) -> Result<bool, AuthError> {
        let created = self
            .database_connection
            .lock()
            .await
            .create_user_if_not_exists(username, record)
            .await?;

        Ok(created)
    }

    pub async fn retrieve_password(
        &self,
        username: &Username,
    ) -> Result<Option<PasswordRecord>, AuthError> {
        let record = self
            .database_connection
            .lock()
            .await
            .retrieve_password(username)
            .await?;

        Ok(record)
    }

    pub async fn update_password(
        &self,
        username: &Username,
        record: &PasswordRecord,
    ) -> Result<bool, AuthError> {
        let updated = self
            .database_connection
            .lock()
            .await
            .update_password(username, record)
            .await?;

        Ok(updated)
    }
}

/// Shared handle to the authentication state.
///
/// Cloning is cheap. The signing key is immutable after construction, so
/// any number of requests can authenticate concurrently without locking.
#[derive(Clone)]
pub struct Auth {
    pub(crate) internal: Arc<AuthInternal>,
}

impl Auth {
    pub fn new(config: AuthConfig) -> Result<Self, ConfigError> {
        if config.secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }

        let gate = AuthenticationGate::new(TokenCodec::new(&config.secret), config.token_expiry);

        Ok(Self {
            internal: Arc::new(AuthInternal {
                gate,
                hasher: PasswordHasher::new(config.password_scheme),
                database_connection: config.database_connection,
            }),
        })
    }

    pub fn codec(&self) -> &TokenCodec {
        self.internal.gate.codec()
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.internal.hasher
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    struct MemoryDb {
        storage: HashMap<Username, PasswordRecord>,
    }

    #[async_trait]
    impl UserDatabase for MemoryDb {
        async fn create_user_if_not_exists(
            &mut self,
            username: &Username,
            record: &PasswordRecord,
        ) -> Result<bool, BoxError> {
            if self.storage.contains_key(username) {
                return Ok(false);
            }
            self.storage.insert(username.clone(), record.clone());
            Ok(true)
        }

        async fn retrieve_password(
            &self,
            username: &Username,
        ) -> Result<Option<PasswordRecord>, BoxError> {
            Ok(self.storage.get(username).cloned())
        }

        async fn update_password(
            &mut self,
            username: &Username,
            record: &PasswordRecord,
        ) -> Result<bool, BoxError> {
            Ok(self
                .storage
                .get_mut(username)
                .map(|stored| *stored = record.clone())
                .is_some())
        }
    }

    fn database() -> Arc<Mutex<dyn UserDatabase>> {
        Arc::new(Mutex::new(MemoryDb::default()))
    }

    #[test]
    fn empty_secret_is_refused() {
        assert!(matches!(
            Auth::new(AuthConfig::new("", database())),
            Err(ConfigError::EmptySecret)
        ));
    }

    #[test]
    fn config_is_read_from_the_environment() {
        env::remove_var("SECRET_KEY");
        assert!(matches!(
            AuthConfig::from_env(database()),
            Err(ConfigError::MissingVar("SECRET_KEY"))
        ));

        env::set_var("SECRET_KEY", "s3cret");
        env::set_var("TOKEN_EXPIRY_SECS", "3600");
        env::set_var("PASSWORD_SCHEME", "argon2");
        let config = AuthConfig::from_env(database()).unwrap();
        assert_eq!(config.secret, "s3cret");
        assert_eq!(config.token_expiry, Duration::from_secs(3600));
        assert_eq!(config.password_scheme, PasswordScheme::Argon2);

        env::set_var("PASSWORD_SCHEME", "md5");
        assert!(matches!(
            AuthConfig::from_env(database()),
            Err(ConfigError::InvalidVar {
                name: "PASSWORD_SCHEME",
                ..
            })
        ));

        env::remove_var("SECRET_KEY");
        env::remove_var("TOKEN_EXPIRY_SECS");
        env::remove_var("PASSWORD_SCHEME");
    }

    #[test]
    fn defaults_match_conduit() {
        let config = AuthConfig::new("s3cret", database());
        assert_eq!(config.token_expiry, Duration::from_secs(10 * 24 * 60 * 60));
        assert_eq!(config.password_scheme, PasswordScheme::Salted);
    }

    #[test]
    fn issued_token_authenticates() {
        let auth = Auth::new(AuthConfig::new("s3cret", database())).unwrap();
        let username = Username("jake".into());

        let token = auth.internal.generate_token(&username).unwrap();
        let header = format!("Token {token}");
        let identity = auth
            .internal
            .authenticate(&[header.as_bytes()], Utc::now())
            .unwrap();

        assert_eq!(identity.username, username);
        assert_eq!(
            auth.codec().decode_and_verify(&token).unwrap().username,
            username
        );
    }

    #[tokio::test]
    async fn stored_password_round_trips_through_the_database() {
        let auth = Auth::new(AuthConfig::new("s3cret", database())).unwrap();
        let username = Username("jake".into());
        let record = auth.internal.hash("hunter2").unwrap();

        assert!(auth
            .internal
            .create_user_if_not_exists(&username, &record)
            .await
            .unwrap());
        assert!(!auth
            .internal
            .create_user_if_not_exists(&username, &record)
            .await
            .unwrap());

        let stored = auth.internal.retrieve_password(&username).await.unwrap();
        assert!(auth.internal.verify_hash("hunter2", stored.as_ref()));

        let replacement = auth.internal.hash("hunter3").unwrap();
        assert!(auth
            .internal
            .update_password(&username, &replacement)
            .await
            .unwrap());
        let stored = auth.internal.retrieve_password(&username).await.unwrap();
        assert!(!auth.internal.verify_hash("hunter2", stored.as_ref()));
        assert!(auth.internal.verify_hash("hunter3", stored.as_ref()));
    }
}
