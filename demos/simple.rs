use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use conduit_auth::{
    build_api_route_filter, handle_auth_errors, with_auth, Auth, AuthConfig, BoxError, Identity,
    PasswordRecord, UserDatabase, Username,
};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use warp::{path, Filter};

// SECRET_KEY=... cargo run --example simple
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();

    let database_connection = Arc::new(Mutex::new(SimpleInMemoryDb::new()));

    let auth = Auth::new(AuthConfig::from_env(database_connection)?)?;

    let auth_routes = build_api_route_filter(&auth);

    let unsecured_homepage =
        warp::path::end().then(|| async move { warp::reply::html("hello, world!") });

    let secure_page = path!("whoami")
        .and(with_auth(&auth))
        .then(|identity: Identity| async move {
            warp::reply::json(&json!({
                "username": identity.username,
                "issuedAt": identity.issued_at,
            }))
        });

    let all_routes = unsecured_homepage
        .or(secure_page)
        .or(auth_routes)
        .recover(handle_auth_errors);

    let addr: SocketAddr = "127.0.0.1:4000".parse()?;
    info!(%addr, "listening");
    warp::serve(all_routes).run(addr).await;

    Ok(())
}

struct SimpleInMemoryDb {
    storage: HashMap<Username, PasswordRecord>,
}

impl SimpleInMemoryDb {
    pub fn new() -> Self {
        Self {
            storage: HashMap::new(),
        }
    }
}

#[async_trait]
impl UserDatabase for SimpleInMemoryDb {
    async fn create_user_if_not_exists(
        &mut self,
        username: &Username,
        record: &PasswordRecord,
    ) -> Result<bool, BoxError> {
        if self.storage.contains_key(username) {
            Ok(false)
        } else {
            self.storage.insert(username.clone(), record.clone());
            Ok(true)
        }
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
        Ok(match self.storage.get_mut(username) {
            Some(stored) => {
                *stored = record.clone();
                true
            }
            None => false,
        })
    }
}
