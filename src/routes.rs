use std::{convert::Infallible, ops::RangeInclusive, sync::Arc};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use warp::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    path, Filter, Rejection, Reply,
};

use crate::{
    auth::{Auth, AuthInternal},
    error::AuthError,
    types::{Identity, Username},
};

pub fn build_api_route_filter(
    auth: &Auth,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let register = path!("users")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_auth_state(auth.internal.clone()))
        .and_then(user_register);

    let login = path!("users" / "login")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_auth_state(auth.internal.clone()))
        .and_then(user_login);

    let current = path!("user")
        .and(warp::get())
        .and(with_auth(auth))
        .and(with_auth_state(auth.internal.clone()))
        .and_then(current_user);

    let change_password = path!("user" / "password")
        .and(warp::put())
        .and(with_auth(auth))
        .and(warp::body::json())
        .and(with_auth_state(auth.internal.clone()))
        .and_then(user_change_password);

    register.or(login).or(current).or(change_password)
}

/// Authenticate the request from its `Authorization` header, extracting the caller's [`Identity`].
pub fn with_auth(auth: &Auth) -> impl Filter<Extract = (Identity,), Error = Rejection> + Clone {
    warp::header::headers_cloned()
        .and(with_auth_state(auth.internal.clone()))
        .and_then(user_auth_check)
}

pub async fn handle_auth_errors(err: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(auth_error) = err.find::<AuthError>() {
        let (status, messages) = match auth_error {
            AuthError::InvalidInput(errors) => (StatusCode::BAD_REQUEST, errors.clone()),
            AuthError::UsernameAlreadyTaken => (
                StatusCode::CONFLICT,
                vec!["username: A user with the same username already exists".to_string()],
            ),
            AuthError::LoginFailed => (
                StatusCode::UNAUTHORIZED,
                vec!["Username or Password invalid".to_string()],
            ),
            AuthError::Unauthenticated(_) => (
                StatusCode::UNAUTHORIZED,
                vec!["This request needs authentication information.".to_string()],
            ),
            AuthError::UserNotFound => (StatusCode::NOT_FOUND, vec!["Not Found.".to_string()]),
            other => {
                warn!(error = %other, "auth request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    vec!["An unknown error has occurred.".to_string()],
                )
            }
        };
        let body = ErrorsEnvelope {
            errors: ErrorBody { body: messages },
        };
        return Ok(warp::reply::with_status(warp::reply::json(&body), status));
    }

    Err(err)
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UserEnvelope<T> {
    pub user: T,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub password: String,
}

/// Field lengths, in characters, accepted from clients.
const USERNAME_LEN: RangeInclusive<usize> = 3..=100;
const NEW_PASSWORD_LEN: RangeInclusive<usize> = 7..=30;
const LOGIN_PASSWORD_LEN: RangeInclusive<usize> = 3..=100;

fn check_length(
    errors: &mut Vec<String>,
    field: &str,
    value: &str,
    limits: RangeInclusive<usize>,
) {
    let len = value.chars().count();
    if len < *limits.start() {
        errors.push(format!(
            "{field}: must be at least {} characters",
            limits.start()
        ));
    } else if len > *limits.end() {
        errors.push(format!(
            "{field}: must be at most {} characters",
            limits.end()
        ));
    }
}

fn into_result(errors: Vec<String>) -> Result<(), AuthError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AuthError::InvalidInput(errors))
    }
}

impl Credentials {
    fn validate(&self, password_len: RangeInclusive<usize>) -> Result<(), AuthError> {
        let mut errors = vec![];
        check_length(&mut errors, "username", &self.username, USERNAME_LEN);
        check_length(&mut errors, "password", &self.password, password_len);
        into_result(errors)
    }
}

impl PasswordChange {
    fn validate(&self) -> Result<(), AuthError> {
        let mut errors = vec![];
        check_length(&mut errors, "password", &self.password, NEW_PASSWORD_LEN);
        into_result(errors)
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub username: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
struct ErrorsEnvelope {
    errors: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    body: Vec<String>,
}

fn user_reply(username: Username, token: String) -> impl Reply {
    warp::reply::json(&UserEnvelope {
        user: UserResponse {
            username: username.0,
            token,
        },
    })
}

async fn user_register(
    input: UserEnvelope<Credentials>,
    auth: Arc<AuthInternal>,
) -> Result<impl Reply, Rejection> {
    input.user.validate(NEW_PASSWORD_LEN)?;

    let username = Username(input.user.username);
    let record = auth.hash(&input.user.password)?;

    if !auth.create_user_if_not_exists(&username, &record).await? {
        Err(AuthError::UsernameAlreadyTaken)?;
    }

    info!(%username, "registered user");
    let token = auth.generate_token(&username)?;

    Ok(user_reply(username, token))
}

async fn user_login(
    input: UserEnvelope<Credentials>,
    auth: Arc<AuthInternal>,
) -> Result<impl Reply, Rejection> {
    input.user.validate(LOGIN_PASSWORD_LEN)?;

    let username = Username(input.user.username);
    let password = input.user.password;

    let record = auth.retrieve_password(&username).await?;

    if !auth.verify_hash(&password, record.as_ref()) {
        warn!(%username, "failed login attempt");
        Err(AuthError::LoginFailed)?;
    }

    if record.as_ref().is_some_and(|r| auth.needs_rehash(r)) {
        let upgraded = auth.hash(&password)?;
        if auth.update_password(&username, &upgraded).await? {
            info!(%username, "rehashed stored password with the configured scheme");
        }
    }

    info!(%username, "user logged in");
    let token = auth.generate_token(&username)?;

    Ok(user_reply(username, token))
}

async fn current_user(
    identity: Identity,
    auth: Arc<AuthInternal>,
) -> Result<impl Reply, Rejection> {
    if auth.retrieve_password(&identity.username).await?.is_none() {
        Err(AuthError::UserNotFound)?;
    }

    Ok(user_reply(identity.username, identity.token))
}

async fn user_change_password(
    identity: Identity,
    input: UserEnvelope<PasswordChange>,
    auth: Arc<AuthInternal>,
) -> Result<impl Reply, Rejection> {
    input.user.validate()?;

    let record = auth.hash(&input.user.password)?;

    if !auth.update_password(&identity.username, &record).await? {
        Err(AuthError::UserNotFound)?;
    }

    info!(username = %identity.username, "changed password");
    let token = auth.generate_token(&identity.username)?;

    Ok(user_reply(identity.username, token))
}

// Run every Authorization header the client sent through the authentication gate
async fn user_auth_check(
    headers: HeaderMap,
    auth: Arc<AuthInternal>,
) -> Result<Identity, Rejection> {
    let values: Vec<&[u8]> = headers
        .get_all(AUTHORIZATION)
        .iter()
        .map(|value| value.as_bytes())
        .collect();

    let identity = auth
        .authenticate(&values, Utc::now())
        .map_err(AuthError::from)?;

    Ok(identity)
}

// functor that adds a reference to the internal auth state into the filter chain
fn with_auth_state(
    auth: Arc<AuthInternal>,
) -> impl Filter<Extract = (Arc<AuthInternal>,), Error = Infallible> + Clone {
    warp::any().map(move || auth.clone())
}
