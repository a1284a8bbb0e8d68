use anyhow::anyhow;
use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::{
    extract::{Form, Query, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use rand_core::OsRng;
use serde::Deserialize;
use tracing::{debug, info};

use crate::web::{
    AppState, csrf, data,
    error::AppError,
    flash::{FlashKind, FlashQuery, compose_flash_message, flash_block},
    forms::{CredentialsForm, FormErrors},
    session::{self, SessionUser},
    templates::{render_login_page, render_register_page},
};

const INVALID_CREDENTIALS: &str = "Invalid username or password.";
const USERNAME_TAKEN: &str = "Username already exists. Choose another.";

#[derive(Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

pub async fn register_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(flash): Query<FlashQuery>,
) -> (SignedCookieJar, Html<String>) {
    let user = session::current_user(&jar);
    let (jar, csrf_token) = csrf::issue_token(jar, state.secure_cookies());
    let html = render_register_page(
        user.as_ref(),
        &compose_flash_message(&flash),
        &CredentialsForm::default(),
        &FormErrors::default(),
        &csrf_token,
    );
    (jar, Html(html))
}

pub async fn process_register(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<CredentialsForm>,
) -> Result<Response, AppError> {
    csrf::verify_token(&jar, &form.csrf_token)?;

    let credentials = match form.validate() {
        Ok(credentials) => credentials,
        Err(errors) => {
            debug!(?errors, "registration form rejected");
            return Ok(register_form_response(
                &state,
                jar,
                StatusCode::UNPROCESSABLE_ENTITY,
                "",
                &form,
                &errors,
            ));
        }
    };

    let password_hash = hash_password(&credentials.password)
        .map_err(|err| anyhow!("failed to hash password during registration: {err}"))?;

    // The UNIQUE constraint on users.username decides duplicates atomically.
    match data::insert_user(state.pool_ref(), &credentials.username, &password_hash).await {
        Ok(user_id) => {
            info!(user_id, username = %credentials.username, "registered user");
            Ok(Redirect::to("/login?status=registered").into_response())
        }
        Err(err) if data::is_unique_violation(&err) => {
            info!(username = %credentials.username, "registration rejected: username taken");
            Ok(register_form_response(
                &state,
                jar,
                StatusCode::CONFLICT,
                &flash_block(FlashKind::Error, USERNAME_TAKEN),
                &form,
                &FormErrors::default(),
            ))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn login_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(flash): Query<FlashQuery>,
    Query(target): Query<NextQuery>,
) -> (SignedCookieJar, Html<String>) {
    let user = session::current_user(&jar);
    let (jar, csrf_token) = csrf::issue_token(jar, state.secure_cookies());
    let html = render_login_page(
        user.as_ref(),
        &compose_flash_message(&flash),
        &CredentialsForm::default(),
        &FormErrors::default(),
        &csrf_token,
        target.next.as_deref(),
    );
    (jar, Html(html))
}

pub async fn process_login(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(target): Query<NextQuery>,
    Form(form): Form<CredentialsForm>,
) -> Result<Response, AppError> {
    csrf::verify_token(&jar, &form.csrf_token)?;

    let credentials = match form.validate() {
        Ok(credentials) => credentials,
        Err(errors) => {
            debug!(?errors, "login form rejected");
            return Ok(login_form_response(
                &state,
                jar,
                StatusCode::UNPROCESSABLE_ENTITY,
                "",
                &form,
                &errors,
                target.next.as_deref(),
            ));
        }
    };

    let user = data::fetch_user_by_username(state.pool_ref(), &credentials.username).await?;
    let user = match user {
        Some(user) if verify_password(&credentials.password, &user.password_hash) => user,
        // unknown user and wrong password look identical to the visitor
        _ => {
            info!(username = %credentials.username, "failed login attempt");
            return Ok(login_form_response(
                &state,
                jar,
                StatusCode::UNAUTHORIZED,
                &flash_block(FlashKind::Error, INVALID_CREDENTIALS),
                &form,
                &FormErrors::default(),
                target.next.as_deref(),
            ));
        }
    };

    let session_user = SessionUser {
        user_id: user.id,
        username: user.username,
    };
    let jar = session::start_session(jar, &session_user, state.secure_cookies());
    info!(user_id = session_user.user_id, "user logged in");

    let destination = target.next.as_deref().and_then(sanitize_next).unwrap_or("/");
    let destination = with_status(destination, "logged_in");

    Ok((jar, Redirect::to(&destination)).into_response())
}

/// Appends a flash `status` code to a local target.
fn with_status(target: &str, status: &str) -> String {
    let separator = if target.contains('?') { '&' } else { '?' };
    format!("{target}{separator}status={status}")
}

pub async fn logout(jar: SignedCookieJar) -> (SignedCookieJar, Redirect) {
    if let Some(user) = session::current_user(&jar) {
        info!(user_id = user.user_id, "user logged out");
    }
    (session::end_session(jar), Redirect::to("/?status=logged_out"))
}

/// Access guard for protected handlers. `uri` is the request being made; it
/// becomes the `next` target of the login redirect.
pub fn require_user(jar: &SignedCookieJar, uri: &Uri) -> Result<SessionUser, AppError> {
    session::current_user(jar).ok_or_else(|| AppError::LoginRequired {
        return_to: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string()),
    })
}

pub fn login_url_for(return_to: &str) -> String {
    format!(
        "/login?next={}&error=login_required",
        urlencoding::encode(return_to)
    )
}

/// Only local absolute paths are accepted as post-login destinations.
pub fn sanitize_next(next: &str) -> Option<&str> {
    let local = next.starts_with('/') && !next.starts_with("//");
    let clean = !next.contains('\\') && !next.chars().any(char::is_control);
    (local && clean).then_some(next)
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed = PasswordHash::new(password_hash);
    match parsed {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

fn register_form_response(
    state: &AppState,
    jar: SignedCookieJar,
    status: StatusCode,
    flash_html: &str,
    form: &CredentialsForm,
    errors: &FormErrors,
) -> Response {
    let user = session::current_user(&jar);
    let (jar, csrf_token) = csrf::issue_token(jar, state.secure_cookies());
    let html = render_register_page(user.as_ref(), flash_html, form, errors, &csrf_token);
    (status, jar, Html(html)).into_response()
}

fn login_form_response(
    state: &AppState,
    jar: SignedCookieJar,
    status: StatusCode,
    flash_html: &str,
    form: &CredentialsForm,
    errors: &FormErrors,
    next: Option<&str>,
) -> Response {
    let user = session::current_user(&jar);
    let (jar, csrf_token) = csrf::issue_token(jar, state.secure_cookies());
    let html = render_login_page(user.as_ref(), flash_html, form, errors, &csrf_token, next);
    (status, jar, Html(html)).into_response()
}
