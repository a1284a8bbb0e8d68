use axum::{
    body::Body,
    extract::Request,
    http::{StatusCode, header},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use thiserror::Error;
use tracing::error;

use super::auth::login_url_for;
use super::session::{self, SessionUser};
use super::templates::{render_bad_request_page, render_not_found_page, render_server_error_page};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("resource not found")]
    NotFound,
    /// Carries the path the visitor asked for so login can send them back.
    #[error("login required to access {return_to}")]
    LoginRequired { return_to: String },
    #[error("missing or invalid CSRF token")]
    Csrf,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Marks a response as one of the shared error pages so the page can be
/// rendered again with the visitor's navigation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorPage {
    NotFound,
    BadRequest,
    ServerError,
}

impl ErrorPage {
    fn status(self) -> StatusCode {
        match self {
            ErrorPage::NotFound => StatusCode::NOT_FOUND,
            ErrorPage::BadRequest => StatusCode::BAD_REQUEST,
            ErrorPage::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn render(self, user: Option<&SessionUser>) -> String {
        match self {
            ErrorPage::NotFound => render_not_found_page(user),
            ErrorPage::BadRequest => render_bad_request_page(user),
            ErrorPage::ServerError => render_server_error_page(user),
        }
    }

    fn response(self) -> Response {
        let mut response = (self.status(), Html(self.render(None))).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => ErrorPage::NotFound.response(),
            AppError::LoginRequired { return_to } => {
                Redirect::to(&login_url_for(&return_to)).into_response()
            }
            AppError::Csrf => ErrorPage::BadRequest.response(),
            // Any transaction still open in the failing handler was dropped
            // without commit before we get here, so it has been rolled back.
            AppError::Database(err) => {
                error!(?err, "database error while handling request");
                ErrorPage::ServerError.response()
            }
            AppError::Internal(err) => {
                error!(?err, "internal error while handling request");
                ErrorPage::ServerError.response()
            }
        }
    }
}

/// Router fallback for unknown paths.
pub async fn not_found() -> AppError {
    AppError::NotFound
}

/// Error pages are built without access to the request, so a signed-in
/// visitor gets them re-rendered here with their own navigation.
pub async fn personalize_error_pages(
    jar: SignedCookieJar,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;

    let Some(page) = response.extensions().get::<ErrorPage>().copied() else {
        return response;
    };
    if let Some(user) = session::current_user(&jar) {
        response.headers_mut().remove(header::CONTENT_LENGTH);
        *response.body_mut() = Body::from(page.render(Some(&user)));
    }
    response
}
