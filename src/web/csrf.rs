use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use tracing::warn;
use uuid::Uuid;

use super::error::AppError;

pub const CSRF_COOKIE: &str = "csrf_token";

/// Reuses the browser's token when it has one, otherwise issues a new one.
/// The returned jar must be sent back with the response.
pub fn issue_token(jar: SignedCookieJar, secure: bool) -> (SignedCookieJar, String) {
    if let Some(existing) = jar.get(CSRF_COOKIE) {
        let token = existing.value().to_string();
        if !token.is_empty() {
            return (jar, token);
        }
    }

    let token = Uuid::new_v4().simple().to_string();
    let mut cookie = Cookie::new(CSRF_COOKIE, token.clone());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(secure);

    (jar.add(cookie), token)
}

/// Forgets the browser's token, e.g. when the signed-in identity changes.
pub fn discard_token(jar: SignedCookieJar) -> SignedCookieJar {
    let mut removal = Cookie::from(CSRF_COOKIE);
    removal.set_path("/");
    jar.remove(removal)
}

pub fn verify_token(jar: &SignedCookieJar, submitted: &str) -> Result<(), AppError> {
    let Some(expected) = jar.get(CSRF_COOKIE) else {
        warn!("rejecting form post without a CSRF cookie");
        return Err(AppError::Csrf);
    };

    if submitted.is_empty() || expected.value() != submitted {
        warn!("rejecting form post with a mismatched CSRF token");
        return Err(AppError::Csrf);
    }

    Ok(())
}
