use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use cookie::time::Duration as CookieDuration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::csrf;

pub const SESSION_COOKIE: &str = "session";
pub const SESSION_TTL_DAYS: i64 = 31;

/// Identity carried by the signed session cookie.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: i64,
    pub username: String,
}

impl SessionUser {
    fn encode(&self) -> String {
        // serializing two plain fields cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    fn decode(raw: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// Returns the user stored in a cookie whose signature verified.
pub fn current_user(jar: &SignedCookieJar) -> Option<SessionUser> {
    let cookie = jar.get(SESSION_COOKIE)?;
    let user = SessionUser::decode(cookie.value());
    if user.is_none() {
        debug!("ignoring undecodable session cookie");
    }
    user
}

/// Replaces whatever session the browser held with a fresh one for `user`.
/// The CSRF token is dropped too; the next rendered form issues a new one.
pub fn start_session(jar: SignedCookieJar, user: &SessionUser, secure: bool) -> SignedCookieJar {
    let mut cookie = Cookie::new(SESSION_COOKIE, user.encode());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(secure);
    cookie.set_max_age(CookieDuration::days(SESSION_TTL_DAYS));

    csrf::discard_token(jar.remove(removal_cookie()).add(cookie))
}

pub fn end_session(jar: SignedCookieJar) -> SignedCookieJar {
    csrf::discard_token(jar.remove(removal_cookie()))
}

fn removal_cookie() -> Cookie<'static> {
    let mut removal = Cookie::from(SESSION_COOKIE);
    removal.set_path("/");
    removal
}
