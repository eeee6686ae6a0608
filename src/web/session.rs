//! Session identity at the HTTP boundary.
//!
//! Anonymous players are identified by a `sessionid` cookie. Creating the
//! session is an explicit step here; the engine only ever sees an
//! [`AccountId`].

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::debug;
use uuid::Uuid;

use crate::types::AccountId;

pub const SESSION_COOKIE: &str = "sessionid";

/// Longest session id accepted from a client.
const MAX_SESSION_LEN: usize = 100;

/// Resolve the caller's session, minting a new one when the cookie is
/// missing or malformed. The returned jar must be sent back with the
/// response so a new cookie reaches the browser.
pub fn get_or_create_session(jar: CookieJar) -> (CookieJar, AccountId) {
    if let Some(id) = jar.get(SESSION_COOKIE).and_then(|c| valid_session_id(c.value())) {
        let id = AccountId::Session(id.to_string());
        return (jar, id);
    }

    let id = Uuid::new_v4().simple().to_string();
    debug!(session = %id, "New session");
    let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    (jar.add(cookie), AccountId::Session(id))
}

fn valid_session_id(raw: &str) -> Option<&str> {
    let ok = !raw.is_empty()
        && raw.len() <= MAX_SESSION_LEN
        && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    ok.then_some(raw)
}
