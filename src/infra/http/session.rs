//! Session cookie handling and the viewer extractors.

use std::{convert::Infallible, time::Duration};

use axum::{
    extract::FromRequestParts,
    http::{Uri, request::Parts},
    response::Redirect,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use url::form_urlencoded;

use crate::{application::auth::Viewer, domain::entities::UserSummary};

pub const SESSION_COOKIE: &str = "folio_session";
pub const LOGIN_PATH: &str = "/auth/login/";

/// The resolved viewer; anonymous when no session was found.
pub struct CurrentViewer(pub Viewer);

impl<S> FromRequestParts<S> for CurrentViewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts.extensions.get::<Viewer>().cloned().unwrap_or_default(),
        ))
    }
}

/// A signed-in user. Anonymous requests are redirected to the login page
/// with the original path and query in `next`.
pub struct RequireUser(pub UserSummary);

impl RequireUser {
    pub fn viewer(&self) -> Viewer {
        Viewer::authenticated(self.0.clone())
    }
}

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts
            .extensions
            .get::<Viewer>()
            .and_then(|viewer| viewer.user().cloned())
        {
            Some(user) => Ok(Self(user)),
            None => Err(login_redirect(&parts.uri)),
        }
    }
}

pub fn login_redirect(uri: &Uri) -> Redirect {
    Redirect::to(&login_url(uri))
}

pub fn login_url(uri: &Uri) -> String {
    let target = uri
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or_else(|| uri.path());
    format!("{LOGIN_PATH}?next={}", encode_next(target))
}

/// Percent-encode `target` for a query value, leaving `/` readable.
fn encode_next(target: &str) -> String {
    target
        .split('/')
        .map(|segment| form_urlencoded::byte_serialize(segment.as_bytes()).collect::<String>())
        .collect::<Vec<_>>()
        .join("/")
}

/// Only same-site absolute paths are accepted as post-login destinations.
pub fn safe_next(next: Option<&str>) -> Option<String> {
    let next = next?.trim();
    let is_local = next.starts_with('/') && !next.starts_with("//") && !next.contains('\\');
    is_local.then(|| next.to_string())
}

pub fn session_cookie(token: String, ttl: Duration, secure: bool) -> Cookie<'static> {
    let max_age = time::Duration::try_from(ttl).unwrap_or(time::Duration::weeks(2));
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_url_keeps_path_and_query() {
        let uri: Uri = "/new/".parse().expect("uri");
        assert_eq!(login_url(&uri), "/auth/login/?next=/new/");

        let uri: Uri = "/follow/?page=2".parse().expect("uri");
        assert_eq!(login_url(&uri), "/auth/login/?next=/follow/%3Fpage%3D2");
    }

    #[test]
    fn safe_next_rejects_foreign_targets() {
        assert_eq!(safe_next(Some("/new/")).as_deref(), Some("/new/"));
        assert!(safe_next(Some("//evil.example/")).is_none());
        assert!(safe_next(Some("https://evil.example/")).is_none());
        assert!(safe_next(Some("/\\evil")).is_none());
        assert!(safe_next(None).is_none());
    }

    #[test]
    fn session_cookie_is_http_only() {
        let cookie = session_cookie("fo_abc_secret".to_string(), Duration::from_secs(60), true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }
}
