//! Cookie jar helpers
//!
//! The server sets `XSRF-TOKEN` on every page load, which makes the jar the
//! cheapest source for the request interceptor. After login the client also
//! writes the session cookies itself so synchronous route guards can see them
//! without a round trip.

use common::Secret;
use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};

use crate::constants::{
    ACCESS_TOKEN_ALIAS_COOKIE, ACCESS_TOKEN_COOKIE, ACCESS_TOKEN_MAX_AGE_SECS, CSRF_COOKIE,
    REFRESH_TOKEN_COOKIE, REFRESH_TOKEN_MAX_AGE_SECS,
};

/// Value of a named cookie the jar would send to `url`.
pub fn read_cookie(jar: &Jar, url: &Url, name: &str) -> Option<String> {
    let header = jar.cookies(url)?;
    let header = header.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

/// The server-set `XSRF-TOKEN` cookie, if present.
pub fn xsrf_cookie(jar: &Jar, url: &Url) -> Option<String> {
    read_cookie(jar, url, CSRF_COOKIE)
}

/// `Secure` and `SameSite=Strict` only when the origin is HTTPS; browsers
/// drop `Secure` cookies set over plain HTTP.
fn cookie_attributes(url: &Url, max_age: u64) -> String {
    if url.scheme() == "https" {
        format!("Path=/; Max-Age={max_age}; Secure; SameSite=Strict")
    } else {
        format!("Path=/; Max-Age={max_age}; SameSite=Lax")
    }
}

/// Write `accessToken`, its alias, and `refreshToken` after a login.
pub fn write_login_cookies(
    jar: &Jar,
    url: &Url,
    access: &Secret<String>,
    refresh: Option<&Secret<String>>,
) {
    let access_attrs = cookie_attributes(url, ACCESS_TOKEN_MAX_AGE_SECS);
    for name in [ACCESS_TOKEN_COOKIE, ACCESS_TOKEN_ALIAS_COOKIE] {
        jar.add_cookie_str(&format!("{name}={}; {access_attrs}", access.expose()), url);
    }
    if let Some(refresh) = refresh {
        let refresh_attrs = cookie_attributes(url, REFRESH_TOKEN_MAX_AGE_SECS);
        jar.add_cookie_str(
            &format!("{REFRESH_TOKEN_COOKIE}={}; {refresh_attrs}", refresh.expose()),
            url,
        );
    }
}

/// Expire every cookie this client manages, including `XSRF-TOKEN`.
pub fn clear_session_cookies(jar: &Jar, url: &Url) {
    let attrs = cookie_attributes(url, 0);
    for name in [
        ACCESS_TOKEN_COOKIE,
        ACCESS_TOKEN_ALIAS_COOKIE,
        REFRESH_TOKEN_COOKIE,
        CSRF_COOKIE,
    ] {
        jar.add_cookie_str(&format!("{name}=; {attrs}"), url);
    }
}
