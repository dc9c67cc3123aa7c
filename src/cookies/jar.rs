//! Cookie jar shared by the session's HTTP clients.
//!
//! `reqwest::cookie::Jar` cannot be enumerated, so cookies could never be
//! written back to disk. [`PersistentCookieJar`] implements the same
//! `CookieStore` contract over a plain list of [`CookieLine`]s that can be
//! snapshotted for saving.

use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use cookie::Cookie;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use tracing::{debug, trace, warn};
use url::Url;

use super::CookieLine;

/// In-memory cookie store that can be loaded from and saved to a cookie file.
#[derive(Debug, Default)]
pub struct PersistentCookieJar {
    cookies: RwLock<Vec<CookieLine>>,
}

impl PersistentCookieJar {
    /// Creates an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a jar holding `cookies`, dropping any that already expired.
    #[must_use]
    pub fn from_cookies(cookies: Vec<CookieLine>) -> Self {
        let now = unix_now();
        let live = cookies
            .into_iter()
            .filter(|cookie| !cookie.is_expired_at(now))
            .collect();
        Self {
            cookies: RwLock::new(live),
        }
    }

    /// Returns every unexpired cookie, session cookies included.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CookieLine> {
        let now = unix_now();
        self.read()
            .iter()
            .filter(|cookie| !cookie.is_expired_at(now))
            .cloned()
            .collect()
    }

    /// Number of cookies currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True when the jar holds no cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Inserts or replaces a cookie keyed by (name, domain, path).
    pub fn insert(&self, cookie: CookieLine) {
        let mut cookies = self.write();
        cookies.retain(|existing| !same_identity(existing, &cookie));
        cookies.push(cookie);
    }

    fn remove_matching(&self, cookie: &CookieLine) {
        self.write().retain(|existing| !same_identity(existing, cookie));
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<CookieLine>> {
        self.cookies.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<CookieLine>> {
        self.cookies.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CookieStore for PersistentCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let now = unix_now();
        for header in cookie_headers {
            let Ok(raw) = header.to_str() else {
                warn!(url = %url.path(), "ignoring non-ASCII Set-Cookie header");
                continue;
            };
            match parse_set_cookie(raw, url, now) {
                Some(SetCookie::Store(cookie)) => {
                    debug!(domain = %cookie.domain, name = %cookie.name, "stored cookie");
                    self.insert(cookie);
                }
                Some(SetCookie::Expire(cookie)) => {
                    debug!(domain = %cookie.domain, name = %cookie.name, "expired cookie");
                    self.remove_matching(&cookie);
                }
                None => trace!(url = %url.path(), "rejected Set-Cookie header"),
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let host = url.host_str()?.to_ascii_lowercase();
        let secure_channel = url.scheme() == "https";
        let now = unix_now();

        let cookies = self.read();
        let mut matching: Vec<&CookieLine> = cookies
            .iter()
            .filter(|cookie| {
                !cookie.is_expired_at(now)
                    && domain_matches(cookie, &host)
                    && path_matches(&cookie.path, url.path())
                    && (!cookie.secure || secure_channel)
            })
            .collect();
        if matching.is_empty() {
            return None;
        }
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

        let header = matching
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value()))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&header).ok()
    }
}

/// Outcome of interpreting one `Set-Cookie` header.
#[derive(Debug)]
enum SetCookie {
    Store(CookieLine),
    Expire(CookieLine),
}

/// Interprets a `Set-Cookie` header received from `url`.
///
/// Returns `None` for headers that must be ignored (no name, or a `Domain`
/// attribute the request host does not belong to). `Expires` accepts every
/// date form `cookie` understands, including `Thu, 01-Jan-1970 00:00:01 GMT`.
fn parse_set_cookie(raw: &str, url: &Url, now: u64) -> Option<SetCookie> {
    let host = url.host_str()?.to_ascii_lowercase();
    let parsed = Cookie::parse(raw).ok()?;
    let name = parsed.name().trim();
    if name.is_empty() {
        return None;
    }

    let (domain, tailmatch) = match parsed
        .domain()
        .map(|domain| domain.trim_start_matches('.').to_ascii_lowercase())
        .filter(|domain| !domain.is_empty())
    {
        Some(domain) => {
            if host != domain && !host.ends_with(&format!(".{domain}")) {
                return None;
            }
            (format!(".{domain}"), true)
        }
        None => (host, false),
    };

    // Max-Age wins over Expires.
    let expiry = match parsed.max_age() {
        Some(max_age) => Some(match u64::try_from(max_age.whole_seconds()) {
            Ok(0) | Err(_) => 0,
            Ok(seconds) => now.saturating_add(seconds),
        }),
        None => parsed
            .expires_datetime()
            .map(|at| u64::try_from(at.unix_timestamp()).unwrap_or(0)),
    };

    let path = parsed
        .path()
        .filter(|path| path.starts_with('/'))
        .map_or_else(|| default_path(url.path()), ToString::to_string);

    let cookie = CookieLine::new(
        domain,
        tailmatch,
        path,
        parsed.secure().unwrap_or(false),
        parsed.http_only().unwrap_or(false),
        expiry.map_or(0, |at| at.max(1)),
        name.to_string(),
        parsed.value().trim().to_string(),
    );

    match expiry {
        Some(at) if at <= now => Some(SetCookie::Expire(cookie)),
        _ => Some(SetCookie::Store(cookie)),
    }
}

/// RFC 6265 default-path: the request path up to, not including, its last `/`.
fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => request_path[..idx].to_string(),
    }
}

fn domain_matches(cookie: &CookieLine, host: &str) -> bool {
    let domain = cookie.domain.trim_start_matches('.').to_ascii_lowercase();
    if cookie.tailmatch {
        host == domain || host.ends_with(&format!(".{domain}"))
    } else {
        host == domain
    }
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if cookie_path == request_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

fn same_identity(a: &CookieLine, b: &CookieLine) -> bool {
    a.name == b.name && a.path == b.path && a.domain.eq_ignore_ascii_case(&b.domain)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
