//! Shared HTTP client construction for the session.
//!
//! The state machine needs every exchange with redirects disabled, while the
//! dispatcher follows redirects to learn where a request finally landed. Both
//! clients are built from one policy (timeouts, browser-like headers, gzip)
//! and share a single [`PersistentCookieJar`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, Proxy, redirect};
use tracing::warn;

use crate::cookies::PersistentCookieJar;
use crate::error::AuthError;

/// User agent presented to the gateway and the provider.
pub const USER_AGENT: &str = "Mozilla/5.0";

/// Accept-Language presented to the gateway and the provider.
pub const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.5";

/// Connect and read timeouts applied to both clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// TCP/TLS connect timeout.
    pub connect: Duration,
    /// Whole-request timeout.
    pub read: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(30),
        }
    }
}

/// The two clients a session uses, over one cookie jar.
#[derive(Debug, Clone)]
pub struct SessionClients {
    /// Never follows redirects; used for every authentication exchange.
    pub direct: Client,
    /// Follows redirects; used by the dispatcher.
    pub following: Client,
    /// Cookie store both clients read and write.
    pub jar: Arc<PersistentCookieJar>,
}

impl SessionClients {
    /// Builds both clients over `jar`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ClientBuild`] when the TLS backend or proxy
    /// configuration cannot be initialised.
    pub fn build(jar: Arc<PersistentCookieJar>, timeouts: HttpTimeouts) -> Result<Self, AuthError> {
        let direct = build_client(&jar, timeouts, false)?;
        let following = build_client(&jar, timeouts, true)?;
        Ok(Self {
            direct,
            following,
            jar,
        })
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn build_client(
    jar: &Arc<PersistentCookieJar>,
    timeouts: HttpTimeouts,
    follow_redirects: bool,
) -> Result<Client, AuthError> {
    match try_build_client(jar, timeouts, follow_redirects, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed platforms panic while reading system proxy settings.
            warn!("HTTP client hit system proxy panic; using env-proxy fallback builder");
            match try_build_client(jar, timeouts, follow_redirects, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(AuthError::ClientBuild(
                    "client construction panicked while initializing networking".to_string(),
                )),
                Err(BuildClientFailure::Build(error)) => {
                    Err(AuthError::ClientBuild(error.to_string()))
                }
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(AuthError::ClientBuild(error.to_string())),
    }
}

fn try_build_client(
    jar: &Arc<PersistentCookieJar>,
    timeouts: HttpTimeouts,
    follow_redirects: bool,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let jar = Arc::clone(jar);
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(jar, timeouts, follow_redirects);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(
    jar: Arc<PersistentCookieJar>,
    timeouts: HttpTimeouts,
    follow_redirects: bool,
) -> ClientBuilder {
    let policy = if follow_redirects {
        redirect::Policy::default()
    } else {
        redirect::Policy::none()
    };
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE),
    );

    Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.read)
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .redirect(policy)
        .gzip(true)
        .cookie_provider(jar)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    let names: &[&str] = match scheme {
        "https" => &["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"],
        "http" => &["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"],
        _ => return None,
    };
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
