//! Session and poll configuration.

use std::time::Duration;

use url::Url;

use crate::error::AuthError;
use crate::http_client::HttpTimeouts;

/// Gateway login URL used when none is configured.
pub const DEFAULT_GATEWAY_URL: &str = "https://weblogin.umich.edu/";

/// Default delay between second-factor status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How the second-factor status endpoint is polled.
///
/// With neither `max_attempts` nor `deadline` set the poll only ends when
/// the provider decides or the session is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between consecutive status requests.
    pub interval: Duration,
    /// Maximum number of status requests.
    pub max_attempts: Option<u32>,
    /// Maximum wall-clock time spent polling.
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            deadline: None,
        }
    }
}

impl PollPolicy {
    /// Sets the delay between status requests.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Caps the number of status requests.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Caps the total time spent polling.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Everything a [`Session`](super::Session) needs besides its cookie jar.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Gateway login URL; GET and the credential POST go here.
    pub gateway_url: Url,
    /// Replaces `https://{provider host}` for every provider endpoint.
    pub provider_base_url: Option<Url>,
    /// Client timeouts.
    pub timeouts: HttpTimeouts,
    /// Second-factor status polling.
    pub poll: PollPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(default_gateway_url())
    }
}

impl SessionConfig {
    /// Creates a configuration for `gateway_url` with default timeouts and polling.
    #[must_use]
    pub fn new(gateway_url: Url) -> Self {
        Self {
            gateway_url,
            provider_base_url: None,
            timeouts: HttpTimeouts::default(),
            poll: PollPolicy::default(),
        }
    }

    /// Routes provider traffic to `base` instead of the host named by the gateway.
    #[must_use]
    pub fn with_provider_base_url(mut self, base: Url) -> Self {
        self.provider_base_url = Some(base);
        self
    }

    /// Sets the poll policy.
    #[must_use]
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Sets client timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: HttpTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Base URL for the provider at `host`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Protocol`] when `host` does not form a valid URL.
    pub fn provider_base(&self, host: &str) -> Result<Url, AuthError> {
        if let Some(base) = &self.provider_base_url {
            return Ok(base.clone());
        }
        Url::parse(&format!("https://{host}/")).map_err(|e| {
            AuthError::protocol(
                "second-factor configuration",
                format!("provider host '{host}' is not usable: {e}"),
            )
        })
    }
}

/// Parses [`DEFAULT_GATEWAY_URL`]; panics only if the constant is invalid.
#[must_use]
pub fn default_gateway_url() -> Url {
    Url::parse(DEFAULT_GATEWAY_URL)
        .unwrap_or_else(|e| panic!("invalid default gateway URL '{DEFAULT_GATEWAY_URL}': {e}"))
}
