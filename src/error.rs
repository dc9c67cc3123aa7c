//! Error types for gateway authentication.
//!
//! Errors follow the What/Suggestion pattern used across the project. The
//! variants separate failures the user can fix by typing something else
//! ([`AuthError::Credential`]) from failures that mean the remote contract
//! changed ([`AuthError::Protocol`]) and from plain network trouble
//! ([`AuthError::Transport`]).

use thiserror::Error;

use crate::extract::ExtractError;

/// Errors raised by the session, the login orchestration and the dispatcher.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Network-layer failure (connect, timeout, redirect limit, body read).
    ///
    /// Propagated verbatim from the HTTP client and never retried.
    #[error("request to {url} failed: {source}")]
    Transport {
        /// The URL being requested, without query string.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The gateway rejected the primary credentials.
    ///
    /// Carries the gateway's literal error text so it can be shown to the user.
    #[error("{message}")]
    Credential {
        /// Error text extracted from the gateway login page.
        message: String,
    },

    /// An expected script block, field, header or JSON member is missing.
    #[error(
        "unexpected response from {context}: {detail}\n  Suggestion: the login pages may have changed; re-run with -v and report the output"
    )]
    Protocol {
        /// Which exchange produced the response.
        context: &'static str,
        /// What was missing or malformed.
        detail: String,
    },

    /// An operation was called in a state that does not allow it.
    #[error("invalid session state: {reason}")]
    Precondition {
        /// Which precondition failed.
        reason: &'static str,
    },

    /// The session's cancellation token fired.
    #[error("authentication cancelled")]
    Cancelled,

    /// The bounded poll policy ran out before the provider answered.
    #[error(
        "second-factor approval not received after {attempts} status check(s)\n  Suggestion: approve the request sooner or raise the poll limit"
    )]
    PollExhausted {
        /// Number of status requests issued.
        attempts: u32,
    },

    /// A caller-imposed login attempt limit was reached.
    #[error("{stage} failed after {attempts} attempt(s)")]
    AttemptsExhausted {
        /// Which loop gave up ("login" or "second-factor authentication").
        stage: &'static str,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The credential/choice provider could not produce an answer.
    #[error("could not read input: {0}")]
    Interaction(#[from] std::io::Error),

    /// The HTTP clients could not be constructed.
    #[error("HTTP client construction failed: {0}")]
    ClientBuild(String),
}

impl AuthError {
    /// Creates a `Transport` error, dropping any query string from the URL.
    pub fn transport(url: &url::Url, source: reqwest::Error) -> Self {
        let mut url = url.clone();
        url.set_query(None);
        Self::Transport {
            url: url.to_string(),
            source,
        }
    }

    /// Creates a `Credential` error from gateway error text.
    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential {
            message: message.into(),
        }
    }

    /// Creates a `Protocol` error.
    pub fn protocol(context: &'static str, detail: impl Into<String>) -> Self {
        Self::Protocol {
            context,
            detail: detail.into(),
        }
    }

    /// Creates a `Precondition` error.
    #[must_use]
    pub fn precondition(reason: &'static str) -> Self {
        Self::Precondition { reason }
    }

    /// True when the gateway rejected the credentials (recoverable by re-prompting).
    #[must_use]
    pub fn is_credential(&self) -> bool {
        matches!(self, Self::Credential { .. })
    }

    /// True for request timeouts.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport { source, .. } if source.is_timeout())
    }

    /// True for connection failures (DNS, refused, TLS handshake).
    #[must_use]
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Transport { source, .. } if source.is_connect())
    }

    /// True when the redirect limit was exceeded.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Transport { source, .. } if source.is_redirect())
    }
}

impl From<ExtractError> for AuthError {
    fn from(error: ExtractError) -> Self {
        Self::protocol("gateway login page", error.to_string())
    }
}
