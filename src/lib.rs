//! Weblogin Core Library
//!
//! Command-line authentication against a Shibboleth-style single-sign-on
//! gateway protected by a push/passcode second factor. A [`Session`] sends a
//! request, notices when it is bounced to the gateway, logs in (credentials,
//! then the second-factor challenge) and replays the request with the
//! resulting session cookies, which persist in a Netscape cookie file.
//!
//! # Architecture
//!
//! - [`cookies`] - Netscape cookie file format and the shared cookie jar
//! - [`extract`] - inline-script and prompt-page extraction
//! - [`challenge`] - second-factor configuration and option types
//! - [`session`] - the authentication state machine
//! - [`login`] - login orchestration over a [`LoginHandler`]
//! - [`dispatcher`] - transparent login around one request
//! - [`http_client`] - shared client construction
//! - [`error`] - error taxonomy

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod challenge;
pub mod cookies;
pub mod dispatcher;
pub mod error;
pub mod extract;
pub mod http_client;
pub mod login;
pub mod session;

// Re-export commonly used types
pub use challenge::{FactorKind, SecondFactorConfig, SecondFactorOption, SignedRequest};
pub use cookies::{PersistentCookieJar, load_cookie_file, save_cookie_file};
pub use error::AuthError;
pub use extract::{ExtractError, RegexScriptExtractor, ScriptExtractor};
pub use http_client::HttpTimeouts;
pub use login::{Credentials, LoginHandler, LoginLimits, SecondFactorChoice};
pub use session::{
    AuthState, DEFAULT_GATEWAY_URL, PendingChallenge, PollPolicy, SECOND_FACTOR_REQUIRED, Session,
    SessionConfig,
};
