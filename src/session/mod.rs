//! The authentication state machine.
//!
//! A [`Session`] owns the shared HTTP clients, the script extractor and the
//! current [`AuthState`]. Each operation is one or more awaited round-trips;
//! a failed operation returns an error and leaves the state as it was, so the
//! caller can retry.
//!
//! ```text
//! Unauthenticated --primary (redirect)--------------------> Authenticated
//! Unauthenticated --primary (sentinel)--> SecondFactorPending --allow--> Authenticated
//! ```

mod config;
mod poll;
mod provider;

pub use config::{
    DEFAULT_GATEWAY_URL, DEFAULT_POLL_INTERVAL, PollPolicy, SessionConfig, default_gateway_url,
};
pub use poll::{ChallengeStatus, poll_until_decided};

use std::sync::Arc;

use reqwest::header::{HeaderValue, ORIGIN};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use crate::challenge::{SecondFactorConfig, SecondFactorOption};
use crate::cookies::PersistentCookieJar;
use crate::error::AuthError;
use crate::extract::{RegexScriptExtractor, ScriptExtractor, parse_prompt_options};
use crate::http_client::SessionClients;
use provider::ProviderApi;

/// Gateway error text meaning "credentials accepted, second factor required".
pub const SECOND_FACTOR_REQUIRED: &str = "Additional authentication is required.";

/// A second-factor challenge opened by a successful primary authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChallenge {
    /// Provider configuration taken from the gateway login page.
    pub config: SecondFactorConfig,
    /// Provider session id from the handshake.
    pub session_id: String,
    /// Transaction id of the last submitted factor, if any.
    pub transaction_id: Option<String>,
    /// Options offered for this challenge, in prompt order.
    pub options: Vec<SecondFactorOption>,
}

/// Where a session stands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    /// No credentials accepted yet.
    #[default]
    Unauthenticated,
    /// Primary credentials accepted; a second factor is outstanding.
    SecondFactorPending(PendingChallenge),
    /// The gateway session is fully established.
    Authenticated,
}

/// One authentication lifecycle bound to one cookie jar.
pub struct Session {
    config: SessionConfig,
    clients: SessionClients,
    extractor: Box<dyn ScriptExtractor>,
    cancel: CancellationToken,
    state: AuthState,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("gateway_url", &self.config.gateway_url.as_str())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session over `jar` with the regex script extractor.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ClientBuild`] if the HTTP clients cannot be built.
    pub fn new(config: SessionConfig, jar: Arc<PersistentCookieJar>) -> Result<Self, AuthError> {
        let clients = SessionClients::build(jar, config.timeouts)?;
        Ok(Self {
            config,
            clients,
            extractor: Box::new(RegexScriptExtractor),
            cancel: CancellationToken::new(),
            state: AuthState::Unauthenticated,
        })
    }

    /// Replaces the script extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: impl ScriptExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// Uses `cancel` to abort polling and login loops.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The cookie jar shared by both clients.
    #[must_use]
    pub fn cookie_jar(&self) -> &Arc<PersistentCookieJar> {
        &self.clients.jar
    }

    pub(crate) fn following_client(&self) -> &Client {
        &self.clients.following
    }

    /// True once primary credentials were accepted (or found unnecessary).
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !matches!(self.state, AuthState::Unauthenticated)
    }

    /// True once the gateway session is fully established.
    #[must_use]
    pub fn is_second_factor_authenticated(&self) -> bool {
        matches!(self.state, AuthState::Authenticated)
    }

    /// Provider configuration of the outstanding challenge.
    #[must_use]
    pub fn second_factor_config(&self) -> Option<&SecondFactorConfig> {
        match &self.state {
            AuthState::SecondFactorPending(pending) => Some(&pending.config),
            _ => None,
        }
    }

    /// Checks whether stored cookies already satisfy the gateway.
    ///
    /// A redirect from the gateway root means they do; the session becomes
    /// [`AuthState::Authenticated`]. Otherwise the state is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Transport`] if the request fails.
    #[instrument(skip(self), fields(gateway = %self.config.gateway_url))]
    pub async fn check_already_authenticated(&mut self) -> Result<bool, AuthError> {
        let gateway = &self.config.gateway_url;
        let response = self
            .clients
            .direct
            .get(gateway.clone())
            .send()
            .await
            .map_err(|e| AuthError::transport(gateway, e))?;
        debug!(status = %response.status(), "gateway root answered");

        if response.status().is_redirection() {
            info!("existing gateway session is still valid");
            self.state = AuthState::Authenticated;
            return Ok(true);
        }
        Ok(false)
    }

    /// Submits primary credentials to the gateway.
    ///
    /// Returns the second-factor options to choose from, or an empty list when
    /// the gateway redirected straight away (the session is then fully
    /// authenticated).
    ///
    /// # Errors
    ///
    /// - [`AuthError::Credential`] with the gateway's text when the login is rejected
    /// - [`AuthError::Protocol`] when the login page or provider prompt is not understood
    /// - [`AuthError::Transport`] on network failure
    #[instrument(skip(self, secret))]
    pub async fn authenticate_primary(
        &mut self,
        identity: &str,
        secret: &Secret<String>,
    ) -> Result<Vec<SecondFactorOption>, AuthError> {
        let gateway = self.config.gateway_url.clone();

        // Primes the gateway's session cookies.
        let primer = self
            .clients
            .direct
            .get(gateway.clone())
            .send()
            .await
            .map_err(|e| AuthError::transport(&gateway, e))?;
        debug!(status = %primer.status(), "gateway login page fetched");

        let form = [
            ("ref", ""),
            ("service", ""),
            ("required", ""),
            ("login", identity),
            ("loginX", identity),
            ("password", secret.expose_secret().as_str()),
        ];
        let response = self.post_gateway(&gateway, &form).await?;

        if response.status().is_redirection() {
            info!("gateway accepted the existing session after login");
            self.state = AuthState::Authenticated;
            return Ok(Vec::new());
        }

        let html = response
            .text()
            .await
            .map_err(|e| AuthError::transport(&gateway, e))?;
        let error = self.extractor.find_error_message(&html)?;
        if error != SECOND_FACTOR_REQUIRED {
            debug!("gateway rejected primary credentials");
            if error.is_empty() {
                return Err(AuthError::credential(
                    "The gateway did not accept the login and gave no reason.",
                ));
            }
            return Err(AuthError::credential(error));
        }

        let mapping = self.extractor.find_second_factor_config(&html)?;
        let config = SecondFactorConfig::from_mapping(&mapping)?;
        debug!(provider = %config.provider_host, "second factor required");

        let (session_id, options) = self.open_challenge(&config).await?;
        self.state = AuthState::SecondFactorPending(PendingChallenge {
            config,
            session_id,
            transaction_id: None,
            options: options.clone(),
        });
        Ok(options)
    }

    /// Re-opens the provider session and lists the options it offers.
    ///
    /// Replaces the options and session id of the pending challenge.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Precondition`] when no challenge is pending
    /// - [`AuthError::Protocol`] / [`AuthError::Transport`] from the provider exchange
    pub async fn list_second_factor_options(
        &mut self,
    ) -> Result<Vec<SecondFactorOption>, AuthError> {
        let AuthState::SecondFactorPending(pending) = &self.state else {
            return Err(AuthError::precondition(
                "no second-factor challenge is pending",
            ));
        };
        let (session_id, options) = self.open_challenge(&pending.config).await?;

        if let AuthState::SecondFactorPending(pending) = &mut self.state {
            pending.session_id = session_id;
            pending.transaction_id = None;
            pending.options.clone_from(&options);
        }
        Ok(options)
    }

    /// Performs the provider handshake and parses the prompt page.
    async fn open_challenge(
        &self,
        config: &SecondFactorConfig,
    ) -> Result<(String, Vec<SecondFactorOption>), AuthError> {
        let api = self.provider_api(config)?;
        let session_id = api
            .begin_session(config.signed_request.provider_half())
            .await?;
        debug!("provider session opened");

        let prompt = api.fetch_prompt(&session_id).await?;
        let options = parse_prompt_options(&prompt);
        debug!(count = options.len(), "second-factor options listed");
        Ok((session_id, options))
    }

    /// Runs one second-factor attempt with `option`.
    ///
    /// Returns `Ok(true)` once the gateway accepted the provider's signed
    /// response. Returns `Ok(false)` when the provider denied the attempt or
    /// when `option` is an SMS request, which only sends new passcodes.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Precondition`] without a pending challenge, for an option
    ///   not offered by it, or for a passcode option without a passcode
    /// - [`AuthError::Cancelled`] / [`AuthError::PollExhausted`] from polling
    /// - [`AuthError::Protocol`] / [`AuthError::Transport`] from the exchanges
    #[instrument(skip(self, option, passcode), fields(device = %option.device_id, factor = %option.factor))]
    pub async fn authenticate_second_factor(
        &mut self,
        option: &SecondFactorOption,
        passcode: Option<&Secret<String>>,
    ) -> Result<bool, AuthError> {
        let pending = match &self.state {
            AuthState::SecondFactorPending(pending) => pending,
            AuthState::Unauthenticated => {
                return Err(AuthError::precondition(
                    "primary authentication has not completed",
                ));
            }
            AuthState::Authenticated => {
                return Err(AuthError::precondition(
                    "no second-factor challenge is pending",
                ));
            }
        };
        if !pending.options.contains(option) {
            return Err(AuthError::precondition(
                "option was not offered by the current challenge",
            ));
        }
        if option.requires_passcode() && passcode.is_none() {
            return Err(AuthError::precondition(
                "a passcode is required for this option",
            ));
        }
        let config = pending.config.clone();
        let session_id = pending.session_id.clone();

        let api = self.provider_api(&config)?;
        let passcode = passcode.map(|p| p.expose_secret().as_str());
        let Some(transaction_id) = api.submit_factor(&session_id, option, passcode).await? else {
            return Ok(false);
        };
        debug!("second-factor challenge submitted");
        self.record_transaction(transaction_id.clone());

        let approved = {
            let api = &api;
            let sid = session_id.as_str();
            let txid = transaction_id.as_str();
            poll_until_decided(&self.config.poll, &self.cancel, move || {
                api.check_status(sid, txid)
            })
            .await?
        };
        if !approved {
            return Ok(false);
        }

        let cookie = api
            .fetch_result_cookie(&session_id, &transaction_id)
            .await?;
        let signed_response = config.signed_request.response_for(&cookie);

        let target = self.config.gateway_url.join(&config.post_action).map_err(|e| {
            AuthError::protocol(
                "second-factor configuration",
                format!("post_action is not a path: {e}"),
            )
        })?;
        let form = [
            ("ref", ""),
            ("service", ""),
            ("required", "mtoken"),
            (config.post_argument.as_str(), signed_response.as_str()),
        ];
        let response = self.post_gateway(&target, &form).await?;
        debug!(status = %response.status(), "gateway accepted signed response");

        info!("two-factor authentication complete");
        self.state = AuthState::Authenticated;
        Ok(true)
    }

    fn record_transaction(&mut self, transaction_id: String) {
        if let AuthState::SecondFactorPending(pending) = &mut self.state {
            pending.transaction_id = Some(transaction_id);
        }
    }

    fn provider_api(&self, config: &SecondFactorConfig) -> Result<ProviderApi, AuthError> {
        let base = self.config.provider_base(&config.provider_host)?;
        Ok(ProviderApi::new(
            self.clients.direct.clone(),
            base,
            self.config.gateway_url.clone(),
        ))
    }

    async fn post_gateway(&self, url: &Url, form: &[(&str, &str)]) -> Result<Response, AuthError> {
        let mut request = self.clients.direct.post(url.clone()).form(form);
        if let Ok(origin) = HeaderValue::from_str(&url.origin().ascii_serialization()) {
            request = request.header(ORIGIN, origin);
        }
        request
            .send()
            .await
            .map_err(|e| AuthError::transport(url, e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::challenge::FactorKind;

    fn session() -> Session {
        Session::new(SessionConfig::default(), Arc::new(PersistentCookieJar::new())).unwrap()
    }

    fn option() -> SecondFactorOption {
        SecondFactorOption {
            device_id: "phone1".to_string(),
            factor: FactorKind::Push,
            description: "iOS: Duo Push".to_string(),
        }
    }

    #[test]
    fn test_new_session_is_unauthenticated() {
        let session = session();
        assert_eq!(session.state(), &AuthState::Unauthenticated);
        assert!(!session.is_authenticated());
        assert!(!session.is_second_factor_authenticated());
        assert!(session.second_factor_config().is_none());
    }

    #[tokio::test]
    async fn test_second_factor_before_primary_is_precondition_error() {
        let mut session = session();
        let err = session
            .authenticate_second_factor(&option(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Precondition { .. }));
        assert_eq!(session.state(), &AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_listing_options_without_challenge_is_precondition_error() {
        let mut session = session();
        let err = session.list_second_factor_options().await.unwrap_err();
        assert!(matches!(err, AuthError::Precondition { .. }));
    }

    #[tokio::test]
    async fn test_stale_option_is_rejected() {
        let mut session = session();
        session.state = AuthState::SecondFactorPending(PendingChallenge {
            config: SecondFactorConfig::from_mapping(
                &[
                    ("host", "api-x.duosecurity.com"),
                    ("sig_request", "AAA:APPBBB"),
                    ("post_argument", "mtoken"),
                    ("post_action", "/login"),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            )
            .unwrap(),
            session_id: "sid".to_string(),
            transaction_id: None,
            options: Vec::new(),
        });
        let err = session
            .authenticate_second_factor(&option(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Precondition { .. }));
        assert!(session.is_authenticated());
        assert!(session.second_factor_config().is_some());
    }

    #[test]
    fn test_debug_does_not_expose_clients() {
        let debug = format!("{:?}", session());
        assert!(debug.contains("Unauthenticated"));
        assert!(debug.contains("weblogin.umich.edu"));
    }
}
