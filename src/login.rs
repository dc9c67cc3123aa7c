//! Login orchestration over a credential/choice provider.
//!
//! [`Session::login`] repeats primary authentication until the gateway accepts
//! the credentials, then repeats second-factor attempts until one succeeds.
//! Presentation (prompts, error display, option menus) lives behind
//! [`LoginHandler`] so the same flow serves a console, a GUI or a test double.

use secrecy::Secret;
use tracing::{debug, info, instrument, warn};

use crate::challenge::SecondFactorOption;
use crate::error::AuthError;
use crate::session::Session;

/// Identity and secret for one primary login attempt.
pub struct Credentials {
    pub identity: String,
    pub secret: Secret<String>,
}

impl Credentials {
    #[must_use]
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: Secret::new(secret.into()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// The option picked for one second-factor attempt.
pub struct SecondFactorChoice {
    pub option: SecondFactorOption,
    /// Required when `option` is a passcode factor.
    pub passcode: Option<Secret<String>>,
}

impl std::fmt::Debug for SecondFactorChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecondFactorChoice")
            .field("option", &self.option)
            .field("passcode", &self.passcode.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Supplies credentials and choices during [`Session::login`].
pub trait LoginHandler {
    /// Produces credentials for the next primary attempt.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Interaction`] when no answer can be read.
    fn credentials(&mut self) -> Result<Credentials, AuthError>;

    /// Shows the gateway's rejection text before the next attempt.
    fn report_credential_error(&mut self, message: &str);

    /// Called once the gateway asks for a second factor.
    fn on_second_factor_start(&mut self, identity: &str);

    /// Called when an attempt with `option` did not authenticate.
    fn on_second_factor_failed(&mut self, option: &SecondFactorOption);

    /// Picks one of `options` (never empty), with a passcode when needed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Interaction`] when no answer can be read.
    fn choose_second_factor(
        &mut self,
        options: &[SecondFactorOption],
    ) -> Result<SecondFactorChoice, AuthError>;
}

/// Caps on the login loops. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoginLimits {
    /// Maximum primary credential submissions.
    pub max_credential_attempts: Option<u32>,
    /// Maximum second-factor submissions.
    pub max_second_factor_attempts: Option<u32>,
}

impl LoginLimits {
    /// No caps on either loop.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Caps both loops at `attempts`.
    #[must_use]
    pub fn at_most(attempts: u32) -> Self {
        Self {
            max_credential_attempts: Some(attempts),
            max_second_factor_attempts: Some(attempts),
        }
    }
}

fn check_limit(limit: Option<u32>, attempts: u32, stage: &'static str) -> Result<(), AuthError> {
    match limit {
        Some(max) if attempts >= max => Err(AuthError::AttemptsExhausted { stage, attempts }),
        _ => Ok(()),
    }
}

impl Session {
    /// Authenticates interactively, asking `handler` for whatever is needed.
    ///
    /// Nothing is asked when the stored cookies already satisfy the gateway.
    /// Rejected credentials are reported to `handler` and asked for again;
    /// failed second-factor attempts reuse the option list from the accepted
    /// primary login.
    ///
    /// # Errors
    ///
    /// - [`AuthError::AttemptsExhausted`] when `limits` are reached
    /// - [`AuthError::Cancelled`] when the session's token fires
    /// - [`AuthError::Protocol`] when the provider offers no options
    /// - any non-credential error from the state machine or the handler
    #[instrument(skip_all)]
    pub async fn login<H>(&mut self, handler: &mut H, limits: &LoginLimits) -> Result<(), AuthError>
    where
        H: LoginHandler + ?Sized,
    {
        if self.check_already_authenticated().await? {
            return Ok(());
        }

        let mut attempts: u32 = 0;
        let (identity, options) = loop {
            if self.cancellation_token().is_cancelled() {
                return Err(AuthError::Cancelled);
            }
            check_limit(limits.max_credential_attempts, attempts, "login")?;

            let credentials = handler.credentials()?;
            attempts += 1;
            match self
                .authenticate_primary(&credentials.identity, &credentials.secret)
                .await
            {
                Ok(options) => break (credentials.identity, options),
                Err(AuthError::Credential { message }) => {
                    warn!(attempt = attempts, "gateway rejected credentials");
                    handler.report_credential_error(&message);
                }
                Err(other) => return Err(other),
            }
        };

        if self.is_second_factor_authenticated() {
            return Ok(());
        }
        if options.is_empty() {
            return Err(AuthError::protocol(
                "second-factor prompt",
                "no second-factor options were offered",
            ));
        }

        handler.on_second_factor_start(&identity);
        let mut attempts: u32 = 0;
        loop {
            if self.cancellation_token().is_cancelled() {
                return Err(AuthError::Cancelled);
            }
            check_limit(
                limits.max_second_factor_attempts,
                attempts,
                "second-factor authentication",
            )?;

            let choice = handler.choose_second_factor(&options)?;
            attempts += 1;
            debug!(device = %choice.option.device_id, factor = %choice.option.factor, "second-factor attempt");
            if self
                .authenticate_second_factor(&choice.option, choice.passcode.as_ref())
                .await?
            {
                info!(identity = %identity, "login complete");
                return Ok(());
            }
            handler.on_second_factor_failed(&choice.option);
        }
    }
}
