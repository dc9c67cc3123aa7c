//! Second-factor challenge types.
//!
//! The gateway hands the browser a small configuration object pointing at the
//! second-factor provider. [`SecondFactorConfig`] is the decoded form of that
//! object; [`SecondFactorOption`] is one device/factor pair the user can pick.

use std::collections::HashMap;
use std::fmt;

use crate::error::AuthError;

/// Literal that separates the two halves of the signed request token.
pub const SIGNATURE_SEPARATOR: &str = ":APP";

/// Signed request token split into its provider half and its application half.
///
/// Both halves always come from the same token: the first is sent to the
/// provider, the second is re-appended to the provider's result cookie before
/// it goes back to the gateway.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedRequest {
    provider_half: String,
    app_half: String,
}

impl SignedRequest {
    /// Splits a signed request token at [`SIGNATURE_SEPARATOR`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Protocol`] unless the separator occurs exactly once.
    pub fn split(token: &str) -> Result<Self, AuthError> {
        let mut halves = token.split(SIGNATURE_SEPARATOR);
        match (halves.next(), halves.next(), halves.next()) {
            (Some(provider_half), Some(app_half), None) => Ok(Self {
                provider_half: provider_half.to_string(),
                app_half: app_half.to_string(),
            }),
            _ => Err(AuthError::protocol(
                "second-factor configuration",
                format!("signed request must contain '{SIGNATURE_SEPARATOR}' exactly once"),
            )),
        }
    }

    /// Joins two halves with [`SIGNATURE_SEPARATOR`].
    #[must_use]
    pub fn reassemble(first: &str, second: &str) -> String {
        format!("{first}{SIGNATURE_SEPARATOR}{second}")
    }

    /// The half sent to the second-factor provider.
    #[must_use]
    pub fn provider_half(&self) -> &str {
        &self.provider_half
    }

    /// The half kept back for the gateway.
    #[must_use]
    pub fn app_half(&self) -> &str {
        &self.app_half
    }

    /// Builds the value posted back to the gateway from the provider's cookie.
    #[must_use]
    pub fn response_for(&self, provider_cookie: &str) -> String {
        Self::reassemble(provider_cookie, &self.app_half)
    }
}

impl fmt::Debug for SignedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedRequest")
            .field("provider_half", &"[REDACTED]")
            .field("app_half", &"[REDACTED]")
            .finish()
    }
}

/// Decoded second-factor configuration embedded in the gateway login page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondFactorConfig {
    /// Provider API host (e.g. `api-1234.duosecurity.com`).
    pub provider_host: String,
    /// Signed request token, already split.
    pub signed_request: SignedRequest,
    /// Form field name the gateway expects the signed response under.
    pub post_argument: String,
    /// Gateway path the signed response is posted to.
    pub post_action: String,
}

impl SecondFactorConfig {
    /// Builds the configuration from the decoded key/value literal.
    ///
    /// Expects the keys `host`, `sig_request`, `post_argument` and `post_action`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Protocol`] if a key is missing or empty, or if the
    /// signed request cannot be split.
    pub fn from_mapping(mapping: &HashMap<String, String>) -> Result<Self, AuthError> {
        let field = |key: &'static str| {
            mapping
                .get(key)
                .filter(|value| !value.is_empty())
                .cloned()
                .ok_or_else(|| {
                    AuthError::protocol(
                        "second-factor configuration",
                        format!("missing '{key}'"),
                    )
                })
        };

        Ok(Self {
            provider_host: field("host")?,
            signed_request: SignedRequest::split(&field("sig_request")?)?,
            post_argument: field("post_argument")?,
            post_action: field("post_action")?,
        })
    }
}

/// Kind of second factor offered for a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FactorKind {
    /// Push notification approved on a phone.
    Push,
    /// Automated phone call.
    PhoneCall,
    /// One-time passcode typed by the user.
    Passcode,
    /// Text message carrying new passcodes; never completes authentication by itself.
    Sms,
    /// Any factor this tool does not know by name.
    Other(String),
}

impl FactorKind {
    /// Maps the provider's `factor` form value to a kind.
    #[must_use]
    pub fn from_form_value(value: &str) -> Self {
        match value {
            "Duo Push" => Self::Push,
            "Phone Call" => Self::PhoneCall,
            "Passcode" => Self::Passcode,
            "sms" => Self::Sms,
            other => Self::Other(other.to_string()),
        }
    }

    /// The `factor` form value submitted for this kind.
    #[must_use]
    pub fn form_value(&self) -> &str {
        match self {
            Self::Push => "Duo Push",
            Self::PhoneCall => "Phone Call",
            Self::Passcode => "Passcode",
            Self::Sms => "sms",
            Self::Other(value) => value,
        }
    }
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sms => f.write_str("Text me new codes"),
            other => f.write_str(other.form_value()),
        }
    }
}

/// One selectable second-factor method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondFactorOption {
    /// Provider device identifier (e.g. `phone1`).
    pub device_id: String,
    /// Factor to use on that device.
    pub factor: FactorKind,
    /// Human-readable label shown to the chooser.
    pub description: String,
}

impl SecondFactorOption {
    /// True when submitting this option needs a passcode.
    #[must_use]
    pub fn requires_passcode(&self) -> bool {
        self.factor == FactorKind::Passcode
    }
}
