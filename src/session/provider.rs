//! HTTP exchanges with the second-factor provider's iframe endpoints.
//!
//! Every call goes through the session's non-redirect client. JSON bodies are
//! decoded with `serde_json` so a shape mismatch surfaces as
//! [`AuthError::Protocol`] rather than a transport error.

use reqwest::header::{HeaderValue, LOCATION, ORIGIN, REFERER};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use super::poll::ChallengeStatus;
use crate::challenge::{FactorKind, SecondFactorOption};
use crate::error::AuthError;

const AUTH_PATH: &str = "frame/web/v1/auth";
const PROMPT_PATH: &str = "frame/prompt";
const STATUS_PATH: &str = "frame/status";
const IFRAME_PROTOCOL_VERSION: &str = "2.6";

/// `{"stat": "...", "response": {...}, "message": "..."}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    stat: Option<String>,
    response: Option<T>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptResponse {
    txid: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status_code: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    cookie: String,
}

/// Client for one provider host, bound to one gateway parent URL.
pub(crate) struct ProviderApi {
    client: Client,
    base: Url,
    parent: Url,
}

impl ProviderApi {
    pub(crate) fn new(client: Client, base: Url, parent: Url) -> Self {
        Self {
            client,
            base,
            parent,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.base.join(path).map_err(|e| {
            AuthError::protocol("second-factor provider", format!("bad endpoint '{path}': {e}"))
        })
    }

    fn origin(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.base.origin().ascii_serialization()).ok()
    }

    async fn post_form(
        &self,
        url: &Url,
        form: &[(&str, &str)],
        ajax_referer: Option<&Url>,
    ) -> Result<Response, AuthError> {
        let mut request = self.client.post(url.clone()).form(form);
        if let Some(origin) = self.origin() {
            request = request.header(ORIGIN, origin);
        }
        if let Some(referer) = ajax_referer {
            request = request
                .header("X-Requested-With", "XMLHttpRequest")
                .header(REFERER, referer.as_str());
        }
        request
            .send()
            .await
            .map_err(|e| AuthError::transport(url, e))
    }

    /// Opens a provider session for the given signed-request half and
    /// returns its session id.
    pub(crate) async fn begin_session(&self, provider_half: &str) -> Result<String, AuthError> {
        let mut url = self.endpoint(AUTH_PATH)?;
        url.query_pairs_mut()
            .append_pair("tx", provider_half)
            .append_pair("parent", self.parent.as_str())
            .append_pair("v", IFRAME_PROTOCOL_VERSION);

        let form = [
            ("tx", provider_half),
            ("parent", self.parent.as_str()),
            ("java_version", ""),
            ("flash_version", ""),
            ("screen_resolution_width", "500"),
            ("screen_resolution_height", "1000"),
            ("color_depth", "24"),
            ("is_cef_browser", "false"),
            ("is_ipad_os", "false"),
        ];
        let response = self.post_form(&url, &form, None).await?;
        debug!(status = %response.status(), "provider handshake answered");

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                AuthError::protocol("second-factor handshake", "response has no Location header")
            })?;
        let target = url.join(location).map_err(|e| {
            AuthError::protocol(
                "second-factor handshake",
                format!("Location header is not a URL: {e}"),
            )
        })?;
        target
            .query_pairs()
            .find(|(key, _)| key == "sid")
            .map(|(_, sid)| sid.into_owned())
            .filter(|sid| !sid.is_empty())
            .ok_or_else(|| {
                AuthError::protocol("second-factor handshake", "Location header carries no 'sid'")
            })
    }

    /// Fetches the prompt page HTML for `sid`.
    pub(crate) async fn fetch_prompt(&self, sid: &str) -> Result<String, AuthError> {
        let mut url = self.endpoint(PROMPT_PATH)?;
        url.query_pairs_mut().append_pair("sid", sid);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AuthError::transport(&url, e))?;
        response
            .text()
            .await
            .map_err(|e| AuthError::transport(&url, e))
    }

    /// Submits a factor choice.
    ///
    /// Returns the transaction id to poll, or `None` for an SMS request whose
    /// response is not decoded.
    pub(crate) async fn submit_factor(
        &self,
        sid: &str,
        option: &SecondFactorOption,
        passcode: Option<&str>,
    ) -> Result<Option<String>, AuthError> {
        let url = self.endpoint(PROMPT_PATH)?;
        let mut referer = url.clone();
        referer.query_pairs_mut().append_pair("sid", sid);

        let mut form = vec![
            ("sid", sid),
            ("device", option.device_id.as_str()),
            ("factor", option.factor.form_value()),
            ("out_of_date", ""),
            ("days_out_of_date", ""),
            ("days_to_block", "None"),
        ];
        if option.factor == FactorKind::Passcode
            && let Some(passcode) = passcode
        {
            form.push(("passcode", passcode));
        }

        let response = self.post_form(&url, &form, Some(&referer)).await?;
        if option.factor == FactorKind::Sms {
            debug!(device = %option.device_id, "requested new passcodes by text message");
            return Ok(None);
        }

        let prompt: PromptResponse = decode(response, &url, "second-factor prompt").await?;
        Ok(Some(prompt.txid))
    }

    /// Asks for the current status of transaction `txid`.
    pub(crate) async fn check_status(
        &self,
        sid: &str,
        txid: &str,
    ) -> Result<ChallengeStatus, AuthError> {
        let url = self.endpoint(STATUS_PATH)?;
        let response = self
            .post_form(&url, &[("sid", sid), ("txid", txid)], None)
            .await?;
        let status: StatusResponse = decode(response, &url, "second-factor status").await?;
        if let Some(message) = status.status.as_deref().filter(|m| !m.is_empty()) {
            info!("{message}");
        }
        Ok(ChallengeStatus::from_status_code(&status.status_code))
    }

    /// Fetches the signed result cookie for an approved transaction.
    pub(crate) async fn fetch_result_cookie(
        &self,
        sid: &str,
        txid: &str,
    ) -> Result<String, AuthError> {
        let mut url = self.endpoint(STATUS_PATH)?;
        url.path_segments_mut()
            .map_err(|()| {
                AuthError::protocol("second-factor provider", "base URL cannot carry a path")
            })?
            .push(txid);
        let response = self.post_form(&url, &[("sid", sid)], None).await?;
        let result: ResultResponse = decode(response, &url, "second-factor result").await?;
        Ok(result.cookie)
    }
}

async fn decode<T: DeserializeOwned>(
    response: Response,
    url: &Url,
    context: &'static str,
) -> Result<T, AuthError> {
    let body = response
        .text()
        .await
        .map_err(|e| AuthError::transport(url, e))?;
    let envelope: Envelope<T> = serde_json::from_str(&body)
        .map_err(|e| AuthError::protocol(context, format!("response is not the expected JSON: {e}")))?;

    if let Some(stat) = envelope.stat.as_deref()
        && stat != "OK"
    {
        let message = envelope.message.unwrap_or_default();
        return Err(AuthError::protocol(
            context,
            format!("provider answered '{stat}' {message}").trim_end().to_string(),
        ));
    }
    envelope
        .response
        .ok_or_else(|| AuthError::protocol(context, "JSON has no 'response' member"))
}
