//! Request dispatch with transparent login.
//!
//! A request is sent through the redirect-following client. When it ends up
//! on the gateway login page the session logs in and the request is sent once
//! more; the second response is returned whatever it is.

use reqwest::{Method, Request, RequestBuilder, Response};
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::AuthError;
use crate::login::{LoginHandler, LoginLimits};
use crate::session::Session;

impl Session {
    /// Starts a request on the redirect-following client, sharing the session jar.
    #[must_use]
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.following_client().request(method, url)
    }

    /// True when `url` is the gateway login page (scheme, host, port and path).
    #[must_use]
    pub fn is_login_page(&self, url: &Url) -> bool {
        let gateway = &self.config().gateway_url;
        url.scheme() == gateway.scheme()
            && url.host_str() == gateway.host_str()
            && url.port_or_known_default() == gateway.port_or_known_default()
            && url.path() == gateway.path()
    }

    /// Sends `request`, logging in and resending it once if it lands on the
    /// gateway login page.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Precondition`] when the request body cannot be replayed
    /// - [`AuthError::Transport`] when either send fails
    /// - any error from [`Session::login`]
    #[instrument(skip_all, fields(method = %request.method(), url = %request.url().path()))]
    pub async fn perform<H>(
        &mut self,
        request: Request,
        handler: &mut H,
        limits: &LoginLimits,
    ) -> Result<Response, AuthError>
    where
        H: LoginHandler + ?Sized,
    {
        let replay = request
            .try_clone()
            .ok_or_else(|| AuthError::precondition("request body cannot be replayed"))?;
        let target = request.url().clone();

        let response = self.send(request, &target).await?;
        if !self.is_login_page(response.url()) {
            debug!(status = %response.status(), "request served without login");
            return Ok(response);
        }

        info!("request was redirected to the login gateway; authenticating");
        self.login(handler, limits).await?;
        self.send(replay, &target).await
    }

    async fn send(&self, request: Request, target: &Url) -> Result<Response, AuthError> {
        self.following_client()
            .execute(request)
            .await
            .map_err(|e| AuthError::transport(target, e))
    }
}
