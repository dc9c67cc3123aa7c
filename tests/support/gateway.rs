//! Mock gateway and provider fixtures shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use weblogin_core::{PersistentCookieJar, PollPolicy, Session, SessionConfig};

pub const PROVIDER_HOST: &str = "api-x.duosecurity.com";
pub const SESSION_ID: &str = "SID123";
pub const TRANSACTION_ID: &str = "TX1";

/// Login page whose inline script declares `error` (and, for the second
/// factor, the provider configuration).
pub fn login_page(error: &str) -> String {
    format!(
        r#"<html><head>
<script src="/js/jquery.js"></script>
<script type="text/javascript">
var error = '{error}'; var duo_config = {{'host':'{PROVIDER_HOST}','sig_request':'AAA:APPBBB','post_argument':'mtoken','post_action':'/login'}};
</script>
</head><body><form method="post"></form></body></html>"#
    )
}

pub fn second_factor_page() -> String {
    login_page("Additional authentication is required.")
}

pub const PROMPT_PAGE: &str = r#"<html><body>
<form id="login-form">
  <select name="device">
    <option value="phone1">iOS (XXX-XXX-1234)</option>
  </select>
  <fieldset data-device-index="phone1">
    <input type="hidden" name="factor" value="Duo Push">
    <input type="hidden" name="factor" value="Passcode">
    <input name="phone-smsable" type="hidden" value="true">
    <input name="next-passcode" type="hidden" value="1">
  </fieldset>
</form></body></html>"#;

pub fn ok_envelope(response: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"stat": "OK", "response": response}))
}

pub fn status_response(code: &str) -> ResponseTemplate {
    ok_envelope(json!({"status_code": code, "status": format!("status is {code}")}))
}

/// Gateway root serving the login page; `POST /` answers with `post_page`.
pub async fn mount_gateway(server: &MockServer, post_page: String) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(login_page("")))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(post_page))
        .mount(server)
        .await;
}

/// Provider handshake redirecting to the prompt, and the prompt page itself.
pub async fn mount_provider_prompt(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/frame/web/v1/auth"))
        .and(query_param("tx", "AAA"))
        .and(query_param("v", "2.6"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("/frame/prompt?sid={SESSION_ID}").as_str()),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/frame/prompt"))
        .and(query_param("sid", SESSION_ID))
        .respond_with(ResponseTemplate::new(200).set_body_string(PROMPT_PAGE))
        .mount(server)
        .await;
}

/// Factor submission, result cookie and the gateway's signed-response endpoint.
pub async fn mount_factor_exchange(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/frame/prompt"))
        .respond_with(ok_envelope(json!({"txid": TRANSACTION_ID})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/frame/status/{TRANSACTION_ID}")))
        .respond_with(ok_envelope(json!({"cookie": "COOKIE"})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/welcome")
                .insert_header("Set-Cookie", "gateway_session=established; Path=/; HttpOnly"),
        )
        .mount(server)
        .await;
}

/// Config pointing both the gateway and the provider at `server`.
pub fn config_for(server: &MockServer) -> SessionConfig {
    let base = Url::parse(&format!("{}/", server.uri())).unwrap();
    SessionConfig::new(base.clone())
        .with_provider_base_url(base)
        .with_poll_policy(
            PollPolicy::default()
                .with_interval(Duration::from_millis(10))
                .with_max_attempts(10),
        )
}

pub fn session_for(server: &MockServer) -> (Session, Arc<PersistentCookieJar>) {
    let jar = Arc::new(PersistentCookieJar::new());
    let session = Session::new(config_for(server), Arc::clone(&jar)).unwrap();
    (session, jar)
}
