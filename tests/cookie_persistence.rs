//! Integration tests for cookies surviving a save/load cycle between sessions.

use std::fs;
use std::sync::Arc;

use reqwest::Method;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use weblogin_core::{LoginLimits, Session, load_cookie_file, save_cookie_file};
mod support;
use support::gateway::config_for;
use support::socket_guard::start_mock_server_or_skip;

#[tokio::test]
async fn test_cookies_set_by_server_are_sent_by_next_session() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = tempfile::TempDir::new().unwrap();
    let cookie_file = temp_dir.path().join("cookies.tmp");

    Mock::given(method("GET"))
        .and(path("/issue"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("Set-Cookie", "cosign=abc123; Path=/; HttpOnly")
                .append_header("Set-Cookie", "prefs=dark; Path=/issue; Max-Age=3600"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/check"))
        .and(header("cookie", "cosign=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("welcome back"))
        .expect(1)
        .mount(&server)
        .await;

    // First run: receive cookies and persist them.
    let jar = Arc::new(load_cookie_file(&cookie_file));
    assert!(jar.is_empty());
    let session = Session::new(config_for(&server), Arc::clone(&jar)).unwrap();
    let response = session
        .request(Method::GET, format!("{}/issue", server.uri()).parse().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    save_cookie_file(&cookie_file, &jar).unwrap();

    let text = fs::read_to_string(&cookie_file).unwrap();
    assert!(text.starts_with("# Netscape HTTP Cookie File"));
    assert!(text.contains("#HttpOnly_127.0.0.1\tFALSE\t/\tFALSE\t0\tcosign\tabc123"));
    assert!(text.contains("\t/issue\t"));

    // Second run: a fresh jar from the file authenticates the request.
    let reloaded = Arc::new(load_cookie_file(&cookie_file));
    assert_eq!(reloaded.len(), 2);
    let mut session = Session::new(config_for(&server), reloaded).unwrap();
    let request = session
        .request(Method::GET, format!("{}/check", server.uri()).parse().unwrap())
        .build()
        .unwrap();
    let mut handler = NoLogin;
    let response = session
        .perform(request, &mut handler, &LoginLimits::unlimited())
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "welcome back");
}

#[tokio::test]
async fn test_server_expired_cookie_is_not_saved() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = tempfile::TempDir::new().unwrap();
    let cookie_file = temp_dir.path().join("cookies.tmp");
    let host = url::Url::parse(&server.uri()).unwrap();
    fs::write(
        &cookie_file,
        format!(
            "# Netscape HTTP Cookie File\n{}\tFALSE\t/\tFALSE\t0\tcosign\tstale\n",
            host.host_str().unwrap()
        ),
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/logout"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("Set-Cookie", "cosign=; Path=/; Max-Age=0"),
        )
        .mount(&server)
        .await;

    let jar = Arc::new(load_cookie_file(&cookie_file));
    assert_eq!(jar.len(), 1);
    let session = Session::new(config_for(&server), Arc::clone(&jar)).unwrap();
    session
        .request(Method::GET, format!("{}/logout", server.uri()).parse().unwrap())
        .send()
        .await
        .unwrap();

    assert!(jar.is_empty());
    save_cookie_file(&cookie_file, &jar).unwrap();
    let text = fs::read_to_string(&cookie_file).unwrap();
    assert!(!text.contains("cosign"));
}

#[test]
fn test_unreadable_cookie_file_starts_empty() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    // A directory cannot be read as a cookie file.
    let jar = load_cookie_file(temp_dir.path());
    assert!(jar.is_empty());
}

/// Handler for requests that must never trigger a login.
struct NoLogin;

impl weblogin_core::LoginHandler for NoLogin {
    fn credentials(&mut self) -> Result<weblogin_core::Credentials, weblogin_core::AuthError> {
        panic!("login was not expected");
    }

    fn report_credential_error(&mut self, _message: &str) {}

    fn on_second_factor_start(&mut self, _identity: &str) {}

    fn on_second_factor_failed(&mut self, _option: &weblogin_core::SecondFactorOption) {}

    fn choose_second_factor(
        &mut self,
        _options: &[weblogin_core::SecondFactorOption],
    ) -> Result<weblogin_core::SecondFactorChoice, weblogin_core::AuthError> {
        panic!("second factor was not expected");
    }
}
