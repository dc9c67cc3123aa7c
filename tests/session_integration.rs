//! Integration tests for the authentication state machine against a mock
//! gateway and second-factor provider.

use secrecy::Secret;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use weblogin_core::{AuthError, AuthState, FactorKind, SecondFactorOption};
mod support;
use support::gateway::{
    PROVIDER_HOST, SESSION_ID, TRANSACTION_ID, login_page, mount_factor_exchange, mount_gateway,
    mount_provider_prompt, second_factor_page, session_for, status_response,
};
use support::socket_guard::start_mock_server_or_skip;

fn password() -> Secret<String> {
    Secret::new("hunter2".to_string())
}

fn push_option(options: &[SecondFactorOption]) -> SecondFactorOption {
    options
        .iter()
        .find(|option| option.factor == FactorKind::Push)
        .cloned()
        .unwrap()
}

// ---- Primary authentication ----

#[tokio::test]
async fn test_primary_login_requiring_second_factor_lists_options() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_gateway(&server, second_factor_page()).await;
    mount_provider_prompt(&server).await;
    let (mut session, _jar) = session_for(&server);

    let options = session
        .authenticate_primary("alice", &password())
        .await
        .unwrap();

    let factors: Vec<&FactorKind> = options.iter().map(|o| &o.factor).collect();
    assert_eq!(
        factors,
        vec![&FactorKind::Push, &FactorKind::Passcode, &FactorKind::Sms]
    );
    assert!(session.is_authenticated());
    assert!(!session.is_second_factor_authenticated());

    let config = session.second_factor_config().unwrap();
    assert_eq!(config.provider_host, PROVIDER_HOST);
    assert_eq!(config.signed_request.provider_half(), "AAA");
    assert_eq!(config.signed_request.app_half(), "BBB");
    assert_eq!(config.post_argument, "mtoken");

    let AuthState::SecondFactorPending(pending) = session.state() else {
        panic!("expected a pending challenge, got {:?}", session.state());
    };
    assert_eq!(pending.session_id, SESSION_ID);
    assert!(pending.transaction_id.is_none());
}

#[tokio::test]
async fn test_primary_login_posts_identity_twice_and_password() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(login_page("")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains("login=alice"))
        .and(body_string_contains("loginX=alice"))
        .and(body_string_contains("password=hunter2"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/welcome"))
        .expect(1)
        .mount(&server)
        .await;
    let (mut session, _jar) = session_for(&server);

    let options = session
        .authenticate_primary("alice", &password())
        .await
        .unwrap();

    assert!(options.is_empty());
    assert!(session.is_authenticated());
    assert!(session.is_second_factor_authenticated());
}

#[tokio::test]
async fn test_rejected_credentials_surface_gateway_text() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_gateway(&server, login_page("Password is incorrect.")).await;
    let (mut session, _jar) = session_for(&server);

    let err = session
        .authenticate_primary("alice", &password())
        .await
        .unwrap_err();

    match err {
        AuthError::Credential { message } => assert_eq!(message, "Password is incorrect."),
        other => panic!("expected a credential error, got {other:?}"),
    }
    assert_eq!(session.state(), &AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_login_page_without_script_is_protocol_error() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_gateway(&server, "<html><body>maintenance</body></html>".to_string()).await;
    let (mut session, _jar) = session_for(&server);

    let err = session
        .authenticate_primary("alice", &password())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Protocol { .. }), "got {err:?}");
    assert_eq!(session.state(), &AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_handshake_without_sid_is_protocol_error() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_gateway(&server, second_factor_page()).await;
    Mock::given(method("POST"))
        .and(path("/frame/web/v1/auth"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/frame/prompt"))
        .mount(&server)
        .await;
    let (mut session, _jar) = session_for(&server);

    let err = session
        .authenticate_primary("alice", &password())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Protocol { .. }), "got {err:?}");
    assert_eq!(session.state(), &AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_handshake_without_location_is_protocol_error() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_gateway(&server, second_factor_page()).await;
    Mock::given(method("POST"))
        .and(path("/frame/web/v1/auth"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let (mut session, _jar) = session_for(&server);

    let err = session
        .authenticate_primary("alice", &password())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Protocol { .. }), "got {err:?}");
}

// ---- Second factor ----

#[tokio::test]
async fn test_push_polls_until_allowed_then_posts_signed_response() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_gateway(&server, second_factor_page()).await;
    mount_provider_prompt(&server).await;
    mount_factor_exchange(&server).await;
    Mock::given(method("POST"))
        .and(path("/frame/status"))
        .and(body_string_contains(format!("txid={TRANSACTION_ID}")))
        .respond_with(status_response("pushed"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/frame/status"))
        .respond_with(status_response("allow"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("required=mtoken"))
        .and(body_string_contains("mtoken=COOKIE%3AAPPBBB"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/welcome")
                .insert_header("Set-Cookie", "gateway_session=established; Path=/"),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    let (mut session, jar) = session_for(&server);

    let options = session
        .authenticate_primary("alice", &password())
        .await
        .unwrap();
    let approved = session
        .authenticate_second_factor(&push_option(&options), None)
        .await
        .unwrap();

    assert!(approved);
    assert_eq!(session.state(), &AuthState::Authenticated);
    assert!(
        jar.snapshot()
            .iter()
            .any(|cookie| cookie.name == "gateway_session")
    );
}

#[tokio::test]
async fn test_denied_push_returns_false_after_one_check() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_gateway(&server, second_factor_page()).await;
    mount_provider_prompt(&server).await;
    mount_factor_exchange(&server).await;
    Mock::given(method("POST"))
        .and(path("/frame/status"))
        .respond_with(status_response("deny"))
        .expect(1)
        .mount(&server)
        .await;
    let (mut session, _jar) = session_for(&server);

    let options = session
        .authenticate_primary("alice", &password())
        .await
        .unwrap();
    let approved = session
        .authenticate_second_factor(&push_option(&options), None)
        .await
        .unwrap();

    assert!(!approved);
    let AuthState::SecondFactorPending(pending) = session.state() else {
        panic!("challenge should still be pending");
    };
    assert_eq!(pending.transaction_id.as_deref(), Some(TRANSACTION_ID));
}

#[tokio::test]
async fn test_sms_request_never_polls() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_gateway(&server, second_factor_page()).await;
    mount_provider_prompt(&server).await;
    Mock::given(method("POST"))
        .and(path("/frame/prompt"))
        .and(body_string_contains("factor=sms"))
        .and(header("X-Requested-With", "XMLHttpRequest"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/frame/status"))
        .respond_with(status_response("allow"))
        .expect(0)
        .mount(&server)
        .await;
    let (mut session, _jar) = session_for(&server);

    let options = session
        .authenticate_primary("alice", &password())
        .await
        .unwrap();
    let sms = options
        .iter()
        .find(|option| option.factor == FactorKind::Sms)
        .cloned()
        .unwrap();
    let approved = session.authenticate_second_factor(&sms, None).await.unwrap();

    assert!(!approved);
    assert!(session.second_factor_config().is_some());
}

#[tokio::test]
async fn test_passcode_is_submitted_with_the_factor() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_gateway(&server, second_factor_page()).await;
    mount_provider_prompt(&server).await;
    Mock::given(method("POST"))
        .and(path("/frame/prompt"))
        .and(body_string_contains("factor=Passcode"))
        .and(body_string_contains("passcode=123456"))
        .respond_with(support::gateway::ok_envelope(
            serde_json::json!({"txid": TRANSACTION_ID}),
        ))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_factor_exchange(&server).await;
    Mock::given(method("POST"))
        .and(path("/frame/status"))
        .respond_with(status_response("allow"))
        .mount(&server)
        .await;
    let (mut session, _jar) = session_for(&server);

    let options = session
        .authenticate_primary("alice", &password())
        .await
        .unwrap();
    let passcode_option = options
        .iter()
        .find(|option| option.factor == FactorKind::Passcode)
        .cloned()
        .unwrap();

    let missing = session
        .authenticate_second_factor(&passcode_option, None)
        .await
        .unwrap_err();
    assert!(matches!(missing, AuthError::Precondition { .. }));

    let approved = session
        .authenticate_second_factor(
            &passcode_option,
            Some(&Secret::new("123456".to_string())),
        )
        .await
        .unwrap();
    assert!(approved);
    assert!(session.is_second_factor_authenticated());
}

#[tokio::test]
async fn test_second_factor_after_full_login_is_precondition_error() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/welcome"))
        .mount(&server)
        .await;
    let (mut session, _jar) = session_for(&server);

    assert!(session.check_already_authenticated().await.unwrap());
    let option = SecondFactorOption {
        device_id: "phone1".to_string(),
        factor: FactorKind::Push,
        description: "iOS: Duo Push".to_string(),
    };
    let err = session
        .authenticate_second_factor(&option, None)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Precondition { .. }));
    assert_eq!(session.state(), &AuthState::Authenticated);
}

#[tokio::test]
async fn test_poll_gives_up_after_max_attempts() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_gateway(&server, second_factor_page()).await;
    mount_provider_prompt(&server).await;
    mount_factor_exchange(&server).await;
    Mock::given(method("POST"))
        .and(path("/frame/status"))
        .respond_with(status_response("pushed"))
        .expect(10)
        .mount(&server)
        .await;
    let (mut session, _jar) = session_for(&server);

    let options = session
        .authenticate_primary("alice", &password())
        .await
        .unwrap();
    let err = session
        .authenticate_second_factor(&push_option(&options), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::PollExhausted { .. }), "got {err:?}");
    assert!(session.second_factor_config().is_some());
}

#[tokio::test]
async fn test_relisting_options_refreshes_provider_session() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_gateway(&server, second_factor_page()).await;
    mount_provider_prompt(&server).await;
    let (mut session, _jar) = session_for(&server);

    let first = session
        .authenticate_primary("alice", &password())
        .await
        .unwrap();
    let second = session.list_second_factor_options().await.unwrap();

    assert_eq!(first, second);
    let received = server.received_requests().await.unwrap();
    let handshakes = received
        .iter()
        .filter(|request| request.url.path() == "/frame/web/v1/auth")
        .count();
    assert_eq!(handshakes, 2);
}
