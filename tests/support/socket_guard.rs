//! Mock gateway startup for sandboxes that forbid binding localhost.

use std::net::{Ipv4Addr, TcpListener};

use wiremock::MockServer;

/// Set to `1`, `true` or `yes` to turn a skipped mock-gateway test into a failure.
const REQUIRE_ENV: &str = "WEBLOGIN_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_ENV).is_ok_and(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        )
    })
}

/// Starts a mock server, or returns `None` when localhost cannot be bound.
///
/// Panics instead of skipping when `WEBLOGIN_REQUIRE_SOCKET_TESTS` is set.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    let bind_error = match TcpListener::bind((Ipv4Addr::LOCALHOST, 0)) {
        Ok(listener) => {
            drop(listener);
            return Some(MockServer::start().await);
        }
        Err(error) => error,
    };

    assert!(
        !sockets_required(),
        "mock gateway cannot bind 127.0.0.1 ({bind_error}) and {REQUIRE_ENV} is set"
    );
    eprintln!("skipping mock gateway test: cannot bind 127.0.0.1 ({bind_error}); set {REQUIRE_ENV}=1 to fail instead");
    None
}
