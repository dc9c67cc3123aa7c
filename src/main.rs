//! CLI entry point for the weblogin tool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use reqwest::Method;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use weblogin_core::session::default_gateway_url;
use weblogin_core::{
    HttpTimeouts, LoginLimits, PersistentCookieJar, PollPolicy, Session, SessionConfig,
    load_cookie_file, save_cookie_file,
};

mod app_config;
mod cli;
mod console;
mod exit_handler;

use app_config::{FileConfig, load_default_file_config};
use cli::Args;
use console::ConsoleHandler;
use exit_handler::determine_exit_outcome;

/// Grace period between Ctrl-C and a forced exit while blocked in a prompt.
const INTERRUPT_GRACE: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    init_tracing(default_level);
    debug!(?args, "CLI arguments parsed");

    let result = run(args).await;
    let (exit, message) = determine_exit_outcome(&result);
    if let Some(message) = message {
        eprintln!("{message}");
    }
    exit.into()
}

fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

async fn run(args: Args) -> Result<()> {
    let loaded = load_default_file_config()?;
    if let Some(path) = loaded.path.as_deref()
        && loaded.config.is_some()
    {
        debug!(path = %path.display(), "loaded config file");
    }
    let file = loaded.config.unwrap_or_default();
    let config = session_config(&args, &file);
    let limits = login_limits(&args, &file);
    let gateway = config.gateway_url.clone();

    let jar = Arc::new(load_cookie_file(&args.cookie_file));
    debug!(cookies = jar.len(), "cookie jar ready");

    let cancel = CancellationToken::new();
    watch_for_interrupt(cancel.clone(), Arc::clone(&jar), args.cookie_file.clone());

    let mut session = Session::new(config, Arc::clone(&jar))?.with_cancellation(cancel);
    let mut handler = ConsoleHandler::stdio(args.username.clone());
    let request = session
        .request(Method::GET, gateway.clone())
        .build()
        .context("Failed to build gateway request")?;

    let outcome = session.perform(request, &mut handler, &limits).await;

    // Cookies are saved whatever the outcome.
    let saved = save_cookie_file(&args.cookie_file, &jar).with_context(|| {
        format!(
            "Failed to save cookie file '{}'",
            args.cookie_file.display()
        )
    });

    let response = outcome?;
    saved?;

    if session.is_login_page(response.url()) {
        bail!("Authentication failed: the gateway still asks for a login");
    }
    info!(status = %response.status(), "authenticated to {}", gateway);
    Ok(())
}

fn session_config(args: &Args, file: &FileConfig) -> SessionConfig {
    let gateway = args
        .gateway_url
        .clone()
        .or_else(|| file.gateway_url.clone())
        .unwrap_or_else(default_gateway_url);

    let defaults = HttpTimeouts::default();
    let timeouts = HttpTimeouts {
        connect: file
            .connect_timeout_secs
            .map_or(defaults.connect, Duration::from_secs),
        read: file
            .read_timeout_secs
            .map_or(defaults.read, Duration::from_secs),
    };

    let mut poll = PollPolicy::default();
    if let Some(ms) = args.poll_interval_ms.or(file.poll_interval_ms) {
        poll = poll.with_interval(Duration::from_millis(ms));
    }
    if let Some(attempts) = args.poll_max_attempts.or(file.poll_max_attempts) {
        poll = poll.with_max_attempts(attempts);
    }
    if let Some(secs) = args.poll_timeout_secs.or(file.poll_timeout_secs) {
        poll = poll.with_deadline(Duration::from_secs(secs));
    }

    let mut config = SessionConfig::new(gateway)
        .with_timeouts(timeouts)
        .with_poll_policy(poll);
    if let Some(base) = file.provider_base_url.clone() {
        config = config.with_provider_base_url(base);
    }
    config
}

fn login_limits(args: &Args, file: &FileConfig) -> LoginLimits {
    args.max_login_attempts
        .or(file.max_login_attempts)
        .map_or_else(LoginLimits::unlimited, LoginLimits::at_most)
}

fn watch_for_interrupt(
    cancel: CancellationToken,
    jar: Arc<PersistentCookieJar>,
    cookie_file: PathBuf,
) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupted; cancelling authentication");
        cancel.cancel();
        // A blocking prompt never observes the token.
        tokio::time::sleep(INTERRUPT_GRACE).await;
        save_before_exit(&cookie_file, &jar);
        std::process::exit(1);
    });
}

/// Flushes the jar on the forced-exit path, which never returns to `run`.
fn save_before_exit(cookie_file: &Path, jar: &PersistentCookieJar) {
    if let Err(error) = save_cookie_file(cookie_file, jar) {
        eprintln!(
            "Failed to save cookie file '{}': {error}",
            cookie_file.display()
        );
    }
}
