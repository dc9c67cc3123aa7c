//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// Cookie file used when none is given.
pub const DEFAULT_COOKIE_FILE: &str = "cookies.tmp";

/// Authenticate to a Shibboleth weblogin gateway from the command line.
///
/// Logs in (username, password, then a Duo second factor) only when the
/// stored cookies no longer satisfy the gateway, and saves the resulting
/// session cookies for curl, wget and later runs.
#[derive(Parser, Debug)]
#[command(name = "weblogin")]
#[command(author, version, about)]
pub struct Args {
    /// Netscape-style cookie file (e.g. one generated by curl)
    #[arg(default_value = DEFAULT_COOKIE_FILE)]
    pub cookie_file: PathBuf,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Gateway login URL
    #[arg(long, value_name = "URL")]
    pub gateway_url: Option<Url>,

    /// Username to log in as (prompted when omitted)
    #[arg(short, long)]
    pub username: Option<String>,

    /// Delay between second-factor status checks in milliseconds (1-60000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=60_000))]
    pub poll_interval_ms: Option<u64>,

    /// Give up after this many second-factor status checks
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub poll_max_attempts: Option<u32>,

    /// Give up waiting for second-factor approval after this many seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub poll_timeout_secs: Option<u64>,

    /// Maximum credential and second-factor attempts (unlimited when omitted)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub max_login_attempts: Option<u32>,
}
