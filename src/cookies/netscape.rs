//! Netscape cookie file reader and writer.
//!
//! One cookie per line, seven TAB-separated fields:
//!
//! ```text
//! domain  tailmatch  path  secure  expires  name  value
//! ```
//!
//! curl marks `HttpOnly` cookies by prefixing the domain with `#HttpOnly_`;
//! every other line starting with `#` is a comment.

use std::fmt;
use std::io::{self, BufRead, Write};

use tracing::{trace, warn};

/// Header line written at the top of every saved cookie file.
pub const NETSCAPE_HEADER: &str = "# Netscape HTTP Cookie File";

const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// A single cookie in Netscape cookie-file form.
///
/// `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct CookieLine {
    /// Domain the cookie belongs to (e.g. `.umich.edu`).
    pub domain: String,
    /// Whether subdomains of `domain` match too.
    pub tailmatch: bool,
    /// Path scope.
    pub path: String,
    /// HTTPS only.
    pub secure: bool,
    /// Written with the `#HttpOnly_` prefix.
    pub http_only: bool,
    /// Expiry in Unix seconds; `0` for a session cookie.
    pub expires: u64,
    pub name: String,
    value: String,
}

impl CookieLine {
    #[must_use]
    #[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
    pub fn new(
        domain: String,
        tailmatch: bool,
        path: String,
        secure: bool,
        http_only: bool,
        expires: u64,
        name: String,
        value: String,
    ) -> Self {
        Self {
            domain,
            tailmatch,
            path,
            secure,
            http_only,
            expires,
            name,
            value,
        }
    }

    /// The cookie value. Treat it as a credential.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// True for cookies without an expiry (kept only for the browser session).
    #[must_use]
    pub fn is_session(&self) -> bool {
        self.expires == 0
    }

    /// True when the cookie has a fixed expiry at or before `now` (Unix seconds).
    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires != 0 && self.expires <= now
    }
}

impl fmt::Debug for CookieLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieLine")
            .field("domain", &self.domain)
            .field("tailmatch", &self.tailmatch)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .field("expires", &self.expires)
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Errors reading or writing a cookie file.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    #[error("cookie file I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Every cookie line in a non-empty file was malformed.
    #[error("no usable cookies in file ({malformed} malformed line(s))")]
    NoCookiesFound {
        /// Lines that failed to parse.
        malformed: usize,
    },
}

/// Cookies read from a file plus the lines that were skipped.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub cookies: Vec<CookieLine>,
    /// `(line number, reason)` for each skipped line. Reasons never quote values.
    pub warnings: Vec<(usize, String)>,
}

/// Reads a Netscape cookie file.
///
/// Blank lines and comments are skipped; CRLF endings are accepted. Malformed
/// lines are reported in [`ParseResult::warnings`] and do not stop parsing.
///
/// # Errors
///
/// [`CookieError::Io`] on read failure and [`CookieError::NoCookiesFound`]
/// when there were cookie lines but none of them parsed.
pub fn parse_netscape_cookies(reader: impl BufRead) -> Result<ParseResult, CookieError> {
    let mut result = ParseResult::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let (body, http_only) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => (rest, true),
            None if line.starts_with('#') => continue,
            None => (line, false),
        };

        match parse_fields(body, http_only) {
            Ok(cookie) => {
                trace!(line = index + 1, domain = %cookie.domain, name = %cookie.name, "read cookie");
                result.cookies.push(cookie);
            }
            Err(reason) => result.warnings.push((index + 1, reason)),
        }
    }

    if result.cookies.is_empty() && !result.warnings.is_empty() {
        return Err(CookieError::NoCookiesFound {
            malformed: result.warnings.len(),
        });
    }
    Ok(result)
}

fn parse_fields(body: &str, http_only: bool) -> Result<CookieLine, String> {
    let fields: Vec<&str> = body.split('\t').collect();
    let Ok([domain, tailmatch, path, secure, expires, name, value]) =
        <[&str; 7]>::try_from(fields.as_slice())
    else {
        return Err(format!(
            "expected 7 TAB-separated fields, found {}",
            fields.len()
        ));
    };

    if domain.is_empty() {
        return Err("empty domain".to_string());
    }
    if name.is_empty() {
        return Err(format!("cookie for {domain} has no name"));
    }
    let flag = |field: &str, what: &str| match field {
        "TRUE" => Ok(true),
        "FALSE" => Ok(false),
        other => Err(format!("{what} flag of '{name}' must be TRUE or FALSE, got '{other}'")),
    };
    let expires = expires
        .parse::<u64>()
        .map_err(|_| format!("expiry of '{name}' is not a Unix timestamp: '{expires}'"))?;

    Ok(CookieLine::new(
        domain.to_string(),
        flag(tailmatch, "tailmatch")?,
        path.to_string(),
        flag(secure, "secure")?,
        http_only,
        expires,
        name.to_string(),
        value.to_string(),
    ))
}

/// Writes `cookies` in Netscape format, header first.
///
/// Cookies with a TAB or line break in any field cannot be represented and
/// are skipped with a warning.
///
/// # Errors
///
/// Returns the underlying I/O error if writing fails.
pub fn write_netscape_cookies(mut writer: impl Write, cookies: &[CookieLine]) -> io::Result<()> {
    writeln!(writer, "{NETSCAPE_HEADER}")?;
    writeln!(writer, "# This file was generated by weblogin. Edit at your own risk.")?;
    writeln!(writer)?;
    for cookie in cookies {
        if let Some(part) = unwritable_field(cookie) {
            warn!(domain = %cookie.domain.escape_debug(), part, "skipping cookie that does not fit on one line");
            continue;
        }
        let prefix = if cookie.http_only { HTTP_ONLY_PREFIX } else { "" };
        writeln!(
            writer,
            "{prefix}{}\t{}\t{}\t{}\t{}\t{}\t{}",
            cookie.domain,
            flag_text(cookie.tailmatch),
            cookie.path,
            flag_text(cookie.secure),
            cookie.expires,
            cookie.name,
            cookie.value
        )?;
    }
    writer.flush()
}

fn unwritable_field(cookie: &CookieLine) -> Option<&'static str> {
    let breaks_line = |text: &str| text.contains(['\t', '\n', '\r']);
    [
        ("domain", cookie.domain.as_str()),
        ("path", cookie.path.as_str()),
        ("name", cookie.name.as_str()),
        ("value", cookie.value.as_str()),
    ]
    .into_iter()
    .find_map(|(field, text)| breaks_line(text).then_some(field))
}

fn flag_text(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}
