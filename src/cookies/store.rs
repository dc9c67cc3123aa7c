//! Loading and saving the on-disk cookie file.
//!
//! Loading is permissive: a missing, unreadable or garbage file yields an empty
//! jar so a fresh login can still proceed. Saving is atomic.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use super::{
    CookieError, CookieLine, PersistentCookieJar, parse_netscape_cookies, write_netscape_cookies,
};

/// Loads a Netscape cookie file into a new jar.
///
/// Never fails: problems are logged and an empty (or partial) jar is returned.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn load_cookie_file(path: &Path) -> PersistentCookieJar {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            debug!("cookie file does not exist yet; starting with an empty jar");
            return PersistentCookieJar::new();
        }
        Err(error) => {
            warn!(error = %error, "cannot open cookie file; starting with an empty jar");
            return PersistentCookieJar::new();
        }
    };

    match parse_netscape_cookies(BufReader::new(file)) {
        Ok(result) => {
            for (line_num, reason) in &result.warnings {
                warn!(line = line_num, reason = %reason, "skipping malformed cookie line");
            }
            info!(count = result.cookies.len(), "loaded cookies");
            PersistentCookieJar::from_cookies(result.cookies)
        }
        Err(error) => {
            warn!(error = %error, "cookie file unusable; starting with an empty jar");
            PersistentCookieJar::new()
        }
    }
}

/// Writes every unexpired cookie in `jar` to `path`, session cookies included.
///
/// The file is written next to its destination and renamed into place, so a
/// crash never leaves a truncated cookie file behind.
///
/// # Errors
///
/// Returns [`CookieError::Io`] if the directory cannot be created or the file
/// cannot be written or renamed.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn save_cookie_file(path: &Path, jar: &PersistentCookieJar) -> Result<(), CookieError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let cookies = jar.snapshot();
    let partial = partial_path(path);
    if let Err(error) = write_and_replace(&partial, path, &cookies) {
        let _ = fs::remove_file(&partial);
        return Err(error.into());
    }

    info!(count = cookies.len(), "saved cookies");
    Ok(())
}

fn write_and_replace(partial: &Path, path: &Path, cookies: &[CookieLine]) -> io::Result<()> {
    let file = File::create(partial)?;
    write_netscape_cookies(BufWriter::new(file), cookies)?;
    fs::rename(partial, path)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
