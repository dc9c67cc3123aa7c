//! Cookie persistence.
//!
//! Cookies are kept in a [`PersistentCookieJar`] shared by every HTTP client of
//! a session, loaded from a Netscape-format cookie file before the first
//! request and written back after the last one.

mod jar;
mod netscape;
mod store;

pub use jar::PersistentCookieJar;
pub use netscape::{
    CookieError, CookieLine, NETSCAPE_HEADER, ParseResult, parse_netscape_cookies,
    write_netscape_cookies,
};
pub use store::{load_cookie_file, save_cookie_file};
