//! Markup and inline-script extraction.
//!
//! The gateway and the second-factor provider expose their state only through
//! HTML and inline JavaScript. This module pattern-matches that text; it is
//! not a browser and does not evaluate scripts.
//!
//! - [`ScriptExtractor`] - seam for reading the login page's inline script
//! - [`RegexScriptExtractor`] - the regex implementation of that seam
//! - [`parse_prompt_options`] - device/factor discovery on the prompt page

mod literal;
mod prompt;
mod script;

pub use literal::{LiteralError, parse_string_mapping};
pub use prompt::parse_prompt_options;
pub use script::RegexScriptExtractor;

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

/// Reads values assigned in the gateway login page's inline script.
///
/// Implementations may pattern-match or lex; callers only see the two values.
pub trait ScriptExtractor: Send + Sync {
    /// Returns the string assigned to the page's `error` variable.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] if the script or the assignment is absent.
    fn find_error_message(&self, html: &str) -> Result<String, ExtractError>;

    /// Returns the key/value mapping assigned to the page's `duo_config` variable.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] if the script or assignment is absent or the
    /// literal is not a flat mapping of strings.
    fn find_second_factor_config(
        &self,
        html: &str,
    ) -> Result<HashMap<String, String>, ExtractError>;
}

/// Why a value could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// No inline script declaring the login variables.
    #[error("no login script found in page")]
    ScriptNotFound,

    /// The script exists but does not assign the variable.
    #[error("script does not assign '{variable}'")]
    VariableNotFound {
        /// Variable name searched for.
        variable: &'static str,
    },

    /// The assigned literal has an unsupported shape.
    #[error("'{variable}' literal is malformed: {source}")]
    MalformedLiteral {
        /// Variable name.
        variable: &'static str,
        /// Decoder failure.
        #[source]
        source: LiteralError,
    },
}

/// Compiles a regex at static init; panics on invalid pattern.
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}
