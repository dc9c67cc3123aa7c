//! Regex-backed extraction of values assigned in the login page's inline script.
//!
//! Extraction happens in two stages: locate the designated `<script>` element,
//! then capture a literal from its text.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use super::literal::parse_string_mapping;
use super::{ExtractError, ScriptExtractor, compile_static_regex};

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<script\b[^>]*>(.*?)</script\s*>"));

/// `var|const|let error = '...';` with either quote character; the opening
/// quote decides the terminator and no escapes are recognised.
static ERROR_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?m)(?:^|[;\s])(?:var|const|let)\s+error\s*=\s*(?:'([^'\n]*)'|"([^"\n]*)")\s*;"#,
    )
});

/// `var|const|let duo_config = {...};` where the braces do not nest.
static CONFIG_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?m)(?:^|[;\s])(?:var|const|let)\s+duo_config\s*=\s*(\{[^}]*\})\s*;")
});

/// Extractor that pattern-matches the literal script source.
///
/// The designated script is the first `<script>` element declaring `error`;
/// both the error message and the second-factor configuration are read from
/// that one element.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexScriptExtractor;

impl RegexScriptExtractor {
    /// Returns the text of the designated login script, if the page has one.
    #[must_use]
    pub fn locate_script(html: &str) -> Option<&str> {
        SCRIPT_RE
            .captures_iter(html)
            .filter_map(|caps| caps.get(1))
            .map(|body| body.as_str())
            .find(|body| ERROR_DECL_RE.is_match(body))
    }
}

impl ScriptExtractor for RegexScriptExtractor {
    fn find_error_message(&self, html: &str) -> Result<String, ExtractError> {
        let script = Self::locate_script(html).ok_or(ExtractError::ScriptNotFound)?;
        let caps = ERROR_DECL_RE
            .captures(script)
            .ok_or(ExtractError::VariableNotFound { variable: "error" })?;
        let message = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str());
        trace!(message, "found gateway error variable");
        Ok(message.to_string())
    }

    fn find_second_factor_config(
        &self,
        html: &str,
    ) -> Result<HashMap<String, String>, ExtractError> {
        let script = Self::locate_script(html).ok_or(ExtractError::ScriptNotFound)?;
        let literal = CONFIG_DECL_RE
            .captures(script)
            .and_then(|caps| caps.get(1))
            .ok_or(ExtractError::VariableNotFound {
                variable: "duo_config",
            })?;
        parse_string_mapping(literal.as_str()).map_err(|source| ExtractError::MalformedLiteral {
            variable: "duo_config",
            source,
        })
    }
}
