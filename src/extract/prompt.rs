//! Second-factor option discovery from the provider's prompt page.
//!
//! The prompt page lists devices in a `<select name="device">` element and
//! describes each device in a `<fieldset data-device-index="...">` holding one
//! `factor` input per available method.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::compile_static_regex;
use crate::challenge::{FactorKind, SecondFactorOption};

static DEVICE_SELECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?is)<select\b[^>]*\bname\s*=\s*["']device["'][^>]*>(.*?)</select\s*>"#,
    )
});
static OPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<option\b([^>]*)>(.*?)</option\s*>"));
static FIELDSET_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<fieldset\b([^>]*)>(.*?)</fieldset\s*>"));
static INPUT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<input\b([^>]*)>"));
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?s)<[^>]*>"));

/// Parses every (device, factor) pair from a prompt page, in document order.
///
/// A device whose fieldset announces SMS capability also gets one synthetic
/// [`FactorKind::Sms`] option. Devices without a fieldset contribute nothing.
#[must_use]
pub fn parse_prompt_options(html: &str) -> Vec<SecondFactorOption> {
    let Some(select) = DEVICE_SELECT_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
    else {
        debug!("prompt page has no device selector");
        return Vec::new();
    };

    let fieldsets: Vec<(String, &str)> = FIELDSET_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let attrs = parse_attributes(caps.get(1)?.as_str());
            let index = attrs.get("data-device-index")?.clone();
            Some((index, caps.get(2)?.as_str()))
        })
        .collect();

    let mut options = Vec::new();
    for device in OPTION_RE.captures_iter(select.as_str()) {
        let attrs = parse_attributes(device.get(1).map_or("", |m| m.as_str()));
        let Some(device_id) = attrs.get("value").filter(|id| !id.is_empty()) else {
            continue;
        };
        let label = text_content(device.get(2).map_or("", |m| m.as_str()));

        let Some((_, body)) = fieldsets.iter().find(|(index, _)| index == device_id) else {
            debug!(device = %device_id, "device has no fieldset; skipping");
            continue;
        };

        options.extend(device_options(device_id, &label, body));
    }

    debug!(count = options.len(), "parsed second-factor options");
    options
}

fn device_options(device_id: &str, label: &str, fieldset: &str) -> Vec<SecondFactorOption> {
    let inputs: Vec<HashMap<String, String>> = INPUT_TAG_RE
        .captures_iter(fieldset)
        .filter_map(|caps| caps.get(1).map(|m| parse_attributes(m.as_str())))
        .collect();
    let input_value = |name: &str| {
        inputs
            .iter()
            .find(|attrs| attrs.get("name").is_some_and(|n| n == name))
            .and_then(|attrs| attrs.get("value"))
            .filter(|value| !value.is_empty())
    };

    let next_passcode = input_value("next-passcode");
    let sms_capable = input_value("phone-smsable").is_some_and(|value| value == "true");

    let mut options: Vec<SecondFactorOption> = inputs
        .iter()
        .filter(|attrs| attrs.get("name").is_some_and(|n| n == "factor"))
        .filter_map(|attrs| attrs.get("value"))
        .map(|value| {
            let factor = FactorKind::from_form_value(value);
            let mut description = format!("{label}: {value}");
            if factor == FactorKind::Passcode
                && let Some(hint) = next_passcode
            {
                description.push_str(&format!(" (next SMS passcode starts with {hint})"));
            }
            SecondFactorOption {
                device_id: device_id.to_string(),
                factor,
                description,
            }
        })
        .collect();

    if sms_capable {
        options.push(SecondFactorOption {
            device_id: device_id.to_string(),
            factor: FactorKind::Sms,
            description: format!("{label}: {}", FactorKind::Sms),
        });
    }

    options
}

fn parse_attributes(tag: &str) -> HashMap<String, String> {
    ATTR_RE
        .captures_iter(tag)
        .filter_map(|attr| {
            let key = attr.get(1)?.as_str().to_ascii_lowercase();
            let value = attr.get(2).or_else(|| attr.get(3))?.as_str();
            Some((key, html_unescape_basic(value)))
        })
        .collect()
}

fn text_content(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, " ");
    html_unescape_basic(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn html_unescape_basic(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", "\u{00a0}")
        .replace("&amp;", "&")
}
