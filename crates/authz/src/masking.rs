//! Masking strategies for field values.
//!
//! Every strategy is a pure function of the raw value. Callers guarantee the
//! masked output differs from the raw value (see `FieldAccessResolver`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder for fully withheld values.
pub const REDACTED: &str = "[REDACTED]";

const MAX_MASK_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskingStrategy {
    Asterisk,
    Dots,
    Redacted,
    Partial,
    Initials,
    Domain,
    Currency,
    /// Named masker registered on the field resolver.
    Custom(String),
}

/// String form of a JSON value as a UI would render it.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn fill(raw: &str, ch: char) -> String {
    let len = raw.chars().count().clamp(1, MAX_MASK_LEN);
    std::iter::repeat_n(ch, len).collect()
}

/// `*` per character, capped at eight.
pub fn asterisk(raw: &str) -> String {
    fill(raw, '*')
}

/// `•` per character, capped at eight.
pub fn dots(raw: &str) -> String {
    fill(raw, '•')
}

pub fn redacted() -> String {
    REDACTED.to_string()
}

/// Keep two characters at each end, mask the middle. Four-character values
/// keep one at each end; three or fewer are fully masked.
pub fn partial(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let keep = match chars.len() {
        0..=3 => return asterisk(raw),
        4 => 1,
        _ => 2,
    };

    let mut out = String::with_capacity(raw.len());
    out.extend(&chars[..keep]);
    out.extend(std::iter::repeat_n('*', chars.len() - 2 * keep));
    out.extend(&chars[chars.len() - keep..]);
    out
}

/// First letter of each whitespace-separated token, upper-cased, dot-joined.
pub fn initials(raw: &str) -> String {
    let letters: Vec<String> = raw
        .split_whitespace()
        .filter_map(|token| token.chars().next())
        .map(|c| c.to_uppercase().collect())
        .collect();

    if letters.is_empty() {
        return asterisk(raw);
    }
    letters.join(".")
}

/// Mask the local part of an email, keep `@domain`. Non-emails are fully
/// masked.
pub fn domain(raw: &str) -> String {
    match raw.rsplit_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
            format!("{}@{domain}", asterisk(local))
        }
        _ => asterisk(raw),
    }
}

/// Keep the currency symbol and separators, mask every digit. Bare numbers
/// get `symbol` prepended.
pub fn currency(value: &Value, symbol: &str) -> String {
    let raw = display(value);
    if !raw.chars().any(|c| c.is_ascii_digit()) {
        return asterisk(&raw);
    }

    let masked: String = raw
        .chars()
        .map(|c| if c.is_ascii_digit() { '*' } else { c })
        .collect();

    let has_symbol = raw
        .chars()
        .next()
        .is_some_and(|c| !c.is_ascii_digit() && c != '-' && c != '.');
    if has_symbol {
        masked
    } else if let Some(unsigned) = masked.strip_prefix('-') {
        format!("-{symbol}{unsigned}")
    } else {
        format!("{symbol}{masked}")
    }
}

/// Apply a built-in strategy. `None` for `Custom`, which the caller resolves.
pub fn apply(strategy: &MaskingStrategy, value: &Value, currency_symbol: &str) -> Option<String> {
    let raw = display(value);
    let masked = match strategy {
        MaskingStrategy::Asterisk => asterisk(&raw),
        MaskingStrategy::Dots => dots(&raw),
        MaskingStrategy::Redacted => redacted(),
        MaskingStrategy::Partial => partial(&raw),
        MaskingStrategy::Initials => initials(&raw),
        MaskingStrategy::Domain => domain(&raw),
        MaskingStrategy::Currency => currency(value, currency_symbol),
        MaskingStrategy::Custom(_) => return None,
    };
    Some(masked)
}
