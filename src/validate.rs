//! Input normalization and rejection.
//!
//! Every argument that reaches the licensing client or the store goes through
//! one of these first. Failures are `ValidationError`s and short-circuit the
//! handler before any I/O.

use crate::meter::usage::Period;
use crate::BotError;
use rand::Rng;

/// Length of a license key.
pub const LICENSE_KEY_LEN: usize = 32;

/// Alphabet license keys are drawn from.
pub const LICENSE_KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Longest accepted identity.
pub const MAX_IDENTITY_LEN: usize = 64;

/// Upper bound for product prices.
pub const MAX_PRICE: f64 = 1_000_000.0;

/// Validate a license key: exactly 32 characters of `[A-Z0-9]`.
///
/// Surrounding whitespace is trimmed; case is not folded.
pub fn validate_license_key(raw: &str) -> Result<String, BotError> {
    let key = raw.trim();
    if key.len() != LICENSE_KEY_LEN {
        return Err(BotError::invalid(
            "license key",
            format!("must be {} characters, got {}", LICENSE_KEY_LEN, key.chars().count()),
        ));
    }
    if !key.bytes().all(|b| LICENSE_KEY_ALPHABET.contains(&b)) {
        return Err(BotError::invalid(
            "license key",
            "only uppercase letters and digits are allowed",
        ));
    }
    Ok(key.to_string())
}

/// Bounds-check an integer argument.
pub fn validate_integer(field: &str, value: i64, min: i64, max: i64) -> Result<i64, BotError> {
    if value < min || value > max {
        return Err(BotError::OutOfRange {
            field: field.to_string(),
            min,
            max,
            value,
        });
    }
    Ok(value)
}

/// Validate an opaque caller or user identity.
///
/// Mentions of the form `<@123>` or `<@!123>` are unwrapped.
pub fn validate_identity(raw: &str) -> Result<String, BotError> {
    let trimmed = raw.trim();
    let id = trimmed
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|inner| inner.trim_start_matches('!'))
        .unwrap_or(trimmed);

    if id.is_empty() {
        return Err(BotError::invalid("user", "cannot be empty"));
    }
    if id.len() > MAX_IDENTITY_LEN {
        return Err(BotError::invalid(
            "user",
            format!("longer than {} characters", MAX_IDENTITY_LEN),
        ));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    {
        return Err(BotError::invalid("user", "contains unsupported characters"));
    }
    Ok(id.to_string())
}

/// Validate an email address (`local@domain.tld`, no whitespace).
pub fn validate_email(raw: &str) -> Result<String, BotError> {
    let email = raw.trim();
    let invalid = || BotError::invalid("email", format!("'{}' is not an email address", email));

    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let (host, tld) = domain.rsplit_once('.').ok_or_else(invalid)?;
    if host.is_empty() || tld.is_empty() {
        return Err(invalid());
    }
    Ok(email.to_string())
}

/// Parse a reporting period (`7d`, `30d`, `90d`, `1y`).
pub fn validate_period(raw: &str) -> Result<Period, BotError> {
    Period::parse(raw.trim())
        .ok_or_else(|| BotError::invalid("period", "expected one of 7d, 30d, 90d, 1y"))
}

/// Parse a non-negative price with at most two decimal places.
pub fn validate_price(raw: &str) -> Result<f64, BotError> {
    let price = raw.trim();
    let invalid = |reason: &str| BotError::invalid("price", reason.to_string());

    let (whole, fraction) = price.split_once('.').unwrap_or((price, ""));
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("must be a non-negative number"));
    }
    if fraction.len() > 2 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("at most two decimal places"));
    }
    let value: f64 = price
        .parse()
        .map_err(|_| invalid("must be a non-negative number"))?;
    if value > MAX_PRICE {
        return Err(invalid("exceeds the maximum price"));
    }
    Ok(value)
}

/// Generate a fresh license key in the canonical format.
pub fn generate_license_key() -> String {
    let mut rng = rand::thread_rng();
    (0..LICENSE_KEY_LEN)
        .map(|_| LICENSE_KEY_ALPHABET[rng.gen_range(0..LICENSE_KEY_ALPHABET.len())] as char)
        .collect()
}

/// Escape characters that are significant to HTML or chat markdown.
pub fn sanitize_for_display(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '*' | '_' | '~' | '`' | '|' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '@' => out.push_str("@\u{200b}"),
            _ => out.push(c),
        }
    }
    out
}

/// Shorten to `max` characters, ending in `...` when cut.
pub fn truncate_for_display(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
