//! Environment variable utilities
//!
//! Generic `env_get<T>` for parsing environment variables with defaults,
//! plus the boolean toggle parser used for `ROTATE_DEBUG`.
//!
//! # Usage
//!
//! ```ignore
//! use tilerot_core::env::env_get_bool;
//!
//! // Accepts "1", any other non-zero integer, "true", "yes", "on"
//! let debug: bool = env_get_bool("ROTATE_DEBUG", false);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as optional value
///
/// Returns `Some(T)` if the variable is set and parses successfully,
/// `None` otherwise.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as boolean
///
/// Unset variables return the default. Set variables are parsed with
/// [`parse_bool`]; anything unparsable reads as false.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => parse_bool(&val),
        Err(_) => default,
    }
}

/// Parse a toggle value
///
/// Integers are true when non-zero (`"2"` enables, `"0"` disables).
/// Words `true`, `yes`, `on` are accepted case-insensitively.
pub fn parse_bool(val: &str) -> bool {
    let val = val.trim();
    if let Ok(n) = val.parse::<i64>() {
        return n != 0;
    }
    matches!(val.to_lowercase().as_str(), "true" | "yes" | "on")
}

// ============================================================================
// Tests
// ============================================================================
