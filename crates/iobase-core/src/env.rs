//! Environment variable helpers
//!
//! Every runtime knob has a compile-time default and an `IOB_*`
//! override read through these functions.

use std::str::FromStr;

/// Parse `key` as `T`, falling back to `default` when unset or unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// "1", "true", "yes", "on" (any case) are true, anything else false.
/// Unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an octal value such as file permission bits ("644", "0o600", "0755").
pub fn env_get_octal(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| {
            let v = v.trim();
            let digits = v.strip_prefix("0o").unwrap_or(v);
            u32::from_str_radix(digits, 8).ok()
        })
        .unwrap_or(default)
}
