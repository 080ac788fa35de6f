//! Environment variable helpers for `GAS_*` overrides.
//!
//! ```ignore
//! use gas_core::env::{env_get, env_get_opt};
//!
//! let depth: usize = env_get("GAS_DEPTH", 32);
//! let interval: Option<u64> = env_get_opt("GAS_POLL_INTERVAL_US");
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, or return `default` when unset or unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Parse `key` as `T` if set and valid. A set but unparsable value is
/// logged and ignored.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__GAS_TEST_UNSET_12345__", 42);
        assert_eq!(val, 42);
        assert!(env_get_opt::<u64>("__GAS_TEST_UNSET_12345__").is_none());
    }

    #[test]
    fn test_env_get_parse() {
        std::env::set_var("__GAS_TEST_DEPTH__", " 16 ");
        assert_eq!(env_get::<usize>("__GAS_TEST_DEPTH__", 1), 16);
        std::env::set_var("__GAS_TEST_DEPTH__", "sixteen");
        assert_eq!(env_get::<usize>("__GAS_TEST_DEPTH__", 1), 1);
        std::env::remove_var("__GAS_TEST_DEPTH__");
    }
}
