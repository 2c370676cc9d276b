// Connection-string option parsing (§6.2, §4.13). Recognized keys are
// stripped before the sanitized string reaches the driver; each key falls
// back to an `ODBC_*` environment variable, then a documented default.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub test_on_checkout: bool,
    pub checkout_wait_ms: u64,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            test_on_checkout: true,
            checkout_wait_ms: 5000,
        }
    }
}

impl PoolOptions {
    pub fn checkout_wait(&self) -> Duration {
        Duration::from_millis(self.checkout_wait_ms)
    }
}

const KEY_TEST_ON_CHECKOUT: &str = "POOL_TEST_ON_CHECKOUT";
const KEY_CHECKOUT_WAIT_MS: &str = "POOL_CHECKOUT_WAIT_MS";

/// Splits `key=value;key=value` segments out of a connection string,
/// returning the options it specifies plus the string with those segments
/// removed. Keys are matched case-insensitively; unrecognized segments are
/// left untouched for the driver to interpret.
pub fn extract_pool_options(connection_string: &str) -> (PoolOptions, String) {
    let mut test_on_checkout = None;
    let mut checkout_wait_ms = None;
    let mut kept_segments = Vec::new();

    for segment in connection_string.split(';') {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.split_once('=') {
            Some((key, value)) if key.trim().eq_ignore_ascii_case(KEY_TEST_ON_CHECKOUT) => {
                test_on_checkout = parse_bool(value.trim());
            }
            Some((key, value)) if key.trim().eq_ignore_ascii_case(KEY_CHECKOUT_WAIT_MS) => {
                checkout_wait_ms = value.trim().parse::<u64>().ok();
            }
            _ => kept_segments.push(segment),
        }
    }

    let defaults = PoolOptions::default();
    let options = PoolOptions {
        test_on_checkout: test_on_checkout
            .or_else(|| env_bool("ODBC_POOL_TEST_ON_CHECKOUT"))
            .unwrap_or(defaults.test_on_checkout),
        checkout_wait_ms: checkout_wait_ms
            .or_else(|| env_u64("ODBC_POOL_CHECKOUT_WAIT_MS"))
            .unwrap_or(defaults.checkout_wait_ms),
    };

    (options, kept_segments.join(";"))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|v| parse_bool(v.trim()))
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_recognized_keys_case_insensitively() {
        let (options, sanitized) = extract_pool_options("DSN=mydb;pool_test_on_checkout=FALSE;UID=me");
        assert!(!options.test_on_checkout);
        assert_eq!(sanitized, "DSN=mydb;UID=me");
    }

    #[test]
    fn unspecified_keys_fall_back_to_defaults() {
        let (options, _) = extract_pool_options("DSN=mydb");
        assert!(options.test_on_checkout);
        assert_eq!(options.checkout_wait_ms, 5000);
    }

    #[test]
    fn checkout_wait_ms_is_parsed() {
        let (options, sanitized) = extract_pool_options("POOL_CHECKOUT_WAIT_MS=1500;DSN=mydb");
        assert_eq!(options.checkout_wait_ms, 1500);
        assert_eq!(sanitized, "DSN=mydb");
    }

    #[test]
    fn garbage_value_falls_back_to_default() {
        let (options, _) = extract_pool_options("POOL_TEST_ON_CHECKOUT=maybe");
        assert!(options.test_on_checkout);
    }
}
