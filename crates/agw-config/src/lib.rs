// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading and validation for the agent gateway.
//!
//! All configuration comes from the environment. Required secrets are
//! checked up front: boot aborts with a single diagnostic naming **every**
//! missing variable rather than failing one variable at a time.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// One or more required environment variables are missing.
    #[error("missing required environment variables: {}", vars.join(", "))]
    MissingVars {
        /// Names of every missing variable.
        vars: Vec<String>,
    },

    /// A variable was present but could not be parsed.
    #[error("invalid value for {var}: {reason}")]
    Invalid {
        /// Variable name.
        var: String,
        /// Human-readable parse failure.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Rate limit spec
// ---------------------------------------------------------------------------

/// A parsed rate limit such as `"500/minute"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSpec {
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateLimitSpec {
    /// Window length as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Parse `"<count>/<unit>"` where unit is `second`, `minute`, or `hour`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (count, unit) = raw
            .split_once('/')
            .ok_or_else(|| format!("expected '<count>/<unit>', got '{raw}'"))?;
        let max_requests: u32 = count
            .trim()
            .parse()
            .map_err(|_| format!("'{count}' is not a valid request count"))?;
        if max_requests == 0 {
            return Err("request count must be positive".into());
        }
        let window_secs = match unit.trim() {
            "second" | "seconds" => 1,
            "minute" | "minutes" => 60,
            "hour" | "hours" => 3600,
            other => return Err(format!("unknown rate-limit unit '{other}'")),
        };
        Ok(Self {
            max_requests,
            window_secs,
        })
    }
}

// ---------------------------------------------------------------------------
// GatewayConfig
// ---------------------------------------------------------------------------

/// Runtime configuration for the gateway, resolved once at boot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Symmetric signing key for bearer tokens (HS256).
    pub secret_key: String,
    /// Document-store connection string.
    pub store_uri: String,
    /// Cache / pub-sub store connection string.
    pub cache_uri: String,
    /// CORS allow-list.
    pub allowed_origins: Vec<String>,
    /// Log filter (e.g. `"info"`, `"agw_server=debug"`).
    pub log_level: String,
    /// Bearer token lifetime in minutes.
    pub access_token_expire_minutes: u64,
    /// Duplicate-sale detection window in minutes.
    pub duplicate_sale_window_minutes: u64,
    /// Days terminal deliveries are retained before TTL purge.
    pub delivery_retention_days: i64,
    /// Gateway rate limit per caller address.
    pub rate_limit: RateLimitSpec,
    /// Default currency applied when a sale omits one.
    pub default_currency: String,
    /// Bounded retries for optimistic stock allocation.
    pub stock_allocation_retries: u32,
    /// Base URL of the LLM oracle, if configured.
    pub llm_base_url: Option<String>,
}

impl GatewayConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    ///
    /// The seam exists so tests can exercise the full parse path without
    /// mutating process-global environment state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let mut require = |name: &str| match lookup(name) {
            Some(v) if !v.trim().is_empty() => Some(v),
            _ => {
                missing.push(name.to_string());
                None
            }
        };

        let secret_key = require("SECRET_KEY");
        let store_uri = require("STORE_URI");
        let cache_uri = require("CACHE_URI");

        if !missing.is_empty() {
            return Err(ConfigError::MissingVars { vars: missing });
        }

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".into());

        let access_token_expire_minutes =
            parse_or("ACCESS_TOKEN_EXPIRE_MINUTES", &lookup, 24 * 60)?;
        let duplicate_sale_window_minutes =
            parse_or("DUPLICATE_SALE_WINDOW_MINUTES", &lookup, 5)?;
        let delivery_retention_days = parse_or("DELIVERY_RETENTION_DAYS", &lookup, 30)?;

        let rate_limit = match lookup("RATE_LIMIT") {
            Some(raw) => RateLimitSpec::parse(&raw).map_err(|reason| ConfigError::Invalid {
                var: "RATE_LIMIT".into(),
                reason,
            })?,
            None => RateLimitSpec {
                max_requests: 500,
                window_secs: 60,
            },
        };

        Ok(Self {
            secret_key: secret_key.unwrap(),
            store_uri: store_uri.unwrap(),
            cache_uri: cache_uri.unwrap(),
            allowed_origins,
            log_level,
            access_token_expire_minutes,
            duplicate_sale_window_minutes,
            delivery_retention_days,
            rate_limit,
            default_currency: lookup("DEFAULT_CURRENCY").unwrap_or_else(|| "USD".into()),
            stock_allocation_retries: 3,
            llm_base_url: lookup("LLM_BASE_URL"),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var: name.into(),
            reason: format!("'{raw}' is not a valid number"),
        }),
        None => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("SECRET_KEY", "test-secret"),
            ("STORE_URI", "mongodb://localhost:27017/gateway"),
            ("CACHE_URI", "redis://localhost:6379"),
        ])
    }

    fn load(vars: HashMap<&str, &str>) -> Result<GatewayConfig, ConfigError> {
        GatewayConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
    }

    // -- Required variables ----------------------------------------------

    #[test]
    fn loads_with_only_required_vars() {
        let cfg = load(base_vars()).unwrap();
        assert_eq!(cfg.secret_key, "test-secret");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.duplicate_sale_window_minutes, 5);
        assert_eq!(cfg.delivery_retention_days, 30);
        assert_eq!(cfg.rate_limit.max_requests, 500);
        assert_eq!(cfg.rate_limit.window_secs, 60);
        assert_eq!(cfg.default_currency, "USD");
        assert_eq!(cfg.stock_allocation_retries, 3);
    }

    #[test]
    fn reports_every_missing_var_at_once() {
        let err = load(HashMap::new()).unwrap_err();
        match err {
            ConfigError::MissingVars { vars } => {
                assert_eq!(vars, vec!["SECRET_KEY", "STORE_URI", "CACHE_URI"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_required_var_counts_as_missing() {
        let mut vars = base_vars();
        vars.insert("SECRET_KEY", "   ");
        let err = load(vars).unwrap_err();
        assert!(err.to_string().contains("SECRET_KEY"));
    }

    // -- Optional variables ----------------------------------------------

    #[test]
    fn parses_origins_list() {
        let mut vars = base_vars();
        vars.insert(
            "ALLOWED_ORIGINS",
            "http://localhost:5173, https://app.example.com",
        );
        let cfg = load(vars).unwrap();
        assert_eq!(
            cfg.allowed_origins,
            vec!["http://localhost:5173", "https://app.example.com"]
        );
    }

    #[test]
    fn overrides_numeric_defaults() {
        let mut vars = base_vars();
        vars.insert("DUPLICATE_SALE_WINDOW_MINUTES", "10");
        vars.insert("DELIVERY_RETENTION_DAYS", "7");
        vars.insert("ACCESS_TOKEN_EXPIRE_MINUTES", "60");
        let cfg = load(vars).unwrap();
        assert_eq!(cfg.duplicate_sale_window_minutes, 10);
        assert_eq!(cfg.delivery_retention_days, 7);
        assert_eq!(cfg.access_token_expire_minutes, 60);
    }

    #[test]
    fn rejects_garbage_numbers() {
        let mut vars = base_vars();
        vars.insert("DELIVERY_RETENTION_DAYS", "soon");
        let err = load(vars).unwrap_err();
        assert!(err.to_string().contains("DELIVERY_RETENTION_DAYS"));
    }

    // -- Rate limit parsing ----------------------------------------------

    #[test]
    fn rate_limit_units() {
        assert_eq!(
            RateLimitSpec::parse("500/minute").unwrap(),
            RateLimitSpec { max_requests: 500, window_secs: 60 }
        );
        assert_eq!(RateLimitSpec::parse("10/second").unwrap().window_secs, 1);
        assert_eq!(RateLimitSpec::parse("1000/hour").unwrap().window_secs, 3600);
    }

    #[test]
    fn rate_limit_rejects_malformed() {
        assert!(RateLimitSpec::parse("500").is_err());
        assert!(RateLimitSpec::parse("abc/minute").is_err());
        assert!(RateLimitSpec::parse("0/minute").is_err());
        assert!(RateLimitSpec::parse("5/fortnight").is_err());
    }

    #[test]
    fn rate_limit_env_override() {
        let mut vars = base_vars();
        vars.insert("RATE_LIMIT", "20/second");
        let cfg = load(vars).unwrap();
        assert_eq!(cfg.rate_limit.max_requests, 20);
        assert_eq!(cfg.rate_limit.window(), Duration::from_secs(1));
    }
}
