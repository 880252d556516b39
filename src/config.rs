use anyhow::{bail, Context, Result};
use std::env;

/// Production holiday feed
pub const DEFAULT_HOLIDAYS_URL: &str = "https://content.capta.co/Recruitment/WorkingDays.json";

#[derive(Debug, Clone)]
pub struct Config {
    // Holiday feed endpoint (JSON array of {date, name})
    pub holidays_url: String,

    // Bound on a single feed retrieval
    pub holiday_fetch_timeout_secs: u64,

    // Snapshot age beyond which a lookup refreshes first
    // Default: 24 hours
    pub holiday_cache_max_age_secs: u64,

    // Query HTTP server port
    pub http_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env if present, ignore if missing
        Self::from_getter(|key| env::var(key).ok())
    }

    /// Parse config from a custom getter function (for testing)
    pub fn from_getter<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            holidays_url: get("HOLIDAYS_URL").unwrap_or_else(|| DEFAULT_HOLIDAYS_URL.to_string()),

            holiday_fetch_timeout_secs: get("HOLIDAY_FETCH_TIMEOUT_SECS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .context("HOLIDAY_FETCH_TIMEOUT_SECS must be a number of seconds")?,

            holiday_cache_max_age_secs: get("HOLIDAY_CACHE_MAX_AGE_SECS")
                .unwrap_or_else(|| "86400".to_string())
                .parse()
                .context("HOLIDAY_CACHE_MAX_AGE_SECS must be a number of seconds")?,

            http_port: get("HTTP_PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .context("HTTP_PORT must be a valid port number")?,
        })
    }

    /// Create config from a HashMap (convenience for testing)
    #[cfg(test)]
    pub fn from_map(map: &std::collections::HashMap<&str, &str>) -> Result<Self> {
        Self::from_getter(|key| map.get(key).map(|v| v.to_string()))
    }

    /// Validate configuration values at startup.
    /// Returns Ok(()) if all validations pass, or Err with details of what failed.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if !self.holidays_url.starts_with("http://") && !self.holidays_url.starts_with("https://")
        {
            errors.push(format!(
                "HOLIDAYS_URL '{}' invalid. Expected an http(s) URL.",
                self.holidays_url
            ));
        }

        if self.holiday_fetch_timeout_secs == 0 {
            errors.push("HOLIDAY_FETCH_TIMEOUT_SECS must be greater than 0.".to_string());
        } else if self.holiday_fetch_timeout_secs > 120 {
            errors.push(format!(
                "HOLIDAY_FETCH_TIMEOUT_SECS={} seems too long (max recommended: 120).",
                self.holiday_fetch_timeout_secs
            ));
        }

        if self.holiday_cache_max_age_secs == 0 {
            errors.push(
                "HOLIDAY_CACHE_MAX_AGE_SECS must be greater than 0 (every lookup would refetch)."
                    .to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let env = HashMap::new();
        let config = Config::from_map(&env).expect("empty env should use defaults");

        assert_eq!(config.holidays_url, DEFAULT_HOLIDAYS_URL);
        assert_eq!(config.holiday_fetch_timeout_secs, 10);
        assert_eq!(config.holiday_cache_max_age_secs, 86400);
        assert_eq!(config.http_port, 3000);
    }

    #[test]
    fn test_custom_values() {
        let mut env = HashMap::new();
        env.insert("HOLIDAYS_URL", "https://example.com/holidays.json");
        env.insert("HOLIDAY_FETCH_TIMEOUT_SECS", "5");
        env.insert("HOLIDAY_CACHE_MAX_AGE_SECS", "3600");
        env.insert("HTTP_PORT", "8080");
        let config = Config::from_map(&env).expect("should parse");

        assert_eq!(config.holidays_url, "https://example.com/holidays.json");
        assert_eq!(config.holiday_fetch_timeout_secs, 5);
        assert_eq!(config.holiday_cache_max_age_secs, 3600);
        assert_eq!(config.http_port, 8080);
    }

    #[test]
    fn test_invalid_port_not_numeric() {
        let mut env = HashMap::new();
        env.insert("HTTP_PORT", "not_a_number");
        let result = Config::from_map(&env);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("HTTP_PORT"), "error should mention HTTP_PORT: {}", err);
    }

    #[test]
    fn test_invalid_port_out_of_range() {
        let mut env = HashMap::new();
        env.insert("HTTP_PORT", "99999");
        let result = Config::from_map(&env);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_timeout() {
        let mut env = HashMap::new();
        env.insert("HOLIDAY_FETCH_TIMEOUT_SECS", "soon");
        let result = Config::from_map(&env);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("HOLIDAY_FETCH_TIMEOUT_SECS"));
    }

    #[test]
    fn test_invalid_max_age() {
        let mut env = HashMap::new();
        env.insert("HOLIDAY_CACHE_MAX_AGE_SECS", "-1");
        let result = Config::from_map(&env);
        assert!(result.is_err());
    }

    #[test]
    fn test_port_boundary_values() {
        for port in ["1", "80", "443", "3000", "65535"] {
            let mut env = HashMap::new();
            env.insert("HTTP_PORT", port);
            let config = Config::from_map(&env).expect(&format!("port {} should be valid", port));
            assert_eq!(config.http_port, port.parse::<u16>().unwrap());
        }
    }

    #[test]
    fn test_validation_passes_for_defaults() {
        let config = Config::from_map(&HashMap::new()).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_non_http_url() {
        let mut env = HashMap::new();
        env.insert("HOLIDAYS_URL", "ftp://example.com/holidays.json");
        let config = Config::from_map(&env).unwrap();
        let result = config.validate();
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("HOLIDAYS_URL"), "error should mention the URL: {}", err);
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let mut env = HashMap::new();
        env.insert("HOLIDAY_FETCH_TIMEOUT_SECS", "0");
        let config = Config::from_map(&env).unwrap();
        let result = config.validate();
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("HOLIDAY_FETCH_TIMEOUT_SECS"));
    }

    #[test]
    fn test_validation_rejects_excessive_timeout() {
        let mut env = HashMap::new();
        env.insert("HOLIDAY_FETCH_TIMEOUT_SECS", "500");
        let config = Config::from_map(&env).unwrap();
        let result = config.validate();
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("too long"), "error should mention timeout too long: {}", err);
    }

    #[test]
    fn test_validation_rejects_zero_max_age() {
        let mut env = HashMap::new();
        env.insert("HOLIDAY_CACHE_MAX_AGE_SECS", "0");
        let config = Config::from_map(&env).unwrap();
        assert!(config.validate().is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    proptest! {
        #[test]
        fn parsing_never_panics(
            url in ".*",
            timeout in ".*",
            max_age in ".*",
            port in ".*",
        ) {
            let mut env: HashMap<&str, String> = HashMap::new();
            env.insert("HOLIDAYS_URL", url);
            env.insert("HOLIDAY_FETCH_TIMEOUT_SECS", timeout);
            env.insert("HOLIDAY_CACHE_MAX_AGE_SECS", max_age);
            env.insert("HTTP_PORT", port);

            let _ = Config::from_getter(|key| env.get(key).cloned());
            // If we get here without panicking, the test passes
        }

        #[test]
        fn valid_numeric_values_parse(
            timeout in 1u64..=120,
            max_age in 1u64..=604_800,
            port in 1u16..=65535,
        ) {
            let mut env: HashMap<&str, String> = HashMap::new();
            env.insert("HOLIDAY_FETCH_TIMEOUT_SECS", timeout.to_string());
            env.insert("HOLIDAY_CACHE_MAX_AGE_SECS", max_age.to_string());
            env.insert("HTTP_PORT", port.to_string());

            let config = Config::from_getter(|key| env.get(key).cloned()).unwrap();
            prop_assert_eq!(config.holiday_fetch_timeout_secs, timeout);
            prop_assert_eq!(config.holiday_cache_max_age_secs, max_age);
            prop_assert_eq!(config.http_port, port);
            prop_assert!(config.validate().is_ok());
        }
    }
}
