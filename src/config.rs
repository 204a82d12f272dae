//! Runtime configuration loaded from environment variables.

use std::env;
use std::str::FromStr;

use crate::performance::AnalysisParams;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_URL: &str = "sqlite:adintel.db?mode=rwc";

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port (`ADINTEL_PORT`).
    pub port: u16,

    /// SQLite connection string (`ADINTEL_DATABASE_URL`).
    pub database_url: String,

    /// Analysis defaults, overridable per request.
    pub analysis: AnalysisParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DB_URL.to_string(),
            analysis: AnalysisParams::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        Ok(Self {
            port: parse_or(&lookup, "ADINTEL_PORT", defaults.port)?,
            database_url: lookup("ADINTEL_DATABASE_URL").unwrap_or(defaults.database_url),
            analysis: AnalysisParams {
                days_to_analyze: parse_or(
                    &lookup,
                    "ADINTEL_DAYS_TO_ANALYZE",
                    defaults.analysis.days_to_analyze,
                )?,
                min_ads_threshold: parse_or(
                    &lookup,
                    "ADINTEL_MIN_ADS_THRESHOLD",
                    defaults.analysis.min_ads_threshold,
                )?,
                max_drop_percentage: parse_or(
                    &lookup,
                    "ADINTEL_MAX_DROP_PERCENTAGE",
                    defaults.analysis.max_drop_percentage,
                )?,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.database_url, "sqlite:adintel.db?mode=rwc");
        assert_eq!(config.analysis, AnalysisParams::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("ADINTEL_PORT", "8080"),
            ("ADINTEL_DATABASE_URL", "sqlite::memory:"),
            ("ADINTEL_DAYS_TO_ANALYZE", "14"),
            ("ADINTEL_MAX_DROP_PERCENTAGE", "12.5"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.analysis.days_to_analyze, 14);
        assert_eq!(config.analysis.min_ads_threshold, 10);
        assert_eq!(config.analysis.max_drop_percentage, 12.5);
    }

    #[test]
    fn test_invalid_value() {
        let err = Config::from_lookup(lookup_from(&[("ADINTEL_MIN_ADS_THRESHOLD", "ten")]))
            .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "ADINTEL_MIN_ADS_THRESHOLD",
                ..
            }
        ));
    }
}
