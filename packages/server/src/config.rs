//! Startup configuration read from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use accident_risk_hotspots::DEFAULT_MIN_RISK;
use accident_risk_hotspots::cache::CacheConfig;

/// A configuration variable held a value that could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("Invalid value for {name}: '{value}'")]
pub struct ConfigError {
    /// Variable name.
    pub name: &'static str,
    /// Raw value.
    pub value: String,
}

/// Everything the server needs to start.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// `BIND_ADDR`, default `127.0.0.1`.
    pub bind_addr: String,
    /// `PORT`, default `8080`.
    pub port: u16,
    /// `FEATURE_TABLE_PATH`, default `data/model_df.csv`.
    pub feature_table_path: PathBuf,
    /// `MODEL_PATH`, default `data/risk_model.json`.
    pub model_path: PathBuf,
    /// `ENCODER_PATH`, default `data/grid_encoder.json`.
    pub encoder_path: PathBuf,
    /// `MIN_RISK`, default `0.3`.
    pub min_risk: f64,
    /// `CACHE_TTL_SECS`, `RECOMPUTE_TIMEOUT_SECS` (0 disables the timeout),
    /// `RETRY_BACKOFF_SECS`, and `SERVE_STALE_ON_FAILURE`.
    pub cache: CacheConfig,
    /// `WARM_CACHE`: materialize once in the background at startup.
    pub warm_cache: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            feature_table_path: PathBuf::from("data/model_df.csv"),
            model_path: PathBuf::from("data/risk_model.json"),
            encoder_path: PathBuf::from("data/grid_encoder.json"),
            min_risk: DEFAULT_MIN_RISK,
            cache: CacheConfig::default(),
            warm_cache: true,
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a set variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, applying defaults for
    /// unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a set variable cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let parse = |name: &'static str| -> Result<Option<u64>, ConfigError> {
            parse_var(name, lookup(name))
        };

        let min_risk = parse_var::<f64>("MIN_RISK", lookup("MIN_RISK"))?
            .unwrap_or(defaults.min_risk);
        if !min_risk.is_finite() {
            return Err(ConfigError {
                name: "MIN_RISK",
                value: min_risk.to_string(),
            });
        }

        let cache = CacheConfig {
            ttl: parse("CACHE_TTL_SECS")?
                .map_or(defaults.cache.ttl, Duration::from_secs),
            recompute_timeout: match parse("RECOMPUTE_TIMEOUT_SECS")? {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.cache.recompute_timeout,
            },
            retry_backoff: parse("RETRY_BACKOFF_SECS")?
                .map_or(defaults.cache.retry_backoff, Duration::from_secs),
            serve_stale_on_failure: parse_var(
                "SERVE_STALE_ON_FAILURE",
                lookup("SERVE_STALE_ON_FAILURE"),
            )?
            .unwrap_or(defaults.cache.serve_stale_on_failure),
        };

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: parse_var("PORT", lookup("PORT"))?.unwrap_or(defaults.port),
            feature_table_path: lookup("FEATURE_TABLE_PATH")
                .map_or(defaults.feature_table_path, PathBuf::from),
            model_path: lookup("MODEL_PATH").map_or(defaults.model_path, PathBuf::from),
            encoder_path: lookup("ENCODER_PATH").map_or(defaults.encoder_path, PathBuf::from),
            min_risk,
            cache,
            warm_cache: parse_var("WARM_CACHE", lookup("WARM_CACHE"))?
                .unwrap_or(defaults.warm_cache),
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|raw| {
            raw.trim().parse().map_err(|_| ConfigError {
                name,
                value: raw.clone(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(config(&[]).unwrap(), ServerConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("PORT", "9000"),
            ("FEATURE_TABLE_PATH", "/srv/model_df.csv"),
            ("CACHE_TTL_SECS", "60"),
            ("RECOMPUTE_TIMEOUT_SECS", "0"),
            ("RETRY_BACKOFF_SECS", "5"),
            ("SERVE_STALE_ON_FAILURE", "false"),
            ("MIN_RISK", "0.5"),
            ("WARM_CACHE", "false"),
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.feature_table_path, PathBuf::from("/srv/model_df.csv"));
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert_eq!(config.cache.recompute_timeout, None);
        assert_eq!(config.cache.retry_backoff, Duration::from_secs(5));
        assert!(!config.cache.serve_stale_on_failure);
        assert!((config.min_risk - 0.5).abs() < f64::EPSILON);
        assert!(!config.warm_cache);
    }

    #[test]
    fn rejects_unparseable_values() {
        let err = config(&[("CACHE_TTL_SECS", "soon")]).unwrap_err();
        assert_eq!(err.name, "CACHE_TTL_SECS");
        assert!(config(&[("MIN_RISK", "NaN")]).is_err());
    }
}
