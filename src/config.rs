use std::{env, fmt::Display, str::FromStr};

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("You need to add {0} to the env")]
    Missing(&'static str),

    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mongodb_uri: String,
    pub database_name: String,
    pub bind_address: String,
    pub port: u16,
    pub api_secret: String,
    pub cors_origin: Option<String>,
    /// Base URL of the web app, used in invitation links.
    pub frontend_url: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            mongodb_uri: required(&lookup, "MONGODB_URI")?,
            database_name: try_load(&lookup, "DATABASE_NAME", "GroceryShare")?,
            bind_address: try_load(&lookup, "BIND_ADDRESS", "0.0.0.0")?,
            port: try_load(&lookup, "PORT", "8080")?,
            api_secret: required(&lookup, "API_SECRET")?,
            cors_origin: lookup("CORS_ORIGIN").filter(|origin| !origin.is_empty()),
            frontend_url: try_load(&lookup, "FRONTEND_URL", "http://localhost:3000")?,
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn applies_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("MONGODB_URI", "mongodb://localhost:27017"),
            ("API_SECRET", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.database_name, "GroceryShare");
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.cors_origin, None);
        assert_eq!(config.frontend_url, "http://localhost:3000");
    }

    #[test]
    fn requires_mongodb_uri_and_secret() {
        let err = Config::from_lookup(lookup_from(&[("API_SECRET", "s3cret")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("MONGODB_URI"));

        let err = Config::from_lookup(lookup_from(&[("MONGODB_URI", "mongodb://db")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::Missing("API_SECRET"));
    }

    #[test]
    fn rejects_invalid_port() {
        let err = Config::from_lookup(lookup_from(&[
            ("MONGODB_URI", "mongodb://db"),
            ("API_SECRET", "s3cret"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }
}
