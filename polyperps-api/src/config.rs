//! Server configuration from environment variables

use polyperps_core::{PerpsError, PerpsResult};
use polyperps_polymarket::{CLOB_API_BASE, GAMMA_API_BASE, POLYMARKET_WS_URL};
use polyperps_research::DEFAULT_MODEL;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_STARTING_BALANCE: u32 = 10_000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub gamma_api_url: String,
    pub clob_api_url: String,
    pub ws_url: String,
    /// Built frontend, served for every non-API path
    pub static_dir: PathBuf,
    pub database_path: PathBuf,
    /// Balance credited to every new account
    pub starting_balance: Decimal,
    /// AI analysis is disabled when unset
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> PerpsResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> PerpsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let port = parse_var(get("PORT"), "PORT")?.unwrap_or(DEFAULT_PORT);

        let starting_balance = parse_var::<Decimal>(get("STARTING_BALANCE"), "STARTING_BALANCE")?
            .unwrap_or_else(|| Decimal::from(DEFAULT_STARTING_BALANCE));
        if starting_balance < Decimal::ZERO {
            return Err(PerpsError::config(format!(
                "STARTING_BALANCE must not be negative, got {}",
                starting_balance
            )));
        }

        Ok(Self {
            port,
            gamma_api_url: get_or("GAMMA_API_URL", GAMMA_API_BASE),
            clob_api_url: get_or("CLOB_API_URL", CLOB_API_BASE),
            ws_url: get_or("POLYMARKET_WS_URL", POLYMARKET_WS_URL),
            static_dir: PathBuf::from(get_or("STATIC_DIR", "dist")),
            database_path: PathBuf::from(get_or("DATABASE_PATH", "data/polyperps.db")),
            starting_balance,
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get_or("OPENAI_MODEL", DEFAULT_MODEL),
            openai_base_url: get("OPENAI_BASE_URL"),
        })
    }
}

fn parse_var<T: FromStr>(value: Option<String>, key: &str) -> PerpsResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| PerpsError::config(format!("Invalid {} '{}': {}", key, v, e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> PerpsResult<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.gamma_api_url, "https://gamma-api.polymarket.com");
        assert_eq!(config.clob_api_url, "https://clob.polymarket.com");
        assert_eq!(config.static_dir, PathBuf::from("dist"));
        assert_eq!(config.database_path, PathBuf::from("data/polyperps.db"));
        assert_eq!(config.starting_balance, dec!(10000));
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.openai_model, "gpt-4o-mini");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("STARTING_BALANCE", "250.5"),
            ("OPENAI_API_KEY", "sk-abc"),
            ("OPENAI_BASE_URL", "  "),
            ("STATIC_DIR", "web/build"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.starting_balance, dec!(250.5));
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-abc"));
        assert!(config.openai_base_url.is_none());
        assert_eq!(config.static_dir, PathBuf::from("web/build"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(config_from(&[("PORT", "http")]), Err(PerpsError::Config(_))));
        assert!(matches!(
            config_from(&[("STARTING_BALANCE", "-5")]),
            Err(PerpsError::Config(_))
        ));
    }
}
