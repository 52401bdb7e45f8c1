//! Static configuration: RPC endpoint, quote settings, token and pool lists.
//!
//! The file is parsed once at startup; `domain::pool::Catalog` then validates
//! the raw entries into strongly typed tokens and pools.

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::{fs, time::Duration};

use crate::infrastructure::cache::DEFAULT_RESERVE_TTL_MS;
use crate::shared::errors::AppError;

pub const DEFAULT_CONFIG_PATH: &str = "Config.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct RpcCfg {
    pub url: String,
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_rpc_timeout_ms() -> u64 {
    1_500
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuoteCfg {
    pub slippage_bps: u32,
    pub deadline_ms: u64,
    /// Reserve cache lifetime. Quotes assume the 5 s default; other values are
    /// meant for tests and incident handling only and are logged at startup.
    pub cache_ttl_ms: u64,
    pub staleness_threshold_secs: u64,
    pub refresh_interval_ms: u64,
}

impl Default for QuoteCfg {
    fn default() -> Self {
        Self {
            slippage_bps: 100,
            deadline_ms: 2_000,
            cache_ttl_ms: DEFAULT_RESERVE_TTL_MS as u64,
            staleness_threshold_secs: 120,
            refresh_interval_ms: 5_000,
        }
    }
}

impl QuoteCfg {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.cache_ttl_ms as i64)
    }

    pub fn cache_ttl_overridden(&self) -> bool {
        self.cache_ttl_ms != DEFAULT_RESERVE_TTL_MS as u64
    }

    pub fn staleness_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_threshold_secs as i64)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.slippage_bps > 10_000 {
            return Err(AppError::ConfigError(format!(
                "quote.slippage_bps must be at most 10000, got {}",
                self.slippage_bps
            )));
        }
        if self.cache_ttl_ms == 0 || self.deadline_ms == 0 || self.refresh_interval_ms == 0 {
            return Err(AppError::ConfigError(
                "quote.cache_ttl_ms, quote.deadline_ms and quote.refresh_interval_ms \
                 must be positive"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenCfg {
    pub symbol: String,
    pub mint: String,
    #[serde(default)]
    pub name: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolCfg {
    pub id: String,
    pub token_a: String,
    pub token_b: String,
    pub token_a_account: String,
    pub token_b_account: String,
    pub lp_mint: String,
    pub fee_numerator: u64,
    pub fee_denominator: u64,
    #[serde(default)]
    pub shard: u16,
    /// Human-readable fallback liquidity, as a decimal string
    pub liquidity_a: String,
    pub liquidity_b: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcCfg,
    #[serde(default)]
    pub quote: QuoteCfg,
    #[serde(default)]
    pub tokens: Vec<TokenCfg>,
    #[serde(default)]
    pub pools: Vec<PoolCfg>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        content.parse()
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cfg: Config = toml::from_str(s)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse config file: {}", e)))?;
        cfg.quote.validate()?;
        Ok(cfg)
    }
}

/// Loads configuration from disk
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `Config.toml` from the working directory
    pub fn load_config() -> Result<Config, AppError> {
        Config::from_file(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from(path: Option<&str>) -> Result<Config, AppError> {
        match path {
            Some(path) => Config::from_file(path),
            None => Self::load_config(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [rpc]
        url = "http://localhost:8899"

        [[tokens]]
        symbol = "SOL"
        mint = "So11111111111111111111111111111111111111112"
        decimals = 9
    "#;

    #[test]
    fn test_defaults_applied() {
        let cfg: Config = MINIMAL.parse().unwrap();
        assert_eq!(cfg.rpc.commitment, "confirmed");
        assert_eq!(cfg.quote.slippage_bps, 100);
        assert_eq!(cfg.quote.cache_ttl(), chrono::Duration::milliseconds(5_000));
        assert!(!cfg.quote.cache_ttl_overridden());
        assert_eq!(cfg.quote.staleness_threshold(), chrono::Duration::seconds(120));
        assert_eq!(cfg.quote.deadline(), Duration::from_secs(2));
        assert_eq!(cfg.tokens.len(), 1);
        assert!(cfg.pools.is_empty());
    }

    #[test]
    fn test_cache_ttl_override() {
        let raw = r#"
            [rpc]
            url = "http://localhost:8899"

            [quote]
            cache_ttl_ms = 250
        "#;
        let cfg: Config = raw.parse().unwrap();
        assert_eq!(cfg.quote.cache_ttl(), chrono::Duration::milliseconds(250));
        assert!(cfg.quote.cache_ttl_overridden());

        let zero = raw.replace("250", "0");
        assert!(matches!(zero.parse::<Config>(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_missing_decimals_rejected() {
        let raw = r#"
            [rpc]
            url = "http://localhost:8899"

            [[tokens]]
            symbol = "SOL"
            mint = "So11111111111111111111111111111111111111112"
        "#;
        assert!(matches!(raw.parse::<Config>(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_excessive_slippage_rejected() {
        let raw = r#"
            [rpc]
            url = "http://localhost:8899"

            [quote]
            slippage_bps = 20000
        "#;
        assert!(matches!(raw.parse::<Config>(), Err(AppError::ConfigError(_))));
    }
}
