//! Validated token and pool lists, built once from configuration

use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use super::{FeeRate, Pool, SwapDirection};
use crate::shared::config::{Config, PoolCfg, TokenCfg};
use crate::shared::errors::AppError;
use crate::shared::types::Token;

/// Tokens and pools known to the engine. Immutable after load.
#[derive(Debug, Clone)]
pub struct Catalog {
    tokens: Vec<Token>,
    pools: Vec<Pool>,
}

impl Catalog {
    pub fn from_config(cfg: &Config) -> Result<Self, AppError> {
        let tokens = cfg.tokens.iter().map(parse_token).collect::<Result<Vec<_>, _>>()?;
        let by_symbol: HashMap<String, &Token> = tokens
            .iter()
            .map(|t| (t.symbol.to_ascii_uppercase(), t))
            .collect();

        let pools = cfg
            .pools
            .iter()
            .map(|p| parse_pool(p, &by_symbol))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(tokens, pools)
    }

    /// Checks uniqueness of symbols, pool ids and (pair, shard) combinations
    pub fn new(tokens: Vec<Token>, pools: Vec<Pool>) -> Result<Self, AppError> {
        let mut symbols = HashSet::new();
        for token in &tokens {
            if !symbols.insert(token.symbol.to_ascii_uppercase()) {
                return Err(config_error(format!("duplicate token symbol {}", token.symbol)));
            }
        }

        let mut ids = HashSet::new();
        let mut shards = HashSet::new();
        for pool in &pools {
            if !ids.insert(pool.id.as_str()) {
                return Err(config_error(format!("duplicate pool id {}", pool.id)));
            }
            let mut pair = [
                pool.token_a.symbol.to_ascii_uppercase(),
                pool.token_b.symbol.to_ascii_uppercase(),
            ];
            pair.sort();
            if !shards.insert((pair, pool.shard)) {
                return Err(config_error(format!(
                    "pool {} reuses shard {} of pair {}",
                    pool.id,
                    pool.shard,
                    pool.pair_label()
                )));
            }
        }

        Ok(Self { tokens, pools })
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    /// Case-insensitive symbol lookup
    pub fn token(&self, symbol: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    /// Every shard trading `input -> output`, in shard order
    pub fn pools_for_pair(&self, input: &str, output: &str) -> Vec<(&Pool, SwapDirection)> {
        let mut matches: Vec<_> = self
            .pools
            .iter()
            .filter_map(|pool| pool.direction(input, output).map(|dir| (pool, dir)))
            .collect();
        matches.sort_by_key(|(pool, _)| pool.shard);
        matches
    }
}

fn config_error(message: String) -> AppError {
    AppError::ConfigError(message)
}

fn parse_pubkey(value: &str, what: &str) -> Result<Pubkey, AppError> {
    Pubkey::from_str(value)
        .map_err(|e| config_error(format!("invalid {} address {}: {}", what, value, e)))
}

fn parse_token(cfg: &TokenCfg) -> Result<Token, AppError> {
    if cfg.symbol.trim().is_empty() {
        return Err(config_error(format!("token {} has an empty symbol", cfg.mint)));
    }
    let mint = parse_pubkey(&cfg.mint, &format!("{} mint", cfg.symbol))?;
    let name = if cfg.name.is_empty() { cfg.symbol.clone() } else { cfg.name.clone() };
    Ok(Token::new(mint, cfg.symbol.clone(), name, cfg.decimals))
}

fn parse_liquidity(value: &str, pool_id: &str, side: &str) -> Result<Decimal, AppError> {
    let liquidity = Decimal::from_str(value.trim()).map_err(|e| {
        config_error(format!(
            "pool {} liquidity_{} {:?} is not a decimal: {}",
            pool_id, side, value, e
        ))
    })?;
    if liquidity < Decimal::ZERO {
        return Err(config_error(format!(
            "pool {} liquidity_{} must not be negative, got {}",
            pool_id, side, liquidity
        )));
    }
    Ok(liquidity)
}

fn parse_pool(cfg: &PoolCfg, tokens: &HashMap<String, &Token>) -> Result<Pool, AppError> {
    let lookup = |symbol: &str| {
        tokens
            .get(&symbol.to_ascii_uppercase())
            .map(|t| (*t).clone())
            .ok_or_else(|| {
                config_error(format!("pool {} references unknown token {}", cfg.id, symbol))
            })
    };
    let token_a = lookup(&cfg.token_a)?;
    let token_b = lookup(&cfg.token_b)?;
    if token_a.mint == token_b.mint {
        return Err(config_error(format!(
            "pool {} trades {} against itself",
            cfg.id, token_a.symbol
        )));
    }

    let fee = FeeRate::new(cfg.fee_numerator, cfg.fee_denominator)
        .map_err(|e| config_error(format!("pool {}: {}", cfg.id, e)))?;

    Ok(Pool {
        id: cfg.id.clone(),
        token_a_account: parse_pubkey(
            &cfg.token_a_account,
            &format!("{} token_a_account", cfg.id),
        )?,
        token_b_account: parse_pubkey(
            &cfg.token_b_account,
            &format!("{} token_b_account", cfg.id),
        )?,
        lp_mint: parse_pubkey(&cfg.lp_mint, &format!("{} lp_mint", cfg.id))?,
        fee,
        shard: cfg.shard,
        fallback_liquidity_a: parse_liquidity(&cfg.liquidity_a, &cfg.id, "a")?,
        fallback_liquidity_b: parse_liquidity(&cfg.liquidity_b, &cfg.id, "b")?,
        token_a,
        token_b,
    })
}
