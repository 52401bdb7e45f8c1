//! Error handling for the application

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Chain-reader errors.
///
/// Cloneable because one coalesced fetch result is handed to every waiter.
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("RPC request for account {account} failed: {source}")]
    Transport {
        account: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    #[error("Account {account} not found on-chain")]
    AccountNotFound { account: String },

    #[error("Rate limited while reading account {account}: {message}")]
    RateLimited { account: String, message: String },

    #[error("Account {account} holds unexpected data: {reason}")]
    InvalidAccountData { account: String, reason: String },
}

impl ChainError {
    pub fn transport<E>(account: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ChainError::Transport {
            account: account.into(),
            source: Arc::new(err),
        }
    }

    pub fn kind(&self) -> ChainErrorKind {
        match self {
            ChainError::Transport { .. } => ChainErrorKind::Transport,
            ChainError::AccountNotFound { .. } => ChainErrorKind::AccountNotFound,
            ChainError::RateLimited { .. } => ChainErrorKind::RateLimited,
            ChainError::InvalidAccountData { .. } => ChainErrorKind::InvalidAccountData,
        }
    }

    pub fn account(&self) -> &str {
        match self {
            ChainError::Transport { account, .. }
            | ChainError::AccountNotFound { account }
            | ChainError::RateLimited { account, .. }
            | ChainError::InvalidAccountData { account, .. } => account,
        }
    }
}

/// Coarse classification of a [`ChainError`], used in logs and by backoff logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainErrorKind {
    Transport,
    AccountNotFound,
    RateLimited,
    InvalidAccountData,
}

impl ChainErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainErrorKind::Transport => "chain_read_error",
            ChainErrorKind::AccountNotFound => "account_not_found",
            ChainErrorKind::RateLimited => "rate_limited",
            ChainErrorKind::InvalidAccountData => "invalid_account_data",
        }
    }
}

impl fmt::Display for ChainErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one shard of a pair could not be quoted
#[derive(Debug, Clone)]
pub struct ShardFailure {
    pub pool_id: String,
    pub shard: u16,
    pub error: QuoteError,
    /// Chain failure that forced the shard onto fallback data, if any
    pub chain_failure: Option<ChainError>,
}

impl fmt::Display for ShardFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard {} ({}): {}", self.shard, self.pool_id, self.error)?;
        if let Some(chain) = &self.chain_failure {
            write!(f, " [after {}]", chain.kind())?;
        }
        Ok(())
    }
}

fn join_failures(failures: &[ShardFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Quote-related errors
#[derive(Error, Debug, Clone)]
pub enum QuoteError {
    #[error("Cannot convert {value} with {decimals} decimals to base units: {reason}")]
    DecimalConversion {
        value: String,
        decimals: u8,
        reason: String,
    },

    #[error("Pool {pool_id} has no liquidity")]
    NoLiquidity { pool_id: String },

    #[error("Deadline exceeded before pool {pool_id} produced a usable snapshot")]
    QuoteTimeout { pool_id: String },

    #[error("Unknown token symbol: {0}")]
    UnknownToken(String),

    #[error("No pool trades {input} -> {output}")]
    NoPoolForPair { input: String, output: String },

    #[error("Input amount must be greater than zero")]
    ZeroAmount,

    #[error("Invalid fee {numerator}/{denominator}")]
    InvalidFee { numerator: u64, denominator: u64 },

    #[error("Slippage tolerance {0} bps is outside 0..=10000")]
    InvalidSlippage(u32),

    #[error("Amount {amount} overflows swap arithmetic on pool {pool_id}")]
    ArithmeticOverflow { pool_id: String, amount: String },

    #[error("All {} shards failed: {}", .failures.len(), join_failures(.failures))]
    AllShardsFailed { failures: Vec<ShardFailure> },
}

impl QuoteError {
    /// True when the failure traces back to an RPC rate limit
    pub fn is_rate_limited(&self) -> bool {
        match self {
            QuoteError::AllShardsFailed { failures } => failures.iter().any(|f| {
                matches!(f.chain_failure, Some(ChainError::RateLimited { .. }))
                    || f.error.is_rate_limited()
            }),
            _ => false,
        }
    }

    /// Single human-readable message; `Display` carries the technical reason
    pub fn user_message(&self) -> &'static str {
        if self.is_rate_limited() {
            return "The network is busy right now, please try again shortly.";
        }
        match self {
            QuoteError::DecimalConversion { .. } => {
                "The amount has more decimal places than this token supports."
            }
            QuoteError::ArithmeticOverflow { .. } => "The amount is too large to quote.",
            QuoteError::NoLiquidity { .. } | QuoteError::AllShardsFailed { .. } => {
                "Not enough liquidity to quote this swap."
            }
            QuoteError::QuoteTimeout { .. } => "The quote took too long, please try again.",
            QuoteError::UnknownToken(_) => "This token is not supported.",
            QuoteError::NoPoolForPair { .. } => "No pool is available for this token pair.",
            QuoteError::ZeroAmount => "Enter an amount greater than zero.",
            QuoteError::InvalidFee { .. } | QuoteError::InvalidSlippage(_) => {
                "Invalid swap parameters."
            }
        }
    }
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Blockchain error: {0}")]
    BlockchainError(#[from] ChainError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(error: QuoteError, chain_failure: Option<ChainError>) -> ShardFailure {
        ShardFailure {
            pool_id: "sol-usdc-0".to_string(),
            shard: 0,
            error,
            chain_failure,
        }
    }

    #[test]
    fn test_chain_error_kind_and_account() {
        let source = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = ChainError::transport("Vault111", source);
        assert_eq!(err.kind(), ChainErrorKind::Transport);
        assert_eq!(err.account(), "Vault111");
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_all_shards_failed_names_every_shard() {
        let err = QuoteError::AllShardsFailed {
            failures: vec![
                failure(QuoteError::NoLiquidity { pool_id: "a".into() }, None),
                ShardFailure {
                    shard: 1,
                    ..failure(QuoteError::QuoteTimeout { pool_id: "b".into() }, None)
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("All 2 shards failed"));
        assert!(text.contains("shard 0"));
        assert!(text.contains("shard 1"));
        assert_eq!(err.user_message(), "Not enough liquidity to quote this swap.");
    }

    #[test]
    fn test_rate_limit_has_distinct_user_message() {
        let err = QuoteError::AllShardsFailed {
            failures: vec![failure(
                QuoteError::NoLiquidity { pool_id: "a".into() },
                Some(ChainError::RateLimited {
                    account: "Vault111".into(),
                    message: "429 Too Many Requests".into(),
                }),
            )],
        };
        assert!(err.is_rate_limited());
        assert!(err.user_message().contains("try again shortly"));
    }
}
