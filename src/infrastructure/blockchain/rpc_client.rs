//! Read-only Solana RPC access for token balances and supplies

use async_trait::async_trait;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::{Account as TokenAccount, Mint};
use std::str::FromStr;
use std::time::Duration;
use tracing::trace;

use crate::shared::config::RpcCfg;
use crate::shared::errors::{AppError, ChainError};
use crate::shared::types::TokenAmount;

/// Balance and supply queries against the chain.
///
/// No caching and no retries: both belong to the caller.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Amount held by an SPL token account, in base units
    async fn fetch_token_account_balance(
        &self,
        account: &Pubkey,
    ) -> Result<TokenAmount, ChainError>;

    /// Total supply of an SPL mint, in base units
    async fn fetch_token_supply(&self, mint: &Pubkey) -> Result<TokenAmount, ChainError>;
}

/// [`ChainReader`] backed by the nonblocking Solana RPC client
pub struct SolanaChainReader {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaChainReader {
    pub fn new(rpc_url: String, commitment: CommitmentConfig, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new_with_timeout_and_commitment(rpc_url, timeout, commitment),
            commitment,
        }
    }

    pub fn from_config(cfg: &RpcCfg) -> Result<Self, AppError> {
        let commitment = CommitmentConfig::from_str(&cfg.commitment).map_err(|e| {
            AppError::ConfigError(format!("Invalid commitment {}: {}", cfg.commitment, e))
        })?;
        Ok(Self::new(cfg.url.clone(), commitment, Duration::from_millis(cfg.timeout_ms)))
    }

    /// Raw account data, `AccountNotFound` if the account does not exist
    async fn get_account_data(&self, account: &Pubkey) -> Result<Vec<u8>, ChainError> {
        let response = self
            .client
            .get_account_with_commitment(account, self.commitment)
            .await
            .map_err(|e| classify_client_error(account, e))?;

        response
            .value
            .map(|acc| acc.data)
            .ok_or_else(|| ChainError::AccountNotFound {
                account: account.to_string(),
            })
    }
}

#[async_trait]
impl ChainReader for SolanaChainReader {
    async fn fetch_token_account_balance(
        &self,
        account: &Pubkey,
    ) -> Result<TokenAmount, ChainError> {
        let data = self.get_account_data(account).await?;
        // Token-2022 accounts share the base layout; extensions follow it
        let base = data.get(..TokenAccount::LEN).ok_or_else(|| ChainError::InvalidAccountData {
            account: account.to_string(),
            reason: format!("expected at least {} bytes, got {}", TokenAccount::LEN, data.len()),
        })?;
        let token_account = TokenAccount::unpack(base).map_err(|e| ChainError::InvalidAccountData {
            account: account.to_string(),
            reason: e.to_string(),
        })?;

        trace!(account = %account, amount = token_account.amount, "Fetched token account balance");
        Ok(TokenAmount::from(token_account.amount))
    }

    async fn fetch_token_supply(&self, mint: &Pubkey) -> Result<TokenAmount, ChainError> {
        let data = self.get_account_data(mint).await?;
        let base = data.get(..Mint::LEN).ok_or_else(|| ChainError::InvalidAccountData {
            account: mint.to_string(),
            reason: format!("expected at least {} bytes, got {}", Mint::LEN, data.len()),
        })?;
        let mint_data = Mint::unpack(base).map_err(|e| ChainError::InvalidAccountData {
            account: mint.to_string(),
            reason: e.to_string(),
        })?;

        trace!(mint = %mint, supply = mint_data.supply, "Fetched token supply");
        Ok(TokenAmount::from(mint_data.supply))
    }
}

fn classify_client_error(account: &Pubkey, err: ClientError) -> ChainError {
    let status = match err.kind() {
        ClientErrorKind::Reqwest(e) => e.status().map(|s| s.as_u16()),
        _ => None,
    };
    let message = err.to_string();

    if is_rate_limit(status, &message) {
        ChainError::RateLimited {
            account: account.to_string(),
            message,
        }
    } else if is_missing_account(&message) {
        ChainError::AccountNotFound {
            account: account.to_string(),
        }
    } else {
        ChainError::transport(account.to_string(), err)
    }
}

/// HTTP 429, or a provider that reports it only in the message body.
///
/// Never matches on a bare "429": transport errors embed the request URL,
/// and API keys in it may contain those digits.
fn is_rate_limit(status: Option<u16>, message: &str) -> bool {
    if status == Some(429) {
        return true;
    }
    let lower = message.to_ascii_lowercase();
    lower.contains("too many requests") || lower.contains("rate limit")
}

fn is_missing_account(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("could not find account") || lower.contains("accountnotfound")
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scriptable in-memory chain for resolver, store and service tests

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockChainReader {
        balances: Mutex<HashMap<Pubkey, Result<u64, ChainError>>>,
        supplies: Mutex<HashMap<Pubkey, u64>>,
        delay: Mutex<Duration>,
        account_delays: Mutex<HashMap<Pubkey, Duration>>,
        balance_calls: AtomicUsize,
        supply_calls: AtomicUsize,
    }

    impl MockChainReader {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_balance(&self, account: Pubkey, amount: u64) {
            self.balances.lock().unwrap().insert(account, Ok(amount));
        }

        pub fn set_supply(&self, mint: Pubkey, supply: u64) {
            self.supplies.lock().unwrap().insert(mint, supply);
        }

        pub fn fail(&self, account: Pubkey, error: ChainError) {
            self.balances.lock().unwrap().insert(account, Err(error));
        }

        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap() = delay;
        }

        /// Latency for one account, taking precedence over `set_delay`
        pub fn set_account_delay(&self, account: Pubkey, delay: Duration) {
            self.account_delays.lock().unwrap().insert(account, delay);
        }

        pub fn balance_calls(&self) -> usize {
            self.balance_calls.load(Ordering::SeqCst)
        }

        pub fn supply_calls(&self) -> usize {
            self.supply_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChainReader for MockChainReader {
        async fn fetch_token_account_balance(
            &self,
            account: &Pubkey,
        ) -> Result<TokenAmount, ChainError> {
            self.balance_calls.fetch_add(1, Ordering::SeqCst);
            let delay = self
                .account_delays
                .lock()
                .unwrap()
                .get(account)
                .copied()
                .unwrap_or_else(|| *self.delay.lock().unwrap());
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let entry = self.balances.lock().unwrap().get(account).cloned();
            match entry {
                Some(Ok(amount)) => Ok(TokenAmount::from(amount)),
                Some(Err(e)) => Err(e),
                None => Err(ChainError::AccountNotFound {
                    account: account.to_string(),
                }),
            }
        }

        async fn fetch_token_supply(&self, mint: &Pubkey) -> Result<TokenAmount, ChainError> {
            self.supply_calls.fetch_add(1, Ordering::SeqCst);
            self.supplies
                .lock()
                .unwrap()
                .get(mint)
                .map(|s| TokenAmount::from(*s))
                .ok_or_else(|| ChainError::AccountNotFound {
                    account: mint.to_string(),
                })
        }
    }
}
