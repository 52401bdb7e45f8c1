//! Direct blockchain reading for Solana token accounts

pub mod rpc_client;

pub use rpc_client::{ChainReader, SolanaChainReader};
