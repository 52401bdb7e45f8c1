//! Swapquote - swap quoting engine for constant-product Solana pools
//! Built with Domain-Driven Design principles

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

// Re-export main types for convenience
pub use application::QuoteService;
pub use domain::pool::{AggregateState, Catalog, PoolManager, PoolStateResolver};
pub use domain::quote::Quote;
pub use infrastructure::blockchain::{ChainReader, SolanaChainReader};
pub use infrastructure::cache::ReserveCache;
