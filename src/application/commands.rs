//! CLI commands and handlers
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::application::services::QuoteService;
use crate::domain::pool::{AggregateState, RefreshOutcome, RefreshReport};
use crate::domain::quote::{PriceImpactLevel, Quote};
use crate::shared::utils::format_base_units;

#[derive(Parser)]
#[command(name = "swapquote")]
#[command(version, about = "Swap quotes for constant-product Solana pools")]
pub struct Cli {
    /// Path to the TOML configuration
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// RPC endpoint URL, overrides the configuration file
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Quote a swap across every shard of a pair
    Quote {
        /// Input token symbol
        #[arg(long)]
        from: String,

        /// Output token symbol
        #[arg(long)]
        to: String,

        /// Input amount in human units, e.g. 1.5
        #[arg(long)]
        amount: Decimal,

        /// Slippage tolerance in basis points (100 = 1%)
        #[arg(long)]
        slippage_bps: Option<u32>,

        /// Print the quote as JSON
        #[arg(long)]
        json: bool,
    },

    /// Refresh every configured pool once
    Refresh,

    /// Refresh, then list pools with their reserves
    Pools {
        /// Also fetch LP-token supply
        #[arg(long)]
        detailed: bool,

        /// Print the pool state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Keep the pool cache warm with a periodic refresh
    Watch {
        /// Refresh interval in milliseconds (defaults to the configured one)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Stop after this many reports
        #[arg(long)]
        iterations: Option<u32>,
    },
}

pub struct CommandExecutor;

impl CommandExecutor {
    /// Execute the selected command
    pub async fn execute(command: Commands, service: Arc<QuoteService>) -> Result<()> {
        match command {
            Commands::Quote {
                from,
                to,
                amount,
                slippage_bps,
                json,
            } => {
                Self::execute_quote_command(&service, &from, &to, amount, slippage_bps, json).await
            }
            Commands::Refresh => Self::execute_refresh_command(&service).await,
            Commands::Pools { detailed, json } => {
                Self::execute_pools_command(&service, detailed, json).await
            }
            Commands::Watch {
                interval_ms,
                iterations,
            } => Self::execute_watch_command(service, interval_ms, iterations).await,
        }
    }

    async fn execute_quote_command(
        service: &QuoteService,
        from: &str,
        to: &str,
        amount: Decimal,
        slippage_bps: Option<u32>,
        json: bool,
    ) -> Result<()> {
        let quote = match service.get_quote_with_slippage(from, to, amount, slippage_bps).await {
            Ok(quote) => quote,
            Err(err) => {
                println!("❌ {}", err.user_message());
                println!("   Reason: {}", err);
                return Err(err).context("quote failed");
            }
        };

        if json {
            println!("{}", serde_json::to_string_pretty(&quote)?);
        } else {
            print_quote(&quote);
        }
        Ok(())
    }

    async fn execute_refresh_command(service: &QuoteService) -> Result<()> {
        println!("🔄 Refreshing {} pools...", service.catalog().pools().len());
        match service.refresh_pools().await {
            RefreshOutcome::Completed(report) => print_report(&report),
            RefreshOutcome::InProgress => println!("⏳ A refresh is already in progress"),
        }
        print_pools(&service.get_cached_pools().await);
        Ok(())
    }

    async fn execute_pools_command(
        service: &QuoteService,
        detailed: bool,
        json: bool,
    ) -> Result<()> {
        service.refresh_pools().await;
        let state = service.get_cached_pools().await;

        if json {
            println!("{}", serde_json::to_string_pretty(&state)?);
            return Ok(());
        }

        print_pools(&state);
        if detailed {
            println!("\n🪙 LP supply:");
            for entry in &state.pools {
                match service.lp_supply(&entry.pool.id).await {
                    Ok(supply) => {
                        println!("   {}: {} (mint {})", entry.pool.id, supply, entry.pool.lp_mint)
                    }
                    Err(e) => println!("   {}: ⚠️  {}", entry.pool.id, e),
                }
            }
        }
        Ok(())
    }

    async fn execute_watch_command(
        service: Arc<QuoteService>,
        interval_ms: Option<u64>,
        iterations: Option<u32>,
    ) -> Result<()> {
        let interval = interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| service.settings().refresh_interval());
        if interval.is_zero() {
            anyhow::bail!("--interval-ms must be positive");
        }

        println!(
            "👀 Watching {} pools every {}ms",
            service.catalog().pools().len(),
            interval.as_millis()
        );
        let handle = Arc::clone(&service).spawn_refresh_loop(interval);

        let mut ticker = tokio::time::interval(interval);
        let mut round = 0u32;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping refresh loop");
                    break;
                }
            }
            if round > 0 {
                println!("\n🔄 Round {}", round);
                print_pools(&service.get_cached_pools().await);
            }
            round += 1;
            if iterations.is_some_and(|limit| round > limit) {
                break;
            }
        }

        handle.abort();
        println!("✅ Watch finished");
        Ok(())
    }
}

fn print_quote(quote: &Quote) {
    let input = &quote.input_token;
    let output = &quote.output_token;
    println!("💱 Quote {}", quote.id);
    println!(
        "   {} {} -> {} {}",
        format_base_units(quote.amount_in, input.decimals),
        input.symbol,
        format_base_units(quote.amount_out, output.decimals),
        output.symbol
    );
    println!(
        "   Minimum received: {} {} ({}% slippage)",
        format_base_units(quote.minimum_output, output.decimals),
        output.symbol,
        Decimal::new(i64::from(quote.slippage_bps), 2)
    );
    if let Some(price) = quote.effective_price {
        println!(
            "   Price: 1 {} = {} {}",
            input.symbol,
            price.round_dp(output.decimals.into()),
            output.symbol
        );
    }
    let marker = match quote.price_impact_level {
        PriceImpactLevel::Normal => "",
        PriceImpactLevel::Caution => " ⚠️",
        PriceImpactLevel::Blocking => " 🛑 confirm before swapping",
    };
    println!("   Price impact: {}%{}", quote.price_impact_pct, marker);
    println!(
        "   Route: {} (shard {}, {})",
        quote.route.pool_id, quote.route.shard, quote.route.provenance
    );
    if quote.is_stale() {
        let reason = quote.route.fallback_reason.as_deref().unwrap_or("unknown");
        println!("   ⚠️  Reserves from static configuration: {}", reason);
    }
    if quote.shards.len() > 1 || !quote.rejected.is_empty() {
        println!("   Shards:");
        for shard in &quote.shards {
            println!(
                "     #{} {}: {} {} [{}]",
                shard.shard,
                shard.pool_id,
                format_base_units(shard.amount_out, output.decimals),
                output.symbol,
                shard.provenance
            );
        }
        for rejected in &quote.rejected {
            println!("     #{} {}: ❌ {}", rejected.shard, rejected.pool_id, rejected.reason);
        }
    }
}

fn print_report(report: &RefreshReport) {
    if report.failures.is_empty() {
        println!("✅ Refreshed {} pools", report.succeeded);
        return;
    }
    println!(
        "⚠️  Refreshed {} pools, {} failed (consecutive failures: {})",
        report.succeeded,
        report.failures.len(),
        report.consecutive_failures
    );
    for failure in &report.failures {
        println!("   {}: {}", failure.pool_id, failure.reason);
    }
    if report.rate_limited() {
        println!("   The RPC endpoint is rate limiting requests, try again shortly.");
    }
}

fn print_pools(state: &AggregateState) {
    let freshness = if state.stale { "⚠️  stale" } else { "✅ fresh" };
    let last = state
        .last_full_success
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    println!("📊 Pools: {} ({}, last full refresh: {})", state.pools.len(), freshness, last);

    for (i, entry) in state.pools.iter().enumerate() {
        let pool = &entry.pool;
        println!(
            "   {}. {} {} shard {} fee {} [{}]",
            i + 1,
            pool.id,
            pool.pair_label(),
            pool.shard,
            pool.fee,
            entry.provenance()
        );
        println!(
            "      Reserves: {} {} / {} {}",
            format_base_units(entry.snapshot.reserve_a, pool.token_a.decimals),
            pool.token_a.symbol,
            format_base_units(entry.snapshot.reserve_b, pool.token_b.decimals),
            pool.token_b.symbol
        );
        if let Some(err) = &entry.last_error {
            println!("      Last error: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quote_command() {
        let cli = Cli::try_parse_from([
            "swapquote",
            "--config",
            "pools.toml",
            "quote",
            "--from",
            "SOL",
            "--to",
            "USDC",
            "--amount",
            "1.5",
            "--slippage-bps",
            "50",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("pools.toml"));
        match cli.command {
            Commands::Quote {
                from,
                amount,
                slippage_bps,
                json,
                ..
            } => {
                assert_eq!(from, "SOL");
                assert_eq!(amount, Decimal::new(15, 1));
                assert_eq!(slippage_bps, Some(50));
                assert!(!json);
            }
            _ => panic!("expected quote command"),
        }
    }

    #[test]
    fn test_rejects_non_decimal_amount() {
        let args = ["swapquote", "quote", "--from", "SOL", "--to", "USDC", "--amount", "lots"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_global_rpc_url_after_subcommand() {
        let args = ["swapquote", "pools", "--detailed", "--rpc-url", "http://localhost:8899"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.rpc_url.as_deref(), Some("http://localhost:8899"));
        assert!(matches!(cli.command, Commands::Pools { detailed: true, json: false }));
    }
}
