//! Superlend Liquidation Bot
//!
//! Periodic liquidation bot for Superlend (Aave V3 fork) on Etherlink.
//! Each cycle reads liquidatable accounts from the indexer database,
//! re-checks them on-chain, ranks collateral/debt pairs by profit and
//! liquidates through the FlashLiquidations helper contract.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liquidator_api::{IguanaV3Addresses, IguanaV3Router};
use liquidator_chain::{
    AaveV3DataProvider, ExponentialBackoff, FailoverClient, FlashLiquidationSubmitter,
    RpcEndpoint, RpcFailover,
};
use liquidator_core::{
    BatchOrchestrator, CycleScheduler, ExecutionCoordinator, LiquidatorConfig,
    PgPositionRepository, PositionDataFetcher,
};

/// Environment variable names.
mod env {
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

const DEFAULT_LOG_FILTER: &str = "info,liquidator_core=debug,liquidator_chain=debug";

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = LiquidatorConfig::load()?;
    config.log_config();

    info!(chain_id = config.rpc.chain_id, "Starting Superlend liquidation bot");

    // Explicit resource handles, released below in reverse order
    let repository = Arc::new(PgPositionRepository::connect(&config.database).await?);
    let rpc = connect_rpc(&config).await?;

    let mut scheduler = CycleScheduler::new(Arc::new(build_orchestrator(
        &config,
        rpc,
        repository.clone(),
    )?));
    scheduler.start(config.schedule()?.interval);

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown signal received");

    scheduler.stop().await;
    repository.close().await;

    info!("Shutdown complete");
    Ok(())
}

/// Human-readable logs by default, JSON with `LOG_FORMAT=json`.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var(env::LOG_FORMAT)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

/// Build the endpoint set and check it serves the configured chain.
async fn connect_rpc(config: &LiquidatorConfig) -> Result<RpcFailover> {
    let urls = config.rpc.endpoint_urls();
    let mut rpc = FailoverClient::new(RpcEndpoint::from_urls(&urls)?);
    if let Some((initial, max)) = config.failover.backoff() {
        rpc = rpc.with_backoff(ExponentialBackoff::new(initial, max));
    }

    rpc.verify_chain(config.rpc.chain_id).await?;
    Ok(rpc)
}

fn build_orchestrator(
    config: &LiquidatorConfig,
    rpc: RpcFailover,
    repository: Arc<PgPositionRepository>,
) -> Result<BatchOrchestrator> {
    info!("Initializing components...");

    let protocol = Arc::new(AaveV3DataProvider::new(
        rpc.clone(),
        config.protocol.addresses_provider,
    ));

    let (Some(factory), Some(quoter_v2)) = (config.dex.factory, config.dex.quoter_v2) else {
        anyhow::bail!("IguanaDEX V3 factory and quoter addresses are required");
    };
    let router = Arc::new(IguanaV3Router::new(
        rpc.clone(),
        IguanaV3Addresses { factory, quoter_v2 },
    ));

    let private_key = std::env::var(env::PRIVATE_KEY)
        .with_context(|| format!("Missing env var: {}", env::PRIVATE_KEY))?;
    let submitter = Arc::new(FlashLiquidationSubmitter::new(
        rpc,
        &private_key,
        config.rpc.chain_id,
        config.protocol.liquidation_helper,
        config.liquidation.confirmation_timeout(),
    )?);

    let coordinator =
        ExecutionCoordinator::new(router, submitter, config.liquidation.confirmations);

    info!("All components initialized");

    Ok(BatchOrchestrator::new(
        repository,
        PositionDataFetcher::new(protocol),
        coordinator,
        &config.liquidation,
    ))
}
