//! Candidate position store.

use crate::config::DatabaseConfig;
use crate::position::CandidatePosition;
use alloy::primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, info, warn};

const LIQUIDATABLE_USERS_QUERY: &str =
    "SELECT user_address, health_factor::float8 FROM liquidatable_accounts ORDER BY health_factor ASC";

/// Read-only source of liquidation candidates.
#[async_trait]
pub trait PositionRepository: Send + Sync + Debug {
    /// Users the indexer considers liquidatable, lowest health factor first.
    async fn list_liquidatable_users(&self) -> Result<Vec<CandidatePosition>>;
}

/// Postgres-backed repository over the indexer's `liquidatable_accounts` table.
#[derive(Debug, Clone)]
pub struct PgPositionRepository {
    pool: PgPool,
}

impl PgPositionRepository {
    /// Open a connection pool.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .context("connecting to position database")?;

        info!(max_connections = config.max_connections, "Position database connected");
        Ok(Self { pool })
    }

    /// Close every connection. Pending queries finish first.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Position database closed");
    }
}

#[async_trait]
impl PositionRepository for PgPositionRepository {
    async fn list_liquidatable_users(&self) -> Result<Vec<CandidatePosition>> {
        let rows: Vec<(String, f64)> = sqlx::query_as(LIQUIDATABLE_USERS_QUERY)
            .fetch_all(&self.pool)
            .await
            .context("querying liquidatable_accounts")?;

        let candidates = parse_rows(rows);
        debug!(count = candidates.len(), "Loaded liquidation candidates");
        Ok(candidates)
    }
}

/// Turn raw rows into candidates, skipping malformed addresses.
fn parse_rows(rows: Vec<(String, f64)>) -> Vec<CandidatePosition> {
    rows.into_iter()
        .filter_map(|(address, health_factor)| match address.trim().parse::<Address>() {
            Ok(user) => Some(CandidatePosition {
                user,
                health_factor,
            }),
            Err(e) => {
                warn!(address = %address, error = %e, "Skipping row with invalid address");
                None
            }
        })
        .collect()
}
