//! One liquidation cycle over every candidate in the position store.
//!
//! Candidates are processed in fixed-size batches. Within a batch, position
//! fetches run concurrently (at most `batch_size` at a time) and the whole
//! batch is awaited before ranking. Execution is sequential, in repository
//! order (lowest health factor first), because every liquidation is signed
//! by the same account. The next batch starts only after the previous one
//! has been fully executed.

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::LiquidationConfig;
use crate::error::{CycleError, ExecutionError};
use crate::fetcher::PositionDataFetcher;
use crate::liquidator::ExecutionCoordinator;
use crate::position::UserPositionSnapshot;
use crate::ranker::rank_opportunities;
use crate::repository::PositionRepository;
use liquidator_chain::{LiquidationReceipt, ReservesSnapshot};

/// Why a user was passed over without an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkipReason {
    /// Fresh health factor outside `[0, 1)`
    HealthFactorOutOfRange(f64),
    /// Ranking produced nothing (no debt, no collateral, zero amounts)
    NoOpportunity,
    /// Best opportunity does not make money
    NotProfitable { profit_usd: f64 },
}

/// Result of processing one candidate.
#[derive(Debug)]
pub enum UserOutcome {
    FetchFailed,
    Skipped(SkipReason),
    NoRoute,
    Executed(LiquidationReceipt),
    ExecutionFailed,
}

/// Per-cycle counters.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub candidates: usize,
    pub fetched: usize,
    pub fetch_failures: usize,
    pub filtered_out: usize,
    pub skipped_unprofitable: usize,
    pub no_route: usize,
    pub executed: usize,
    pub execution_failures: usize,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            candidates: 0,
            fetched: 0,
            fetch_failures: 0,
            filtered_out: 0,
            skipped_unprofitable: 0,
            no_route: 0,
            executed: 0,
            execution_failures: 0,
        }
    }

    fn record(&mut self, outcome: &UserOutcome) {
        if !matches!(outcome, UserOutcome::FetchFailed) {
            self.fetched += 1;
        }
        match outcome {
            UserOutcome::FetchFailed => self.fetch_failures += 1,
            UserOutcome::Skipped(SkipReason::HealthFactorOutOfRange(_)) => self.filtered_out += 1,
            UserOutcome::Skipped(_) => self.skipped_unprofitable += 1,
            UserOutcome::NoRoute => self.no_route += 1,
            UserOutcome::Executed(_) => self.executed += 1,
            UserOutcome::ExecutionFailed => self.execution_failures += 1,
        }
    }
}

/// Drives a full cycle: candidates, snapshot, batched fetch, rank, execute.
#[derive(Debug)]
pub struct BatchOrchestrator {
    repository: Arc<dyn PositionRepository>,
    fetcher: PositionDataFetcher,
    coordinator: ExecutionCoordinator,
    batch_size: usize,
    flat_cost_usd: f64,
}

impl BatchOrchestrator {
    pub fn new(
        repository: Arc<dyn PositionRepository>,
        fetcher: PositionDataFetcher,
        coordinator: ExecutionCoordinator,
        config: &LiquidationConfig,
    ) -> Self {
        Self {
            repository,
            fetcher,
            coordinator,
            batch_size: config.batch_size.max(1),
            flat_cost_usd: config.flat_cost_usd,
        }
    }

    /// Run one cycle.
    ///
    /// Only a repository failure or a reserve snapshot failure aborts the
    /// cycle. Per-user failures are logged and counted.
    #[instrument(skip(self), name = "cycle")]
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let mut report = CycleReport::new(Utc::now());

        let candidates = self
            .repository
            .list_liquidatable_users()
            .await
            .map_err(CycleError::Repository)?;
        report.candidates = candidates.len();

        if candidates.is_empty() {
            debug!("No liquidation candidates");
            return Ok(report);
        }

        let snapshot = self
            .fetcher
            .reserves_snapshot()
            .await
            .map_err(CycleError::ReservesSnapshot)?;

        info!(
            candidates = candidates.len(),
            reserves = snapshot.reserves.len(),
            batch_size = self.batch_size,
            "Starting liquidation cycle"
        );

        for (index, batch) in candidates.chunks(self.batch_size).enumerate() {
            let start = Instant::now();
            let positions = self
                .fetch_batch(batch.iter().map(|c| c.user).collect(), &snapshot)
                .await;

            debug!(
                batch = index,
                size = batch.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Batch fetched"
            );

            for (user, position) in positions {
                let outcome = match position {
                    Some(position) => self.process_position(position).await,
                    None => UserOutcome::FetchFailed,
                };
                debug!(user = %user, outcome = ?outcome, "User processed");
                report.record(&outcome);
            }
        }

        Ok(report)
    }

    /// Fetch every user of one batch, at most `batch_size` in flight.
    ///
    /// Results keep the input order.
    async fn fetch_batch(
        &self,
        users: Vec<Address>,
        snapshot: &ReservesSnapshot,
    ) -> Vec<(Address, Option<UserPositionSnapshot>)> {
        stream::iter(users)
            .map(|user| async move {
                match self.fetcher.fetch(user, snapshot).await {
                    Ok(position) => (user, Some(position)),
                    Err(e) => {
                        warn!(user = %user, error = %format!("{e:#}"), "Position fetch failed");
                        (user, None)
                    }
                }
            })
            .buffered(self.batch_size)
            .collect()
            .await
    }

    /// Filter, rank and, when profitable, execute one user.
    async fn process_position(&self, position: UserPositionSnapshot) -> UserOutcome {
        let user = position.user;

        if !position.is_liquidatable() {
            debug!(user = %user, health_factor = position.health_factor, "Not liquidatable");
            return UserOutcome::Skipped(SkipReason::HealthFactorOutOfRange(position.health_factor));
        }

        let opportunities = rank_opportunities(
            &position.collateral_assets,
            &position.debt_assets,
            self.flat_cost_usd,
            position.health_factor,
        );

        let Some(best) = opportunities.first() else {
            debug!(user = %user, "No liquidation opportunity");
            return UserOutcome::Skipped(SkipReason::NoOpportunity);
        };

        if best.profit_usd <= 0.0 {
            debug!(
                user = %user,
                profit_usd = best.profit_usd,
                "Best opportunity not profitable"
            );
            return UserOutcome::Skipped(SkipReason::NotProfitable {
                profit_usd: best.profit_usd,
            });
        }

        info!(
            user = %user,
            health_factor = position.health_factor,
            collateral = %best.collateral.symbol,
            debt = %best.debt.symbol,
            repay_usd = format!("{:.2}", best.repay_usd),
            profit_usd = format!("{:.2}", best.profit_usd),
            "Executing liquidation"
        );

        match self.coordinator.execute(best, user).await {
            Ok(receipt) => UserOutcome::Executed(receipt),
            Err(ExecutionError::NoRouteFound { collateral, debt }) => {
                info!(user = %user, collateral = %collateral, debt = %debt, "No swap route, skipping");
                UserOutcome::NoRoute
            }
            Err(e) => {
                error!(user = %user, error = %e, "Liquidation failed");
                UserOutcome::ExecutionFailed
            }
        }
    }
}
