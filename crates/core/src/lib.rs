//! Liquidator core logic.
//!
//! This crate provides the liquidation pipeline:
//! - Configuration and cycle schedule
//! - Candidate position repository (Postgres)
//! - Position fetch and normalization
//! - Opportunity ranking
//! - Route, submit and confirm execution
//! - Batched cycle orchestration and single-flight scheduling

pub mod config;
mod error;
mod fetcher;
mod liquidator;
mod orchestrator;
mod position;
mod ranker;
mod repository;
mod scheduler;
pub mod u256_math;

#[cfg(test)]
mod testing;

pub use config::{CycleSchedule, LiquidatorConfig};
pub use error::{CycleError, ExecutionError};
pub use fetcher::{normalize, PositionDataFetcher};
pub use liquidator::{build_params, ExecutionCoordinator};
pub use orchestrator::{BatchOrchestrator, CycleReport, SkipReason, UserOutcome};
pub use position::{
    Asset, CandidatePosition, LiquidationOpportunity, TokenAmount, UserPositionSnapshot,
};
pub use ranker::{rank_opportunities, CLOSE_FACTOR_HF_THRESHOLD};
pub use repository::{PgPositionRepository, PositionRepository};
pub use scheduler::{CycleRunner, CycleScheduler};
