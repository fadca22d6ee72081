//! In-memory collaborators for pipeline tests.

use alloy::primitives::{Address, B256, U256};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::position::{CandidatePosition, LiquidationOpportunity, TokenAmount};
use crate::repository::PositionRepository;
use crate::u256_math::to_base_units;
use liquidator_api::{PoolHop, RouteProvider, SwapRoute};
use liquidator_chain::{
    ExecutionParams, LiquidationReceipt, LiquidationSubmitter, ProtocolDataProvider,
    RawUserPosition, ReservesSnapshot, SubmissionError, UserReserveSummary, UserSummary,
};

/// Pipeline steps in the order the fakes saw them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    FetchStarted(Address),
    Submitted(Address),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn candidate(user: Address, health_factor: f64) -> CandidatePosition {
    CandidatePosition {
        user,
        health_factor,
    }
}

/// A 6-decimal, 1 USD reserve with a 5% bonus.
pub fn reserve_summary(
    id: u8,
    supplied_usd: f64,
    borrowed_usd: f64,
    usage_as_collateral: bool,
) -> UserReserveSummary {
    UserReserveSummary {
        asset: Address::repeat_byte(id),
        name: format!("Token {id}"),
        symbol: format!("T{id}"),
        decimals: 6,
        supplied: to_base_units(supplied_usd, 6).unwrap_or_default(),
        supplied_usd,
        borrowed: to_base_units(borrowed_usd, 6).unwrap_or_default(),
        borrowed_usd,
        price_usd: 1.0,
        liquidation_bonus: 10500,
        usage_as_collateral,
    }
}

/// Route through the given `(token_in, fee)` hops ending at `token_out`.
pub fn route(hops: &[(u8, u32)], token_out: u8) -> SwapRoute {
    let mut path_tokens: Vec<Address> = hops.iter().map(|(t, _)| Address::repeat_byte(*t)).collect();
    path_tokens.push(Address::repeat_byte(token_out));

    SwapRoute {
        hops: hops
            .iter()
            .enumerate()
            .map(|(i, (_, fee))| PoolHop {
                pool: Address::with_last_byte(0xa0 + i as u8),
                fee_tier: *fee,
            })
            .collect(),
        path_tokens,
        expected_output: U256::from(1_000_000u64),
    }
}

pub fn opportunity(collateral: u8, debt: u8, profit_usd: f64) -> LiquidationOpportunity {
    LiquidationOpportunity {
        collateral: TokenAmount {
            address: Address::repeat_byte(collateral),
            symbol: format!("T{collateral}"),
            decimals: 18,
            amount: U256::from(500_000_000_000_000_000u64),
        },
        debt: TokenAmount {
            address: Address::repeat_byte(debt),
            symbol: format!("T{debt}"),
            decimals: 6,
            amount: U256::from(952_380_952u64),
        },
        repay_usd: 952.38,
        seizable_usd: 952.38 + profit_usd,
        profit_usd,
    }
}

#[derive(Debug, Default)]
pub struct FakeRepository {
    users: Vec<CandidatePosition>,
    fail: bool,
}

impl FakeRepository {
    pub fn with(users: Vec<CandidatePosition>) -> Self {
        Self { users, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            users: vec![],
            fail: true,
        }
    }
}

#[async_trait]
impl PositionRepository for FakeRepository {
    async fn list_liquidatable_users(&self) -> Result<Vec<CandidatePosition>> {
        if self.fail {
            bail!("connection refused");
        }
        Ok(self.users.clone())
    }
}

/// Serves preformatted positions keyed by user.
#[derive(Debug, Default)]
pub struct FakeProtocol {
    users: HashMap<Address, (f64, Vec<UserReserveSummary>)>,
    fail_snapshot: bool,
    fetch_delay: Option<Duration>,
    user_delays: HashMap<Address, Duration>,
    events: EventLog,
    snapshot_calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeProtocol {
    pub fn with_user(
        mut self,
        user: Address,
        health_factor: f64,
        reserves: Vec<UserReserveSummary>,
    ) -> Self {
        self.users.insert(user, (health_factor, reserves));
        self
    }

    pub fn with_failing_snapshot(mut self) -> Self {
        self.fail_snapshot = true;
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Hold the fetch of `user` for `delay`.
    pub fn with_user_delay(mut self, user: Address, delay: Duration) -> Self {
        self.user_delays.insert(user, delay);
        self
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    pub fn snapshot_calls(&self) -> Arc<AtomicUsize> {
        self.snapshot_calls.clone()
    }

    pub fn max_in_flight(&self) -> Arc<AtomicUsize> {
        self.max_in_flight.clone()
    }
}

#[async_trait]
impl ProtocolDataProvider for FakeProtocol {
    async fn reserves_snapshot(&self) -> Result<ReservesSnapshot> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_snapshot {
            bail!("oracle call reverted");
        }
        Ok(ReservesSnapshot {
            reserves: vec![],
            base_currency_unit: U256::from(100_000_000u64),
        })
    }

    async fn user_raw_position(
        &self,
        user: Address,
        _snapshot: &ReservesSnapshot,
    ) -> Result<RawUserPosition> {
        self.events.lock().unwrap().push(Event::FetchStarted(user));
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.user_delays.get(&user).copied().or(self.fetch_delay) {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if !self.users.contains_key(&user) {
            return Err(anyhow!("execution reverted"));
        }
        Ok(RawUserPosition {
            user,
            reserves: vec![],
            health_factor_wad: U256::ZERO,
        })
    }

    fn format_user_position(
        &self,
        _snapshot: &ReservesSnapshot,
        raw: &RawUserPosition,
    ) -> UserSummary {
        let (health_factor, reserves) = self.users.get(&raw.user).cloned().unwrap_or_default();
        UserSummary {
            user: raw.user,
            health_factor,
            total_collateral_usd: reserves.iter().map(|r| r.supplied_usd).sum(),
            total_debt_usd: reserves.iter().map(|r| r.borrowed_usd).sum(),
            reserves,
        }
    }
}

/// Returns one fixed route (empty by default) and records queries.
#[derive(Debug, Default)]
pub struct FakeRouter {
    route: SwapRoute,
    fail: bool,
    queries: Arc<Mutex<Vec<(Address, Address, U256)>>>,
}

impl FakeRouter {
    pub fn with_route(mut self, route: SwapRoute) -> Self {
        self.route = route;
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Arc<Mutex<Vec<(Address, Address, U256)>>> {
        self.queries.clone()
    }
}

#[async_trait]
impl RouteProvider for FakeRouter {
    fn router_id(&self) -> &str {
        "fake"
    }

    async fn find_route(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<SwapRoute> {
        self.queries.lock().unwrap().push((token_in, token_out, amount_in));
        if self.fail {
            bail!("quoter unavailable");
        }
        Ok(self.route.clone())
    }
}

/// Records submissions; the n-th submission gets `tx_hash_for(n)`.
#[derive(Debug, Default)]
pub struct FakeSubmitter {
    submitted: Mutex<Vec<ExecutionParams>>,
    confirmations: Mutex<Vec<u64>>,
    revert_all: bool,
    revert_for: HashSet<Address>,
    events: EventLog,
}

impl FakeSubmitter {
    pub fn reverting() -> Self {
        Self {
            revert_all: true,
            ..Default::default()
        }
    }

    pub fn reverting_for(borrower: Address) -> Self {
        Self {
            revert_for: HashSet::from([borrower]),
            ..Default::default()
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    pub fn tx_hash_for(index: usize) -> B256 {
        B256::with_last_byte(index as u8 + 1)
    }

    pub fn submitted(&self) -> Vec<ExecutionParams> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn confirmations_requested(&self) -> Vec<u64> {
        self.confirmations.lock().unwrap().clone()
    }
}

#[async_trait]
impl LiquidationSubmitter for FakeSubmitter {
    async fn submit(&self, params: &ExecutionParams) -> Result<B256, SubmissionError> {
        self.events.lock().unwrap().push(Event::Submitted(params.borrower));
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(params.clone());
        Ok(Self::tx_hash_for(submitted.len() - 1))
    }

    async fn await_confirmation(
        &self,
        tx_hash: B256,
        confirmations: u64,
    ) -> Result<LiquidationReceipt, SubmissionError> {
        self.confirmations.lock().unwrap().push(confirmations);

        let borrower = self
            .submitted
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .find(|(i, _)| Self::tx_hash_for(*i) == tx_hash)
            .map(|(_, p)| p.borrower);

        if self.revert_all || borrower.is_some_and(|b| self.revert_for.contains(&b)) {
            return Err(SubmissionError::Reverted { tx_hash });
        }
        Ok(LiquidationReceipt {
            tx_hash,
            block_number: Some(1),
            gas_used: 1_500_000,
        })
    }
}
