//! Scripted in-memory gateway for pipeline tests.

use alloy::primitives::U256;
use async_trait::async_trait;
use snipe_core::types::{ChainAddress, TxId};
use snipe_core::utils::now_ms;
use snipe_core::{ChainId, Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::gateway::{
    BuyOrder, ChainGateway, ChainHandle, ContractAbi, LogBatch, LogCursor, RawEvent, TxStatus,
};

#[derive(Default)]
struct FakeState {
    abi_failure: Option<String>,
    abi_failures_left: usize,
    log_batches: VecDeque<std::result::Result<Vec<RawEvent>, String>>,
    cursors_seen: Vec<LogCursor>,
    liquidity: HashMap<ChainAddress, U256>,
    buy_results: VecDeque<std::result::Result<(), String>>,
    buy_panics: usize,
    buy_orders: Vec<BuyOrder>,
    statuses: VecDeque<TxStatus>,
}

pub struct FakeGateway {
    chain: ChainId,
    state: Mutex<FakeState>,
    buy_delay: Mutex<Option<Duration>>,
    next_block: AtomicUsize,
    pub abi_calls: AtomicUsize,
    pub log_calls: AtomicUsize,
    pub liquidity_calls: AtomicUsize,
    pub buy_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new(chain: ChainId) -> Self {
        Self {
            chain,
            state: Mutex::new(FakeState::default()),
            buy_delay: Mutex::new(None),
            next_block: AtomicUsize::new(1),
            abi_calls: AtomicUsize::new(0),
            log_calls: AtomicUsize::new(0),
            liquidity_calls: AtomicUsize::new(0),
            buy_calls: AtomicUsize::new(0),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// Every `fetch_abi` call fails with `reason`.
    pub fn fail_abi(&self, reason: &str) {
        self.fail_abi_times(reason, usize::MAX);
    }

    /// The next `times` calls to `fetch_abi` fail, later ones succeed.
    pub fn fail_abi_times(&self, reason: &str, times: usize) {
        self.with_state(|s| {
            s.abi_failure = Some(reason.to_string());
            s.abi_failures_left = times;
        });
    }

    pub fn push_logs(&self, events: Vec<RawEvent>) {
        self.with_state(|s| s.log_batches.push_back(Ok(events)));
    }

    pub fn push_log_error(&self, reason: &str) {
        self.with_state(|s| s.log_batches.push_back(Err(reason.to_string())));
    }

    pub fn set_liquidity(&self, token: ChainAddress, amount: U256) {
        self.with_state(|s| {
            s.liquidity.insert(token, amount);
        });
    }

    /// The next `times` calls to `submit_buy` panic.
    pub fn panic_on_buy(&self, times: usize) {
        self.with_state(|s| s.buy_panics = times);
    }

    /// Queues buy outcomes; once exhausted every buy succeeds.
    pub fn push_buy_result(&self, result: std::result::Result<(), &str>) {
        self.with_state(|s| s.buy_results.push_back(result.map_err(str::to_string)));
    }

    pub fn set_buy_delay(&self, delay: Duration) {
        *self.buy_delay.lock().unwrap_or_else(|p| p.into_inner()) = Some(delay);
    }

    /// Queues receipt states; once exhausted every lookup is `Confirmed`.
    pub fn push_status(&self, status: TxStatus) {
        self.with_state(|s| s.statuses.push_back(status));
    }

    pub fn buy_orders(&self) -> Vec<BuyOrder> {
        self.with_state(|s| s.buy_orders.clone())
    }

    pub fn cursors_seen(&self) -> Vec<LogCursor> {
        self.with_state(|s| s.cursors_seen.clone())
    }

    pub fn pending_log_batches(&self) -> usize {
        self.with_state(|s| s.log_batches.len())
    }
}

#[async_trait]
impl ChainGateway for FakeGateway {
    fn chain(&self) -> ChainId {
        self.chain
    }

    async fn connect(&self) -> Result<ChainHandle> {
        Ok(ChainHandle {
            chain: self.chain,
            rpc_url: "fake://".to_string(),
            has_explorer_key: self.chain.is_evm(),
            connected: true,
            checked_at_ms: now_ms(),
        })
    }

    async fn fetch_abi(&self, contract: &ChainAddress) -> Result<ContractAbi> {
        self.abi_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.with_state(|s| {
            if s.abi_failures_left == 0 {
                return None;
            }
            s.abi_failures_left -= 1;
            s.abi_failure.clone()
        });
        match failure {
            Some(reason) => Err(Error::AbiFetch {
                chain: self.chain,
                contract: contract.to_string(),
                attempts: 1,
                reason,
            }),
            None => Ok(ContractAbi::Native),
        }
    }

    async fn read_new_logs(
        &self,
        _contract: &ChainAddress,
        _abi: &ContractAbi,
        _event_name: &str,
        cursor: &LogCursor,
    ) -> Result<LogBatch> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.with_state(|s| {
            s.cursors_seen.push(cursor.clone());
            s.log_batches.pop_front()
        });
        match next {
            None => Ok(LogBatch::empty(cursor.clone())),
            Some(Err(reason)) => Err(Error::connection(self.chain, reason)),
            Some(Ok(events)) => {
                let block = self.next_block.fetch_add(1, Ordering::SeqCst) as u64;
                Ok(LogBatch {
                    events,
                    next: LogCursor::Block(block),
                })
            }
        }
    }

    async fn get_balance(&self, address: &ChainAddress) -> Result<U256> {
        Err(Error::balance(self.chain, address, "no wallet balances in fake"))
    }

    async fn token_liquidity(&self, token: &ChainAddress, _abi: &ContractAbi) -> Result<U256> {
        self.liquidity_calls.fetch_add(1, Ordering::SeqCst);
        self.with_state(|s| s.liquidity.get(token).copied())
            .ok_or_else(|| Error::balance(self.chain, token, "no scripted liquidity"))
    }

    async fn submit_buy(&self, order: &BuyOrder) -> Result<TxId> {
        let call = self.buy_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let panics = self.with_state(|s| {
            let hit = s.buy_panics > 0;
            s.buy_panics = s.buy_panics.saturating_sub(1);
            hit
        });
        if panics {
            panic!("scripted buy panic for {}", order.token);
        }
        let delay = *self.buy_delay.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.with_state(|s| {
            s.buy_orders.push(order.clone());
            s.buy_results.pop_front()
        });
        match result {
            Some(Err(reason)) => Err(Error::transaction(self.chain, reason)),
            Some(Ok(())) | None => Ok(TxId(format!("fake-{}-{call}", self.chain))),
        }
    }

    async fn transaction_status(&self, _tx: &TxId) -> Result<TxStatus> {
        Ok(self
            .with_state(|s| s.statuses.pop_front())
            .unwrap_or(TxStatus::Confirmed))
    }
}
