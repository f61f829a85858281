use alloy::primitives::U256;
use snipe_chain::{BuyOrder, ChainGateway, TxStatus};
use snipe_core::config::ExecutorConfig;
use snipe_core::modes::ConfirmationMode;
use snipe_core::types::{ChainAddress, TxId};
use snipe_core::utils::parse_decimal_amount;
use snipe_core::{ChainId, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::pending::PendingRegistry;
use crate::types::{AttemptOutcome, PurchaseResult, Settlement, TradeAttempt};

/// Bounded-retry buyer, one attempt sequence per token at a time.
#[derive(Clone)]
pub struct TradeExecutor {
    caps: HashMap<ChainId, U256>,
    max_attempts: u32,
    retry_delay: Duration,
    confirmation: ConfirmationMode,
    receipt_poll: Duration,
    receipt_timeout: Duration,
    pending: PendingRegistry,
    permits: Arc<Semaphore>,
}

impl TradeExecutor {
    /// `max_investment` is a decimal amount of native units, e.g. `"0.01"`.
    pub fn new(cfg: &ExecutorConfig, max_investment: &str) -> Result<Self> {
        let mut caps = HashMap::new();
        for chain in ChainId::ALL {
            caps.insert(
                chain,
                parse_decimal_amount(max_investment, chain.native_decimals())?,
            );
        }
        Ok(Self {
            caps,
            max_attempts: cfg.max_attempts.max(1),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            confirmation: ConfirmationMode::parse(&cfg.confirmation)?,
            receipt_poll: Duration::from_millis(cfg.receipt_poll_interval_ms.max(1)),
            receipt_timeout: Duration::from_millis(cfg.receipt_timeout_ms),
            pending: PendingRegistry::default(),
            permits: Arc::new(Semaphore::new(cfg.max_concurrent_trades.max(1))),
        })
    }

    /// Maximum committed amount on `chain`, in base units.
    pub fn max_investment(&self, chain: ChainId) -> U256 {
        self.caps.get(&chain).copied().unwrap_or(U256::ZERO)
    }

    pub fn is_pending(&self, chain: ChainId, token: &ChainAddress) -> bool {
        self.pending.contains(chain, token)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Buys `token` with up to `max_attempts` tries and a fixed delay between
    /// them. Never returns an error: failures end up in the result.
    pub async fn attempt_purchase(
        &self,
        gateway: &dyn ChainGateway,
        token: ChainAddress,
        requested: U256,
        cancel: &CancellationToken,
    ) -> PurchaseResult {
        let chain = gateway.chain();
        let Some(_claim) = self.pending.claim(chain, token) else {
            warn!(%chain, %token, "purchase already pending, request rejected");
            return PurchaseResult::Rejected;
        };

        let cap = self.max_investment(chain);
        let amount = requested.min(cap);
        if amount < requested {
            debug!(%chain, %token, %requested, %cap, "purchase amount clamped");
        }
        let mut attempt = TradeAttempt::new(token, chain, amount);

        let _permit = tokio::select! {
            _ = cancel.cancelled() => return cancelled(attempt),
            permit = self.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return cancelled(attempt),
            },
        };

        let order = BuyOrder { token, amount };
        while attempt.attempts < self.max_attempts {
            if cancel.is_cancelled() {
                return cancelled(attempt);
            }
            attempt.attempts += 1;
            match self.buy_once(gateway, &order).await {
                Ok((tx, settlement)) => {
                    info!(
                        %chain,
                        %token,
                        %amount,
                        tx = %tx,
                        attempt = attempt.attempts,
                        ?settlement,
                        "successfully sniped token"
                    );
                    attempt.outcome = AttemptOutcome::Succeeded;
                    attempt.settlement = Some(settlement);
                    attempt.tx = Some(tx);
                    return PurchaseResult::Succeeded(attempt);
                }
                Err(reason) => {
                    error!(
                        %chain,
                        %token,
                        %reason,
                        attempt = attempt.attempts,
                        max_attempts = self.max_attempts,
                        "failed to snipe token"
                    );
                    attempt.last_error = Some(reason);
                    attempt.outcome = AttemptOutcome::FailedRetryable;
                }
            }

            if attempt.attempts < self.max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return cancelled(attempt),
                    _ = tokio::time::sleep(self.retry_delay) => {}
                }
            }
        }

        error!(%chain, %token, attempts = attempt.attempts, "max attempts reached");
        attempt.outcome = AttemptOutcome::FailedTerminal;
        PurchaseResult::ExhaustedRetries(attempt)
    }

    async fn buy_once(
        &self,
        gateway: &dyn ChainGateway,
        order: &BuyOrder,
    ) -> std::result::Result<(TxId, Settlement), String> {
        let tx = gateway
            .submit_buy(order)
            .await
            .map_err(|err| err.to_string())?;
        match self.confirmation {
            ConfirmationMode::Submitted => Ok((tx, Settlement::Submitted)),
            ConfirmationMode::Receipt => {
                let settlement = self.await_receipt(gateway, &tx).await?;
                Ok((tx, settlement))
            }
        }
    }

    /// Polls until the transaction lands. A timeout downgrades to
    /// `Submitted` instead of failing, since the broadcast may still land.
    async fn await_receipt(
        &self,
        gateway: &dyn ChainGateway,
        tx: &TxId,
    ) -> std::result::Result<Settlement, String> {
        let chain = gateway.chain();
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            match gateway.transaction_status(tx).await {
                Ok(TxStatus::Confirmed) => return Ok(Settlement::Confirmed),
                Ok(TxStatus::Reverted) => return Err(format!("transaction {tx} reverted")),
                Ok(TxStatus::Pending) => {}
                Err(err) => debug!(%chain, tx = %tx, %err, "receipt lookup failed"),
            }
            if Instant::now() + self.receipt_poll > deadline {
                warn!(%chain, tx = %tx, "receipt not observed before timeout");
                return Ok(Settlement::Submitted);
            }
            tokio::time::sleep(self.receipt_poll).await;
        }
    }
}

fn cancelled(mut attempt: TradeAttempt) -> PurchaseResult {
    info!(chain = %attempt.chain, token = %attempt.token, "purchase cancelled");
    attempt.outcome = AttemptOutcome::FailedTerminal;
    attempt.last_error = Some("cancelled".to_string());
    PurchaseResult::Cancelled(attempt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use snipe_chain::testing::FakeGateway;
    use std::sync::atomic::Ordering;

    fn cfg(confirmation: &str) -> ExecutorConfig {
        ExecutorConfig {
            max_attempts: 5,
            retry_delay_ms: 10_000,
            max_concurrent_trades: 4,
            gas_mode: "eip1559".to_string(),
            max_fee_gwei: 0,
            max_priority_gwei: 0,
            gas_limit: 300_000,
            deadline_secs: 120,
            confirmation: confirmation.to_string(),
            receipt_poll_interval_ms: 2_000,
            receipt_timeout_ms: 120_000,
        }
    }

    fn executor(confirmation: &str) -> TradeExecutor {
        TradeExecutor::new(&cfg(confirmation), "0.01").unwrap()
    }

    fn token() -> ChainAddress {
        ChainAddress::Evm(address!("0x0000000000000000000000000000000000000aaa"))
    }

    fn hundredth() -> U256 {
        U256::from(10_000_000_000_000_000u64)
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_five_failed_attempts() {
        let fake = FakeGateway::new(ChainId::Bsc);
        for _ in 0..6 {
            fake.push_buy_result(Err("insufficient funds"));
        }
        let exec = executor("submitted");
        let started = Instant::now();

        let result = exec
            .attempt_purchase(&fake, token(), hundredth(), &CancellationToken::new())
            .await;

        let PurchaseResult::ExhaustedRetries(attempt) = result else {
            panic!("expected exhausted retries, got {result:?}");
        };
        assert_eq!(attempt.attempts, 5);
        assert_eq!(attempt.outcome, AttemptOutcome::FailedTerminal);
        assert!(attempt.last_error.unwrap().contains("insufficient funds"));
        assert_eq!(fake.buy_calls.load(Ordering::SeqCst), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(40));
        assert!(!exec.is_pending(ChainId::Bsc, &token()));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let fake = FakeGateway::new(ChainId::Eth);
        fake.push_buy_result(Err("nonce too low"));
        fake.push_buy_result(Err("nonce too low"));
        let exec = executor("submitted");

        let result = exec
            .attempt_purchase(&fake, token(), hundredth(), &CancellationToken::new())
            .await;

        let PurchaseResult::Succeeded(attempt) = result else {
            panic!("expected success, got {result:?}");
        };
        assert_eq!(attempt.attempts, 3);
        assert_eq!(attempt.settlement, Some(Settlement::Submitted));
        assert_eq!(attempt.tx, Some(TxId("fake-ETH-3".to_string())));
    }

    #[tokio::test]
    async fn amount_is_clamped_to_max_investment() {
        let fake = FakeGateway::new(ChainId::Bsc);
        let exec = executor("submitted");
        let one_bnb = ChainId::Bsc.one_native_unit();

        let result = exec
            .attempt_purchase(&fake, token(), one_bnb, &CancellationToken::new())
            .await;

        assert_eq!(result.attempt().unwrap().amount, hundredth());
        assert_eq!(fake.buy_orders()[0].amount, hundredth());
    }

    #[test]
    fn solana_cap_uses_lamports() {
        let exec = executor("submitted");
        assert_eq!(exec.max_investment(ChainId::Sol), U256::from(10_000_000u64));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_request_for_same_token_is_rejected() {
        let fake = Arc::new(FakeGateway::new(ChainId::Bsc));
        fake.set_buy_delay(Duration::from_secs(1));
        let exec = executor("submitted");

        let first = {
            let fake = fake.clone();
            let exec = exec.clone();
            tokio::spawn(async move {
                exec.attempt_purchase(fake.as_ref(), token(), hundredth(), &CancellationToken::new())
                    .await
            })
        };
        while !exec.is_pending(ChainId::Bsc, &token()) {
            tokio::task::yield_now().await;
        }

        let second = exec
            .attempt_purchase(fake.as_ref(), token(), hundredth(), &CancellationToken::new())
            .await;

        assert_eq!(second, PurchaseResult::Rejected);
        assert!(matches!(first.await.unwrap(), PurchaseResult::Succeeded(_)));
        assert_eq!(fake.buy_calls.load(Ordering::SeqCst), 1);
        assert_eq!(exec.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn receipt_mode_retries_reverted_transaction() {
        let fake = FakeGateway::new(ChainId::Eth);
        fake.push_status(TxStatus::Pending);
        fake.push_status(TxStatus::Reverted);
        let exec = executor("receipt");

        let result = exec
            .attempt_purchase(&fake, token(), hundredth(), &CancellationToken::new())
            .await;

        let PurchaseResult::Succeeded(attempt) = result else {
            panic!("expected success, got {result:?}");
        };
        assert_eq!(attempt.attempts, 2);
        assert_eq!(attempt.settlement, Some(Settlement::Confirmed));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_ends_sequence() {
        let fake = Arc::new(FakeGateway::new(ChainId::Bsc));
        for _ in 0..5 {
            fake.push_buy_result(Err("underpriced"));
        }
        let exec = executor("submitted");
        let cancel = CancellationToken::new();

        let task = {
            let fake = fake.clone();
            let exec = exec.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                exec.attempt_purchase(fake.as_ref(), token(), hundredth(), &cancel)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_secs(15)).await;
        cancel.cancel();

        let result = task.await.unwrap();
        let PurchaseResult::Cancelled(attempt) = result else {
            panic!("expected cancellation, got {result:?}");
        };
        assert_eq!(attempt.attempts, 2);
        assert_eq!(fake.buy_calls.load(Ordering::SeqCst), 2);
    }
}
