use snipe_chain::ChainGateway;
use snipe_core::config::GateConfig;
use snipe_core::types::ChainAddress;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::types::GateVerdict;

/// Passes a token whose self-held balance is strictly above one native unit.
#[derive(Clone)]
pub struct LiquidityGate {
    call_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl LiquidityGate {
    pub fn new(cfg: &GateConfig) -> Self {
        Self {
            call_timeout: Duration::from_millis(cfg.call_timeout_ms),
            permits: Arc::new(Semaphore::new(cfg.max_concurrent_checks.max(1))),
        }
    }

    pub async fn evaluate(&self, gateway: &dyn ChainGateway, token: &ChainAddress) -> GateVerdict {
        let chain = gateway.chain();
        let threshold = chain.one_native_unit();
        let Ok(_permit) = self.permits.acquire().await else {
            return GateVerdict::fail(threshold, "gate closed");
        };

        let abi = match self
            .with_timeout("token abi", gateway.fetch_abi(token))
            .await
        {
            Ok(abi) => abi,
            Err(reason) => {
                warn!(%chain, %token, %reason, "liquidity gate failed");
                return GateVerdict::fail(threshold, reason);
            }
        };
        let liquidity = match self
            .with_timeout("token liquidity", gateway.token_liquidity(token, &abi))
            .await
        {
            Ok(liquidity) => liquidity,
            Err(reason) => {
                warn!(%chain, %token, %reason, "liquidity gate failed");
                return GateVerdict::fail(threshold, reason);
            }
        };

        if liquidity > threshold {
            info!(%chain, %token, %liquidity, "promising token found");
            GateVerdict::pass(liquidity, threshold)
        } else {
            debug!(%chain, %token, %liquidity, %threshold, "token below liquidity threshold");
            GateVerdict::below(liquidity, threshold)
        }
    }

    pub async fn passes(&self, gateway: &dyn ChainGateway, token: &ChainAddress) -> bool {
        self.evaluate(gateway, token).await.pass
    }

    async fn with_timeout<T, Fut, E>(&self, label: &str, fut: Fut) -> Result<T, String>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        match timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(format!("{label} failed: {err}")),
            Err(_) => Err(format!(
                "{label} timed out after {}ms",
                self.call_timeout.as_millis()
            )),
        }
    }
}
