use alloy::rpc::types::TransactionRequest;
use snipe_core::config::ExecutorConfig;
use snipe_core::modes::GasMode;
use snipe_core::Result;

#[derive(Debug, Clone)]
pub struct FeeStrategy {
    pub gas_mode: GasMode,
    pub max_fee_gwei: u64,
    pub max_priority_gwei: u64,
}

impl FeeStrategy {
    pub fn from_config(cfg: &ExecutorConfig) -> Result<Self> {
        Ok(Self {
            gas_mode: GasMode::parse(&cfg.gas_mode)?,
            max_fee_gwei: cfg.max_fee_gwei,
            max_priority_gwei: cfg.max_priority_gwei,
        })
    }

    /// Pins fees when configured. A zero cap leaves pricing to the provider's
    /// gas filler.
    pub fn apply(&self, tx: &mut TransactionRequest) {
        if self.max_fee_gwei == 0 {
            return;
        }
        match self.gas_mode {
            GasMode::Eip1559 => {
                tx.max_fee_per_gas = Some(gwei_to_wei(self.max_fee_gwei));
                tx.max_priority_fee_per_gas =
                    Some(gwei_to_wei(self.max_priority_gwei.min(self.max_fee_gwei)));
            }
            GasMode::Legacy => {
                tx.gas_price = Some(gwei_to_wei(self.max_fee_gwei));
            }
        }
    }
}

fn gwei_to_wei(gwei: u64) -> u128 {
    (gwei as u128) * 1_000_000_000u128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_cap_leaves_fees_unset() {
        let strategy = FeeStrategy {
            gas_mode: GasMode::Eip1559,
            max_fee_gwei: 0,
            max_priority_gwei: 2,
        };
        let mut tx = TransactionRequest::default();
        strategy.apply(&mut tx);
        assert!(tx.max_fee_per_gas.is_none());
        assert!(tx.gas_price.is_none());
    }

    #[test]
    fn legacy_sets_gas_price() {
        let strategy = FeeStrategy {
            gas_mode: GasMode::Legacy,
            max_fee_gwei: 5,
            max_priority_gwei: 0,
        };
        let mut tx = TransactionRequest::default();
        strategy.apply(&mut tx);
        assert_eq!(tx.gas_price, Some(5_000_000_000));
        assert!(tx.max_fee_per_gas.is_none());
    }

    #[test]
    fn priority_fee_capped_by_max_fee() {
        let strategy = FeeStrategy {
            gas_mode: GasMode::Eip1559,
            max_fee_gwei: 3,
            max_priority_gwei: 10,
        };
        let mut tx = TransactionRequest::default();
        strategy.apply(&mut tx);
        assert_eq!(tx.max_fee_per_gas, Some(3_000_000_000));
        assert_eq!(tx.max_priority_fee_per_gas, Some(3_000_000_000));
    }
}
