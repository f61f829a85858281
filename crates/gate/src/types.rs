use alloy::primitives::U256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateVerdict {
    pub pass: bool,
    pub liquidity: Option<U256>,
    pub threshold: U256,
    pub reason: Option<String>,
}

impl GateVerdict {
    pub fn pass(liquidity: U256, threshold: U256) -> Self {
        Self {
            pass: true,
            liquidity: Some(liquidity),
            threshold,
            reason: None,
        }
    }

    pub fn below(liquidity: U256, threshold: U256) -> Self {
        Self {
            pass: false,
            liquidity: Some(liquidity),
            threshold,
            reason: Some(format!("liquidity {liquidity} <= threshold {threshold}")),
        }
    }

    pub fn fail(threshold: U256, reason: impl Into<String>) -> Self {
        Self {
            pass: false,
            liquidity: None,
            threshold,
            reason: Some(reason.into()),
        }
    }

    /// Metric label: `pass`, `below` or `error`.
    pub fn label(&self) -> &'static str {
        match (self.pass, self.liquidity) {
            (true, _) => "pass",
            (false, Some(_)) => "below",
            (false, None) => "error",
        }
    }
}
