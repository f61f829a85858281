use alloy::primitives::U256;
use snipe_core::types::{ChainAddress, TxId};
use snipe_core::ChainId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Pending,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
}

/// How far a successful buy is known to have progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Broadcast accepted; inclusion not observed.
    Submitted,
    /// Included with a success status.
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeAttempt {
    pub token: ChainAddress,
    pub chain: ChainId,
    pub amount: U256,
    pub attempts: u32,
    pub outcome: AttemptOutcome,
    pub settlement: Option<Settlement>,
    pub tx: Option<TxId>,
    pub last_error: Option<String>,
}

impl TradeAttempt {
    pub fn new(token: ChainAddress, chain: ChainId, amount: U256) -> Self {
        Self {
            token,
            chain,
            amount,
            attempts: 0,
            outcome: AttemptOutcome::Pending,
            settlement: None,
            tx: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseResult {
    Succeeded(TradeAttempt),
    ExhaustedRetries(TradeAttempt),
    /// An attempt for the same token is already pending.
    Rejected,
    Cancelled(TradeAttempt),
}

impl PurchaseResult {
    pub fn attempt(&self) -> Option<&TradeAttempt> {
        match self {
            PurchaseResult::Succeeded(attempt)
            | PurchaseResult::ExhaustedRetries(attempt)
            | PurchaseResult::Cancelled(attempt) => Some(attempt),
            PurchaseResult::Rejected => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PurchaseResult::Succeeded(_) => "succeeded",
            PurchaseResult::ExhaustedRetries(_) => "exhausted",
            PurchaseResult::Rejected => "rejected",
            PurchaseResult::Cancelled(_) => "cancelled",
        }
    }
}
