mod pending;
pub mod trade;
pub mod types;

pub use trade::TradeExecutor;
pub use types::{AttemptOutcome, PurchaseResult, Settlement, TradeAttempt};
