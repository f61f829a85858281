pub mod classifier;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod metrics;
pub mod modes;
pub mod types;
pub mod utils;

pub use classifier::{classify, KnownTokens};
pub use config::{AppConfig, Credentials};
pub use error::{Error, Result};
pub use types::{CandidateToken, ChainAddress, ChainId, PairCreatedEvent, SolPubkey};
