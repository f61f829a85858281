use crate::types::ChainId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("missing or invalid environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),
    #[error("{chain} connection failed: {reason}")]
    Connection { chain: ChainId, reason: String },
    #[error("{chain} abi fetch for {contract} failed after {attempts} attempts: {reason}")]
    AbiFetch {
        chain: ChainId,
        contract: String,
        attempts: u32,
        reason: String,
    },
    #[error("{chain} balance fetch for {address} failed: {reason}")]
    BalanceFetch {
        chain: ChainId,
        address: String,
        reason: String,
    },
    #[error("{chain} transaction failed: {reason}")]
    Transaction { chain: ChainId, reason: String },
    #[error("{chain} log decode failed: {reason}")]
    Decode { chain: ChainId, reason: String },
    #[error("unknown chain for token {0}")]
    UnknownChain(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    pub fn connection(chain: ChainId, reason: impl ToString) -> Self {
        Self::Connection { chain, reason: reason.to_string() }
    }

    pub fn balance(chain: ChainId, address: impl ToString, reason: impl ToString) -> Self {
        Self::BalanceFetch {
            chain,
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn transaction(chain: ChainId, reason: impl ToString) -> Self {
        Self::Transaction { chain, reason: reason.to_string() }
    }

    pub fn decode(chain: ChainId, reason: impl ToString) -> Self {
        Self::Decode { chain, reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
