use alloy::primitives::{Address, U256};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    Eth,
    Bsc,
    Sol,
}

impl ChainId {
    /// Classification priority order.
    pub const ALL: [ChainId; 3] = [ChainId::Eth, ChainId::Bsc, ChainId::Sol];

    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "eth" | "ethereum" => Ok(Self::Eth),
            "bsc" | "bnb" | "binance" => Ok(Self::Bsc),
            "sol" | "solana" => Ok(Self::Sol),
            _ => Err(anyhow!("unsupported chain: {raw}").into()),
        }
    }

    pub fn is_evm(self) -> bool {
        !matches!(self, ChainId::Sol)
    }

    /// Decimals of the chain's native denomination.
    pub fn native_decimals(self) -> u8 {
        match self {
            ChainId::Eth | ChainId::Bsc => 18,
            ChainId::Sol => 9,
        }
    }

    /// One whole native unit expressed in base units (1e18 wei, 1e9 lamports).
    pub fn one_native_unit(self) -> U256 {
        U256::from(10u64).pow(U256::from(self.native_decimals()))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChainId::Eth => "ETH",
            ChainId::Bsc => "BSC",
            ChainId::Sol => "SOL",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SolPubkey(pub [u8; 32]);

impl SolPubkey {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for SolPubkey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let raw = bs58::decode(s.trim())
            .into_vec()
            .map_err(|e| anyhow!("invalid base58 pubkey {s}: {e}"))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|v: Vec<u8>| anyhow!("invalid pubkey length {} for {s}", v.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for SolPubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for SolPubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SolPubkey({self})")
    }
}

/// A token, pair or contract address on one of the supported chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainAddress {
    Evm(Address),
    Solana(SolPubkey),
}

impl ChainAddress {
    pub fn parse(chain: ChainId, raw: &str) -> Result<Self> {
        if chain.is_evm() {
            Ok(Self::Evm(crate::utils::parse_address(raw)?))
        } else {
            Ok(Self::Solana(SolPubkey::from_str(raw)?))
        }
    }

    pub fn as_evm(&self) -> Option<Address> {
        match self {
            ChainAddress::Evm(address) => Some(*address),
            ChainAddress::Solana(_) => None,
        }
    }

    pub fn as_solana(&self) -> Option<SolPubkey> {
        match self {
            ChainAddress::Solana(pubkey) => Some(*pubkey),
            ChainAddress::Evm(_) => None,
        }
    }
}

impl fmt::Display for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainAddress::Evm(address) => write!(f, "{address}"),
            ChainAddress::Solana(pubkey) => write!(f, "{pubkey}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    Number(u64),
    Slot(u64),
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Number(number) => write!(f, "block {number}"),
            BlockRef::Slot(slot) => write!(f, "slot {slot}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairCreatedEvent {
    pub chain: ChainId,
    pub block: BlockRef,
    pub token0: ChainAddress,
    pub token1: ChainAddress,
    pub pair: ChainAddress,
    pub discovered_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateToken {
    pub token: ChainAddress,
    pub chain: ChainId,
    pub event: PairCreatedEvent,
}

/// Broadcast identifier: a 0x-prefixed hash on EVM chains, a base58 signature on Solana.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxId(pub String);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
