use crate::abi::IUniswapV2Factory;
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use snipe_chain::{RawEvent, SolanaPoolInit};
use snipe_core::types::{BlockRef, ChainAddress};
use snipe_core::{ChainId, Error, PairCreatedEvent, Result};

/// Raydium `initialize2` account positions.
const POOL_INDEX: usize = 4;
const COIN_MINT_INDEX: usize = 8;
const PC_MINT_INDEX: usize = 9;

pub fn decode_raw_event(
    chain: ChainId,
    raw: &RawEvent,
    discovered_at_ms: u64,
) -> Result<PairCreatedEvent> {
    match raw {
        RawEvent::Evm(log) => decode_pair_created(chain, log, discovered_at_ms),
        RawEvent::Solana(init) => decode_pool_init(chain, init, discovered_at_ms),
    }
}

fn decode_pair_created(chain: ChainId, log: &Log, discovered_at_ms: u64) -> Result<PairCreatedEvent> {
    let event = IUniswapV2Factory::PairCreated::decode_log_data(&log.inner.data)
        .map_err(|err| Error::decode(chain, format!("PairCreated: {err}")))?;
    let block = log
        .block_number
        .ok_or_else(|| Error::decode(chain, "log without block number"))?;
    Ok(PairCreatedEvent {
        chain,
        block: BlockRef::Number(block),
        token0: ChainAddress::Evm(event.token0),
        token1: ChainAddress::Evm(event.token1),
        pair: ChainAddress::Evm(event.pair),
        discovered_at_ms,
    })
}

fn decode_pool_init(
    chain: ChainId,
    init: &SolanaPoolInit,
    discovered_at_ms: u64,
) -> Result<PairCreatedEvent> {
    let account = |index: usize| {
        init.accounts.get(index).copied().ok_or_else(|| {
            Error::decode(
                chain,
                format!(
                    "pool init {} has {} accounts, need index {index}",
                    init.signature,
                    init.accounts.len()
                ),
            )
        })
    };
    Ok(PairCreatedEvent {
        chain,
        block: BlockRef::Slot(init.slot),
        token0: ChainAddress::Solana(account(COIN_MINT_INDEX)?),
        token1: ChainAddress::Solana(account(PC_MINT_INDEX)?),
        pair: ChainAddress::Solana(account(POOL_INDEX)?),
        discovered_at_ms,
    })
}

/// Builds the log a V2 factory emits for a new pair.
#[cfg(any(test, feature = "testing"))]
pub fn pair_created_log(
    factory: alloy::primitives::Address,
    token0: alloy::primitives::Address,
    token1: alloy::primitives::Address,
    pair: alloy::primitives::Address,
    block: u64,
) -> Log {
    let event = IUniswapV2Factory::PairCreated {
        token0,
        token1,
        pair,
        allPairsLength: alloy::primitives::U256::from(1u64),
    };
    Log {
        inner: alloy::primitives::Log {
            address: factory,
            data: event.encode_log_data(),
        },
        block_number: Some(block),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, LogData, B256};
    use snipe_core::SolPubkey;

    const FACTORY: alloy::primitives::Address =
        address!("0xcA143Ce32Fe78f1f7019d7d551a6402fC5350c73");

    #[test]
    fn decodes_pair_created_log() {
        let log = pair_created_log(
            FACTORY,
            address!("0x0000000000000000000000000000000000000aaa"),
            address!("0x0000000000000000000000000000000000000bbb"),
            address!("0x0000000000000000000000000000000000000ccc"),
            42,
        );

        let event = decode_raw_event(ChainId::Bsc, &RawEvent::Evm(log), 7).unwrap();

        assert_eq!(event.chain, ChainId::Bsc);
        assert_eq!(event.block, BlockRef::Number(42));
        assert_eq!(
            event.token0,
            ChainAddress::Evm(address!("0x0000000000000000000000000000000000000aaa"))
        );
        assert_eq!(
            event.pair,
            ChainAddress::Evm(address!("0x0000000000000000000000000000000000000ccc"))
        );
        assert_eq!(event.discovered_at_ms, 7);
    }

    #[test]
    fn rejects_log_with_wrong_topics() {
        let mut log = pair_created_log(
            FACTORY,
            address!("0x0000000000000000000000000000000000000aaa"),
            address!("0x0000000000000000000000000000000000000bbb"),
            address!("0x0000000000000000000000000000000000000ccc"),
            42,
        );
        log.inner.data = LogData::new_unchecked(vec![B256::ZERO], Default::default());

        let err = decode_raw_event(ChainId::Eth, &RawEvent::Evm(log), 0).unwrap_err();
        assert!(matches!(err, Error::Decode { chain: ChainId::Eth, .. }));
    }

    #[test]
    fn decodes_pool_init_accounts() {
        let accounts: Vec<SolPubkey> = (0u8..21).map(|b| SolPubkey::new([b; 32])).collect();
        let init = SolanaPoolInit {
            signature: "sig".to_string(),
            slot: 99,
            accounts,
        };

        let event = decode_raw_event(ChainId::Sol, &RawEvent::Solana(init), 0).unwrap();

        assert_eq!(event.block, BlockRef::Slot(99));
        assert_eq!(event.pair, ChainAddress::Solana(SolPubkey::new([4u8; 32])));
        assert_eq!(event.token0, ChainAddress::Solana(SolPubkey::new([8u8; 32])));
        assert_eq!(event.token1, ChainAddress::Solana(SolPubkey::new([9u8; 32])));
    }

    #[test]
    fn short_pool_init_is_a_decode_error() {
        let init = SolanaPoolInit {
            signature: "sig".to_string(),
            slot: 1,
            accounts: vec![SolPubkey::new([1u8; 32]); 5],
        };
        assert!(decode_raw_event(ChainId::Sol, &RawEvent::Solana(init), 0).is_err());
    }
}
