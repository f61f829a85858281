use anyhow::{anyhow, Result};
use snipe_core::types::SolPubkey;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, EncodedTransaction, UiMessage,
};
use std::str::FromStr;

use crate::gateway::SolanaPoolInit;

/// Raydium `initialize2` touches 21 accounts; mints sit at 8 and 9.
const MIN_POOL_INIT_ACCOUNTS: usize = 10;

/// Finds the first top-level `program` instruction of a successful transaction
/// whose logs mention `event_name`.
pub fn pool_init_from(
    tx: &EncodedConfirmedTransactionWithStatusMeta,
    program: &SolPubkey,
    event_name: &str,
    signature: &str,
) -> Result<Option<SolanaPoolInit>> {
    let Some(meta) = tx.transaction.meta.as_ref() else {
        return Ok(None);
    };
    if meta.err.is_some() {
        return Ok(None);
    }
    let mentioned = match &meta.log_messages {
        OptionSerializer::Some(logs) => logs.iter().any(|line| line.contains(event_name)),
        _ => false,
    };
    if !mentioned {
        return Ok(None);
    }
    let EncodedTransaction::Json(ui) = &tx.transaction.transaction else {
        return Ok(None);
    };
    let UiMessage::Raw(message) = &ui.message else {
        return Ok(None);
    };

    // static keys first, then lookup-table keys, matching instruction indices
    let mut keys = message.account_keys.clone();
    if let OptionSerializer::Some(loaded) = &meta.loaded_addresses {
        keys.extend(loaded.writable.iter().cloned());
        keys.extend(loaded.readonly.iter().cloned());
    }

    let program = program.to_string();
    for ix in &message.instructions {
        if keys.get(usize::from(ix.program_id_index)) != Some(&program) {
            continue;
        }
        if ix.accounts.len() < MIN_POOL_INIT_ACCOUNTS {
            continue;
        }
        let accounts = ix
            .accounts
            .iter()
            .map(|idx| {
                keys.get(usize::from(*idx))
                    .ok_or_else(|| anyhow!("account index {idx} out of range"))
                    .and_then(|key| SolPubkey::from_str(key))
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(Some(SolanaPoolInit {
            signature: signature.to_string(),
            slot: tx.slot,
            accounts,
        }));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const RAYDIUM: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

    fn program() -> SolPubkey {
        SolPubkey::from_str(RAYDIUM).unwrap()
    }

    fn tx(static_keys: Vec<String>, meta: Value) -> EncodedConfirmedTransactionWithStatusMeta {
        serde_json::from_value(json!({
            "slot": 42,
            "blockTime": null,
            "transaction": {
                "signatures": ["sig"],
                "message": {
                    "header": {
                        "numRequiredSignatures": 1,
                        "numReadonlySignedAccounts": 0,
                        "numReadonlyUnsignedAccounts": 1
                    },
                    "accountKeys": static_keys,
                    "recentBlockhash": "11111111111111111111111111111111",
                    "instructions": [{
                        "programIdIndex": 0,
                        "accounts": (1..=10).collect::<Vec<u8>>(),
                        "data": ""
                    }]
                }
            },
            "meta": meta
        }))
        .unwrap()
    }

    fn meta(err: Value, loaded: Value) -> Value {
        json!({
            "err": err,
            "status": if err.is_null() { json!({ "Ok": null }) } else { json!({ "Err": err }) },
            "fee": 5000,
            "preBalances": [],
            "postBalances": [],
            "logMessages": ["Program log: initialize2: InitializeInstruction2 { nonce: 254 }"],
            "loadedAddresses": loaded
        })
    }

    fn key(b: u8) -> String {
        SolPubkey::new([b; 32]).to_string()
    }

    #[test]
    fn lookup_table_keys_extend_static_keys() {
        let static_keys = std::iter::once(RAYDIUM.to_string())
            .chain((1u8..=6).map(key))
            .collect();
        let loaded = json!({
            "writable": [key(7), key(8)],
            "readonly": [key(9), key(10)]
        });
        let tx = tx(static_keys, meta(Value::Null, loaded));

        let init = pool_init_from(&tx, &program(), "initialize2", "sig")
            .unwrap()
            .unwrap();

        assert_eq!(init.slot, 42);
        assert_eq!(init.accounts.len(), 10);
        assert_eq!(init.accounts[7], SolPubkey::new([8u8; 32]));
        assert_eq!(init.accounts[9], SolPubkey::new([10u8; 32]));
    }

    #[test]
    fn failed_or_unrelated_transactions_are_ignored() {
        let static_keys: Vec<String> = std::iter::once(RAYDIUM.to_string())
            .chain((1u8..=10).map(key))
            .collect();
        let empty = json!({ "writable": [], "readonly": [] });
        let failed = tx(
            static_keys.clone(),
            meta(json!({ "InstructionError": [0, { "Custom": 1 }] }), empty.clone()),
        );
        let ok = tx(static_keys, meta(Value::Null, empty));

        assert!(pool_init_from(&failed, &program(), "initialize2", "sig")
            .unwrap()
            .is_none());
        assert!(pool_init_from(&ok, &program(), "deposit", "sig")
            .unwrap()
            .is_none());
        assert!(pool_init_from(&ok, &SolPubkey::new([1u8; 32]), "initialize2", "sig")
            .unwrap()
            .is_none());
    }
}
