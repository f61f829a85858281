pub mod pool;

use alloy::primitives::U256;
use anyhow::anyhow;
use async_trait::async_trait;
use snipe_core::config::{AppConfig, ChainConfig, ChainSecrets, Credentials};
use snipe_core::types::{ChainAddress, SolPubkey, TxId};
use snipe_core::utils::now_ms;
use snipe_core::{ChainId, Error, Result};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcTransactionConfig};
use solana_client::rpc_response::RpcConfirmedTransactionStatusWithSignature;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::{TransactionConfirmationStatus, UiTransactionEncoding};
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::gateway::{
    BuyOrder, ChainGateway, ChainHandle, ContractAbi, LogBatch, LogCursor, RawEvent, TxStatus,
};

const SIGNATURE_PAGE: usize = 100;
const TOKEN_PROGRAM: Pubkey = solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

pub struct SolanaGateway {
    rpc: RpcClient,
    signer: Keypair,
    wallet: SolPubkey,
    purchase_destination: SolPubkey,
    connected: AtomicBool,
}

impl SolanaGateway {
    pub fn new(rpc: RpcClient, signer: Keypair, purchase_destination: SolPubkey) -> Self {
        let wallet = SolPubkey::new(signer.pubkey().to_bytes());
        Self {
            rpc,
            signer,
            wallet,
            purchase_destination,
            connected: AtomicBool::new(false),
        }
    }

    pub fn from_config(
        chain: &ChainConfig,
        secrets: &ChainSecrets,
        creds: &Credentials,
        cfg: &AppConfig,
    ) -> Result<Self> {
        let raw = creds
            .solana_private_key
            .as_deref()
            .ok_or_else(|| Error::MissingEnv(vec!["SOLANA_PRIVATE_KEY".to_string()]))?;
        let bytes = bs58::decode(raw.trim())
            .into_vec()
            .map_err(|err| anyhow!("invalid SOLANA_PRIVATE_KEY: {err}"))?;
        let signer = Keypair::try_from(bytes.as_slice())
            .map_err(|err| anyhow!("invalid SOLANA_PRIVATE_KEY: {err}"))?;
        let destination = chain
            .purchase_destination
            .as_deref()
            .ok_or_else(|| anyhow!("chains[sol].purchase_destination is required"))?;
        let destination = SolPubkey::from_str(destination)?;
        let rpc = RpcClient::new_with_timeout_and_commitment(
            secrets.rpc_url.clone(),
            Duration::from_millis(cfg.explorer.request_timeout_ms),
            CommitmentConfig::confirmed(),
        );
        Ok(Self::new(rpc, signer, destination))
    }

    pub fn wallet(&self) -> SolPubkey {
        self.wallet
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn pubkey(&self, address: &ChainAddress) -> Result<Pubkey> {
        address
            .as_solana()
            .map(|key| Pubkey::new_from_array(key.0))
            .ok_or_else(|| Error::Anyhow(anyhow!("SOL gateway got non-solana address {address}")))
    }

    /// Create the wallet's token account for `mint` if missing, then pay the
    /// purchase destination.
    pub fn buy_transaction(&self, mint: &Pubkey, lamports: u64, blockhash: Hash) -> Transaction {
        let payer = self.signer.pubkey();
        let destination = Pubkey::new_from_array(self.purchase_destination.0);
        let instructions = [
            create_associated_token_account_idempotent(&payer, &payer, mint, &TOKEN_PROGRAM),
            system_instruction::transfer(&payer, &destination, lamports),
        ];
        Transaction::new_signed_with_payer(&instructions, Some(&payer), &[&self.signer], blockhash)
    }

    /// Every signature newer than `until`, newest first. Pages back with
    /// `before` until a short page.
    async fn signatures_since(
        &self,
        program: &Pubkey,
        until: Signature,
    ) -> Result<Vec<RpcConfirmedTransactionStatusWithSignature>> {
        let mut collected = Vec::new();
        let mut before = None;
        loop {
            let page = self
                .rpc
                .get_signatures_for_address_with_config(
                    program,
                    GetConfirmedSignaturesForAddress2Config {
                        before,
                        until: Some(until),
                        limit: Some(SIGNATURE_PAGE),
                        commitment: Some(CommitmentConfig::confirmed()),
                    },
                )
                .await
                .map_err(|err| Error::connection(ChainId::Sol, err))?;
            let full = page.len() >= SIGNATURE_PAGE;
            let oldest = match page.last() {
                Some(info) => Some(parse_signature(&info.signature)?),
                None => None,
            };
            collected.extend(page);
            match oldest {
                Some(oldest) if full => before = Some(oldest),
                _ => break,
            }
        }
        Ok(collected)
    }

    async fn pool_event(
        &self,
        program: &Pubkey,
        event_name: &str,
        signature: &str,
    ) -> Result<Option<RawEvent>> {
        let tx = self
            .rpc
            .get_transaction_with_config(
                &parse_signature(signature)?,
                RpcTransactionConfig {
                    encoding: Some(UiTransactionEncoding::Json),
                    commitment: Some(CommitmentConfig::confirmed()),
                    max_supported_transaction_version: Some(0),
                },
            )
            .await
            .map_err(|err| Error::connection(ChainId::Sol, err))?;
        let program = SolPubkey::new(program.to_bytes());
        let init = pool::pool_init_from(&tx, &program, event_name, signature)
            .map_err(|err| Error::decode(ChainId::Sol, err))?;
        if init.is_none() {
            debug!(%signature, "no pool init in transaction");
        }
        Ok(init.map(RawEvent::Solana))
    }
}

fn parse_signature(raw: &str) -> Result<Signature> {
    Signature::from_str(raw)
        .map_err(|err| Error::decode(ChainId::Sol, format!("bad signature {raw}: {err}")))
}

#[async_trait]
impl ChainGateway for SolanaGateway {
    fn chain(&self) -> ChainId {
        ChainId::Sol
    }

    async fn connect(&self) -> Result<ChainHandle> {
        match self.rpc.get_slot().await {
            Ok(slot) => {
                self.connected.store(true, Ordering::SeqCst);
                info!(chain = %ChainId::Sol, slot, wallet = %self.wallet, "connected");
                Ok(ChainHandle {
                    chain: ChainId::Sol,
                    rpc_url: self.rpc.url(),
                    has_explorer_key: false,
                    connected: true,
                    checked_at_ms: now_ms(),
                })
            }
            Err(err) => {
                self.connected.store(false, Ordering::SeqCst);
                error!(chain = %ChainId::Sol, %err, "connection failed");
                Err(Error::connection(ChainId::Sol, err))
            }
        }
    }

    async fn fetch_abi(&self, contract: &ChainAddress) -> Result<ContractAbi> {
        self.pubkey(contract)?;
        Ok(ContractAbi::Native)
    }

    async fn read_new_logs(
        &self,
        contract: &ChainAddress,
        _abi: &ContractAbi,
        event_name: &str,
        cursor: &LogCursor,
    ) -> Result<LogBatch> {
        let program = self.pubkey(contract)?;
        let until = match cursor {
            LogCursor::Start => {
                let newest = self
                    .rpc
                    .get_signatures_for_address_with_config(
                        &program,
                        GetConfirmedSignaturesForAddress2Config {
                            limit: Some(1),
                            commitment: Some(CommitmentConfig::confirmed()),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|err| Error::connection(ChainId::Sol, err))?;
                return Ok(match newest.first() {
                    Some(info) => LogBatch::empty(LogCursor::Signature(info.signature.clone())),
                    None => LogBatch::empty(LogCursor::Start),
                });
            }
            LogCursor::Signature(signature) => parse_signature(signature)?,
            LogCursor::Block(_) => {
                return Err(Error::decode(ChainId::Sol, "block cursor on solana"))
            }
        };

        let signatures = self.signatures_since(&program, until).await?;
        let Some(newest) = signatures.first() else {
            return Ok(LogBatch::empty(cursor.clone()));
        };
        let next = LogCursor::Signature(newest.signature.clone());

        let mut events = Vec::new();
        for info in signatures.iter().rev() {
            if info.err.is_some() {
                continue;
            }
            if let Some(event) = self.pool_event(&program, event_name, &info.signature).await? {
                events.push(event);
            }
        }
        Ok(LogBatch { events, next })
    }

    async fn get_balance(&self, address: &ChainAddress) -> Result<U256> {
        let key = self.pubkey(address)?;
        let lamports = self
            .rpc
            .get_balance(&key)
            .await
            .map_err(|err| Error::balance(ChainId::Sol, key, err))?;
        Ok(U256::from(lamports))
    }

    async fn token_liquidity(&self, token: &ChainAddress, _abi: &ContractAbi) -> Result<U256> {
        let mint = self.pubkey(token)?;
        let account = get_associated_token_address(&mint, &mint);
        let amount = self
            .rpc
            .get_token_account_balance(&account)
            .await
            .map_err(|err| Error::balance(ChainId::Sol, mint, err))?;
        U256::from_str(&amount.amount)
            .map_err(|err| Error::balance(ChainId::Sol, mint, format!("bad amount: {err}")))
    }

    async fn submit_buy(&self, order: &BuyOrder) -> Result<TxId> {
        let mint = self.pubkey(&order.token)?;
        let lamports = u64::try_from(order.amount)
            .map_err(|_| Error::transaction(ChainId::Sol, "amount exceeds u64 lamports"))?;
        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|err| Error::transaction(ChainId::Sol, format!("blockhash: {err}")))?;
        let tx = self.buy_transaction(&mint, lamports, blockhash);

        let signature = self
            .rpc
            .send_transaction_with_config(
                &tx,
                RpcSendTransactionConfig {
                    skip_preflight: true,
                    encoding: Some(UiTransactionEncoding::Base64),
                    ..Default::default()
                },
            )
            .await
            .map_err(|err| Error::transaction(ChainId::Sol, err))?;
        info!(chain = %ChainId::Sol, %signature, lamports, "tx broadcast");
        Ok(TxId(signature.to_string()))
    }

    async fn transaction_status(&self, tx: &TxId) -> Result<TxStatus> {
        let signature = Signature::from_str(&tx.0)
            .map_err(|err| Error::transaction(ChainId::Sol, format!("bad signature {tx}: {err}")))?;
        let statuses = self
            .rpc
            .get_signature_statuses_with_history(&[signature])
            .await
            .map_err(|err| Error::connection(ChainId::Sol, err))?;
        Ok(match statuses.value.into_iter().next().flatten() {
            None => TxStatus::Pending,
            Some(status) if status.err.is_some() => TxStatus::Reverted,
            Some(status) => match status.confirmation_status {
                Some(TransactionConfirmationStatus::Confirmed)
                | Some(TransactionConfirmationStatus::Finalized) => TxStatus::Confirmed,
                _ => TxStatus::Pending,
            },
        })
    }
}
