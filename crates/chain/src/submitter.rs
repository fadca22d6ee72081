//! Liquidation transaction submission.
//!
//! The transaction is signed exactly once and the same raw bytes are
//! broadcast through the failover set. A backup node can therefore only
//! ever relay the identical transaction, never a second one, and the
//! broadcast chain stops at the first node that accepts it. Confirmation
//! is a separate step.

use crate::contracts::IFlashLiquidations;
use crate::failover::AllEndpointsFailed;
use crate::provider::RpcFailover;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, Bytes, Uint, B256};
use alloy::providers::{PendingTransactionBuilder, Provider};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Headroom added on top of the node's gas estimate (basis points).
const GAS_LIMIT_BUFFER_BPS: u64 = 2000;

/// Arguments of `executeLiquidation` on the flash-liquidation helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionParams {
    pub debt_token: Address,
    /// Debt to repay, in debt-token base units
    pub repay_amount: alloy::primitives::U256,
    pub collateral_token: Address,
    pub borrower: Address,
    /// Fee tier of the first swap pool
    pub fee_tier1: u32,
    /// Fee tier of the second swap pool (0 for direct swaps)
    pub fee_tier2: u32,
    /// Intermediate token of a two-hop swap (zero for direct swaps)
    pub intermediate_token: Address,
    pub uses_multi_hop: bool,
}

/// A mined liquidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// Failure to land a liquidation transaction.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// Nonce, gas or signing step failed before anything was broadcast.
    #[error("failed to prepare liquidation transaction: {0:#}")]
    Prepare(#[source] anyhow::Error),

    /// No node accepted the raw transaction.
    #[error(transparent)]
    Broadcast(#[from] AllEndpointsFailed),

    /// Mined with a failed status.
    #[error("liquidation transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },

    /// Not confirmed within the timeout, or receipt unavailable.
    #[error("liquidation transaction {tx_hash} not confirmed: {source:#}")]
    Confirmation {
        tx_hash: B256,
        #[source]
        source: anyhow::Error,
    },
}

/// Capability for submitting liquidation transactions.
#[async_trait]
pub trait LiquidationSubmitter: Send + Sync + Debug {
    /// Sign and broadcast; returns once a node has accepted the transaction.
    async fn submit(&self, params: &ExecutionParams) -> Result<B256, SubmissionError>;

    /// Wait until `tx_hash` has `confirmations` confirmations.
    async fn await_confirmation(
        &self,
        tx_hash: B256,
        confirmations: u64,
    ) -> Result<LiquidationReceipt, SubmissionError>;
}

/// Submits through the FlashLiquidations helper contract.
pub struct FlashLiquidationSubmitter {
    rpc: RpcFailover,
    wallet: EthereumWallet,
    /// Signer address
    pub address: Address,
    chain_id: u64,
    helper: Address,
    confirmation_timeout: Duration,
}

impl Debug for FlashLiquidationSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashLiquidationSubmitter")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("helper", &self.helper)
            .field("rpc", &self.rpc)
            .finish_non_exhaustive()
    }
}

impl FlashLiquidationSubmitter {
    /// Create a submitter from a hex private key (with or without 0x prefix).
    pub fn new(
        rpc: RpcFailover,
        private_key: &str,
        chain_id: u64,
        helper: Address,
        confirmation_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let key_str = private_key.trim_start_matches("0x");
        let signer: PrivateKeySigner = key_str.parse().context("invalid liquidator private key")?;
        let address = signer.address();

        info!(
            address = %address,
            chain_id,
            helper = %helper,
            "Liquidation submitter initialized"
        );

        Ok(Self {
            rpc,
            wallet: EthereumWallet::from(signer),
            address,
            chain_id,
            helper,
            confirmation_timeout,
        })
    }

    /// ABI-encode the helper call.
    pub fn encode_call(params: &ExecutionParams) -> Bytes {
        IFlashLiquidations::executeLiquidationCall {
            debtToken: params.debt_token,
            amount: params.repay_amount,
            collateralToken: params.collateral_token,
            user: params.borrower,
            poolFee1: Uint::<24, 1>::from(params.fee_tier1),
            poolFee2: Uint::<24, 1>::from(params.fee_tier2),
            pathToken: params.intermediate_token,
            usePath: params.uses_multi_hop,
        }
        .abi_encode()
        .into()
    }

    /// Build and sign the transaction; returns its hash and raw encoding.
    async fn sign(&self, params: &ExecutionParams) -> anyhow::Result<(B256, Bytes)> {
        let from = self.address;

        let nonce = self
            .rpc
            .call("eth_getTransactionCount", |ep| async move {
                Ok(ep.provider().get_transaction_count(from).pending().await?)
            })
            .await?;

        let gas_price = self
            .rpc
            .call("eth_gasPrice", |ep| async move {
                Ok(ep.provider().get_gas_price().await?)
            })
            .await?;

        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(self.helper)
            .with_input(Self::encode_call(params))
            .with_nonce(nonce)
            .with_chain_id(self.chain_id)
            .with_gas_price(gas_price);

        // Reverting liquidations fail here, before anything is signed.
        let estimate = self
            .rpc
            .call("eth_estimateGas", |ep| {
                let tx = tx.clone();
                async move { Ok(ep.provider().estimate_gas(tx).await?) }
            })
            .await?;
        let gas_limit = estimate + estimate * GAS_LIMIT_BUFFER_BPS / 10_000;

        let envelope = tx
            .with_gas_limit(gas_limit)
            .build(&self.wallet)
            .await
            .context("signing liquidation transaction")?;

        debug!(
            nonce,
            gas_price,
            gas_limit,
            "Liquidation transaction signed"
        );

        Ok((*envelope.tx_hash(), envelope.encoded_2718().into()))
    }
}

/// Node already holds this exact transaction.
fn is_already_known(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("already known")
        || message.contains("known transaction")
        || message.contains("already imported")
}

#[async_trait]
impl LiquidationSubmitter for FlashLiquidationSubmitter {
    #[instrument(skip(self, params), fields(borrower = %params.borrower))]
    async fn submit(&self, params: &ExecutionParams) -> Result<B256, SubmissionError> {
        let (tx_hash, raw) = self.sign(params).await.map_err(SubmissionError::Prepare)?;

        self.rpc
            .call("eth_sendRawTransaction", |ep| {
                let raw = raw.clone();
                async move {
                    match ep.provider().send_raw_transaction(&raw).await {
                        Ok(pending) => Ok(*pending.tx_hash()),
                        Err(e) if is_already_known(&e.to_string()) => {
                            debug!(tx_hash = %tx_hash, "Node already has transaction");
                            Ok(tx_hash)
                        }
                        Err(e) => Err(e.into()),
                    }
                }
            })
            .await?;

        info!(
            tx_hash = %tx_hash,
            debt_token = %params.debt_token,
            collateral_token = %params.collateral_token,
            "Liquidation transaction broadcast"
        );
        Ok(tx_hash)
    }

    #[instrument(skip(self))]
    async fn await_confirmation(
        &self,
        tx_hash: B256,
        confirmations: u64,
    ) -> Result<LiquidationReceipt, SubmissionError> {
        let timeout = self.confirmation_timeout;
        let receipt = self
            .rpc
            .call("awaitConfirmation", |ep| async move {
                Ok(PendingTransactionBuilder::new(ep.provider().clone(), tx_hash)
                    .with_required_confirmations(confirmations)
                    .with_timeout(Some(timeout))
                    .get_receipt()
                    .await?)
            })
            .await
            .map_err(|e| SubmissionError::Confirmation {
                tx_hash,
                source: e.into(),
            })?;

        if !receipt.status() {
            warn!(tx_hash = %tx_hash, "Liquidation transaction reverted");
            return Err(SubmissionError::Reverted { tx_hash });
        }

        Ok(LiquidationReceipt {
            tx_hash,
            block_number: receipt.block_number(),
            gas_used: receipt.gas_used(),
        })
    }
}
