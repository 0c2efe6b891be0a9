//! Review and submission of a send-funds transaction.
//!
//! A reviewed draft becomes either a regular Safe transaction (executed
//! directly when the connected owner alone meets the threshold, proposed to
//! the transaction service otherwise) or a delegated transfer through the
//! allowance module.

use crate::contracts::{self, AllowanceTransfer, SafeTransactionData};
use crate::gas::{check_if_tx_is_execution, GasEstimationInfo, GasEstimationInput};
use crate::safe_ledger::{EthersLedger, SafeLedger};
use crate::transactions::{ProposeTransactionBody, TxServiceClient};
use crate::types::{SpendingLimit, TokenBalance};
use crate::utils::{checksum, format_amount, from_token_unit, to_token_unit};
use crate::wallet::Wallet;
use anyhow::{anyhow, Context, Result};
use ethers::types::{Address, Bytes, TxHash, H256, U256};

pub const SPENDING_LIMIT_TAG: &str = "spendingLimit";

/// Origin reported to the transaction service for proposals
const PROPOSAL_ORIGIN: &str = "Strongbox";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxType {
    #[default]
    Standard,
    SpendingLimit,
}

impl TxType {
    /// Tags are compared case-insensitively; anything unknown is Standard
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some(t) if t.trim().eq_ignore_ascii_case(SPENDING_LIMIT_TAG) => Self::SpendingLimit,
            _ => Self::Standard,
        }
    }
}

/// A send-funds draft as confirmed on the review screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewTx {
    pub recipient_address: Address,
    /// Decimal amount in token units
    pub amount: String,
    /// `None` for the native coin
    pub token_address: Option<Address>,
    pub tx_type: TxType,
    pub token_spending_limit: Option<SpendingLimit>,
}

/// The call the Safe will make
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Native coin: send `amount` straight to the recipient with empty data.
/// Token: call the token contract with `transfer(recipient, amount)` and no value.
pub fn prepare_transaction(review: &ReviewTx, token: &TokenBalance) -> Result<PreparedTransaction> {
    let amount = to_token_unit(&review.amount, token.decimals)?;

    match token.address {
        None => Ok(PreparedTransaction {
            to: review.recipient_address,
            value: amount,
            data: Bytes::new(),
        }),
        Some(token_address) => Ok(PreparedTransaction {
            to: token_address,
            value: U256::zero(),
            data: contracts::encode_erc20_transfer(review.recipient_address, amount)?,
        }),
    }
}

/// Find the draft's token among the Safe's balances
pub fn resolve_token<'a>(review: &ReviewTx, tokens: &'a [TokenBalance]) -> Option<&'a TokenBalance> {
    tokens.iter().find(|t| t.address == review.token_address)
}

/// Review screen state. The payload is computed after the screen opens;
/// until then nothing can be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewState {
    pub review: ReviewTx,
    pub token: Option<TokenBalance>,
    pub prepared: Option<PreparedTransaction>,
    pub gas_info: Option<GasEstimationInfo>,
    pub formatted_total_gas: Option<String>,
}

impl ReviewState {
    pub fn new(review: ReviewTx, tokens: &[TokenBalance]) -> Self {
        let token = resolve_token(&review, tokens).cloned();
        Self {
            review,
            token,
            prepared: None,
            gas_info: None,
            formatted_total_gas: None,
        }
    }

    /// Compute the payload. Without a resolved token there is nothing to do.
    pub fn prepare(&mut self) -> Result<()> {
        if let Some(token) = &self.token {
            self.prepared = Some(prepare_transaction(&self.review, token)?);
        }
        Ok(())
    }

    pub fn can_submit(&self) -> bool {
        self.token.is_some() && self.prepared.is_some()
    }

    pub fn is_spending_limit(&self) -> bool {
        self.review.tx_type == TxType::SpendingLimit && self.review.token_spending_limit.is_some()
    }

    pub fn set_gas_info(&mut self, info: GasEstimationInfo, native_decimals: u32) {
        self.formatted_total_gas = Some(format_amount(&from_token_unit(info.total, native_decimals)));
        self.gas_info = Some(info);
    }

    /// Estimation input for the Safe transfer, once the payload is known
    pub fn gas_estimation_input(
        &self,
        safe: Address,
        from: Address,
        native_decimals: u32,
    ) -> Option<GasEstimationInput> {
        let prepared = self.prepared.as_ref()?;
        Some(GasEstimationInput {
            safe,
            to: prepared.to,
            value: prepared.value,
            data: Some(prepared.data.clone()),
            from,
            pre_approving_owner: None,
            tx_confirmations: None,
            native_decimals,
        })
    }
}

/// A regular Safe transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTransaction {
    pub safe: Address,
    pub to: Address,
    pub value_in_wei: U256,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Standard(CreateTransaction),
    SpendingLimit(AllowanceTransfer),
}

/// Decide how the reviewed draft is submitted
pub fn choose_submission(
    review: &ReviewTx,
    token: &TokenBalance,
    prepared: &PreparedTransaction,
    safe: Address,
) -> Result<Submission> {
    if review.tx_type == TxType::SpendingLimit {
        if let Some(limit) = &review.token_spending_limit {
            return Ok(Submission::SpendingLimit(AllowanceTransfer {
                safe,
                token: token.address.unwrap_or_else(Address::zero),
                to: review.recipient_address,
                amount: to_token_unit(&review.amount, token.decimals)?,
                payment_token: Address::zero(),
                payment: U256::zero(),
                delegate: limit.delegate,
                signature: Bytes::new(),
            }));
        }
    }

    Ok(Submission::Standard(CreateTransaction {
        safe,
        to: prepared.to,
        // token transfers carry their amount in the data, not as value
        value_in_wei: if token.is_native() {
            to_token_unit(&review.amount, token.decimals)?
        } else {
            U256::zero()
        },
        data: prepared.data.clone(),
    }))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionReceipt {
    /// Executed on chain by the connected owner
    Executed { safe_tx_hash: H256, tx_hash: TxHash },
    /// Signed and handed to the transaction service for other owners
    Proposed { safe_tx_hash: H256 },
}

/// Performs the two kinds of submission
#[allow(async_fn_in_trait)]
pub trait TransactionSubmitter {
    async fn create_transaction(&self, tx: &CreateTransaction) -> Result<SubmissionReceipt>;

    /// Resolves as soon as the transaction hash is known
    async fn execute_allowance_transfer(&self, transfer: &AllowanceTransfer) -> Result<TxHash>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Payload not computed yet
    NotReady,
    Submitted(SubmissionReceipt),
    AllowanceSent(TxHash),
    /// Regular submission failed; reported, dialog closes
    Failed(String),
    /// Delegated transfer failed; dialog stays open
    KeepOpen(String),
}

impl SubmitOutcome {
    pub fn should_close(&self) -> bool {
        matches!(
            self,
            Self::Submitted(_) | Self::AllowanceSent(_) | Self::Failed(_)
        )
    }
}

pub async fn submit_transaction<T: TransactionSubmitter>(
    submitter: &T,
    state: &ReviewState,
    safe: Address,
) -> SubmitOutcome {
    let (Some(token), Some(prepared)) = (state.token.as_ref(), state.prepared.as_ref()) else {
        return SubmitOutcome::NotReady;
    };

    let submission = match choose_submission(&state.review, token, prepared, safe) {
        Ok(submission) => submission,
        Err(e) => {
            tracing::error!("Could not build the transaction: {:#}", e);
            return SubmitOutcome::KeepOpen(e.to_string());
        }
    };

    match submission {
        Submission::SpendingLimit(transfer) => {
            match submitter.execute_allowance_transfer(&transfer).await {
                Ok(hash) => SubmitOutcome::AllowanceSent(hash),
                Err(e) => {
                    tracing::error!("Spending limit transfer failed: {:#}", e);
                    SubmitOutcome::KeepOpen(e.to_string())
                }
            }
        }
        Submission::Standard(create) => match submitter.create_transaction(&create).await {
            Ok(receipt) => SubmitOutcome::Submitted(receipt),
            Err(e) => {
                tracing::error!("Transaction submission failed: {:#}", e);
                SubmitOutcome::Failed(e.to_string())
            }
        },
    }
}

/// Submits through the node and the transaction service, signing with `wallet`
#[derive(Clone, Debug)]
pub struct EthersSubmitter {
    ledger: EthersLedger,
    wallet: Wallet,
    chain_id: u64,
    tx_service: Option<TxServiceClient>,
    allowance_module: Option<Address>,
}

impl EthersSubmitter {
    pub fn new(
        ledger: EthersLedger,
        wallet: Wallet,
        chain_id: u64,
        tx_service: Option<TxServiceClient>,
        allowance_module: Option<Address>,
    ) -> Self {
        Self {
            ledger,
            wallet,
            chain_id,
            tx_service,
            allowance_module,
        }
    }
}

impl TransactionSubmitter for EthersSubmitter {
    async fn create_transaction(&self, tx: &CreateTransaction) -> Result<SubmissionReceipt> {
        let owner = self.wallet.address(self.chain_id).await?;
        let owners = self.ledger.owners(tx.safe).await?;
        if !owners.contains(&owner) {
            return Err(anyhow!(
                "{} is not an owner of Safe {}",
                checksum(&owner),
                checksum(&tx.safe)
            ));
        }

        let threshold = self.ledger.threshold(tx.safe).await?;
        let nonce = self.ledger.nonce(tx.safe).await?;
        let safe_tx = SafeTransactionData::call(tx.to, tx.value_in_wei, tx.data.clone(), nonce);
        let safe_tx_hash = self.ledger.transaction_hash(tx.safe, &safe_tx).await?;

        if check_if_tx_is_execution(threshold, None, None) {
            let calldata =
                contracts::encode_exec_transaction(&safe_tx, &contracts::prevalidated_signature(owner))?;
            let tx_hash = self
                .wallet
                .send_transaction(self.ledger.provider(), self.chain_id, tx.safe, U256::zero(), calldata)
                .await
                .context("Executing Safe transaction failed")?;
            return Ok(SubmissionReceipt::Executed {
                safe_tx_hash,
                tx_hash,
            });
        }

        let service = self
            .tx_service
            .as_ref()
            .ok_or_else(|| anyhow!("No transaction service configured; cannot propose"))?;
        let signature = self
            .wallet
            .sign_message(safe_tx_hash.as_bytes(), self.chain_id)
            .await?;

        let body = ProposeTransactionBody {
            to: checksum(&safe_tx.to),
            value: safe_tx.value.to_string(),
            data: if safe_tx.data.is_empty() {
                None
            } else {
                Some(format!("0x{}", hex::encode(&safe_tx.data)))
            },
            operation: safe_tx.operation,
            safe_tx_gas: safe_tx.safe_tx_gas.to_string(),
            base_gas: safe_tx.base_gas.to_string(),
            gas_price: safe_tx.gas_price.to_string(),
            gas_token: checksum(&safe_tx.gas_token),
            refund_receiver: checksum(&safe_tx.refund_receiver),
            nonce: safe_tx.nonce.low_u64(),
            contract_transaction_hash: format!("{:?}", safe_tx_hash),
            sender: checksum(&owner),
            signature: format!("0x{}", hex::encode(contracts::eth_sign_signature(&signature))),
            origin: Some(PROPOSAL_ORIGIN.to_string()),
        };
        service
            .propose_transaction(&checksum(&tx.safe), &body)
            .await?;

        Ok(SubmissionReceipt::Proposed { safe_tx_hash })
    }

    async fn execute_allowance_transfer(&self, transfer: &AllowanceTransfer) -> Result<TxHash> {
        let module = self
            .allowance_module
            .ok_or_else(|| anyhow!("No spending limit module is known for chain {}", self.chain_id))?;

        let sender = self.wallet.address(self.chain_id).await?;
        if sender != transfer.delegate {
            return Err(anyhow!(
                "Connected account {} is not the delegate {}",
                checksum(&sender),
                checksum(&transfer.delegate)
            ));
        }

        let calldata = contracts::encode_execute_allowance_transfer(transfer)?;
        self.wallet
            .send_transaction(self.ledger.provider(), self.chain_id, module, U256::zero(), calldata)
            .await
    }
}
