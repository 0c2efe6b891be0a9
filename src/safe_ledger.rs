//! Read access to Safe state and gas figures on the remote node.

use crate::config::Config;
use crate::contracts::{self, SafeTransactionData};
use crate::types::SpendingLimit;
use anyhow::{anyhow, Context, Result};
use ethers::abi::Token;
use ethers::prelude::*;
use std::sync::Arc;

/// What to estimate: a transfer out of `safe`, sent by `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasEstimationRequest {
    pub safe: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    /// Execute directly instead of only confirming
    pub is_execution: bool,
    /// Connected owner account paying for the transaction
    pub from: Address,
}

/// Remote ledger the Safe lives on.
///
/// Implementations talk to a node; tests substitute scripted fakes.
#[allow(async_fn_in_trait)]
pub trait SafeLedger {
    async fn threshold(&self, safe: Address) -> Result<u64>;

    async fn owners(&self, safe: Address) -> Result<Vec<Address>>;

    async fn nonce(&self, safe: Address) -> Result<U256>;

    async fn transaction_hash(&self, safe: Address, tx: &SafeTransactionData) -> Result<H256>;

    /// Gas units for executing or confirming the transfer described by `request`
    async fn estimate_transaction_gas(&self, request: &GasEstimationRequest) -> Result<U256>;

    /// Gas units for a plain call
    async fn estimate_call_gas(&self, from: Address, to: Address, data: Bytes) -> Result<U256>;

    async fn gas_price(&self) -> Result<U256>;

    async fn spending_limits(&self, safe: Address, delegate: Address) -> Result<Vec<SpendingLimit>>;
}

/// `SafeLedger` over an ethers HTTP provider
#[derive(Clone, Debug)]
pub struct EthersLedger {
    provider: Arc<Provider<Http>>,
    allowance_module: Option<Address>,
}

impl EthersLedger {
    pub fn new(provider: Arc<Provider<Http>>, allowance_module: Option<Address>) -> Self {
        Self {
            provider,
            allowance_module,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.get_provider()?, config.spending_limit_module))
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx = TransactionRequest::new().to(to).data(data);
        Ok(self.provider.call(&tx.into(), None).await?)
    }
}

impl SafeLedger for EthersLedger {
    async fn threshold(&self, safe: Address) -> Result<u64> {
        let func = contracts::get_threshold_fn();
        let output = self.call(safe, func.encode_input(&[])?.into()).await?;
        let threshold = contracts::decode_uint(&func, &output)?;
        if threshold > U256::from(u64::MAX) {
            return Err(anyhow!("Threshold out of range: {}", threshold));
        }
        Ok(threshold.as_u64())
    }

    async fn owners(&self, safe: Address) -> Result<Vec<Address>> {
        let func = contracts::get_owners_fn();
        let output = self.call(safe, func.encode_input(&[])?.into()).await?;
        contracts::decode_addresses(&func, &output)
    }

    async fn nonce(&self, safe: Address) -> Result<U256> {
        let func = contracts::nonce_fn();
        let output = self.call(safe, func.encode_input(&[])?.into()).await?;
        contracts::decode_uint(&func, &output)
    }

    async fn transaction_hash(&self, safe: Address, tx: &SafeTransactionData) -> Result<H256> {
        let output = self
            .call(safe, contracts::encode_get_transaction_hash(tx)?)
            .await?;
        contracts::decode_bytes32(&contracts::get_transaction_hash_fn(), &output)
    }

    async fn estimate_transaction_gas(&self, request: &GasEstimationRequest) -> Result<U256> {
        let nonce = self.nonce(request.safe).await?;
        let safe_tx = SafeTransactionData::call(
            request.to,
            request.value,
            request.data.clone(),
            nonce,
        );

        let calldata = if request.is_execution {
            let signature = contracts::prevalidated_signature(request.from);
            contracts::encode_exec_transaction(&safe_tx, &signature)?
        } else {
            let hash = self.transaction_hash(request.safe, &safe_tx).await?;
            contracts::encode_approve_hash(hash)?
        };

        tracing::debug!(
            "Estimating {} gas for Safe {:?} -> {:?}",
            if request.is_execution { "execution" } else { "confirmation" },
            request.safe,
            request.to
        );

        self.estimate_call_gas(request.from, request.safe, calldata)
            .await
    }

    async fn estimate_call_gas(&self, from: Address, to: Address, data: Bytes) -> Result<U256> {
        let tx = TransactionRequest::new().from(from).to(to).data(data);
        self.provider
            .estimate_gas(&tx.into(), None)
            .await
            .context("Gas estimation failed")
    }

    async fn gas_price(&self) -> Result<U256> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn spending_limits(&self, safe: Address, delegate: Address) -> Result<Vec<SpendingLimit>> {
        let module = self
            .allowance_module
            .ok_or_else(|| anyhow!("No spending limit module configured"))?;

        let tokens_fn = contracts::get_tokens_fn();
        let output = self
            .call(
                module,
                tokens_fn
                    .encode_input(&[Token::Address(safe), Token::Address(delegate)])?
                    .into(),
            )
            .await?;
        let tokens = contracts::decode_addresses(&tokens_fn, &output)?;

        let allowance_fn = contracts::get_token_allowance_fn();
        let mut limits = Vec::with_capacity(tokens.len());
        for token in tokens {
            let data = allowance_fn.encode_input(&[
                Token::Address(safe),
                Token::Address(delegate),
                Token::Address(token),
            ])?;
            let output = self.call(module, data.into()).await?;
            let values = contracts::decode_uint_array(&allowance_fn, &output)?;
            limits.push(spending_limit_from_allowance(delegate, token, &values)?);
        }
        Ok(limits)
    }
}

/// Build a `SpendingLimit` from `getTokenAllowance` output:
/// [amount, spent, resetTimeMin, lastResetMin, nonce]
pub fn spending_limit_from_allowance(
    delegate: Address,
    token: Address,
    values: &[U256],
) -> Result<SpendingLimit> {
    if values.len() != 5 {
        return Err(anyhow!(
            "Expected 5 allowance values, got {}",
            values.len()
        ));
    }
    Ok(SpendingLimit {
        delegate,
        token,
        amount: values[0],
        spent: values[1],
        reset_time_min: values[2].low_u64(),
        last_reset_min: values[3].low_u64(),
        nonce: values[4].low_u64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spending_limit_from_allowance() {
        let values: Vec<U256> = [100u64, 40, 1440, 28_000_000, 3]
            .iter()
            .map(|v| U256::from(*v))
            .collect();
        let limit =
            spending_limit_from_allowance(Address::repeat_byte(1), Address::zero(), &values).unwrap();

        assert_eq!(limit.amount, U256::from(100u64));
        assert_eq!(limit.spent, U256::from(40u64));
        assert_eq!(limit.reset_time_min, 1440);
        assert_eq!(limit.last_reset_min, 28_000_000);
        assert_eq!(limit.nonce, 3);
        assert_eq!(limit.remaining(), U256::from(60u64));
    }

    #[test]
    fn test_spending_limit_from_allowance_wrong_length() {
        let result = spending_limit_from_allowance(Address::zero(), Address::zero(), &[U256::one()]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_spending_limits_without_module_fails() {
        let provider = Provider::<Http>::try_from("http://127.0.0.1:1").unwrap();
        let ledger = EthersLedger::new(Arc::new(provider), None);
        let result = ledger
            .spending_limits(Address::zero(), Address::zero())
            .await;
        assert!(result.unwrap_err().to_string().contains("spending limit module"));
    }
}
