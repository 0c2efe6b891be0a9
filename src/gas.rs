//! Gas estimation for Safe transfers.
//!
//! An estimate is computed against the remote node and then published into a
//! [`GasEstimator`]. Every request carries a `CancellationToken`; starting a
//! new request cancels the previous token, and a cancelled request never
//! publishes, so readers only ever observe the latest request's result.

use crate::safe_ledger::{GasEstimationRequest, SafeLedger};
use crate::utils::{format_amount, from_token_unit};
use anyhow::Result;
use ethers::types::{Address, Bytes, U256};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Gas reported when estimation fails
pub const FALLBACK_GAS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimationStatus {
    Loading,
    Failure,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionGasEstimation {
    pub status: EstimationStatus,
    /// Gas units
    pub gas_estimation: U256,
    /// gas × price, in wei
    pub gas_cost: U256,
    /// `gas_cost` in native coin units
    pub gas_cost_formatted: String,
    pub gas_cost_human_readable: String,
    pub gas_price: U256,
    pub is_execution: bool,
}

impl Default for TransactionGasEstimation {
    fn default() -> Self {
        Self {
            status: EstimationStatus::Loading,
            gas_estimation: U256::zero(),
            gas_cost: U256::zero(),
            gas_cost_formatted: "0".to_string(),
            gas_cost_human_readable: "< 0.001".to_string(),
            gas_price: U256::zero(),
            is_execution: false,
        }
    }
}

impl TransactionGasEstimation {
    /// Published when any step of the estimation fails
    pub fn fallback(native_decimals: u32) -> Self {
        let gas = U256::from(FALLBACK_GAS);
        let gas_cost_formatted = from_token_unit(gas, native_decimals);
        Self {
            status: EstimationStatus::Failure,
            gas_estimation: gas,
            gas_cost: gas,
            gas_cost_human_readable: format_amount(&gas_cost_formatted),
            gas_cost_formatted,
            gas_price: U256::one(),
            is_execution: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == EstimationStatus::Loading
    }
}

/// Whether the connected account would execute the transaction rather than
/// only add a confirmation.
pub fn check_if_tx_is_execution(
    threshold: u64,
    pre_approving_owner: Option<Address>,
    tx_confirmations: Option<u64>,
) -> bool {
    tx_confirmations == Some(threshold) || pre_approving_owner.is_some() || threshold == 1
}

/// Inputs of one estimation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasEstimationInput {
    pub safe: Address,
    pub to: Address,
    pub value: U256,
    /// `None` until the transaction payload has been computed
    pub data: Option<Bytes>,
    pub from: Address,
    pub pre_approving_owner: Option<Address>,
    pub tx_confirmations: Option<u64>,
    pub native_decimals: u32,
}

async fn try_estimate<L: SafeLedger>(
    ledger: &L,
    input: &GasEstimationInput,
    data: &Bytes,
) -> Result<TransactionGasEstimation> {
    let threshold = ledger.threshold(input.safe).await?;
    let is_execution =
        check_if_tx_is_execution(threshold, input.pre_approving_owner, input.tx_confirmations);

    let request = GasEstimationRequest {
        safe: input.safe,
        to: input.to,
        value: input.value,
        data: data.clone(),
        is_execution,
        from: input.from,
    };
    let gas_estimation = ledger.estimate_transaction_gas(&request).await?;
    let gas_price = ledger.gas_price().await?;
    let gas_cost = gas_estimation.saturating_mul(gas_price);
    let gas_cost_formatted = from_token_unit(gas_cost, input.native_decimals);

    let status = if gas_estimation.is_zero() {
        EstimationStatus::Failure
    } else {
        EstimationStatus::Success
    };

    Ok(TransactionGasEstimation {
        status,
        gas_estimation,
        gas_cost,
        gas_cost_human_readable: format_amount(&gas_cost_formatted),
        gas_cost_formatted,
        gas_price,
        is_execution,
    })
}

/// Run one estimation.
///
/// Returns `None` when there is nothing to publish: the payload is not known
/// yet, or `cancel` fired while the request was in flight. Failures are never
/// surfaced; they turn into [`TransactionGasEstimation::fallback`].
pub async fn estimate_transaction_gas_costs<L: SafeLedger>(
    ledger: &L,
    input: &GasEstimationInput,
    cancel: &CancellationToken,
) -> Option<TransactionGasEstimation> {
    let data = input.data.as_ref()?;

    let estimation = match try_estimate(ledger, input, data).await {
        Ok(estimation) => estimation,
        Err(e) => {
            tracing::error!("Error while estimating transaction gas: {:#}", e);
            TransactionGasEstimation::fallback(input.native_decimals)
        }
    };

    if cancel.is_cancelled() {
        tracing::debug!("Discarding gas estimate of a superseded request");
        return None;
    }
    Some(estimation)
}

#[derive(Debug, Default)]
struct EstimatorState {
    published: TransactionGasEstimation,
    current: CancellationToken,
}

/// Latest published estimate plus the token of the request allowed to replace it.
///
/// Cheap to clone; clones share state, so a worker thread can publish while
/// the UI reads.
#[derive(Debug, Clone, Default)]
pub struct GasEstimator {
    state: Arc<Mutex<EstimatorState>>,
}

impl GasEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EstimatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel the in-flight request, if any, and hand out the token for a new one
    pub fn start_request(&self) -> CancellationToken {
        let mut state = self.lock();
        state.current.cancel();
        state.current = CancellationToken::new();
        state.current.clone()
    }

    /// Store `estimation` unless `token` has been superseded.
    /// The check and the store happen under one lock.
    pub fn publish(&self, token: &CancellationToken, estimation: TransactionGasEstimation) -> bool {
        let mut state = self.lock();
        if token.is_cancelled() {
            return false;
        }
        state.published = estimation;
        true
    }

    pub fn current(&self) -> TransactionGasEstimation {
        self.lock().published.clone()
    }

    /// Drop any in-flight request and go back to Loading
    pub fn reset(&self) {
        let mut state = self.lock();
        state.current.cancel();
        state.current = CancellationToken::new();
        state.published = TransactionGasEstimation::default();
    }

    /// Start a request, run it, and publish the result if still current
    pub async fn estimate<L: SafeLedger>(&self, ledger: &L, input: &GasEstimationInput) -> bool {
        let token = self.start_request();
        match estimate_transaction_gas_costs(ledger, input, &token).await {
            Some(estimation) => self.publish(&token, estimation),
            None => false,
        }
    }
}

/// Gas figures for a plain call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasEstimationInfo {
    pub gas: U256,
    pub gas_price: U256,
    /// gas × price, in wei
    pub total: U256,
}

/// Estimate a plain call sent from `from`, such as a delegate's allowance transfer
pub async fn estimate_tx_gas_costs<L: SafeLedger>(
    ledger: &L,
    from: Address,
    to: Address,
    data: Bytes,
) -> Result<GasEstimationInfo> {
    let gas = ledger.estimate_call_gas(from, to, data).await?;
    let gas_price = ledger.gas_price().await?;
    Ok(GasEstimationInfo {
        gas,
        gas_price,
        total: gas.saturating_mul(gas_price),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::SafeTransactionData;
    use crate::types::SpendingLimit;
    use anyhow::anyhow;
    use ethers::types::H256;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeLedger {
        threshold: u64,
        gas: u64,
        gas_price: u64,
        fail_estimate: bool,
        delays: HashMap<Address, Duration>,
    }

    impl SafeLedger for FakeLedger {
        async fn threshold(&self, _safe: Address) -> Result<u64> {
            Ok(self.threshold)
        }

        async fn owners(&self, _safe: Address) -> Result<Vec<Address>> {
            Ok(vec![])
        }

        async fn nonce(&self, _safe: Address) -> Result<U256> {
            Ok(U256::zero())
        }

        async fn transaction_hash(&self, _safe: Address, _tx: &SafeTransactionData) -> Result<H256> {
            Ok(H256::zero())
        }

        async fn estimate_transaction_gas(&self, request: &GasEstimationRequest) -> Result<U256> {
            if let Some(delay) = self.delays.get(&request.to) {
                tokio::time::sleep(*delay).await;
            }
            if self.fail_estimate {
                return Err(anyhow!("execution reverted"));
            }
            // Encode the recipient in the result so tests can tell requests apart
            Ok(U256::from(self.gas) + U256::from(request.to.as_bytes()[19]))
        }

        async fn estimate_call_gas(&self, _from: Address, _to: Address, _data: Bytes) -> Result<U256> {
            Ok(U256::from(self.gas))
        }

        async fn gas_price(&self) -> Result<U256> {
            Ok(U256::from(self.gas_price))
        }

        async fn spending_limits(&self, _safe: Address, _delegate: Address) -> Result<Vec<SpendingLimit>> {
            Ok(vec![])
        }
    }

    fn input(to: Address) -> GasEstimationInput {
        GasEstimationInput {
            safe: Address::repeat_byte(0x5a),
            to,
            value: U256::zero(),
            data: Some(Bytes::new()),
            from: Address::repeat_byte(0x0f),
            pre_approving_owner: None,
            tx_confirmations: None,
            native_decimals: 18,
        }
    }

    fn recipient(last: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = last;
        Address::from(bytes)
    }

    // ==================== check_if_tx_is_execution tests ====================

    #[test]
    fn test_check_if_tx_is_execution_single_owner() {
        assert!(check_if_tx_is_execution(1, None, None));
    }

    #[test]
    fn test_check_if_tx_is_execution_multisig_without_confirmations() {
        assert!(!check_if_tx_is_execution(2, None, None));
        assert!(!check_if_tx_is_execution(3, None, Some(2)));
    }

    #[test]
    fn test_check_if_tx_is_execution_confirmations_reach_threshold() {
        assert!(check_if_tx_is_execution(2, None, Some(2)));
        assert!(check_if_tx_is_execution(3, None, Some(3)));
    }

    #[test]
    fn test_check_if_tx_is_execution_pre_approving_owner() {
        assert!(check_if_tx_is_execution(3, Some(Address::repeat_byte(1)), None));
        assert!(check_if_tx_is_execution(3, Some(Address::repeat_byte(1)), Some(0)));
    }

    // ==================== estimate_transaction_gas_costs tests ====================

    #[tokio::test]
    async fn test_estimate_success() {
        let ledger = FakeLedger {
            threshold: 1,
            gas: 50_000,
            gas_price: 2_000_000_000,
            ..Default::default()
        };
        let token = CancellationToken::new();

        let estimation = estimate_transaction_gas_costs(&ledger, &input(recipient(0)), &token)
            .await
            .unwrap();

        assert_eq!(estimation.status, EstimationStatus::Success);
        assert!(estimation.is_execution);
        assert_eq!(estimation.gas_estimation, U256::from(50_000u64));
        assert_eq!(estimation.gas_cost, U256::from(100_000_000_000_000u64));
        assert_eq!(estimation.gas_cost_formatted, "0.000100000000000000");
        assert_eq!(estimation.gas_cost_human_readable, "< 0.001");
    }

    #[tokio::test]
    async fn test_estimate_confirmation_for_multisig() {
        let ledger = FakeLedger {
            threshold: 2,
            gas: 60_000,
            gas_price: 1_000_000_000_000,
            ..Default::default()
        };
        let token = CancellationToken::new();

        let estimation = estimate_transaction_gas_costs(&ledger, &input(recipient(0)), &token)
            .await
            .unwrap();

        assert!(!estimation.is_execution);
        assert_eq!(estimation.gas_cost_formatted, "0.060000000000000000");
        assert_eq!(estimation.gas_cost_human_readable, "0.06");
    }

    #[tokio::test]
    async fn test_estimate_zero_gas_is_failure() {
        let ledger = FakeLedger {
            threshold: 1,
            gas: 0,
            gas_price: 1,
            ..Default::default()
        };
        let token = CancellationToken::new();

        let estimation = estimate_transaction_gas_costs(&ledger, &input(recipient(0)), &token)
            .await
            .unwrap();

        assert_eq!(estimation.status, EstimationStatus::Failure);
    }

    #[tokio::test]
    async fn test_estimate_failure_uses_fallback() {
        let ledger = FakeLedger {
            threshold: 1,
            fail_estimate: true,
            ..Default::default()
        };
        let token = CancellationToken::new();

        let estimation = estimate_transaction_gas_costs(&ledger, &input(recipient(0)), &token)
            .await
            .unwrap();

        assert_eq!(estimation.status, EstimationStatus::Failure);
        assert_eq!(estimation.gas_estimation, U256::from(10_000u64));
        assert_eq!(estimation.gas_price, U256::one());
        assert_eq!(estimation.gas_cost_formatted, "0.000000000000010000");
        assert!(!estimation.is_execution);
    }

    #[tokio::test]
    async fn test_estimate_without_payload_publishes_nothing() {
        let ledger = FakeLedger {
            threshold: 1,
            gas: 21_000,
            gas_price: 1,
            ..Default::default()
        };
        let estimator = GasEstimator::new();
        let mut request = input(recipient(0));
        request.data = None;

        assert!(!estimator.estimate(&ledger, &request).await);
        assert!(estimator.current().is_loading());
    }

    #[tokio::test]
    async fn test_estimate_cancelled_publishes_nothing() {
        let ledger = FakeLedger {
            threshold: 1,
            fail_estimate: true,
            ..Default::default()
        };
        let token = CancellationToken::new();
        token.cancel();

        let result = estimate_transaction_gas_costs(&ledger, &input(recipient(0)), &token).await;

        assert!(result.is_none());
    }

    // ==================== GasEstimator tests ====================

    #[test]
    fn test_gas_estimator_starts_loading() {
        let estimator = GasEstimator::new();
        let current = estimator.current();
        assert!(current.is_loading());
        assert_eq!(current.gas_cost_formatted, "0");
        assert_eq!(current.gas_cost_human_readable, "< 0.001");
    }

    #[test]
    fn test_gas_estimator_publish_after_new_request_is_rejected() {
        let estimator = GasEstimator::new();
        let first = estimator.start_request();
        let second = estimator.start_request();

        assert!(first.is_cancelled());
        assert!(!estimator.publish(&first, TransactionGasEstimation::fallback(18)));
        assert!(estimator.current().is_loading());

        assert!(estimator.publish(&second, TransactionGasEstimation::fallback(18)));
        assert_eq!(estimator.current().status, EstimationStatus::Failure);
    }

    #[test]
    fn test_gas_estimator_reset() {
        let estimator = GasEstimator::new();
        let token = estimator.start_request();
        estimator.publish(&token, TransactionGasEstimation::fallback(18));

        estimator.reset();

        assert!(token.is_cancelled());
        assert!(estimator.current().is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gas_estimator_only_latest_request_is_observed() {
        let slow = recipient(1);
        let fast = recipient(2);
        let ledger = FakeLedger {
            threshold: 1,
            gas: 21_000,
            gas_price: 1,
            delays: HashMap::from([
                (slow, Duration::from_secs(5)),
                (fast, Duration::from_millis(10)),
            ]),
            ..Default::default()
        };
        let estimator = GasEstimator::new();

        let input_slow = input(slow);
        let input_fast = input(fast);
        let (first, second) = tokio::join!(
            estimator.estimate(&ledger, &input_slow),
            estimator.estimate(&ledger, &input_fast),
        );

        assert!(!first);
        assert!(second);
        assert_eq!(estimator.current().gas_estimation, U256::from(21_002u64));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gas_estimator_superseded_fast_request_is_discarded() {
        let a = recipient(1);
        let b = recipient(2);
        let ledger = FakeLedger {
            threshold: 1,
            gas: 21_000,
            gas_price: 1,
            delays: HashMap::from([
                (a, Duration::from_millis(10)),
                (b, Duration::from_secs(5)),
            ]),
            ..Default::default()
        };
        let estimator = GasEstimator::new();

        let input_a = input(a);
        let input_b = input(b);
        let (first, second) = tokio::join!(
            estimator.estimate(&ledger, &input_a),
            estimator.estimate(&ledger, &input_b),
        );

        assert!(!first);
        assert!(second);
        assert_eq!(estimator.current().gas_estimation, U256::from(21_002u64));
    }

    // ==================== estimate_tx_gas_costs tests ====================

    #[tokio::test]
    async fn test_estimate_tx_gas_costs_total() {
        let ledger = FakeLedger {
            gas: 80_000,
            gas_price: 3,
            ..Default::default()
        };

        let info = estimate_tx_gas_costs(&ledger, Address::zero(), Address::zero(), Bytes::new())
            .await
            .unwrap();

        assert_eq!(info.gas, U256::from(80_000u64));
        assert_eq!(info.total, U256::from(240_000u64));
    }
}
