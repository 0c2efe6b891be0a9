//! Signing wallets: a Ledger device or a local development key.

use crate::user_settings::UserSettings;
use anyhow::{anyhow, Result};
use ethers::prelude::*;
use ethers::signers::{HDPath, Ledger, LedgerError};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::env;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Maximum number of attempts for transient HID errors
const MAX_RETRY_ATTEMPTS: usize = 5;

/// Base delay between retries in milliseconds (multiplied by attempt number)
const RETRY_BASE_DELAY_MS: u64 = 300;

/// Serializes all Ledger/HID access. Concurrent HID operations fail on some
/// platforms ("Overlapped I/O operation is in progress").
static LEDGER_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn ledger_lock() -> &'static Mutex<()> {
    LEDGER_LOCK.get_or_init(|| Mutex::new(()))
}

/// Ledger Live derivation path for an account index
pub fn ledger_live_path(account_index: u32) -> String {
    format!("m/44'/60'/{}'/0/0", account_index)
}

/// HID timing/busy errors that may resolve on retry
fn is_transient_error(err_str: &str) -> bool {
    let lower = err_str.to_lowercase();

    if lower.contains("overlapped i/o operation") || lower.contains("overlapped io operation") {
        return true;
    }
    if lower.contains("busy") {
        return true;
    }
    if lower.contains("hidapi") && !lower.contains("no device") && !lower.contains("device not found") {
        return true;
    }
    lower.contains("i/o error") || lower.contains("io error")
}

/// User-facing description of a Ledger failure
fn describe_ledger_error(err_str: &str) -> String {
    let lower = err_str.to_lowercase();

    if lower.contains("device not found") || lower.contains("no device") || lower.contains("hidapi") {
        "Ledger device not found. Please ensure it's connected and unlocked.".to_string()
    } else if lower.contains("locked") || lower.contains("6983") || lower.contains("6985") {
        "Ledger is locked or Ethereum app is not open.".to_string()
    } else if lower.contains("denied") || lower.contains("rejected") {
        "Request was rejected on the Ledger device.".to_string()
    } else if lower.contains("timeout") {
        "Ledger operation timed out. Please try again.".to_string()
    } else {
        format!("Ledger error: {}", err_str)
    }
}

/// Open the device and run `op`, holding the HID lock for the whole exchange
async fn with_ledger<T, F, Fut>(account_index: u32, chain_id: u64, op: F) -> Result<T>
where
    F: Fn(Ledger) -> Fut,
    Fut: Future<Output = std::result::Result<T, LedgerError>>,
{
    let path = ledger_live_path(account_index);

    for attempt in 1..=MAX_RETRY_ATTEMPTS {
        let lock = ledger_lock().lock().await;

        let result = match Ledger::new(HDPath::Other(path.clone()), chain_id).await {
            Ok(ledger) => op(ledger).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) => {
                let err_str = e.to_string();
                if is_transient_error(&err_str) && attempt < MAX_RETRY_ATTEMPTS {
                    warn!("Transient Ledger error (attempt {}): {}, retrying...", attempt, err_str);
                    drop(lock);
                    sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * attempt as u64)).await;
                    continue;
                }
                error!("Ledger error at {}: {}", path, err_str);
                return Err(anyhow!(describe_ledger_error(&err_str)));
            }
        }
    }

    Err(anyhow!("Ledger unavailable after {} attempts", MAX_RETRY_ATTEMPTS))
}

/// The account that signs for the user
#[derive(Clone, Debug)]
pub enum Wallet {
    Ledger { account_index: u32 },
    Local(LocalWallet),
}

impl Wallet {
    /// Development key from the `PRIVATE_KEY` environment variable
    pub fn from_env_key() -> Result<Self> {
        let key = env::var("PRIVATE_KEY").map_err(|_| anyhow!("PRIVATE_KEY is not set"))?;
        let wallet = key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| anyhow!("Invalid PRIVATE_KEY: {}", e))?;
        Ok(Self::Local(wallet))
    }

    pub fn from_settings(settings: &UserSettings) -> Result<Self> {
        if settings.use_ledger {
            Ok(Self::Ledger {
                account_index: settings.ledger_account_index,
            })
        } else {
            Self::from_env_key()
        }
    }

    pub fn kind_label(&self) -> String {
        match self {
            Self::Ledger { account_index } => format!("Ledger #{}", account_index),
            Self::Local(_) => "Local key".to_string(),
        }
    }

    pub async fn address(&self, chain_id: u64) -> Result<Address> {
        match self {
            Self::Ledger { account_index } => {
                let address = with_ledger(*account_index, chain_id, |ledger| async move {
                    ledger.get_address().await
                })
                .await?;
                info!("Got address {:?} from Ledger account {}", address, account_index);
                Ok(address)
            }
            Self::Local(wallet) => Ok(wallet.address()),
        }
    }

    pub async fn sign_transaction(&self, tx: &TypedTransaction, chain_id: u64) -> Result<Signature> {
        match self {
            Self::Ledger { account_index } => {
                info!("Confirm the transaction on your Ledger device");
                with_ledger(*account_index, chain_id, |ledger| {
                    let tx = tx.clone();
                    async move { ledger.sign_transaction(&tx).await }
                })
                .await
            }
            Self::Local(wallet) => Ok(wallet
                .clone()
                .with_chain_id(chain_id)
                .sign_transaction(tx)
                .await?),
        }
    }

    /// EIP-191 personal message signature
    pub async fn sign_message(&self, message: &[u8], chain_id: u64) -> Result<Signature> {
        match self {
            Self::Ledger { account_index } => {
                info!("Confirm the message signature on your Ledger device");
                with_ledger(*account_index, chain_id, |ledger| {
                    let message = message.to_vec();
                    async move { ledger.sign_message(message).await }
                })
                .await
            }
            Self::Local(wallet) => Ok(wallet.sign_message(message).await?),
        }
    }

    /// Sign and broadcast a call. Returns once the node accepted it.
    pub async fn send_transaction(
        &self,
        provider: Arc<Provider<Http>>,
        chain_id: u64,
        to: Address,
        value: U256,
        data: Bytes,
    ) -> Result<TxHash> {
        let from = self.address(chain_id).await?;
        let nonce = provider.get_transaction_count(from, None).await?;
        let gas_price = provider.get_gas_price().await?;

        let request = TransactionRequest::new()
            .from(from)
            .to(to)
            .value(value)
            .data(data)
            .gas_price(gas_price)
            .nonce(nonce)
            .chain_id(chain_id);
        let gas = provider.estimate_gas(&request.clone().into(), None).await?;
        let tx: TypedTransaction = request.gas(gas).into();

        info!(
            "Transaction built: from={:?}, to={:?}, value={}, gas={}, gas_price={}, nonce={}",
            from, to, value, gas, gas_price, nonce
        );

        let signature = self.sign_transaction(&tx, chain_id).await?;
        let pending = provider
            .send_raw_transaction(tx.rlp_signed(&signature))
            .await
            .map_err(|e| anyhow!("Failed to send transaction: {}", e))?;

        let tx_hash = pending.tx_hash();
        info!("Transaction sent: {:?}", tx_hash);
        Ok(tx_hash)
    }
}

/// Connection state shown in the header
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletStatus {
    Disconnected,
    Connecting,
    Connected { address: Address, label: String },
    Error(String),
}

impl WalletStatus {
    pub fn address(&self) -> Option<Address> {
        match self {
            Self::Connected { address, .. } => Some(*address),
            _ => None,
        }
    }
}
