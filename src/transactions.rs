//! Client for the Safe transaction service: transaction history, balances
//! and transaction proposals.
//!
//! History is fetched with a conditional request. The entity tag of the last
//! response that carried data is remembered in a [`TransactionCache`] and sent
//! back as `If-None-Match`; an unchanged list never overwrites cached records.

use crate::config::Config;
use crate::error::{Result, TxServiceError};
use crate::types::TokenBalance;
use crate::utils::checksum;
use ethers::types::{Address, U256};
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Query of the all-transactions endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUriParams {
    pub safe_address: String,
    pub limit: u32,
    pub offset: u32,
    pub order_by: Option<String>,
    pub queued: Option<bool>,
    pub trusted: Option<bool>,
}

impl ServiceUriParams {
    pub fn new(safe_address: impl Into<String>, limit: u32, offset: u32) -> Self {
        Self {
            safe_address: safe_address.into(),
            limit,
            offset,
            order_by: None,
            queued: None,
            trusted: None,
        }
    }

    /// Query pairs; optional parameters are only included when set
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("limit", self.limit.to_string()),
            ("offset", self.offset.to_string()),
        ];
        if let Some(order_by) = &self.order_by {
            pairs.push(("orderBy", order_by.clone()));
        }
        if let Some(queued) = self.queued {
            pairs.push(("queued", queued.to_string()));
        }
        if let Some(trusted) = self.trusted {
            pairs.push(("trusted", trusted.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub owner: String,
    #[serde(default)]
    pub submission_date: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

/// One entry of the all-transactions list.
///
/// The list mixes multisig, module and incoming transactions, so everything
/// past `tx_type` is optional. Unknown fields are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    #[serde(default)]
    pub tx_type: Option<String>,
    #[serde(default)]
    pub safe: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub nonce: Option<u64>,
    #[serde(default)]
    pub submission_date: Option<String>,
    #[serde(default)]
    pub execution_date: Option<String>,
    #[serde(default)]
    pub is_executed: Option<bool>,
    #[serde(default)]
    pub is_successful: Option<bool>,
    #[serde(default)]
    pub safe_tx_hash: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub confirmations_required: Option<u64>,
    #[serde(default)]
    pub confirmations: Option<Vec<Confirmation>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TransactionRecord {
    /// Safe transaction hash for multisig entries, chain hash otherwise
    pub fn hash(&self) -> Option<&str> {
        self.safe_tx_hash
            .as_deref()
            .or(self.transaction_hash.as_deref())
            .or(self.tx_hash.as_deref())
    }

    /// On-chain hash, once mined
    pub fn chain_hash(&self) -> Option<&str> {
        self.transaction_hash.as_deref().or(self.tx_hash.as_deref())
    }

    pub fn confirmation_count(&self) -> usize {
        self.confirmations.as_ref().map(Vec::len).unwrap_or(0)
    }

    pub fn is_pending(&self) -> bool {
        self.tx_type.as_deref() == Some("MULTISIG_TRANSACTION") && self.is_executed == Some(false)
    }

    pub fn status_label(&self) -> String {
        match (self.is_executed, self.is_successful) {
            (Some(false), _) => match self.confirmations_required {
                Some(required) => format!("Awaiting {}/{}", self.confirmation_count(), required),
                None => "Pending".to_string(),
            },
            (_, Some(false)) => "Failed".to_string(),
            _ => "Success".to_string(),
        }
    }

    pub fn date(&self) -> Option<&str> {
        self.execution_date
            .as_deref()
            .or(self.submission_date.as_deref())
    }
}

/// One page of the all-transactions endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointResponse {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<TransactionRecord>,
}

/// Result of one conditional fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// New data under a new entity tag
    Updated {
        etag: Option<String>,
        results: Vec<TransactionRecord>,
    },
    /// Unchanged, or nothing to show
    NotModified,
    Failed(String),
}

/// Native coin entries carry no token address and no token metadata
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceEntry {
    token_address: Option<String>,
    token: Option<BalanceToken>,
    balance: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceToken {
    name: String,
    symbol: String,
    #[serde(default)]
    decimals: Option<u32>,
    #[serde(default)]
    logo_uri: Option<String>,
}

/// Body of a multisig transaction proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeTransactionBody {
    pub to: String,
    pub value: String,
    pub data: Option<String>,
    pub operation: u8,
    pub safe_tx_gas: String,
    pub base_gas: String,
    pub gas_price: String,
    pub gas_token: String,
    pub refund_receiver: String,
    pub nonce: u64,
    pub contract_transaction_hash: String,
    pub sender: String,
    pub signature: String,
    pub origin: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TxServiceClient {
    client: Client,
    base_url: String,
}

impl TxServiceClient {
    /// `base_url` is the service root including `/api`
    pub fn new(base_url: &str) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(TxServiceError::NotConfigured);
        }
        Url::parse(trimmed)?;
        Ok(Self {
            client: Client::new(),
            base_url: trimmed.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.tx_service_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn safe_url(&self, safe_address: &str, endpoint: &str) -> Result<String> {
        let address: Address = safe_address
            .trim()
            .parse()
            .map_err(|_| TxServiceError::InvalidResponse(format!("Invalid Safe address: {}", safe_address)))?;
        Ok(format!(
            "{}/v1/safes/{}/{}/",
            self.base_url,
            checksum(&address),
            endpoint
        ))
    }

    pub fn all_transactions_url(&self, safe_address: &str) -> Result<String> {
        self.safe_url(safe_address, "all-transactions")
    }

    async fn try_fetch_all_transactions(
        &self,
        params: &ServiceUriParams,
        etag: Option<&str>,
    ) -> Result<FetchOutcome> {
        let url = self.all_transactions_url(&params.safe_address)?;
        let mut request = self.client.get(&url).query(&params.query_pairs());
        if let Some(tag) = etag {
            request = request.header(IF_NONE_MATCH, tag);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TxServiceError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let response_etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        let page: EndpointResponse = serde_json::from_slice(&bytes)?;

        // Nothing remembered yet: any non-empty page is new, tagged or not
        let changed = etag.is_none() || response_etag.as_deref() != etag;
        if page.count > 0 && changed {
            return Ok(FetchOutcome::Updated {
                etag: response_etag,
                results: page.results,
            });
        }
        Ok(FetchOutcome::NotModified)
    }

    /// Conditional fetch of one page of the Safe's transaction history.
    /// Errors are logged and reported as `Failed`, never returned.
    pub async fn fetch_all_transactions(
        &self,
        params: &ServiceUriParams,
        etag: Option<&str>,
    ) -> FetchOutcome {
        match self.try_fetch_all_transactions(params, etag).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    "Request for transactions of {} failed: {}",
                    if params.safe_address.is_empty() {
                        "unknown"
                    } else {
                        params.safe_address.as_str()
                    },
                    e
                );
                FetchOutcome::Failed(e.to_string())
            }
        }
    }

    /// Token balances held by the Safe, native coin included
    pub async fn fetch_safe_balances(
        &self,
        safe_address: &str,
        native_symbol: &str,
        native_decimals: u32,
    ) -> Result<Vec<TokenBalance>> {
        let url = self.safe_url(safe_address, "balances")?;
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TxServiceError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let entries: Vec<BalanceEntry> = serde_json::from_slice(&bytes)?;
        entries
            .into_iter()
            .map(|entry| balance_from_entry(entry, native_symbol, native_decimals))
            .collect()
    }

    /// Submit a signed multisig transaction for the other owners to confirm
    pub async fn propose_transaction(
        &self,
        safe_address: &str,
        body: &ProposeTransactionBody,
    ) -> Result<()> {
        let url = self.safe_url(safe_address, "multisig-transactions")?;
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TxServiceError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }
        tracing::info!(
            "Proposed transaction {} for Safe {}",
            body.contract_transaction_hash,
            safe_address
        );
        Ok(())
    }
}

fn balance_from_entry(
    entry: BalanceEntry,
    native_symbol: &str,
    native_decimals: u32,
) -> Result<TokenBalance> {
    let balance = U256::from_dec_str(&entry.balance)
        .map_err(|e| TxServiceError::InvalidResponse(format!("Invalid balance '{}': {}", entry.balance, e)))?;

    let Some(token_address) = entry.token_address else {
        return Ok(TokenBalance::native(native_symbol, native_decimals, balance));
    };

    let address: Address = token_address
        .parse()
        .map_err(|_| TxServiceError::InvalidResponse(format!("Invalid token address: {}", token_address)))?;
    let token = entry.token.ok_or_else(|| {
        TxServiceError::InvalidResponse(format!("Missing token metadata for {}", token_address))
    })?;

    Ok(TokenBalance {
        address: Some(address),
        name: token.name,
        symbol: token.symbol,
        decimals: token.decimals.unwrap_or(0),
        logo_uri: token.logo_uri,
        balance,
    })
}

/// How a load changed the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Updated { count: usize },
    NotModified,
    Failed(String),
}

/// Transaction lists per Safe and the remembered entity tag
#[derive(Debug, Clone, Default)]
pub struct TransactionCache {
    etag: Option<String>,
    transactions: HashMap<String, Vec<TransactionRecord>>,
}

impl TransactionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn transactions_for(&self, safe_address: &str) -> &[TransactionRecord] {
        self.transactions
            .get(safe_address)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Forget everything, e.g. when switching network
    pub fn clear(&mut self) {
        self.etag = None;
        self.transactions.clear();
    }

    /// Fold a fetch result into the cache. Only `Updated` touches the tag
    /// or the stored records.
    pub fn apply(&mut self, safe_address: &str, outcome: FetchOutcome) -> LoadOutcome {
        match outcome {
            FetchOutcome::Updated { etag, results } => {
                let count = results.len();
                self.etag = etag;
                self.transactions.insert(safe_address.to_string(), results);
                LoadOutcome::Updated { count }
            }
            FetchOutcome::NotModified => LoadOutcome::NotModified,
            FetchOutcome::Failed(reason) => LoadOutcome::Failed(reason),
        }
    }

    /// Load and report whether anything changed
    pub async fn load_all_transactions_outcome(
        &mut self,
        client: &TxServiceClient,
        params: &ServiceUriParams,
    ) -> LoadOutcome {
        let outcome = client
            .fetch_all_transactions(params, self.etag.as_deref())
            .await;
        self.apply(&params.safe_address, outcome)
    }

    /// Load and return `{safe: new records}`; the list is empty when nothing
    /// changed or the request failed.
    pub async fn load_all_transactions(
        &mut self,
        client: &TxServiceClient,
        params: &ServiceUriParams,
    ) -> HashMap<String, Vec<TransactionRecord>> {
        let results = match self.load_all_transactions_outcome(client, params).await {
            LoadOutcome::Updated { .. } => self.transactions_for(&params.safe_address).to_vec(),
            LoadOutcome::NotModified | LoadOutcome::Failed(_) => Vec::new(),
        };
        HashMap::from([(params.safe_address.clone(), results)])
    }
}

pub type SharedTransactionCache = Arc<Mutex<TransactionCache>>;

pub fn shared_cache() -> SharedTransactionCache {
    Arc::new(Mutex::new(TransactionCache::new()))
}

/// Background refresh of one Safe's transaction list
#[derive(Debug)]
pub struct TransactionPoller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TransactionPoller {
    /// Must be called from within a tokio runtime
    pub fn spawn(
        client: TxServiceClient,
        params: ServiceUriParams,
        cache: SharedTransactionCache,
        interval: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            tracing::info!(
                "Polling transactions of {} every {:?}",
                params.safe_address,
                interval
            );
            loop {
                let etag = cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .etag()
                    .map(str::to_string);

                let outcome = client.fetch_all_transactions(&params, etag.as_deref()).await;
                if token.is_cancelled() {
                    break;
                }

                let applied = cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .apply(&params.safe_address, outcome);
                if let LoadOutcome::Updated { count } = applied {
                    tracing::debug!("Loaded {} transactions for {}", count, params.safe_address);
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            tracing::debug!("Stopped polling transactions of {}", params.safe_address);
        });

        Self { cancel, handle }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TransactionPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hash: &str) -> TransactionRecord {
        serde_json::from_value(serde_json::json!({
            "txType": "MULTISIG_TRANSACTION",
            "safeTxHash": hash,
            "isExecuted": true,
            "isSuccessful": true,
        }))
        .unwrap()
    }

    // ==================== ServiceUriParams tests ====================

    #[test]
    fn test_query_pairs_only_present_params() {
        let params = ServiceUriParams::new("0x1", 50, 0);
        assert_eq!(
            params.query_pairs(),
            vec![("limit", "50".to_string()), ("offset", "0".to_string())]
        );
    }

    #[test]
    fn test_query_pairs_all_params() {
        let params = ServiceUriParams {
            order_by: Some("-timestamp".to_string()),
            queued: Some(false),
            trusted: Some(true),
            ..ServiceUriParams::new("0x1", 10, 20)
        };
        let pairs = params.query_pairs();
        assert_eq!(pairs.len(), 5);
        assert!(pairs.contains(&("orderBy", "-timestamp".to_string())));
        assert!(pairs.contains(&("queued", "false".to_string())));
        assert!(pairs.contains(&("trusted", "true".to_string())));
    }

    // ==================== TxServiceClient tests ====================

    #[test]
    fn test_client_new_empty_is_not_configured() {
        assert!(matches!(
            TxServiceClient::new("  "),
            Err(TxServiceError::NotConfigured)
        ));
    }

    #[test]
    fn test_client_new_invalid_url() {
        assert!(matches!(
            TxServiceClient::new("not a url"),
            Err(TxServiceError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_all_transactions_url_checksums_address() {
        let client = TxServiceClient::new("https://safe-transaction-mainnet.safe.global/api/").unwrap();
        let url = client
            .all_transactions_url("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed")
            .unwrap();
        assert_eq!(
            url,
            "https://safe-transaction-mainnet.safe.global/api/v1/safes/0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed/all-transactions/"
        );
    }

    #[test]
    fn test_all_transactions_url_rejects_bad_address() {
        let client = TxServiceClient::new("https://example.com/api").unwrap();
        assert!(client.all_transactions_url("0xnope").is_err());
    }

    // ==================== TransactionRecord tests ====================

    #[test]
    fn test_transaction_record_keeps_unknown_fields() {
        let record: TransactionRecord = serde_json::from_value(serde_json::json!({
            "txType": "ETHEREUM_TRANSACTION",
            "txHash": "0xabc",
            "transfers": [],
        }))
        .unwrap();

        assert_eq!(record.hash(), Some("0xabc"));
        assert_eq!(record.chain_hash(), Some("0xabc"));
        assert!(record.extra.contains_key("transfers"));
    }

    #[test]
    fn test_transaction_record_status_label() {
        let pending: TransactionRecord = serde_json::from_value(serde_json::json!({
            "txType": "MULTISIG_TRANSACTION",
            "isExecuted": false,
            "confirmationsRequired": 2,
            "confirmations": [{"owner": "0x1"}],
        }))
        .unwrap();
        assert!(pending.is_pending());
        assert_eq!(pending.status_label(), "Awaiting 1/2");

        let failed: TransactionRecord = serde_json::from_value(serde_json::json!({
            "isExecuted": true,
            "isSuccessful": false,
        }))
        .unwrap();
        assert_eq!(failed.status_label(), "Failed");
        assert_eq!(record("0x1").status_label(), "Success");
    }

    // ==================== TransactionCache tests ====================

    #[test]
    fn test_cache_apply_updated_replaces_records_and_tag() {
        let mut cache = TransactionCache::new();
        cache.apply(
            "0xsafe",
            FetchOutcome::Updated {
                etag: Some("\"a\"".to_string()),
                results: vec![record("0x1")],
            },
        );

        let outcome = cache.apply(
            "0xsafe",
            FetchOutcome::Updated {
                etag: Some("\"b\"".to_string()),
                results: vec![record("0x2"), record("0x3")],
            },
        );

        assert_eq!(outcome, LoadOutcome::Updated { count: 2 });
        assert_eq!(cache.etag(), Some("\"b\""));
        assert_eq!(cache.transactions_for("0xsafe").len(), 2);
    }

    #[test]
    fn test_cache_apply_not_modified_keeps_state() {
        let mut cache = TransactionCache::new();
        cache.apply(
            "0xsafe",
            FetchOutcome::Updated {
                etag: Some("\"a\"".to_string()),
                results: vec![record("0x1")],
            },
        );

        assert_eq!(cache.apply("0xsafe", FetchOutcome::NotModified), LoadOutcome::NotModified);
        assert_eq!(
            cache.apply("0xsafe", FetchOutcome::Failed("boom".to_string())),
            LoadOutcome::Failed("boom".to_string())
        );

        assert_eq!(cache.etag(), Some("\"a\""));
        assert_eq!(cache.transactions_for("0xsafe")[0].hash(), Some("0x1"));
    }

    #[test]
    fn test_cache_clear() {
        let mut cache = TransactionCache::new();
        cache.apply(
            "0xsafe",
            FetchOutcome::Updated {
                etag: Some("\"a\"".to_string()),
                results: vec![record("0x1")],
            },
        );
        cache.clear();
        assert!(cache.etag().is_none());
        assert!(cache.transactions_for("0xsafe").is_empty());
    }

    // ==================== balances tests ====================

    #[test]
    fn test_balance_from_entry_native() {
        let entry = BalanceEntry {
            token_address: None,
            token: None,
            balance: "1000".to_string(),
        };
        let balance = balance_from_entry(entry, "xDAI", 18).unwrap();
        assert!(balance.is_native());
        assert_eq!(balance.symbol, "xDAI");
        assert_eq!(balance.balance, U256::from(1000u64));
    }

    #[test]
    fn test_balance_from_entry_token_without_metadata_fails() {
        let entry = BalanceEntry {
            token_address: Some("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".to_string()),
            token: None,
            balance: "1".to_string(),
        };
        assert!(balance_from_entry(entry, "ETH", 18).is_err());
    }

    #[test]
    fn test_balance_from_entry_invalid_balance() {
        let entry = BalanceEntry {
            token_address: None,
            token: None,
            balance: "-1".to_string(),
        };
        assert!(balance_from_entry(entry, "ETH", 18).is_err());
    }

    #[test]
    fn test_propose_body_serializes_camel_case() {
        let body = ProposeTransactionBody {
            to: "0x1".to_string(),
            value: "0".to_string(),
            data: None,
            operation: 0,
            safe_tx_gas: "0".to_string(),
            base_gas: "0".to_string(),
            gas_price: "0".to_string(),
            gas_token: "0x0".to_string(),
            refund_receiver: "0x0".to_string(),
            nonce: 4,
            contract_transaction_hash: "0xhash".to_string(),
            sender: "0x2".to_string(),
            signature: "0xsig".to_string(),
            origin: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contractTransactionHash"], "0xhash");
        assert_eq!(json["safeTxGas"], "0");
        assert_eq!(json["nonce"], 4);
    }
}
