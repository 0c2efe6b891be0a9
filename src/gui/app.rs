//! Main GUI application module
//!
//! Holds the GuiApp state, background job wiring, and the frame loop.

use crate::{
    config::{Config, NetworkCategory, NETWORKS},
    error::TxServiceError,
    gas::{GasEstimationInfo, GasEstimator},
    safe_ledger::{EthersLedger, SafeLedger},
    sidebar::SidebarState,
    submit::{ReviewState, SubmitOutcome},
    transactions::{
        shared_cache, ServiceUriParams, SharedTransactionCache, TransactionPoller,
        TxServiceClient,
    },
    types::{SafeEntry, SpendingLimit, TokenBalance},
    user_settings::{CustomNetwork, UserSettings},
    utils,
    wallet::{Wallet, WalletStatus},
};
use anyhow::{anyhow, Result};
use eframe::{egui, egui::RichText, App, Frame, NativeOptions};
use ethers::prelude::{Address, Middleware};
use std::collections::VecDeque;
use std::sync::{MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

use super::async_job::AsyncJob;
use super::helpers::{app_icon, truncate_message};
use super::notifications::{
    format_failure, poll_operation_state, push_notification, NotificationEntry, OperationState,
};
use super::theme::{configure_style, AppTheme};
use super::views;

/// Page size requested from the transaction service
pub(crate) const TX_PAGE_SIZE: u32 = 50;

const TOAST_DURATION: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuiSection {
    Balances,
    Transactions,
    Settings,
}

#[derive(Default)]
pub(crate) struct BalancesState {
    pub(crate) tokens: Vec<TokenBalance>,
    pub(crate) job: Option<AsyncJob<Vec<TokenBalance>>>,
    pub(crate) error: Option<String>,
}

/// One-shot "refresh now" of the transaction list, next to the poller
#[derive(Default)]
pub(crate) struct TransactionsViewState {
    pub(crate) job: Option<AsyncJob<String>>,
    pub(crate) status: Option<String>,
}

impl OperationState for TransactionsViewState {
    fn job_mut(&mut self) -> &mut Option<AsyncJob<String>> {
        &mut self.job
    }

    fn status_mut(&mut self) -> &mut Option<String> {
        &mut self.status
    }
}

/// Send-funds form and the review screen that follows it
#[derive(Default)]
pub(crate) struct SendFundsState {
    pub(crate) form_open: bool,
    pub(crate) recipient: String,
    pub(crate) amount: String,
    pub(crate) token_index: usize,
    pub(crate) use_spending_limit: bool,
    pub(crate) form_error: Option<String>,
    pub(crate) spending_limits: Vec<SpendingLimit>,
    pub(crate) limits_job: Option<AsyncJob<Vec<SpendingLimit>>>,
    pub(crate) review: Option<ReviewState>,
    pub(crate) review_error: Option<String>,
    pub(crate) gas_job: Option<AsyncJob<bool>>,
    pub(crate) delegate_gas_job: Option<AsyncJob<GasEstimationInfo>>,
    pub(crate) submit_job: Option<AsyncJob<SubmitOutcome>>,
}

impl SendFundsState {
    /// Close both dialogs and forget the draft. Loaded spending limits stay.
    pub(crate) fn close(&mut self) {
        let spending_limits = std::mem::take(&mut self.spending_limits);
        *self = Self {
            spending_limits,
            ..Self::default()
        };
    }

    pub(crate) fn close_review(&mut self) {
        self.review = None;
        self.review_error = None;
        self.gas_job = None;
        self.delegate_gas_job = None;
    }
}

#[derive(Default)]
pub(crate) struct AddSafeFormState {
    pub(crate) name: String,
    pub(crate) address: String,
    pub(crate) error: Option<String>,
}

/// Represents either a built-in network or a custom network selection
#[derive(Clone, Debug, PartialEq)]
pub enum NetworkSelection {
    /// Index into the static NETWORKS array
    Builtin(usize),
    /// Chain ID of a custom network
    Custom(u64),
}

impl NetworkSelection {
    fn from_chain_id(chain_id: u64, custom_networks: &[CustomNetwork]) -> Self {
        if let Some(idx) = crate::config::find_network_index(chain_id) {
            NetworkSelection::Builtin(idx)
        } else if custom_networks.iter().any(|n| n.chain_id == chain_id) {
            NetworkSelection::Custom(chain_id)
        } else {
            NetworkSelection::Builtin(0)
        }
    }
}

#[derive(Default)]
pub struct CustomNetworkFormState {
    pub label: String,
    pub chain_id: String,
    pub native_token: String,
    pub rpc_url: String,
    pub tx_service_url: String,
    pub error: Option<String>,
}

impl CustomNetworkFormState {
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    /// Validate the inputs into a network definition
    pub(crate) fn to_network(&self) -> Result<CustomNetwork> {
        let label = self.label.trim();
        if label.is_empty() {
            return Err(anyhow!("Name is required"));
        }
        let chain_id: u64 = self
            .chain_id
            .trim()
            .parse()
            .map_err(|_| anyhow!("Chain ID must be a number"))?;
        let rpc_url = self.rpc_url.trim();
        url::Url::parse(rpc_url).map_err(|e| anyhow!("Invalid RPC URL: {}", e))?;
        let tx_service_url = self.tx_service_url.trim();
        if !tx_service_url.is_empty() {
            url::Url::parse(tx_service_url)
                .map_err(|e| anyhow!("Invalid transaction service URL: {}", e))?;
        }
        let native_token = match self.native_token.trim() {
            "" => "ETH",
            token => token,
        };
        Ok(CustomNetwork::new(
            label.to_string(),
            chain_id,
            native_token.to_string(),
            rpc_url.to_string(),
            tx_service_url.to_string(),
        ))
    }
}

pub struct GuiApp {
    pub(crate) config: Config,
    pub(crate) user_settings: UserSettings,
    pub(crate) theme: AppTheme,
    pub(crate) section: GuiSection,
    pub(crate) notifications: VecDeque<NotificationEntry>,
    pub(crate) show_notifications_popup: bool,
    pub(crate) notification_toast_visible: bool,
    pub(crate) notification_toast_close_time: Option<Instant>,
    pub(crate) last_notification_count: usize,
    // Network selection
    pub(crate) network_selection: NetworkSelection,
    pub(crate) custom_rpc: String,
    pub(crate) use_custom_rpc: bool,
    pub(crate) custom_network_form: CustomNetworkFormState,
    // Safes
    pub(crate) sidebar: SidebarState,
    pub(crate) add_safe_form: AddSafeFormState,
    pub(crate) balances: BalancesState,
    pub(crate) tx_cache: SharedTransactionCache,
    pub(crate) tx_view: TransactionsViewState,
    /// Hosts the transaction poller
    runtime: Option<Runtime>,
    poller: Option<TransactionPoller>,
    // Sending
    pub(crate) send: SendFundsState,
    pub(crate) gas_estimator: GasEstimator,
    // Wallet
    pub(crate) wallet_status: WalletStatus,
    pub(crate) wallet_job: Option<AsyncJob<(Address, String)>>,
}

impl GuiApp {
    fn new(config: Config, ctx: &egui::Context) -> Self {
        let theme = AppTheme::default();
        configure_style(ctx, &theme);

        let user_settings = UserSettings::load();

        let network_selection = NetworkSelection::from_chain_id(
            user_settings.selected_chain_id,
            &user_settings.custom_networks,
        );

        let mut config = match &network_selection {
            NetworkSelection::Builtin(idx) => Config::from_network(&NETWORKS[*idx]),
            NetworkSelection::Custom(chain_id) => user_settings
                .get_custom_network(*chain_id)
                .map(Config::from_custom_network)
                .unwrap_or(config),
        };
        let custom_rpc = user_settings
            .get_custom_rpc(config.chain_id)
            .cloned()
            .unwrap_or_default();
        let use_custom_rpc = !custom_rpc.is_empty();
        if use_custom_rpc {
            config.rpc_url = custom_rpc.clone();
        }
        config.ledger_account_index = user_settings.ledger_account_index;

        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("tx-poller")
            .enable_all()
            .build()
        {
            Ok(runtime) => Some(runtime),
            Err(e) => {
                tracing::error!("Failed to create poller runtime: {}", e);
                None
            }
        };

        let mut app = Self {
            config,
            user_settings,
            theme,
            section: GuiSection::Balances,
            notifications: VecDeque::with_capacity(20),
            show_notifications_popup: false,
            notification_toast_visible: false,
            notification_toast_close_time: None,
            last_notification_count: 0,
            network_selection,
            custom_rpc,
            use_custom_rpc,
            custom_network_form: CustomNetworkFormState::default(),
            sidebar: SidebarState::default(),
            add_safe_form: AddSafeFormState::default(),
            balances: BalancesState::default(),
            tx_cache: shared_cache(),
            tx_view: TransactionsViewState::default(),
            runtime,
            poller: None,
            send: SendFundsState::default(),
            gas_estimator: GasEstimator::new(),
            wallet_status: WalletStatus::Disconnected,
            wallet_job: None,
        };

        // No Safe yet: start with the drawer open so one can be added
        if app.user_settings.safes.is_empty() {
            app.sidebar.toggle();
        }
        app.reload_safe_data();
        app.start_wallet_connect();
        app
    }

    pub(crate) fn spawn_job<T, FutBuilder, Fut>(&self, builder: FutBuilder) -> AsyncJob<T>
    where
        T: Send + 'static,
        FutBuilder: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<T>> + 'static,
    {
        AsyncJob::spawn(builder)
    }

    pub(crate) fn notify(&mut self, message: impl Into<String>) {
        push_notification(&mut self.notifications, message);
    }

    fn save_settings(&mut self) {
        if let Err(e) = self.user_settings.save() {
            tracing::error!("Failed to save settings: {}", e);
            self.notify(format!("Could not save settings: {}", e));
        }
    }

    pub(crate) fn selected_safe(&self) -> Option<&SafeEntry> {
        self.user_settings
            .selected_safe
            .as_deref()
            .and_then(|address| self.user_settings.get_safe(address))
    }

    pub(crate) fn selected_safe_address(&self) -> Option<Address> {
        self.selected_safe()
            .and_then(|safe| utils::parse_address(&safe.address).ok())
    }

    pub(crate) fn tx_cache(&self) -> MutexGuard<'_, crate::transactions::TransactionCache> {
        self.tx_cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `address` the open Safe and reload everything shown for it
    pub(crate) fn select_safe(&mut self, address: &str) {
        if self.user_settings.selected_safe.as_deref() == Some(address) {
            return;
        }
        self.user_settings.selected_safe = Some(address.to_string());
        self.save_settings();
        tracing::info!("Opened Safe {}", address);
        self.reload_safe_data();
    }

    pub(crate) fn add_safe(&mut self, name: &str, address: &str) -> Result<()> {
        let address = utils::checksum(&utils::parse_address(address)?);
        let name = match name.trim() {
            "" => utils::short_address(&address),
            name => name.to_string(),
        };
        if !self.user_settings.add_safe(SafeEntry::new(name.clone(), address.clone())) {
            self.notify(format!("Renamed Safe {} to {}", utils::short_address(&address), name));
        } else {
            self.notify(format!("Added Safe {}", name));
        }
        self.save_settings();
        if self.user_settings.selected_safe.is_none() {
            self.select_safe(&address);
        }
        Ok(())
    }

    pub(crate) fn remove_safe(&mut self, address: &str) {
        if !self.user_settings.remove_safe(address) {
            return;
        }
        let was_selected = self
            .user_settings
            .selected_safe
            .as_deref()
            .is_some_and(|selected| utils::same_address(selected, address));
        if was_selected {
            self.user_settings.selected_safe =
                self.user_settings.safes.first().map(|safe| safe.address.clone());
            self.reload_safe_data();
        }
        self.save_settings();
    }

    /// Drop per-Safe state and start loading it for the current Safe and network
    pub(crate) fn reload_safe_data(&mut self) {
        self.balances = BalancesState::default();
        self.send.close();
        self.send.spending_limits.clear();
        self.gas_estimator.reset();
        self.tx_view = TransactionsViewState::default();
        self.restart_poller();
        self.start_balances_load();
        self.start_spending_limits_load();
    }

    fn restart_poller(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        self.tx_cache().clear();

        let Some(safe) = self.user_settings.selected_safe.clone() else {
            return;
        };
        let Some(runtime) = &self.runtime else {
            return;
        };
        let client = match TxServiceClient::from_config(&self.config) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("Transaction history unavailable: {}", e);
                return;
            }
        };

        let _guard = runtime.enter();
        self.poller = Some(TransactionPoller::spawn(
            client,
            ServiceUriParams::new(safe, TX_PAGE_SIZE, 0),
            self.tx_cache.clone(),
            Duration::from_secs(self.config.poll_interval_secs),
        ));
    }

    pub(crate) fn start_balances_load(&mut self) {
        let Some(safe) = self.user_settings.selected_safe.clone() else {
            return;
        };
        let config = self.config.clone();
        self.balances.error = None;
        self.balances.job = Some(self.spawn_job(move || async move {
            match TxServiceClient::from_config(&config) {
                Ok(client) => Ok(client
                    .fetch_safe_balances(&safe, config.native_token(), config.native_decimals())
                    .await?),
                // Without a service only the native balance is known
                Err(TxServiceError::NotConfigured) => {
                    let provider = config.get_provider()?;
                    let balance = provider
                        .get_balance(utils::parse_address(&safe)?, None)
                        .await?;
                    Ok(vec![TokenBalance::native(
                        config.native_token(),
                        config.native_decimals(),
                        balance,
                    )])
                }
                Err(e) => Err(e.into()),
            }
        }));
    }

    /// Refresh the transaction list now instead of waiting for the poller
    pub(crate) fn start_transactions_refresh(&mut self) {
        let Some(safe) = self.user_settings.selected_safe.clone() else {
            return;
        };
        let config = self.config.clone();
        let cache = self.tx_cache.clone();
        self.tx_view.status = None;
        self.tx_view.job = Some(self.spawn_job(move || async move {
            let client = TxServiceClient::from_config(&config)?;
            let params = ServiceUriParams::new(safe.clone(), TX_PAGE_SIZE, 0);
            let etag = cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .etag()
                .map(str::to_string);
            let outcome = client.fetch_all_transactions(&params, etag.as_deref()).await;
            let applied = cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .apply(&safe, outcome);
            match applied {
                crate::transactions::LoadOutcome::Updated { count } => {
                    Ok(format!("Loaded {} transactions", count))
                }
                crate::transactions::LoadOutcome::NotModified => {
                    Ok("Transaction list is up to date".to_string())
                }
                crate::transactions::LoadOutcome::Failed(reason) => Err(anyhow!(reason)),
            }
        }));
    }

    pub(crate) fn start_wallet_connect(&mut self) {
        if self.wallet_job.is_some() {
            return;
        }
        let settings = self.user_settings.clone();
        let chain_id = self.config.chain_id;
        self.wallet_status = WalletStatus::Connecting;
        self.wallet_job = Some(self.spawn_job(move || async move {
            let wallet = Wallet::from_settings(&settings)?;
            let address = wallet.address(chain_id).await?;
            Ok((address, wallet.kind_label()))
        }));
    }

    /// Allowances granted to the connected account by the open Safe
    pub(crate) fn start_spending_limits_load(&mut self) {
        let (Some(safe), Some(delegate)) = (self.selected_safe_address(), self.wallet_status.address())
        else {
            return;
        };
        if self.config.spending_limit_module.is_none() {
            return;
        }
        let config = self.config.clone();
        self.send.limits_job = Some(self.spawn_job(move || async move {
            let ledger = EthersLedger::from_config(&config)?;
            ledger.spending_limits(safe, delegate).await
        }));
    }

    /// Get the display info for the currently selected network
    pub(crate) fn selected_network_info(&self) -> (String, String, u64, String) {
        // Returns (label, native_token, chain_id, default_rpc)
        match &self.network_selection {
            NetworkSelection::Builtin(idx) => {
                let net = &NETWORKS[*idx];
                (
                    net.label.to_string(),
                    net.native_token.to_string(),
                    net.chain_id,
                    net.default_rpc.to_string(),
                )
            }
            NetworkSelection::Custom(chain_id) => {
                if let Some(net) = self.user_settings.get_custom_network(*chain_id) {
                    (net.label.clone(), net.native_token.clone(), net.chain_id, net.rpc_url.clone())
                } else {
                    ("Unknown".to_string(), "ETH".to_string(), *chain_id, String::new())
                }
            }
        }
    }

    pub(crate) fn apply_network_selection(&mut self) {
        let mut config = match &self.network_selection {
            NetworkSelection::Builtin(idx) => Config::from_network(&NETWORKS[*idx]),
            NetworkSelection::Custom(chain_id) => match self.user_settings.get_custom_network(*chain_id) {
                Some(net) => Config::from_custom_network(net),
                None => {
                    let (_, _, chain_id, rpc) = self.selected_network_info();
                    Config::new(rpc, chain_id)
                }
            },
        };
        self.custom_rpc = self
            .user_settings
            .get_custom_rpc(config.chain_id)
            .cloned()
            .unwrap_or_default();
        self.use_custom_rpc = !self.custom_rpc.is_empty();
        if self.use_custom_rpc {
            config.rpc_url = self.custom_rpc.clone();
        }
        config.ledger_account_index = self.user_settings.ledger_account_index;
        self.config = config;

        self.user_settings.selected_chain_id = self.config.chain_id;
        self.save_settings();

        // A different chain may give a different address for the same Ledger account
        self.wallet_status = WalletStatus::Disconnected;
        self.wallet_job = None;
        self.reload_safe_data();
        self.start_wallet_connect();
    }

    fn poll_jobs(&mut self) {
        if let Some(job) = &mut self.balances.job {
            if let Some(result) = job.poll() {
                self.balances.job = None;
                match result {
                    Ok(tokens) => {
                        tracing::info!("Loaded {} balances", tokens.len());
                        self.balances.tokens = tokens;
                    }
                    Err(e) => {
                        tracing::error!("Failed to load balances: {:#}", e);
                        self.balances.error = Some(format!("{:#}", e));
                    }
                }
            }
        }

        poll_operation_state(&mut self.tx_view, &mut self.notifications);

        if let Some(job) = &mut self.wallet_job {
            if let Some(result) = job.poll() {
                self.wallet_job = None;
                match result {
                    Ok((address, label)) => {
                        self.notify(format!("Connected {} {}", label, utils::checksum(&address)));
                        self.wallet_status = WalletStatus::Connected { address, label };
                        self.start_spending_limits_load();
                    }
                    Err(e) => {
                        tracing::warn!("Wallet connection failed: {:#}", e);
                        self.wallet_status = WalletStatus::Error(format!("{:#}", e));
                    }
                }
            }
        }

        if let Some(job) = &mut self.send.limits_job {
            if let Some(result) = job.poll() {
                self.send.limits_job = None;
                match result {
                    Ok(limits) => self.send.spending_limits = limits,
                    Err(e) => tracing::warn!("Failed to load spending limits: {:#}", e),
                }
            }
        }

        views::send_funds::poll_send_jobs(self);
    }

    /// Render a consistent section header
    pub(crate) fn render_section_header(&self, ui: &mut egui::Ui, icon: &str, title: &str) {
        ui.label(
            RichText::new(self.theme.section_header_text(icon, title))
                .size(22.0)
                .strong()
                .color(self.theme.text_primary),
        );
        if let Some(safe) = self.selected_safe() {
            ui.label(
                RichText::new(format!("{} · {}", safe.name, safe.address))
                    .monospace()
                    .color(self.theme.text_secondary),
            );
        }
        ui.separator();
    }

    fn render_network_selector(&mut self, ui: &mut egui::Ui) {
        let (current_label, current_token, _, _) = self.selected_network_info();
        let display_text = format!("{} ({})", current_label, current_token);
        let mut new_selection = None;

        egui::ComboBox::from_id_source("network_selector")
            .selected_text(display_text.as_str())
            .width(200.0)
            .show_ui(ui, |ui| {
                ui.set_min_width(240.0);
                let mut last_category: Option<NetworkCategory> = None;

                for (idx, network) in NETWORKS.iter().enumerate() {
                    if last_category != Some(network.category) {
                        if last_category.is_some() {
                            ui.separator();
                        }
                        let header = match network.category {
                            NetworkCategory::EthereumMainnet => "── Ethereum ──",
                            NetworkCategory::EthereumTestnet => "── Testnets ──",
                            NetworkCategory::L2Mainnet => "── L2 Networks ──",
                            NetworkCategory::OtherMainnet => "── Other Chains ──",
                        };
                        ui.label(RichText::new(header).color(self.theme.text_secondary).small());
                        last_category = Some(network.category);
                    }
                    let label = format!("{} · {} · #{}", network.label, network.native_token, network.chain_id);
                    let is_selected = self.network_selection == NetworkSelection::Builtin(idx);
                    if ui.selectable_label(is_selected, label.as_str()).clicked() {
                        new_selection = Some(NetworkSelection::Builtin(idx));
                    }
                }

                if !self.user_settings.custom_networks.is_empty() {
                    ui.separator();
                    ui.label(RichText::new("── Custom Networks ──").color(self.theme.accent).small());
                    for net in &self.user_settings.custom_networks {
                        let label = format!("{} · {} · #{}", net.label, net.native_token, net.chain_id);
                        let is_selected = self.network_selection == NetworkSelection::Custom(net.chain_id);
                        if ui.selectable_label(is_selected, label.as_str()).clicked() {
                            new_selection = Some(NetworkSelection::Custom(net.chain_id));
                        }
                    }
                }
            });

        if let Some(selection) = new_selection {
            if selection != self.network_selection {
                self.network_selection = selection;
                self.apply_network_selection();
                let label = self.config.network_label().to_string();
                self.notify(format!("Switched to {}", label));
            }
        }
    }

    fn render_wallet_indicator(&mut self, ui: &mut egui::Ui) {
        let (status_color, status_text, hover) = match &self.wallet_status {
            WalletStatus::Connected { address, label } => {
                let address = utils::checksum(address);
                (self.theme.success, utils::short_address(&address), format!("{}: {}", label, address))
            }
            WalletStatus::Connecting => (
                self.theme.accent,
                "Connecting...".to_string(),
                "Confirm on your device if asked".to_string(),
            ),
            WalletStatus::Disconnected => (
                self.theme.text_secondary,
                "No wallet".to_string(),
                "Not connected".to_string(),
            ),
            WalletStatus::Error(e) => (self.theme.error, "Wallet error".to_string(), e.clone()),
        };

        self.theme.frame_surface().inner_margin(egui::Margin::symmetric(8.0, 4.0)).show(ui, |ui| {
            ui.horizontal(|ui| {
                if ui
                    .add_enabled(self.wallet_job.is_none(), egui::Button::new("↻").small())
                    .on_hover_text("Reconnect wallet")
                    .clicked()
                {
                    self.start_wallet_connect();
                }
                ui.label(RichText::new("●").color(status_color)).on_hover_text(hover.as_str());
                ui.label(RichText::new(status_text).monospace()).on_hover_text(hover.as_str());
            });
        });
    }

    fn render_notifications(&mut self, ctx: &egui::Context) {
        let current_notification_count = self.notifications.len();
        if current_notification_count > self.last_notification_count {
            self.notification_toast_visible = true;
            self.notification_toast_close_time = Some(Instant::now() + TOAST_DURATION);
        }
        self.last_notification_count = current_notification_count;

        if let Some(close_time) = self.notification_toast_close_time {
            if Instant::now() >= close_time {
                self.notification_toast_visible = false;
                self.notification_toast_close_time = None;
            }
        }

        let latest = self.notifications.back().map(|n| n.message.clone());
        egui::Area::new(egui::Id::new("notification_overlay"))
            .anchor(egui::Align2::RIGHT_BOTTOM, [-10.0, -10.0])
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                self.theme.frame_panel().inner_margin(egui::Margin::symmetric(8.0, 6.0)).show(ui, |ui| {
                    ui.horizontal(|ui| {
                        let icon_color = if self.notifications.is_empty() {
                            self.theme.text_secondary
                        } else {
                            self.theme.primary
                        };
                        if ui
                            .add(
                                egui::Button::new(RichText::new("🔔").color(icon_color))
                                    .fill(egui::Color32::TRANSPARENT),
                            )
                            .on_hover_text("Notification history")
                            .clicked()
                        {
                            self.show_notifications_popup = !self.show_notifications_popup;
                        }
                        if self.notification_toast_visible {
                            if let Some(msg) = &latest {
                                ui.label(RichText::new(truncate_message(msg, 60)).size(12.0));
                            }
                        } else if !self.notifications.is_empty() {
                            ui.label(
                                RichText::new(self.notifications.len().to_string())
                                    .size(10.0)
                                    .color(self.theme.warning),
                            );
                        }
                    });
                });
            });

        if self.show_notifications_popup {
            let mut open = true;
            egui::Window::new("Notifications")
                .open(&mut open)
                .collapsible(false)
                .resizable(true)
                .default_width(450.0)
                .anchor(egui::Align2::RIGHT_BOTTOM, [-10.0, -50.0])
                .show(ctx, |ui| {
                    ui.horizontal(|ui| {
                        ui.label(
                            RichText::new(format!("{} notifications", self.notifications.len()))
                                .color(self.theme.text_secondary),
                        );
                        if ui.add(self.theme.button_small("Clear")).clicked() {
                            self.notifications.clear();
                            self.last_notification_count = 0;
                        }
                    });
                    ui.separator();
                    egui::ScrollArea::vertical().max_height(280.0).show(ui, |ui| {
                        if self.notifications.is_empty() {
                            ui.label(RichText::new("No notifications yet.").color(self.theme.text_secondary));
                        }
                        for notification in self.notifications.iter().rev() {
                            ui.horizontal_wrapped(|ui| {
                                ui.label(
                                    RichText::new(format!("[{}]", notification.time_ago()))
                                        .size(11.0)
                                        .color(self.theme.text_secondary),
                                );
                                ui.label(RichText::new(&notification.message).size(12.0));
                            });
                        }
                    });
                });
            self.show_notifications_popup = open;
        }
    }

    pub(crate) fn failure_text(error: &anyhow::Error) -> String {
        format_failure(&format!("{:#}", error))
    }
}

impl App for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.poll_jobs();

        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.sidebar.handle_key(egui::Key::Escape);
        }

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.add_space(self.theme.spacing_sm);
            ui.horizontal(|ui| {
                if ui
                    .add(egui::Button::new(RichText::new("☰").size(18.0)).frame(false))
                    .on_hover_text("Safes (Esc)")
                    .clicked()
                {
                    self.sidebar.toggle();
                }
                ui.label(RichText::new("Strongbox").size(20.0).strong().color(self.theme.primary));
                ui.label(
                    RichText::new(format!("v{}", env!("CARGO_PKG_VERSION")))
                        .size(12.0)
                        .color(self.theme.text_secondary),
                );

                let nav_items = [
                    (GuiSection::Balances, "Assets"),
                    (GuiSection::Transactions, "Transactions"),
                    (GuiSection::Settings, "Settings"),
                ];
                ui.add_space(self.theme.spacing_md);
                for (section, label) in nav_items {
                    if ui.selectable_label(self.section == section, label).clicked() {
                        self.section = section;
                    }
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    self.render_network_selector(ui);
                    ui.add_space(self.theme.spacing_sm);
                    self.render_wallet_indicator(ui);
                });
            });
            ui.add_space(self.theme.spacing_sm);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(self.theme.spacing_md);
            egui::ScrollArea::vertical().show(ui, |ui| match self.section {
                GuiSection::Balances => views::view_balances(self, ui),
                GuiSection::Transactions => views::view_transactions(self, ui),
                GuiSection::Settings => views::view_settings(self, ui),
            });
        });

        views::send_funds::show_send_windows(self, ctx);
        views::sidebar::show_sidebar(self, ctx);
        self.render_notifications(ctx);

        // The poller fills the cache in the background
        ctx.request_repaint_after(Duration::from_millis(250));
    }
}

pub fn launch(mut config: Config) -> Result<()> {
    let user_settings = UserSettings::load();
    if let Some(network) = crate::config::find_network_by_chain_id(user_settings.selected_chain_id) {
        config = Config::from_network(network);
    }

    let app_creator = move |cc: &eframe::CreationContext<'_>| {
        Box::new(GuiApp::new(config.clone(), &cc.egui_ctx)) as Box<dyn App>
    };

    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1100.0, 720.0])
        .with_min_inner_size([720.0, 480.0])
        .with_icon(std::sync::Arc::new(app_icon()));

    let native_options = NativeOptions {
        viewport,
        persist_window: true,
        ..Default::default()
    };

    eframe::run_native("Strongbox - Safe multisig client", native_options, Box::new(app_creator))
        .map_err(|e| anyhow!("Failed to start GUI: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;

    fn form() -> CustomNetworkFormState {
        CustomNetworkFormState {
            label: " Devnet ".to_string(),
            chain_id: "31337".to_string(),
            native_token: String::new(),
            rpc_url: "http://127.0.0.1:8545".to_string(),
            tx_service_url: String::new(),
            error: None,
        }
    }

    #[test]
    fn test_custom_network_form_to_network() {
        let network = form().to_network().unwrap();
        assert_eq!(network.label, "Devnet");
        assert_eq!(network.chain_id, 31337);
        assert_eq!(network.native_token, "ETH");
        assert!(network.tx_service_url.is_empty());
    }

    #[test]
    fn test_custom_network_form_rejects_bad_input() {
        let mut bad_chain = form();
        bad_chain.chain_id = "abc".to_string();
        assert!(bad_chain.to_network().is_err());

        let mut bad_rpc = form();
        bad_rpc.rpc_url = "not a url".to_string();
        assert!(bad_rpc.to_network().is_err());

        let mut no_name = form();
        no_name.label = "  ".to_string();
        assert!(no_name.to_network().is_err());
    }

    #[test]
    fn test_network_selection_from_chain_id() {
        let custom = vec![form().to_network().unwrap()];
        assert_eq!(
            NetworkSelection::from_chain_id(1, &custom),
            NetworkSelection::Builtin(crate::config::find_network_index(1).unwrap())
        );
        assert_eq!(NetworkSelection::from_chain_id(31337, &custom), NetworkSelection::Custom(31337));
        assert_eq!(NetworkSelection::from_chain_id(999_999, &custom), NetworkSelection::Builtin(0));
    }

    #[test]
    fn test_send_funds_close_keeps_limits() {
        let mut state = SendFundsState {
            form_open: true,
            amount: "1".to_string(),
            spending_limits: vec![SpendingLimit {
                delegate: Address::repeat_byte(1),
                token: Address::zero(),
                amount: U256::from(10u64),
                spent: U256::zero(),
                reset_time_min: 0,
                last_reset_min: 0,
                nonce: 0,
            }],
            ..SendFundsState::default()
        };
        state.close();
        assert!(!state.form_open);
        assert!(state.amount.is_empty());
        assert_eq!(state.spending_limits.len(), 1);
    }
}
