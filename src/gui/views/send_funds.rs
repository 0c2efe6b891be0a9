//! Send-funds form and the review screen.
//!
//! The form validates a draft, the review screen computes the payload after it
//! opens, estimates the fee and submits.

use crate::{
    contracts,
    gas::{estimate_tx_gas_costs, TransactionGasEstimation},
    safe_ledger::EthersLedger,
    submit::{
        choose_submission, submit_transaction, EthersSubmitter, ReviewState, ReviewTx,
        Submission, SubmissionReceipt, SubmitOutcome, TxType, SPENDING_LIMIT_TAG,
    },
    transactions::TxServiceClient,
    types::{SpendingLimit, TokenBalance},
    utils,
    wallet::Wallet,
};
use anyhow::{anyhow, Result};
use eframe::egui::{self, RichText};
use ethers::types::Address;

use super::super::app::GuiApp;
use super::super::helpers::gas_estimation_text;
use super::super::notifications::format_failure;

/// Allowance the connected delegate holds for `token`, if any
pub(crate) fn limit_for_token<'a>(
    limits: &'a [SpendingLimit],
    token: &TokenBalance,
) -> Option<&'a SpendingLimit> {
    let address = token.address.unwrap_or_else(Address::zero);
    limits.iter().find(|limit| limit.token == address)
}

/// Validate the form into a draft. With `limit` the transfer goes through
/// the spending limit and must fit in what is left of it.
pub(crate) fn build_review(
    recipient: &str,
    amount: &str,
    token: &TokenBalance,
    limit: Option<&SpendingLimit>,
) -> Result<ReviewTx> {
    let recipient_address = utils::parse_address(recipient)?;
    if recipient_address.is_zero() {
        return Err(anyhow!("Recipient cannot be the zero address"));
    }

    let amount = amount.trim();
    let value = utils::to_token_unit(amount, token.decimals)?;
    if value.is_zero() {
        return Err(anyhow!("Amount must be greater than zero"));
    }
    if value > token.balance {
        return Err(anyhow!("Amount exceeds the Safe's {} balance", token.symbol));
    }

    if let Some(limit) = limit {
        if value > limit.remaining() {
            return Err(anyhow!(
                "Amount exceeds the remaining spending limit of {} {}",
                utils::format_amount(&utils::from_token_unit(limit.remaining(), token.decimals)),
                token.symbol
            ));
        }
    }
    let tx_type = TxType::from_tag(limit.map(|_| SPENDING_LIMIT_TAG));
    let token_spending_limit = limit.cloned();

    Ok(ReviewTx {
        recipient_address,
        amount: amount.to_string(),
        token_address: token.address,
        tx_type,
        token_spending_limit,
    })
}

fn open_review(app: &mut GuiApp, review: ReviewTx) {
    app.gas_estimator.reset();
    app.send.review = Some(ReviewState::new(review, &app.balances.tokens));
    app.send.review_error = None;
}

/// Compute the payload on the first frame of the review screen, then estimate
fn prepare_review_if_needed(app: &mut GuiApp) {
    let Some(review) = app.send.review.as_mut() else {
        return;
    };
    if review.prepared.is_some() || app.send.review_error.is_some() {
        return;
    }
    if review.token.is_none() {
        app.send.review_error = Some("The token is no longer held by this Safe".to_string());
        return;
    }
    if let Err(e) = review.prepare() {
        app.send.review_error = Some(format!("{:#}", e));
        return;
    }
    start_gas_estimation(app);
}

pub(crate) fn start_gas_estimation(app: &mut GuiApp) {
    let (Some(review), Some(safe)) = (app.send.review.clone(), app.selected_safe_address()) else {
        return;
    };
    let from = app.wallet_status.address().unwrap_or_else(Address::zero);
    let config = app.config.clone();

    if review.is_spending_limit() {
        let (Some(token), Some(prepared)) = (review.token.as_ref(), review.prepared.as_ref()) else {
            return;
        };
        let call = config.require_spending_limit_module().and_then(|module| {
            match choose_submission(&review.review, token, prepared, safe)? {
                Submission::SpendingLimit(transfer) => {
                    Ok((module, contracts::encode_execute_allowance_transfer(&transfer)?))
                }
                Submission::Standard(_) => Err(anyhow!("No spending limit selected")),
            }
        });
        let (module, data) = match call {
            Ok(call) => call,
            Err(e) => {
                app.send.review_error = Some(format!("{:#}", e));
                return;
            }
        };
        app.send.delegate_gas_job = Some(app.spawn_job(move || async move {
            let ledger = EthersLedger::from_config(&config)?;
            estimate_tx_gas_costs(&ledger, from, module, data).await
        }));
        return;
    }

    let Some(input) = review.gas_estimation_input(safe, from, config.native_decimals()) else {
        return;
    };
    let estimator = app.gas_estimator.clone();
    app.send.gas_job = Some(app.spawn_job(move || async move {
        let ledger = EthersLedger::from_config(&config)?;
        Ok(estimator.estimate(&ledger, &input).await)
    }));
}

fn start_submit(app: &mut GuiApp) {
    let (Some(state), Some(safe)) = (app.send.review.clone(), app.selected_safe_address()) else {
        return;
    };
    let config = app.config.clone();
    let settings = app.user_settings.clone();
    app.send.review_error = None;
    app.send.submit_job = Some(app.spawn_job(move || async move {
        let ledger = EthersLedger::from_config(&config)?;
        let wallet = Wallet::from_settings(&settings)?;
        let tx_service = TxServiceClient::from_config(&config).ok();
        let submitter = EthersSubmitter::new(
            ledger,
            wallet,
            config.chain_id,
            tx_service,
            config.spending_limit_module,
        );
        Ok(submit_transaction(&submitter, &state, safe).await)
    }));
}

pub(crate) fn poll_send_jobs(app: &mut GuiApp) {
    let native_decimals = app.config.native_decimals();

    if let Some(job) = &mut app.send.gas_job {
        if let Some(result) = job.poll() {
            app.send.gas_job = None;
            if let Err(e) = result {
                tracing::error!("Gas estimation could not start: {:#}", e);
                let token = app.gas_estimator.start_request();
                app.gas_estimator
                    .publish(&token, TransactionGasEstimation::fallback(native_decimals));
            }
        }
    }

    if let Some(job) = &mut app.send.delegate_gas_job {
        if let Some(result) = job.poll() {
            app.send.delegate_gas_job = None;
            match result {
                Ok(info) => {
                    if let Some(review) = app.send.review.as_mut() {
                        review.set_gas_info(info, native_decimals);
                    }
                }
                Err(e) => tracing::warn!("Spending limit fee estimation failed: {:#}", e),
            }
        }
    }

    if let Some(job) = &mut app.send.submit_job {
        if let Some(result) = job.poll() {
            app.send.submit_job = None;
            match result {
                Ok(outcome) => handle_submit_outcome(app, outcome),
                Err(e) => {
                    tracing::error!("Submission could not start: {:#}", e);
                    app.send.review_error = Some(GuiApp::failure_text(&e));
                }
            }
        }
    }
}

fn handle_submit_outcome(app: &mut GuiApp, outcome: SubmitOutcome) {
    let should_close = outcome.should_close();
    match outcome {
        SubmitOutcome::Submitted(SubmissionReceipt::Executed { tx_hash, .. }) => {
            app.notify(format!("Transaction executed: {:?}", tx_hash));
        }
        SubmitOutcome::Submitted(SubmissionReceipt::Proposed { safe_tx_hash }) => {
            app.notify(format!(
                "Transaction {:?} proposed, waiting for other owners",
                safe_tx_hash
            ));
        }
        SubmitOutcome::AllowanceSent(tx_hash) => {
            app.notify(format!("Spending limit transfer sent: {:?}", tx_hash));
        }
        SubmitOutcome::Failed(reason) => {
            app.notify(format!("Transaction failed: {}", reason));
        }
        SubmitOutcome::KeepOpen(reason) => {
            app.send.review_error = Some(format_failure(&reason));
        }
        SubmitOutcome::NotReady => {
            app.send.review_error = Some("The transaction is still being prepared".to_string());
        }
    }

    if should_close {
        app.send.close();
        app.gas_estimator.reset();
        app.start_balances_load();
        app.start_transactions_refresh();
    }
}

/// Send-funds form or review screen, whichever is open
pub fn show_send_windows(app: &mut GuiApp, ctx: &egui::Context) {
    if app.send.review.is_some() {
        prepare_review_if_needed(app);
        show_review_window(app, ctx);
    } else if app.send.form_open {
        show_form_window(app, ctx);
    }
}

fn show_form_window(app: &mut GuiApp, ctx: &egui::Context) {
    let theme = app.theme;
    let mut open = true;
    let mut review_requested = false;

    egui::Window::new("Send funds")
        .open(&mut open)
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            if app.balances.tokens.is_empty() {
                ui.label(RichText::new("This Safe holds no assets yet.").color(theme.text_secondary));
                return;
            }
            app.send.token_index = app.send.token_index.min(app.balances.tokens.len() - 1);

            egui::Grid::new("send_form_grid")
                .num_columns(2)
                .spacing([theme.spacing_md, theme.spacing_sm])
                .show(ui, |ui| {
                    ui.label("Asset:");
                    let selected = &app.balances.tokens[app.send.token_index];
                    egui::ComboBox::from_id_source("send_token")
                        .selected_text(format!("{} ({})", selected.symbol, selected.name))
                        .width(260.0)
                        .show_ui(ui, |ui| {
                            for (idx, token) in app.balances.tokens.iter().enumerate() {
                                ui.selectable_value(
                                    &mut app.send.token_index,
                                    idx,
                                    format!("{} · {}", token.symbol, token.name),
                                );
                            }
                        });
                    ui.end_row();

                    let token = &app.balances.tokens[app.send.token_index];
                    ui.label("Amount:");
                    ui.horizontal(|ui| {
                        ui.add(
                            egui::TextEdit::singleline(&mut app.send.amount)
                                .hint_text("0.0")
                                .desired_width(180.0),
                        );
                        if ui.add(egui::Button::new("Max").small()).clicked() {
                            app.send.amount = utils::from_token_unit(token.balance, token.decimals);
                        }
                    });
                    ui.end_row();

                    ui.label("");
                    ui.label(
                        RichText::new(format!(
                            "Balance: {} {}",
                            utils::format_amount(&utils::from_token_unit(token.balance, token.decimals)),
                            token.symbol
                        ))
                        .small()
                        .color(theme.text_secondary),
                    );
                    ui.end_row();

                    ui.label("Recipient:");
                    ui.add(
                        egui::TextEdit::singleline(&mut app.send.recipient)
                            .hint_text("0x…")
                            .font(egui::TextStyle::Monospace)
                            .desired_width(380.0),
                    );
                    ui.end_row();

                    if let Some(limit) = limit_for_token(&app.send.spending_limits, token) {
                        ui.label("Spending limit:");
                        ui.checkbox(
                            &mut app.send.use_spending_limit,
                            format!(
                                "Use my allowance ({} {} left)",
                                utils::format_amount(&utils::from_token_unit(
                                    limit.remaining(),
                                    token.decimals
                                )),
                                token.symbol
                            ),
                        );
                        ui.end_row();
                    }
                });

            if let Some(err) = &app.send.form_error {
                ui.add_space(theme.spacing_sm);
                ui.colored_label(theme.error, err.as_str());
            }

            ui.add_space(theme.spacing_md);
            if ui.add(theme.button_primary("Review")).clicked() {
                review_requested = true;
            }
        });

    if !open {
        app.send.close();
        return;
    }

    if review_requested {
        let Some(token) = app.balances.tokens.get(app.send.token_index) else {
            return;
        };
        let limit = if app.send.use_spending_limit {
            limit_for_token(&app.send.spending_limits, token)
        } else {
            None
        };
        match build_review(&app.send.recipient, &app.send.amount, token, limit) {
            Ok(review) => {
                app.send.form_error = None;
                open_review(app, review);
            }
            Err(e) => app.send.form_error = Some(e.to_string()),
        }
    }
}

fn show_review_window(app: &mut GuiApp, ctx: &egui::Context) {
    let Some(review) = app.send.review.clone() else {
        return;
    };
    let theme = app.theme;
    let native_symbol = app.config.native_token().to_string();
    let estimation = app.gas_estimator.current();
    let submitting = app.send.submit_job.is_some();
    let safe_label = app
        .selected_safe()
        .map(|safe| format!("{} ({})", safe.name, utils::short_address(&safe.address)))
        .unwrap_or_default();

    let mut back = false;
    let mut submit = false;
    let mut reestimate = false;

    egui::Window::new("Review transaction")
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            let symbol = review.token.as_ref().map(|t| t.symbol.as_str()).unwrap_or("?");

            egui::Grid::new("review_grid")
                .num_columns(2)
                .spacing([theme.spacing_md, theme.spacing_sm])
                .show(ui, |ui| {
                    ui.label("From Safe:");
                    ui.label(RichText::new(&safe_label).monospace());
                    ui.end_row();

                    ui.label("To:");
                    ui.label(RichText::new(utils::checksum(&review.review.recipient_address)).monospace());
                    ui.end_row();

                    ui.label("Amount:");
                    ui.label(
                        RichText::new(format!("{} {}", review.review.amount, symbol))
                            .strong()
                            .color(theme.primary),
                    );
                    ui.end_row();

                    ui.label("Type:");
                    if review.is_spending_limit() {
                        ui.label("Spending limit transfer");
                    } else if estimation.is_loading() {
                        ui.label("Safe transaction");
                    } else if estimation.is_execution {
                        ui.label("Safe transaction, executed now");
                    } else {
                        ui.label("Safe transaction, needs more confirmations");
                    }
                    ui.end_row();

                    ui.label("Network fee:");
                    if review.is_spending_limit() {
                        match &review.formatted_total_gas {
                            Some(total) => ui.label(format!("{} {}", total, native_symbol)),
                            None if app.send.delegate_gas_job.is_some() => {
                                ui.label("Estimating network fee...")
                            }
                            None => ui.label(RichText::new("Unavailable").color(theme.text_secondary)),
                        };
                    } else {
                        ui.horizontal(|ui| {
                            ui.label(gas_estimation_text(&estimation, &native_symbol));
                            if review.prepared.is_some()
                                && !estimation.is_loading()
                                && ui.add(egui::Button::new("↻").small()).on_hover_text("Estimate again").clicked()
                            {
                                reestimate = true;
                            }
                        });
                    }
                    ui.end_row();
                });

            if let Some(err) = &app.send.review_error {
                ui.add_space(theme.spacing_sm);
                ui.colored_label(theme.error, err.as_str());
            }

            ui.add_space(theme.spacing_md);
            ui.horizontal(|ui| {
                if ui.add_enabled(!submitting, theme.button_secondary("Back")).clicked() {
                    back = true;
                }
                if ui
                    .add_enabled(review.can_submit() && !submitting, theme.button_primary("Submit"))
                    .clicked()
                {
                    submit = true;
                }
                if submitting {
                    ui.spinner();
                    ui.label(RichText::new("Confirm on your wallet...").color(theme.text_secondary));
                }
            });
        });

    if back {
        app.send.close_review();
        app.gas_estimator.reset();
    } else if submit {
        start_submit(app);
    } else if reestimate {
        start_gas_estimation(app);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;

    const RECIPIENT: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn usdc(balance: u64) -> TokenBalance {
        TokenBalance {
            address: Some(Address::repeat_byte(0xaa)),
            name: "USD Coin".to_string(),
            symbol: "USDC".to_string(),
            decimals: 6,
            logo_uri: None,
            balance: U256::from(balance),
        }
    }

    fn limit(token: Address, amount: u64, spent: u64) -> SpendingLimit {
        SpendingLimit {
            delegate: Address::repeat_byte(1),
            token,
            amount: U256::from(amount),
            spent: U256::from(spent),
            reset_time_min: 0,
            last_reset_min: 0,
            nonce: 0,
        }
    }

    #[test]
    fn test_build_review_standard() {
        let review = build_review(RECIPIENT, " 1.5 ", &usdc(2_000_000), None).unwrap();
        assert_eq!(review.amount, "1.5");
        assert_eq!(review.tx_type, TxType::Standard);
        assert_eq!(review.token_address, Some(Address::repeat_byte(0xaa)));
        assert!(review.token_spending_limit.is_none());
    }

    #[test]
    fn test_build_review_rejects_bad_input() {
        let token = usdc(2_000_000);
        assert!(build_review("nope", "1", &token, None).is_err());
        assert!(build_review(&format!("{:?}", Address::zero()), "1", &token, None).is_err());
        assert!(build_review(RECIPIENT, "0", &token, None).is_err());
        let err = build_review(RECIPIENT, "3", &token, None).unwrap_err();
        assert!(err.to_string().contains("USDC balance"));
    }

    #[test]
    fn test_build_review_with_spending_limit() {
        let token = usdc(10_000_000);
        let allowance = limit(Address::repeat_byte(0xaa), 2_000_000, 500_000);

        let review = build_review(RECIPIENT, "1.5", &token, Some(&allowance)).unwrap();
        assert_eq!(review.tx_type, TxType::SpendingLimit);
        assert_eq!(review.token_spending_limit, Some(allowance.clone()));

        let err = build_review(RECIPIENT, "1.6", &token, Some(&allowance)).unwrap_err();
        assert!(err.to_string().contains("remaining spending limit"));
    }

    #[test]
    fn test_limit_for_token_matches_native_as_zero_address() {
        let limits = vec![
            limit(Address::zero(), 1, 0),
            limit(Address::repeat_byte(0xaa), 2, 0),
        ];
        let native = TokenBalance::native("ETH", 18, U256::one());

        assert_eq!(limit_for_token(&limits, &native).unwrap().amount, U256::from(1u64));
        assert_eq!(limit_for_token(&limits, &usdc(1)).unwrap().amount, U256::from(2u64));
        assert!(limit_for_token(&limits[..1], &usdc(1)).is_none());
    }
}
