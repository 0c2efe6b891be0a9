//! Formatting helpers for the views and the window icon.

use crate::gas::{EstimationStatus, TransactionGasEstimation};
use eframe::egui;
use ethers::types::U256;

/// Keep at most `max` fractional digits and drop trailing zeros
fn trim_decimals(value: &str, max: usize) -> String {
    match value.split_once('.') {
        Some((int, frac)) => {
            let frac = &frac[..max.min(frac.len())];
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                int.to_string()
            } else {
                format!("{}.{}", int, frac)
            }
        }
        None => value.to_string(),
    }
}

/// Gas price in gwei with two decimals at most
pub fn format_gwei(wei: U256) -> String {
    match ethers::utils::format_units(wei, "gwei") {
        Ok(gwei) => trim_decimals(&gwei, 2),
        Err(_) => "?".to_string(),
    }
}

/// One line describing the network fee of the reviewed transaction
pub fn gas_estimation_text(estimation: &TransactionGasEstimation, native_symbol: &str) -> String {
    match estimation.status {
        EstimationStatus::Loading => "Estimating network fee...".to_string(),
        EstimationStatus::Failure => format!(
            "Could not estimate the fee, using {} gas",
            estimation.gas_estimation
        ),
        EstimationStatus::Success => format!(
            "{} {} ({} gas at {} gwei)",
            estimation.gas_cost_human_readable,
            native_symbol,
            estimation.gas_estimation,
            format_gwei(estimation.gas_price)
        ),
    }
}

/// Shorten `message` to `max` characters for the toast
pub fn truncate_message(message: &str, max: usize) -> String {
    if message.chars().count() > max {
        let head: String = message.chars().take(max).collect();
        format!("{}...", head)
    } else {
        message.to_string()
    }
}

/// Open `url` in the system browser, logging failures
pub fn open_in_browser(url: &str) {
    if let Err(e) = open::that(url) {
        tracing::warn!("Failed to open {}: {}", url, e);
    }
}

const ICON_SIZE: u32 = 64;

/// Window icon: a mint dial inside a dark vault door, drawn at startup
pub fn app_icon() -> egui::IconData {
    let center = (ICON_SIZE as f32 - 1.0) / 2.0;
    let mut rgba = Vec::with_capacity((ICON_SIZE * ICON_SIZE * 4) as usize);

    for y in 0..ICON_SIZE {
        for x in 0..ICON_SIZE {
            let dx = x as f32 - center;
            let dy = y as f32 - center;
            let r = (dx * dx + dy * dy).sqrt();
            let pixel = if r < 8.0 || (18.0..23.0).contains(&r) {
                [18, 255, 128, 255]
            } else if r < 31.0 {
                [28, 28, 28, 255]
            } else {
                [0, 0, 0, 0]
            };
            rgba.extend_from_slice(&pixel);
        }
    }

    egui::IconData {
        rgba,
        width: ICON_SIZE,
        height: ICON_SIZE,
    }
}
