//! Desktop interface built with egui/eframe
//!
//! ## Module Structure
//!
//! - `app` - GuiApp, per-page state and the frame loop
//! - `async_job` - Background work polled from the UI thread
//! - `theme` - Colors, spacing and button styles (AppTheme)
//! - `helpers` - Fee text, formatting and the window icon
//! - `notifications` - Notification log and operation state polling
//! - `views` - Assets, Transactions, Settings, the Safes drawer and the send dialogs
//!
//! ## Usage
//!
//! ```no_run
//! use strongbox::config::Config;
//! use strongbox::gui;
//!
//! gui::launch(Config::default()).expect("Failed to launch GUI");
//! ```

mod app;
pub mod async_job;
pub mod helpers;
pub mod notifications;
pub mod theme;
pub mod views;

pub use app::{launch, GuiApp, GuiSection};

pub use async_job::AsyncJob;
pub use helpers::{app_icon, format_gwei, gas_estimation_text};
pub use notifications::{NotificationEntry, OperationState};
pub use theme::{configure_style, AppTheme};
