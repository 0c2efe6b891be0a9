pub mod config;
pub mod contracts;
pub mod error;
pub mod gas;
pub mod gui;
pub mod safe_ledger;
pub mod sidebar;
pub mod submit;
pub mod transactions;
pub mod types;
pub mod user_settings;
pub mod utils;
pub mod wallet;
