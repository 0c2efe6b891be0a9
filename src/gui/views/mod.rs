//! View modules for the GUI
//!
//! Each page exports a `view_*` function taking `&mut GuiApp` and `&mut egui::Ui`,
//! called from `App::update`. Overlays (sidebar drawer, send dialogs) take the
//! `egui::Context` instead since they float above the panels.

pub mod balances;
pub mod send_funds;
pub mod settings;
pub mod sidebar;
pub mod transactions;

pub use balances::view_balances;
pub use settings::view_settings;
pub use transactions::view_transactions;
