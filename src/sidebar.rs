//! Sidebar drawer state: open/closed and the Safe search filter.

use crate::types::SafeEntry;
use eframe::egui::Key;

/// Safes whose address or name contains `filter`, ignoring case.
/// An empty filter keeps everything. Order is preserved.
pub fn filter_safes<'a>(filter: &str, safes: &'a [SafeEntry]) -> Vec<&'a SafeEntry> {
    let needle = filter.to_lowercase();
    safes
        .iter()
        .filter(|safe| {
            needle.is_empty()
                || safe.address.to_lowercase().contains(&needle)
                || safe.name.to_lowercase().contains(&needle)
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidebarState {
    pub is_open: bool,
    pub filter: String,
}

impl SidebarState {
    pub fn toggle(&mut self) {
        self.is_open = !self.is_open;
    }

    /// Escape toggles the drawer; other keys are ignored.
    /// Returns true when the key was handled.
    pub fn handle_key(&mut self, key: Key) -> bool {
        if key == Key::Escape {
            self.toggle();
            return true;
        }
        false
    }

    /// Click outside the drawer or on its backdrop
    pub fn click_away(&mut self) {
        if self.is_open {
            self.toggle();
        }
    }

    /// Picking a Safe from the list closes the drawer
    pub fn select_safe(&mut self) {
        self.toggle();
    }

    pub fn set_filter(&mut self, value: impl Into<String>) {
        self.filter = value.into();
    }

    pub fn cancel_filter(&mut self) {
        self.filter.clear();
    }

    pub fn filtered<'a>(&self, safes: &'a [SafeEntry]) -> Vec<&'a SafeEntry> {
        filter_safes(&self.filter, safes)
    }
}
