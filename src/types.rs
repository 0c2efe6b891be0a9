//! Common types shared across modules.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// A tracked Safe as shown in the sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeEntry {
    pub name: String,
    pub address: String,
}

impl SafeEntry {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Token metadata plus the Safe's balance of it.
/// `address` is `None` for the chain's native coin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub address: Option<Address>,
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
    pub logo_uri: Option<String>,
    pub balance: U256,
}

impl TokenBalance {
    pub fn native(symbol: &str, decimals: u32, balance: U256) -> Self {
        Self {
            address: None,
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            decimals,
            logo_uri: None,
            balance,
        }
    }

    pub fn is_native(&self) -> bool {
        self.address.is_none()
    }
}

/// An allowance granted to a delegate through the allowance module.
/// Reset values are in minutes, as stored by the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendingLimit {
    pub delegate: Address,
    pub token: Address,
    pub amount: U256,
    pub spent: U256,
    pub reset_time_min: u64,
    pub last_reset_min: u64,
    pub nonce: u64,
}

impl SpendingLimit {
    /// Amount the delegate can still move before the next reset
    pub fn remaining(&self) -> U256 {
        self.amount.saturating_sub(self.spent)
    }
}
