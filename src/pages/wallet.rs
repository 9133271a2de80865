//! Wallet panel view state
//!
//! The lock flag and pending transactions are never stored: a reloaded
//! wallet starts locked with an empty queue.

use crate::error::Result;
use crate::reducer::PageState;
use crate::storage::PersistedState;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    Day,
    Week,
    Month,
    Year,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub id: String,
    pub to: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletState {
    /// Chain id of the selected network
    pub selected_network: String,
    pub selected_account: Option<String>,
    pub hide_balances: bool,
    pub portfolio_time_range: TimeRange,
    pub favorite_apps: Vec<String>,
    pub is_locked: bool,
    pub pending_transactions: Vec<PendingTransaction>,
}

impl Default for WalletState {
    fn default() -> Self {
        Self {
            selected_network: "0x1".to_string(),
            selected_account: None,
            hide_balances: false,
            portfolio_time_range: TimeRange::Day,
            favorite_apps: Vec::new(),
            is_locked: true,
            pending_transactions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WalletAction {
    SelectNetwork(String),
    SelectAccount(String),
    SetHideBalances(bool),
    SetPortfolioTimeRange(TimeRange),
    AddFavoriteApp(String),
    RemoveFavoriteApp(String),
    Lock,
    Unlock,
    QueueTransaction(PendingTransaction),
    /// Approved or rejected; either way it leaves the queue
    ResolveTransaction(String),
}

impl PersistedState for WalletState {
    const STORAGE_KEY: &'static str = "wallet-data";

    fn persistable(&self) -> Result<Value> {
        super::without_fields(self, &["is_locked", "pending_transactions"])
    }
}

impl PageState for WalletState {
    type Action = WalletAction;

    fn reduce(&mut self, action: WalletAction) {
        match action {
            WalletAction::SelectNetwork(chain_id) => self.selected_network = chain_id,
            WalletAction::SelectAccount(address) => self.selected_account = Some(address),
            WalletAction::SetHideBalances(hide) => self.hide_balances = hide,
            WalletAction::SetPortfolioTimeRange(range) => self.portfolio_time_range = range,
            WalletAction::AddFavoriteApp(app) => {
                if !self.favorite_apps.contains(&app) {
                    self.favorite_apps.push(app);
                }
            }
            WalletAction::RemoveFavoriteApp(app) => self.favorite_apps.retain(|a| *a != app),
            WalletAction::Lock => {
                self.is_locked = true;
                self.pending_transactions.clear();
            }
            WalletAction::Unlock => self.is_locked = false,
            WalletAction::QueueTransaction(tx) => {
                if !self.is_locked {
                    self.pending_transactions.push(tx);
                }
            }
            WalletAction::ResolveTransaction(id) => {
                self.pending_transactions.retain(|tx| tx.id != id)
            }
        }
    }
}
