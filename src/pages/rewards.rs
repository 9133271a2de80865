//! Rewards panel
//!
//! Only the user's settings and UI flags are stored. The balance comes
//! from the ledger every time the panel opens, and `initializing` only
//! describes the current session.

use crate::error::Result;
use crate::reducer::PageState;
use crate::storage::PersistedState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const PERSISTED_FIELDS: &[&str] = &[
    "enabled_ads",
    "enabled_contribute",
    "contribution_min_time",
    "contribution_min_visits",
    "contribution_monthly",
    "excluded_publishers",
    "ui",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub total: f64,
    pub wallets: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardsUi {
    pub onboarding_seen: bool,
    pub modal_backup: bool,
    /// Open modal, if any
    pub modal_redirect: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardsState {
    pub enabled_ads: bool,
    pub enabled_contribute: bool,
    /// Seconds on a site before it counts as a visit
    pub contribution_min_time: u64,
    pub contribution_min_visits: u32,
    pub contribution_monthly: f64,
    pub excluded_publishers: Vec<String>,
    pub ui: RewardsUi,
    pub balance: Balance,
    pub initializing: bool,
}

impl Default for RewardsState {
    fn default() -> Self {
        Self {
            enabled_ads: false,
            enabled_contribute: false,
            contribution_min_time: 8,
            contribution_min_visits: 1,
            contribution_monthly: 5.0,
            excluded_publishers: Vec::new(),
            ui: RewardsUi::default(),
            balance: Balance::default(),
            initializing: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RewardsAction {
    SetAdsEnabled(bool),
    SetContributeEnabled(bool),
    SetContributionMinTime(u64),
    SetContributionMinVisits(u32),
    SetContributionMonthly(f64),
    ExcludePublisher(String),
    RestorePublishers,
    BalanceReceived(Balance),
    Initialized,
    DismissOnboarding,
    OpenModal(String),
    CloseModal,
}

impl PersistedState for RewardsState {
    const STORAGE_KEY: &'static str = "rewards-data";

    fn persistable(&self) -> Result<Value> {
        super::only_fields(self, PERSISTED_FIELDS)
    }
}

impl PageState for RewardsState {
    type Action = RewardsAction;

    fn reduce(&mut self, action: RewardsAction) {
        match action {
            RewardsAction::SetAdsEnabled(enabled) => self.enabled_ads = enabled,
            RewardsAction::SetContributeEnabled(enabled) => self.enabled_contribute = enabled,
            RewardsAction::SetContributionMinTime(secs) => self.contribution_min_time = secs,
            RewardsAction::SetContributionMinVisits(visits) => {
                self.contribution_min_visits = visits
            }
            RewardsAction::SetContributionMonthly(amount) => {
                if amount.is_finite() && amount >= 0.0 {
                    self.contribution_monthly = amount;
                }
            }
            RewardsAction::ExcludePublisher(publisher) => {
                if !self.excluded_publishers.contains(&publisher) {
                    self.excluded_publishers.push(publisher);
                }
            }
            RewardsAction::RestorePublishers => self.excluded_publishers.clear(),
            RewardsAction::BalanceReceived(balance) => self.balance = balance,
            RewardsAction::Initialized => self.initializing = false,
            RewardsAction::DismissOnboarding => self.ui.onboarding_seen = true,
            RewardsAction::OpenModal(name) => {
                self.ui.modal_backup = name == "backup";
                self.ui.modal_redirect = Some(name);
            }
            RewardsAction::CloseModal => {
                self.ui.modal_backup = false;
                self.ui.modal_redirect = None;
            }
        }
    }
}
