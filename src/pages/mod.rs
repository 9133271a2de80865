//! Persisted state of the individual pages
//!
//! Each page module owns its default state, its actions and reducer, and
//! the pruning that decides which fields reach storage.

pub mod new_tab;
pub mod playlist;
pub mod rewards;
pub mod wallet;

use crate::error::{Error, Result};
use crate::storage::{clear_state, load_state, LocalStore, PersistedState};
use clap::ValueEnum;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub use new_tab::NewTabState;
pub use playlist::PlaylistState;
pub use rewards::RewardsState;
pub use wallet::WalletState;

/// The pages with persisted state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum PageKind {
    NewTab,
    Rewards,
    Wallet,
    Playlist,
}

impl PageKind {
    pub const ALL: [PageKind; 4] = [
        PageKind::NewTab,
        PageKind::Rewards,
        PageKind::Wallet,
        PageKind::Playlist,
    ];

    /// Key of the page's item in the local store
    pub fn storage_key(self) -> &'static str {
        match self {
            PageKind::NewTab => NewTabState::STORAGE_KEY,
            PageKind::Rewards => RewardsState::STORAGE_KEY,
            PageKind::Wallet => WalletState::STORAGE_KEY,
            PageKind::Playlist => PlaylistState::STORAGE_KEY,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PageKind::NewTab => "new-tab",
            PageKind::Rewards => "rewards",
            PageKind::Wallet => "wallet",
            PageKind::Playlist => "playlist",
        }
    }

    /// The page's hydrated state (stored data over defaults) as JSON
    pub fn load_json(self, store: &dyn LocalStore) -> Result<Value> {
        match self {
            PageKind::NewTab => to_json(&load_state::<NewTabState>(store)),
            PageKind::Rewards => to_json(&load_state::<RewardsState>(store)),
            PageKind::Wallet => to_json(&load_state::<WalletState>(store)),
            PageKind::Playlist => to_json(&load_state::<PlaylistState>(store)),
        }
    }

    /// Remove the page's stored item; the next load yields defaults
    pub fn reset(self, store: &dyn LocalStore) -> Result<()> {
        match self {
            PageKind::NewTab => clear_state::<NewTabState>(store),
            PageKind::Rewards => clear_state::<RewardsState>(store),
            PageKind::Wallet => clear_state::<WalletState>(store),
            PageKind::Playlist => clear_state::<PlaylistState>(store),
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PageKind {
    type Err = Error;

    /// Accepts the page name (`new-tab`) or its storage key (`new-tab-data`)
    fn from_str(s: &str) -> Result<Self> {
        PageKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s || kind.storage_key() == s)
            .ok_or_else(|| Error::UnknownPage(s.to_string()))
    }
}

fn to_json<S: Serialize>(state: &S) -> Result<Value> {
    Ok(serde_json::to_value(state)?)
}

/// Serialized `state` minus the transient `fields`
pub(crate) fn without_fields<S: Serialize>(state: &S, fields: &[&str]) -> Result<Value> {
    let mut value = serde_json::to_value(state)?;
    if let Value::Object(map) = &mut value {
        for field in fields {
            map.remove(*field);
        }
    }
    Ok(value)
}

/// Serialized `state` restricted to `fields`
pub(crate) fn only_fields<S: Serialize>(state: &S, fields: &[&str]) -> Result<Value> {
    let mut map = match serde_json::to_value(state)? {
        Value::Object(map) => map,
        other => return Ok(other),
    };
    let kept: Map<String, Value> = fields
        .iter()
        .filter_map(|field| map.remove(*field).map(|v| (field.to_string(), v)))
        .collect();
    Ok(Value::Object(kept))
}
