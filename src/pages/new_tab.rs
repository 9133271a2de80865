//! New tab page: widget toggles, clock, top-site tiles and blocking stats

use crate::error::Result;
use crate::reducer::PageState;
use crate::storage::PersistedState;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockFormat {
    /// Follow the locale
    Auto,
    H12,
    H24,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Widget {
    BackgroundImage,
    Stats,
    Clock,
    TopSites,
    Rewards,
    News,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopSite {
    pub url: String,
    pub title: String,
    pub pinned: bool,
}

/// Counters reported by the browser each time the page opens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub ads_blocked: u64,
    pub trackers_blocked: u64,
    pub https_upgrades: u64,
    pub bandwidth_saved_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTabState {
    pub show_background_image: bool,
    pub show_stats: bool,
    pub show_clock: bool,
    pub clock_format: ClockFormat,
    pub show_top_sites: bool,
    pub show_rewards: bool,
    pub show_news: bool,
    pub grid_sites: Vec<TopSite>,
    /// Most recent removal last; popped by undo
    pub removed_sites: Vec<TopSite>,
    pub initial_data_loaded: bool,
    pub stats: Stats,
}

impl Default for NewTabState {
    fn default() -> Self {
        Self {
            show_background_image: true,
            show_stats: true,
            show_clock: true,
            clock_format: ClockFormat::Auto,
            show_top_sites: true,
            show_rewards: true,
            show_news: false,
            grid_sites: Vec::new(),
            removed_sites: Vec::new(),
            initial_data_loaded: false,
            stats: Stats::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NewTabAction {
    SetWidgetVisible(Widget, bool),
    SetClockFormat(ClockFormat),
    /// Fresh data from the browser when the page opens
    DataReceived { top_sites: Vec<TopSite>, stats: Stats },
    RemoveSite(String),
    UndoRemoveSite,
    RestoreAllSites,
    TogglePinned(String),
}

impl NewTabState {
    pub fn is_widget_visible(&self, widget: Widget) -> bool {
        match widget {
            Widget::BackgroundImage => self.show_background_image,
            Widget::Stats => self.show_stats,
            Widget::Clock => self.show_clock,
            Widget::TopSites => self.show_top_sites,
            Widget::Rewards => self.show_rewards,
            Widget::News => self.show_news,
        }
    }

    fn widget_flag(&mut self, widget: Widget) -> &mut bool {
        match widget {
            Widget::BackgroundImage => &mut self.show_background_image,
            Widget::Stats => &mut self.show_stats,
            Widget::Clock => &mut self.show_clock,
            Widget::TopSites => &mut self.show_top_sites,
            Widget::Rewards => &mut self.show_rewards,
            Widget::News => &mut self.show_news,
        }
    }

    fn is_removed(&self, url: &str) -> bool {
        self.removed_sites.iter().any(|site| site.url == url)
    }
}

impl PersistedState for NewTabState {
    const STORAGE_KEY: &'static str = "new-tab-data";

    fn persistable(&self) -> Result<Value> {
        super::without_fields(self, &["initial_data_loaded", "stats"])
    }
}

impl PageState for NewTabState {
    type Action = NewTabAction;

    fn reduce(&mut self, action: NewTabAction) {
        match action {
            NewTabAction::SetWidgetVisible(widget, visible) => {
                *self.widget_flag(widget) = visible;
            }
            NewTabAction::SetClockFormat(format) => self.clock_format = format,
            NewTabAction::DataReceived { top_sites, stats } => {
                // Pinned tiles keep their place; removed ones stay hidden.
                let mut grid: Vec<TopSite> = self
                    .grid_sites
                    .iter()
                    .filter(|site| site.pinned)
                    .cloned()
                    .collect();
                for site in top_sites {
                    if !self.is_removed(&site.url) && !grid.iter().any(|s| s.url == site.url) {
                        grid.push(site);
                    }
                }
                self.grid_sites = grid;
                self.stats = stats;
                self.initial_data_loaded = true;
            }
            NewTabAction::RemoveSite(url) => {
                if let Some(index) = self.grid_sites.iter().position(|s| s.url == url) {
                    let site = self.grid_sites.remove(index);
                    self.removed_sites.push(site);
                }
            }
            NewTabAction::UndoRemoveSite => {
                if let Some(site) = self.removed_sites.pop() {
                    self.grid_sites.push(site);
                }
            }
            NewTabAction::RestoreAllSites => {
                self.grid_sites.append(&mut self.removed_sites);
            }
            NewTabAction::TogglePinned(url) => {
                if let Some(site) = self.grid_sites.iter_mut().find(|s| s.url == url) {
                    site.pinned = !site.pinned;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{load_state, save_state, LocalStore, MemoryStore};

    fn site(url: &str) -> TopSite {
        TopSite {
            url: url.to_string(),
            title: url.to_string(),
            pinned: false,
        }
    }

    fn urls(state: &NewTabState) -> Vec<&str> {
        state.grid_sites.iter().map(|s| s.url.as_str()).collect()
    }

    fn loaded(sites: &[&str]) -> NewTabState {
        let mut state = NewTabState::default();
        state.reduce(NewTabAction::DataReceived {
            top_sites: sites.iter().map(|u| site(u)).collect(),
            stats: Stats {
                ads_blocked: 42,
                ..Stats::default()
            },
        });
        state
    }

    #[test]
    fn test_toggle_widgets() {
        let mut state = NewTabState::default();
        state.reduce(NewTabAction::SetWidgetVisible(Widget::Clock, false));
        state.reduce(NewTabAction::SetWidgetVisible(Widget::News, true));
        assert!(!state.is_widget_visible(Widget::Clock));
        assert!(state.is_widget_visible(Widget::News));
    }

    #[test]
    fn test_remove_undo_and_restore_sites() {
        let mut state = loaded(&["a.com", "b.com", "c.com"]);
        state.reduce(NewTabAction::RemoveSite("a.com".to_string()));
        state.reduce(NewTabAction::RemoveSite("b.com".to_string()));
        assert_eq!(urls(&state), vec!["c.com"]);

        state.reduce(NewTabAction::UndoRemoveSite);
        assert_eq!(urls(&state), vec!["c.com", "b.com"]);

        state.reduce(NewTabAction::RestoreAllSites);
        assert_eq!(urls(&state), vec!["c.com", "b.com", "a.com"]);
        assert!(state.removed_sites.is_empty());
    }

    #[test]
    fn test_refresh_hides_removed_and_keeps_pinned() {
        let mut state = loaded(&["a.com", "b.com"]);
        state.reduce(NewTabAction::TogglePinned("b.com".to_string()));
        state.reduce(NewTabAction::RemoveSite("a.com".to_string()));

        state.reduce(NewTabAction::DataReceived {
            top_sites: vec![site("a.com"), site("d.com"), site("b.com")],
            stats: Stats::default(),
        });
        assert_eq!(urls(&state), vec!["b.com", "d.com"]);
        assert!(state.grid_sites[0].pinned);
    }

    #[test]
    fn test_stats_and_load_flag_are_not_persisted() {
        let store = MemoryStore::new();
        let mut state = loaded(&["a.com"]);
        state.reduce(NewTabAction::SetClockFormat(ClockFormat::H24));
        save_state(&store, &state).unwrap();

        let raw: Value = serde_json::from_str(&store.get_item("new-tab-data").unwrap().unwrap())
            .unwrap();
        assert!(raw.get("stats").is_none());
        assert!(raw.get("initial_data_loaded").is_none());
        assert_eq!(raw["clock_format"], Value::String("h24".to_string()));

        let reloaded: NewTabState = load_state(&store);
        assert_eq!(reloaded.clock_format, ClockFormat::H24);
        assert_eq!(urls(&reloaded), vec!["a.com"]);
        assert_eq!(reloaded.stats, Stats::default());
        assert!(!reloaded.initial_data_loaded);
    }
}
