//! Playlist page

use crate::error::Result;
use crate::reducer::PageState;
use crate::storage::PersistedState;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_PLAYLIST_ID: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    Off,
    One,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub id: String,
    pub name: String,
    pub media_src: String,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub items: Vec<PlaylistItem>,
}

/// Where playback stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastPlayed {
    pub playlist_id: String,
    pub item_id: String,
    pub position_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistState {
    pub playlists: Vec<Playlist>,
    pub last_played: Option<LastPlayed>,
    pub autoplay: bool,
    pub loop_mode: LoopMode,
    /// Item id of the media element's current source
    pub currently_playing: Option<String>,
}

impl Default for PlaylistState {
    fn default() -> Self {
        Self {
            playlists: vec![Playlist {
                id: DEFAULT_PLAYLIST_ID.to_string(),
                name: "Play Later".to_string(),
                items: Vec::new(),
            }],
            last_played: None,
            autoplay: true,
            loop_mode: LoopMode::Off,
            currently_playing: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistAction {
    CreatePlaylist { id: String, name: String },
    /// The default playlist cannot be deleted
    DeletePlaylist(String),
    AddItem { playlist_id: String, item: PlaylistItem },
    RemoveItem { playlist_id: String, item_id: String },
    Play { playlist_id: String, item_id: String },
    UpdatePosition(f64),
    Stop,
    SetAutoplay(bool),
    SetLoopMode(LoopMode),
}

impl PlaylistState {
    pub fn playlist(&self, id: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.id == id)
    }

    fn playlist_mut(&mut self, id: &str) -> Option<&mut Playlist> {
        self.playlists.iter_mut().find(|p| p.id == id)
    }

    fn forget_last_played_if(&mut self, matches: impl Fn(&LastPlayed) -> bool) {
        if self.last_played.as_ref().is_some_and(&matches) {
            self.last_played = None;
            self.currently_playing = None;
        }
    }
}

impl PersistedState for PlaylistState {
    const STORAGE_KEY: &'static str = "playlist-data";

    fn persistable(&self) -> Result<Value> {
        super::without_fields(self, &["currently_playing"])
    }
}

impl PageState for PlaylistState {
    type Action = PlaylistAction;

    fn reduce(&mut self, action: PlaylistAction) {
        match action {
            PlaylistAction::CreatePlaylist { id, name } => {
                if self.playlist(&id).is_none() {
                    self.playlists.push(Playlist {
                        id,
                        name,
                        items: Vec::new(),
                    });
                }
            }
            PlaylistAction::DeletePlaylist(id) => {
                if id != DEFAULT_PLAYLIST_ID {
                    self.playlists.retain(|p| p.id != id);
                    self.forget_last_played_if(|last| last.playlist_id == id);
                }
            }
            PlaylistAction::AddItem { playlist_id, item } => {
                if let Some(playlist) = self.playlist_mut(&playlist_id) {
                    if !playlist.items.iter().any(|i| i.id == item.id) {
                        playlist.items.push(item);
                    }
                }
            }
            PlaylistAction::RemoveItem {
                playlist_id,
                item_id,
            } => {
                if let Some(playlist) = self.playlist_mut(&playlist_id) {
                    playlist.items.retain(|i| i.id != item_id);
                }
                self.forget_last_played_if(|last| {
                    last.playlist_id == playlist_id && last.item_id == item_id
                });
            }
            PlaylistAction::Play {
                playlist_id,
                item_id,
            } => {
                let exists = self
                    .playlist(&playlist_id)
                    .is_some_and(|p| p.items.iter().any(|i| i.id == item_id));
                if exists {
                    self.currently_playing = Some(item_id.clone());
                    self.last_played = Some(LastPlayed {
                        playlist_id,
                        item_id,
                        position_secs: 0.0,
                    });
                }
            }
            PlaylistAction::UpdatePosition(position) => {
                if let Some(last) = self.last_played.as_mut() {
                    last.position_secs = position.max(0.0);
                }
            }
            PlaylistAction::Stop => self.currently_playing = None,
            PlaylistAction::SetAutoplay(autoplay) => self.autoplay = autoplay,
            PlaylistAction::SetLoopMode(mode) => self.loop_mode = mode,
        }
    }
}
