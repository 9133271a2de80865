//! Persisted page state example
//!
//! Drives the playlist page through a `PageStore` backed by a directory
//! of JSON files, waits for the debounced save, then reads the stored
//! state back. Transient fields such as the currently playing item are
//! not written.

use prefsync::pages::playlist::{PlaylistAction, PlaylistItem, PlaylistState, DEFAULT_PLAYLIST_ID};
use prefsync::{load_state, FileStore, PageStore, PersistedState};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| env::temp_dir().join("prefsync-demo"));
    println!("Storing page state in: {}\n", dir.display());

    let store = Arc::new(FileStore::new(dir.clone()));
    let mut page = PageStore::<PlaylistState>::new(store.clone(), Duration::from_millis(100));

    page.dispatch(PlaylistAction::AddItem {
        playlist_id: DEFAULT_PLAYLIST_ID.to_string(),
        item: PlaylistItem {
            id: "talk-1".to_string(),
            name: "Conference talk".to_string(),
            media_src: "https://example.com/talk-1.mp4".to_string(),
            duration_secs: 1800.0,
        },
    });
    page.dispatch(PlaylistAction::Play {
        playlist_id: DEFAULT_PLAYLIST_ID.to_string(),
        item_id: "talk-1".to_string(),
    });
    let live = page.dispatch(PlaylistAction::UpdatePosition(42.5)).clone();
    println!("In memory, currently playing: {:?}", live.currently_playing);

    // Writes the pending save before stopping the writer
    page.shutdown().await?;

    let stored: PlaylistState = load_state(&*store);
    println!("Stored under {:?}:", PlaylistState::STORAGE_KEY);
    println!("{}", serde_json::to_string_pretty(&stored.persistable()?)?);
    println!("\nAfter reload, currently playing: {:?}", stored.currently_playing);
    if let Some(last) = stored.last_played {
        println!("Resume {} at {:.1}s", last.item_id, last.position_secs);
    }

    Ok(())
}
