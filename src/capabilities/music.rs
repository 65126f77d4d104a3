//! Music capability: playlist lookup by fuzzy name

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::prompts::{builtin, render};
use crate::storage::{keys, MemoryStore};

use super::{AssistantAction, CapabilityError, CapabilityReply};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(alias = "spotifyUrl")]
    pub url: String,
}

impl Playlist {
    fn new(id: &str, name: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

/// Source of the user's saved playlists
#[async_trait]
pub trait PlaylistCatalog: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Playlist>, CapabilityError>;
}

/// Catalog persisted in the [`MemoryStore`], seeded on first read
pub struct StoredCatalog {
    store: MemoryStore,
}

impl StoredCatalog {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    pub fn default_playlists() -> Vec<Playlist> {
        vec![
            Playlist::new(
                "80s",
                "Éxitos de los 80",
                "https://open.spotify.com/playlist/37i9dQZF1DX4UtSsGT1Sbe",
            ),
            Playlist::new(
                "rock",
                "Rock Clásico",
                "https://open.spotify.com/playlist/37i9dQZF1DWXRqgorJj26U",
            ),
            Playlist::new(
                "pop",
                "Pop Actual",
                "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M",
            ),
            Playlist::new(
                "jazz",
                "Jazz para Relajarse",
                "https://open.spotify.com/playlist/37i9dQZF1DXbITWG1ZJKYt",
            ),
            Playlist::new(
                "classical",
                "Música Clásica",
                "https://open.spotify.com/playlist/37i9dQZF1DWWEJlAGA9gs0",
            ),
            Playlist::new(
                "electronic",
                "Electrónica Total",
                "https://open.spotify.com/playlist/37i9dQZF1DX4dyzvuaRJ0n",
            ),
        ]
    }
}

#[async_trait]
impl PlaylistCatalog for StoredCatalog {
    async fn list_all(&self) -> Result<Vec<Playlist>, CapabilityError> {
        match self.store.read(keys::PLAYLISTS).await {
            Ok(Some(playlists)) => Ok(playlists),
            Ok(None) => {
                let playlists = Self::default_playlists();
                if let Err(e) = self.store.save(keys::PLAYLISTS, &playlists).await {
                    tracing::warn!(error = %e, "Failed to seed playlist catalog");
                }
                Ok(playlists)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Playlist catalog unreadable, using built-in list");
                Ok(Self::default_playlists())
            }
        }
    }
}

fn significant_words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .collect()
}

/// Best match for `query`: exact name, then containment either way, then a
/// shared word longer than two characters
pub fn find_playlist<'a>(query: &str, catalog: &'a [Playlist]) -> Option<&'a Playlist> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }
    let names: Vec<String> = catalog.iter().map(|p| p.name.to_lowercase()).collect();

    if let Some(i) = names.iter().position(|n| *n == query) {
        return Some(&catalog[i]);
    }

    if let Some(i) = names
        .iter()
        .position(|n| n.contains(&query) || query.contains(n.as_str()))
    {
        return Some(&catalog[i]);
    }

    let query_words = significant_words(&query);
    names
        .iter()
        .position(|n| significant_words(n).iter().any(|w| query_words.contains(w)))
        .map(|i| &catalog[i])
}

pub struct MusicCapability {
    catalog: Arc<dyn PlaylistCatalog>,
}

impl MusicCapability {
    pub fn new(catalog: Arc<dyn PlaylistCatalog>) -> Self {
        Self { catalog }
    }

    pub async fn playlists(&self) -> Result<Vec<Playlist>, CapabilityError> {
        self.catalog.list_all().await
    }

    pub async fn play(&self, query: &str, assistant_name: &str, address_form: &str) -> CapabilityReply {
        let playlists = match self.catalog.list_all().await {
            Ok(playlists) => playlists,
            Err(e) => {
                tracing::warn!(error = %e, "Playlist catalog unavailable");
                Vec::new()
            }
        };

        if playlists.is_empty() {
            return CapabilityReply::text(render(
                builtin::PLAYLIST_EMPTY,
                assistant_name,
                address_form,
                "",
            ));
        }

        match find_playlist(query, &playlists) {
            Some(playlist) => {
                tracing::info!(query, playlist = %playlist.name, "Playing playlist");
                let text = render(builtin::PLAYLIST_FOUND, assistant_name, address_form, "")
                    .replace("{playlist}", &playlist.name);
                CapabilityReply::text(text).with_action(AssistantAction::PlayPlaylist {
                    playlist: playlist.clone(),
                })
            }
            None => {
                let names = playlists
                    .iter()
                    .map(|p| p.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                let text = render(builtin::PLAYLIST_NOT_FOUND, assistant_name, address_form, "")
                    .replace("{playlists}", &names);
                CapabilityReply::text(text)
            }
        }
    }
}
