//! UI state containers and persisted preferences.
//!
//! [`UiState`] is a plain value updated through [`UiState::reduce`]; every
//! action overwrites the field it targets. [`UiPreferences`] saves the parts
//! that outlive a session (favorites, menu layout) in a [`PreferenceStore`]
//! under keys namespaced by the storage prefix and the user id.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Key-value storage for preferences.
pub trait PreferenceStore: Send + Sync {
    /// Reads `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Writes `key`.
    fn set(&self, key: &str, value: String);

    /// Deletes `key`.
    fn remove(&self, key: &str);
}

/// In-memory [`PreferenceStore`].
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    entries: RwLock<IndexMap<String, String>>,
}

impl MemoryPreferenceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored keys, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries.write().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.write().shift_remove(key);
    }
}

/// Builds a namespaced storage key.
///
/// ```
/// use studyhub::state::storage_key;
///
/// assert_eq!(storage_key("studyhub", Some(7), "ui"), "studyhub:7:ui");
/// assert_eq!(storage_key("studyhub", None, "auth"), "studyhub:auth");
/// ```
pub fn storage_key(prefix: &str, user: Option<u64>, key: &str) -> String {
    match user {
        Some(user) => format!("{prefix}:{user}:{key}"),
        None => format!("{prefix}:{key}"),
    }
}

/// Application-wide UI state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiState {
    /// Favorite study ids, in the order they were added.
    pub favorites: IndexSet<String>,
    /// Study currently open.
    pub current_study_id: Option<String>,
    /// Whether the side menu is expanded.
    pub menu_extended: bool,
    /// Unread task notifications.
    pub notification_count: usize,
}

/// Updates to [`UiState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiAction {
    /// Replaces the favorites.
    SetFavorites(Vec<String>),
    /// Adds a favorite at the end, if absent.
    AddFavorite(String),
    /// Removes a favorite.
    RemoveFavorite(String),
    /// Sets or clears the current study.
    SetCurrentStudy(Option<String>),
    /// Expands or collapses the menu.
    SetMenuExtended(bool),
    /// Sets the unread notification count.
    SetNotificationCount(usize),
}

impl UiState {
    /// Applies `action` and returns the new state.
    pub fn reduce(mut self, action: UiAction) -> Self {
        match action {
            UiAction::SetFavorites(ids) => self.favorites = ids.into_iter().collect(),
            UiAction::AddFavorite(id) => {
                self.favorites.insert(id);
            },
            UiAction::RemoveFavorite(id) => {
                self.favorites.shift_remove(&id);
            },
            UiAction::SetCurrentStudy(id) => self.current_study_id = id,
            UiAction::SetMenuExtended(extended) => self.menu_extended = extended,
            UiAction::SetNotificationCount(count) => self.notification_count = count,
        }
        self
    }

    /// Returns `true` if `study_id` is a favorite.
    pub fn is_favorite(&self, study_id: &str) -> bool {
        self.favorites.contains(study_id)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedUi {
    #[serde(default)]
    favorites: IndexSet<String>,
    #[serde(default)]
    menu_extended: bool,
}

const UI_KEY: &str = "ui";

/// Saves and restores [`UiState`] per user.
#[derive(Clone)]
pub struct UiPreferences {
    store: Arc<dyn PreferenceStore>,
    prefix: String,
}

impl std::fmt::Debug for UiPreferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiPreferences")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl UiPreferences {
    /// Binds to `store` under `prefix`.
    pub fn new(store: Arc<dyn PreferenceStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Persists the durable parts of `state`.
    pub fn save(&self, user: Option<u64>, state: &UiState) -> Result<()> {
        let persisted = PersistedUi {
            favorites: state.favorites.clone(),
            menu_extended: state.menu_extended,
        };
        let value = serde_json::to_string(&persisted)?;
        self.store
            .set(&storage_key(&self.prefix, user, UI_KEY), value);
        Ok(())
    }

    /// Restores saved preferences into a fresh state.
    ///
    /// Missing or unreadable entries yield the default state.
    pub fn load(&self, user: Option<u64>) -> UiState {
        let key = storage_key(&self.prefix, user, UI_KEY);
        let persisted = match self.store.get(&key) {
            Some(raw) => serde_json::from_str::<PersistedUi>(&raw).unwrap_or_else(|e| {
                tracing::warn!(%key, error = %e, "ignoring unreadable preferences");
                PersistedUi::default()
            }),
            None => PersistedUi::default(),
        };
        UiState {
            favorites: persisted.favorites,
            menu_extended: persisted.menu_extended,
            ..UiState::default()
        }
    }

    /// Forgets the saved preferences of `user`.
    pub fn clear(&self, user: Option<u64>) {
        self.store.remove(&storage_key(&self.prefix, user, UI_KEY));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn last_write_wins() {
        let state = UiState::default()
            .reduce(UiAction::SetCurrentStudy(Some("s1".into())))
            .reduce(UiAction::SetCurrentStudy(Some("s2".into())))
            .reduce(UiAction::SetMenuExtended(true))
            .reduce(UiAction::SetNotificationCount(4))
            .reduce(UiAction::SetNotificationCount(0));
        assert_eq!(state.current_study_id.as_deref(), Some("s2"));
        assert!(state.menu_extended);
        assert_eq!(state.notification_count, 0);
    }

    #[test]
    fn favorites_keep_insertion_order() {
        let state = UiState::default()
            .reduce(UiAction::AddFavorite("b".into()))
            .reduce(UiAction::AddFavorite("a".into()))
            .reduce(UiAction::AddFavorite("b".into()))
            .reduce(UiAction::AddFavorite("c".into()))
            .reduce(UiAction::RemoveFavorite("a".into()));
        let favorites: Vec<&str> = state.favorites.iter().map(String::as_str).collect();
        assert_eq!(favorites, vec!["b", "c"]);
        assert!(state.is_favorite("c"));
        assert!(!state.is_favorite("a"));
    }

    #[test]
    fn preferences_are_namespaced_per_user() {
        let store = Arc::new(MemoryPreferenceStore::new());
        let prefs = UiPreferences::new(store.clone(), "studyhub");
        let state = UiState::default()
            .reduce(UiAction::SetFavorites(vec!["x".into(), "y".into()]))
            .reduce(UiAction::SetMenuExtended(true))
            .reduce(UiAction::SetCurrentStudy(Some("x".into())));
        prefs.save(Some(3), &state).unwrap();

        assert_eq!(store.keys(), vec!["studyhub:3:ui".to_string()]);
        let restored = prefs.load(Some(3));
        assert_eq!(restored.favorites, state.favorites);
        assert!(restored.menu_extended);
        assert_eq!(restored.current_study_id, None);
        assert_eq!(prefs.load(Some(4)), UiState::default());

        prefs.clear(Some(3));
        assert_eq!(prefs.load(Some(3)), UiState::default());
    }

    #[test]
    fn unreadable_preferences_fall_back_to_default() {
        let store = Arc::new(MemoryPreferenceStore::new());
        store.set("studyhub:1:ui", "{not json".to_string());
        let prefs = UiPreferences::new(store, "studyhub");
        assert_eq!(prefs.load(Some(1)), UiState::default());
    }
}
