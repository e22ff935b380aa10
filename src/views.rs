use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::columns::Registry;
use crate::domain::{DEFAULT_VIEW_NAME, DashError, SAVED_VIEWS_KEY};
use crate::storage::Storage;

/// View name to ordered, visible column ids.
pub type ViewMap = BTreeMap<String, Vec<String>>;

/// Persisted column descriptor. Older layouts stored whole column objects, so
/// anything beyond `id` is optional and unknown fields are ignored.
#[derive(Debug, Serialize, Deserialize)]
struct StoredColumn {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header: Option<String>,
}

/// The default view with no customization: the registry in declaration order.
pub fn default_views(registry: &Registry<'_>) -> ViewMap {
    ViewMap::from([(DEFAULT_VIEW_NAME.to_string(), registry.ids())])
}

/// Reads all saved views. Missing, unreadable or malformed content yields the
/// default mapping and is never reported as an error.
pub fn load_views(storage: &dyn Storage, registry: &Registry<'_>) -> ViewMap {
    let content = match storage.get_item(SAVED_VIEWS_KEY) {
        Ok(Some(content)) => content,
        Ok(None) => {
            debug!("No saved views found, using defaults");
            return default_views(registry);
        }
        Err(e) => {
            warn!("Failed to read saved views: {e}");
            return default_views(registry);
        }
    };

    match serde_json::from_str::<BTreeMap<String, Vec<StoredColumn>>>(&content) {
        Ok(stored) => {
            let mut views: ViewMap = stored
                .into_iter()
                .map(|(name, columns)| (name, columns.into_iter().map(|c| c.id).collect()))
                .collect();
            views
                .entry(DEFAULT_VIEW_NAME.to_string())
                .or_insert_with(|| registry.ids());
            info!("Loaded {} saved views", views.len());
            views
        }
        Err(e) => {
            warn!("Ignoring malformed saved views: {e}");
            default_views(registry)
        }
    }
}

fn encode_views(views: &ViewMap, registry: &Registry<'_>) -> Result<String, DashError> {
    let stored: BTreeMap<&str, Vec<StoredColumn>> = views
        .iter()
        .map(|(name, ids)| {
            let columns = ids
                .iter()
                .map(|id| StoredColumn {
                    id: id.clone(),
                    header: registry.get(id).map(|c| c.header.to_string()),
                })
                .collect();
            (name.as_str(), columns)
        })
        .collect();
    Ok(serde_json::to_string(&stored)?)
}

/// Pure insert-or-replace, nothing is persisted.
pub fn upsert(views: &ViewMap, name: &str, ids: Vec<String>) -> ViewMap {
    let mut updated = views.clone();
    updated.insert(name.to_string(), ids);
    updated
}

/// In-memory copy of the saved views backed by a [`Storage`].
pub struct ViewStore<'r> {
    storage: Box<dyn Storage>,
    registry: Registry<'r>,
    views: ViewMap,
}

impl<'r> ViewStore<'r> {
    pub fn load(storage: Box<dyn Storage>, registry: Registry<'r>) -> Self {
        let views = load_views(storage.as_ref(), &registry);
        ViewStore {
            storage,
            registry,
            views,
        }
    }

    #[cfg(test)]
    pub fn views(&self) -> &ViewMap {
        &self.views
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.views.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.views.contains_key(name)
    }

    /// View names for display, the default view first.
    pub fn names(&self) -> Vec<&str> {
        std::iter::once(DEFAULT_VIEW_NAME)
            .chain(
                self.views
                    .keys()
                    .map(String::as_str)
                    .filter(|name| *name != DEFAULT_VIEW_NAME),
            )
            .collect()
    }

    /// Replaces every saved view and writes the full mapping. Write failures
    /// are logged only; the in-memory mapping stays authoritative.
    pub fn save(&mut self, views: ViewMap) {
        self.views = views;
        let result = encode_views(&self.views, &self.registry)
            .and_then(|content| self.storage.set_item(SAVED_VIEWS_KEY, &content));
        match result {
            Ok(()) => debug!("Saved {} views", self.views.len()),
            Err(e) => warn!("Failed to persist views: {e}"),
        }
    }

    pub fn upsert(&self, name: &str, ids: Vec<String>) -> ViewMap {
        upsert(&self.views, name, ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn storage_with(content: &str) -> Box<dyn Storage> {
        let mut storage = MemoryStorage::default();
        storage.set_item(SAVED_VIEWS_KEY, content).unwrap();
        Box::new(storage)
    }

    #[test]
    fn absent_storage_yields_default_view() {
        let registry = Registry::builtin();
        let store = ViewStore::load(Box::new(MemoryStorage::default()), registry);
        assert_eq!(store.views().len(), 1);
        assert_eq!(store.get(DEFAULT_VIEW_NAME).unwrap(), registry.ids().as_slice());
    }

    #[test]
    fn malformed_storage_yields_default_view() {
        let registry = Registry::builtin();
        for content in ["not json", "[1,2,3]", "{\"A\": 5}", "{\"A\": [{\"header\": \"x\"}]}"] {
            let store = ViewStore::load(storage_with(content), registry);
            assert_eq!(store.views(), &default_views(&registry), "{content}");
        }
    }

    #[test]
    fn browser_layout_loads() {
        let content = r#"{"Trending":[{"id":"name","header":"Coin","enableSorting":true}],
                         "Mine":[{"id":"market_cap"},{"id":"old_field"}]}"#;
        let store = ViewStore::load(storage_with(content), Registry::builtin());
        assert_eq!(store.get("Trending").unwrap(), ["name"]);
        assert_eq!(store.get("Mine").unwrap(), ["market_cap", "old_field"]);
        assert_eq!(store.names(), vec!["Trending", "Mine"]);
    }

    #[test]
    fn save_then_load_is_idempotent() {
        let registry = Registry::builtin();
        let content = r#"{"Mine":[{"id":"market_cap"},{"id":"name"}],"Other":[]}"#;
        let mut store = ViewStore::load(storage_with(content), registry);
        let loaded = store.views().clone();
        store.save(loaded.clone());

        let persisted = store.storage.get_item(SAVED_VIEWS_KEY).unwrap().unwrap();
        let reloaded = ViewStore::load(storage_with(&persisted), registry);
        assert_eq!(reloaded.views(), &loaded);
        assert!(persisted.contains("\"header\":\"Market Cap\""));
    }

    #[test]
    fn upsert_does_not_persist() {
        let store = ViewStore::load(Box::new(MemoryStorage::default()), Registry::builtin());
        let updated = store.upsert("Mine", vec!["name".into()]);
        assert_eq!(updated.len(), 2);
        assert!(!store.contains("Mine"));
        assert_eq!(store.storage.get_item(SAVED_VIEWS_KEY).unwrap(), None);
    }
}
