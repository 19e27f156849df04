use application::{ApplicationError, StoreBackend};
use async_trait::async_trait;
use dashmap::DashMap;
use domain::{Collection, Store};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Store backend kept entirely in process memory.
///
/// Records are held as serialized JSON per collection, so load and save go
/// through the same schema checks as the file-backed store. Nothing survives
/// a restart.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    // Collection -> records in insertion order
    collections: Arc<DashMap<Collection, Vec<Value>>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// An empty store with all four collections present.
    pub fn new() -> Self {
        let collections = DashMap::new();
        for collection in Collection::ALL {
            collections.insert(collection, Vec::new());
        }
        Self {
            collections: Arc::new(collections),
        }
    }

    /// A store seeded with `store`.
    pub fn with_store(store: &Store) -> Result<Self, ApplicationError> {
        let seeded = Self::new();
        seeded.replace_all(store)?;
        Ok(seeded)
    }

    /// Number of records currently held in `collection`.
    pub fn collection_len(&self, collection: Collection) -> usize {
        self.collections
            .get(&collection)
            .map_or(0, |records| records.len())
    }

    fn replace_all(&self, store: &Store) -> Result<(), ApplicationError> {
        let document = match serde_json::to_value(store) {
            Ok(Value::Object(document)) => document,
            Ok(_) => {
                return Err(ApplicationError::StorageUnavailable(
                    "store did not serialize to an object".to_string(),
                ));
            }
            Err(e) => return Err(ApplicationError::StorageUnavailable(e.to_string())),
        };

        for collection in Collection::ALL {
            let records = match document.get(collection.as_str()) {
                Some(Value::Array(records)) => records.clone(),
                _ => Vec::new(),
            };
            self.collections.insert(collection, records);
        }
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    #[instrument(skip(self))]
    async fn load(&self) -> Result<Store, ApplicationError> {
        debug!("Loading store from memory");
        let mut document = Map::new();
        for collection in Collection::ALL {
            let records = self
                .collections
                .get(&collection)
                .map(|records| records.clone())
                .unwrap_or_default();
            document.insert(collection.as_str().to_string(), Value::Array(records));
        }
        serde_json::from_value(Value::Object(document)).map_err(|e| {
            error!("In-memory store holds an invalid record: {}", e);
            ApplicationError::StorageUnavailable(e.to_string())
        })
    }

    #[instrument(skip(self, store))]
    async fn save(&self, store: &Store) -> Result<(), ApplicationError> {
        debug!("Saving store to memory");
        self.replace_all(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Field, Job, RecordId, Sector};

    #[tokio::test]
    async fn new_store_loads_empty() {
        let backend = InMemoryStore::new();
        assert_eq!(backend.load().await.unwrap(), Store::default());
    }

    #[tokio::test]
    async fn save_then_load_returns_the_same_store() {
        let backend = InMemoryStore::new();
        let store = Store {
            jobs: vec![Job {
                id: RecordId::from("1"),
                company: Field::from("Acme".to_string()),
                ..Default::default()
            }],
            sectors: vec![Sector {
                id: RecordId::from("s1"),
                count: Field::from(1),
                ..Default::default()
            }],
            ..Default::default()
        };

        backend.save(&store).await.unwrap();
        assert_eq!(backend.load().await.unwrap(), store);
        assert_eq!(backend.collection_len(Collection::Jobs), 1);
        assert_eq!(backend.collection_len(Collection::Users), 0);
    }

    #[tokio::test]
    async fn clones_share_the_same_data() {
        let backend = InMemoryStore::new();
        let other_handle = backend.clone();
        let store = Store {
            jobs: vec![Job::default()],
            ..Default::default()
        };
        backend.save(&store).await.unwrap();
        assert_eq!(other_handle.collection_len(Collection::Jobs), 1);
    }

    #[tokio::test]
    async fn seeded_store_is_loadable() {
        let store = Store {
            sectors: vec![Sector {
                id: RecordId::from("s1"),
                title: Field::from("Design".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let backend = InMemoryStore::with_store(&store).unwrap();
        assert_eq!(backend.load().await.unwrap(), store);
    }
}
