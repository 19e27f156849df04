use domain::{Record, RecordId, Store};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{ApplicationError, StoreBackend};

/// Load/save access to the four collections of the store document.
///
/// Every mutation is a full load-modify-save cycle. Cycles are serialized by a
/// single writer lock, so two mutations issued through the same gateway can no
/// longer overwrite each other. The closure passed to [`mutate`](Self::mutate)
/// either succeeds and the whole store is written, or fails and nothing is.
pub struct PersistenceGateway {
    backend: Arc<dyn StoreBackend>,
    writer: Mutex<()>,
}

impl PersistenceGateway {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            backend,
            writer: Mutex::new(()),
        }
    }

    /// Reads the current store. Reads do not wait for writers.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Store, ApplicationError> {
        self.backend.load().await.map_err(|e| {
            error!("Failed to load store: {}", e);
            e
        })
    }

    /// Overwrites the stored document unconditionally.
    #[instrument(skip(self, store))]
    pub async fn save(&self, store: &Store) -> Result<(), ApplicationError> {
        let _guard = self.writer.lock().await;
        self.backend.save(store).await
    }

    /// Runs one locked load-modify-save cycle.
    #[instrument(skip(self, apply))]
    pub async fn mutate<T, F>(&self, apply: F) -> Result<T, ApplicationError>
    where
        F: FnOnce(&mut Store) -> Result<T, ApplicationError> + Send,
        T: Send,
    {
        let _guard = self.writer.lock().await;
        let mut store = self.load().await?;
        let outcome = apply(&mut store)?;
        self.backend.save(&store).await.map_err(|e| {
            error!("Failed to persist store: {}", e);
            e
        })?;
        Ok(outcome)
    }

    /// Looks a record up by identifier without taking the writer lock.
    #[instrument(skip(self), fields(collection = %R::COLLECTION))]
    pub async fn find<R: Record>(&self, id: &RecordId) -> Result<Option<R>, ApplicationError> {
        let store = self.load().await?;
        Ok(R::collection(&store)
            .iter()
            .find(|record| record.id() == id)
            .cloned())
    }

    /// Assigns a fresh identifier, appends and persists.
    #[instrument(skip(self, record), fields(collection = %R::COLLECTION))]
    pub async fn append<R: Record>(&self, record: R) -> Result<R, ApplicationError> {
        let created = self.mutate(move |store| append_record(store, record)).await?;
        info!(id = %created.id(), "Record created");
        Ok(created)
    }

    /// Shallow-merges `fields` over the record with identifier `id` and persists.
    #[instrument(skip(self, fields), fields(collection = %R::COLLECTION, field_count = fields.len()))]
    pub async fn patch<R: Record>(
        &self,
        id: &RecordId,
        fields: &Map<String, Value>,
    ) -> Result<R, ApplicationError> {
        let updated = self
            .mutate(|store| patch_record::<R>(store, id, fields))
            .await?;
        info!(id = %id, "Record updated");
        Ok(updated)
    }

    /// Removes the record with identifier `id`, persists and returns it.
    #[instrument(skip(self), fields(collection = %R::COLLECTION))]
    pub async fn remove<R: Record>(&self, id: &RecordId) -> Result<R, ApplicationError> {
        let removed = self.mutate(|store| remove_record::<R>(store, id)).await?;
        info!(id = %id, "Record removed");
        Ok(removed)
    }
}

/// Random 128-bit identifier, re-drawn in the unlikely case it is already taken.
fn fresh_id<R: Record>(existing: &[R]) -> RecordId {
    loop {
        let candidate = RecordId::new(Uuid::new_v4().to_string());
        if !existing.iter().any(|record| record.id() == &candidate) {
            return candidate;
        }
    }
}

fn append_record<R: Record>(store: &mut Store, mut record: R) -> Result<R, ApplicationError> {
    record.validate()?;
    let records = R::collection(store);
    if records.iter().any(|existing| existing.conflicts_with(&record)) {
        warn!(collection = %R::COLLECTION, "Create rejected: uniqueness conflict");
        return Err(ApplicationError::Conflict(record.conflict_message()));
    }

    record.assign_id(fresh_id(records));
    R::collection_mut(store).push(record.clone());
    debug!(collection = %R::COLLECTION, len = R::collection(store).len(), "Record appended");
    Ok(record)
}

fn position_of<R: Record>(store: &Store, id: &RecordId) -> Result<usize, ApplicationError> {
    R::collection(store)
        .iter()
        .position(|record| record.id() == id)
        .ok_or_else(|| {
            warn!(collection = %R::COLLECTION, id = %id, "Record not found");
            ApplicationError::NotFound {
                collection: R::COLLECTION,
                id: id.to_string(),
            }
        })
}

fn patch_record<R: Record>(
    store: &mut Store,
    id: &RecordId,
    fields: &Map<String, Value>,
) -> Result<R, ApplicationError> {
    let index = position_of::<R>(store, id)?;
    let records = R::collection(store);
    let merged = records[index].merge_patch(fields)?;

    let collides = records
        .iter()
        .enumerate()
        .any(|(i, other)| i != index && merged.conflicts_with(other));
    if collides {
        warn!(collection = %R::COLLECTION, id = %id, "Update rejected: uniqueness conflict");
        return Err(ApplicationError::Conflict(merged.conflict_message()));
    }

    R::collection_mut(store)[index] = merged.clone();
    Ok(merged)
}

fn remove_record<R: Record>(store: &mut Store, id: &RecordId) -> Result<R, ApplicationError> {
    let index = position_of::<R>(store, id)?;
    Ok(R::collection_mut(store).remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryBackend;
    use domain::{Application, Collection, Field, Job, User};
    use serde_json::json;

    fn job(id: &str, company: &str) -> Job {
        Job {
            id: RecordId::from(id),
            company: Field::from(company.to_string()),
            ..Default::default()
        }
    }

    fn gateway_with(store: Store) -> (Arc<MemoryBackend>, PersistenceGateway) {
        let backend = Arc::new(MemoryBackend::with(store));
        let gateway = PersistenceGateway::new(backend.clone());
        (backend, gateway)
    }

    #[tokio::test]
    async fn append_assigns_unique_ids_and_persists() {
        let (backend, gateway) = gateway_with(Store::default());

        let first = gateway.append(job("", "Acme")).await.unwrap();
        let second = gateway.append(job("", "Globex")).await.unwrap();

        assert!(!first.id.is_blank());
        assert_ne!(first.id, second.id);
        let stored = backend.snapshot();
        assert_eq!(stored.jobs, vec![first, second]);
        assert_eq!(backend.save_count(), 2);
    }

    #[tokio::test]
    async fn append_rejects_duplicate_user_email_without_writing() {
        let existing = User {
            id: RecordId::from("u1"),
            email: Field::from("a@x.com".to_string()),
            ..Default::default()
        };
        let (backend, gateway) = gateway_with(Store {
            users: vec![existing],
            ..Default::default()
        });

        let duplicate = User {
            email: Field::from("a@x.com".to_string()),
            password: Field::from("other".to_string()),
            ..Default::default()
        };
        let err = gateway.append(duplicate).await.unwrap_err();

        assert!(matches!(err, ApplicationError::Conflict(msg) if msg == "User already exists"));
        assert_eq!(backend.save_count(), 0);
        assert_eq!(backend.snapshot().users.len(), 1);
    }

    #[tokio::test]
    async fn patch_merges_shallowly() {
        let mut original = job("1", "Acme");
        original.location = Field::from("Berlin".to_string());
        original.extra.insert("remote".to_string(), json!(true));
        let (backend, gateway) = gateway_with(Store {
            jobs: vec![original.clone()],
            ..Default::default()
        });

        let fields = json!({ "salary": "$100k" });
        let updated: Job = gateway
            .patch(&RecordId::from("1"), fields.as_object().unwrap())
            .await
            .unwrap();

        assert_eq!(updated.salary.as_deref(), Some("$100k"));
        assert_eq!(updated.location, original.location);
        assert_eq!(updated.company, original.company);
        assert_eq!(updated.extra.get("remote"), Some(&json!(true)));
        assert_eq!(backend.snapshot().jobs, vec![updated]);
    }

    #[tokio::test]
    async fn patch_unknown_id_is_not_found() {
        let (backend, gateway) = gateway_with(Store::default());
        let fields = Map::new();
        let err = gateway
            .patch::<Job>(&RecordId::from("nope"), &fields)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::NotFound { collection: Collection::Jobs, ref id } if id == "nope"
        ));
        assert_eq!(backend.save_count(), 0);
    }

    #[tokio::test]
    async fn patch_cannot_move_application_onto_existing_pair() {
        let a1 = Application {
            id: RecordId::from("a1"),
            job_id: Field::from(RecordId::from("42")),
            email: Field::from("a@x.com".to_string()),
            first_name: Field::from("A".to_string()),
            last_name: Field::from("X".to_string()),
            ..Default::default()
        };
        let a2 = Application {
            id: RecordId::from("a2"),
            job_id: Field::from(RecordId::from("43")),
            ..a1.clone()
        };
        let (backend, gateway) = gateway_with(Store {
            applications: vec![a1, a2.clone()],
            ..Default::default()
        });

        let fields = json!({ "jobId": "42" });
        let err = gateway
            .patch::<Application>(&RecordId::from("a2"), fields.as_object().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::Conflict(_)));
        assert_eq!(backend.snapshot().applications[1], a2);
    }

    #[tokio::test]
    async fn remove_returns_record_and_missing_id_leaves_store_unchanged() {
        let (backend, gateway) = gateway_with(Store {
            jobs: vec![job("1", "Acme"), job("2", "Globex")],
            ..Default::default()
        });

        let err = gateway.remove::<Job>(&RecordId::from("3")).await.unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound { .. }));
        assert_eq!(backend.snapshot().jobs.len(), 2);

        let removed: Job = gateway.remove(&RecordId::from("1")).await.unwrap();
        assert_eq!(removed.company.as_deref(), Some("Acme"));
        assert_eq!(backend.snapshot().jobs, vec![job("2", "Globex")]);
    }

    #[tokio::test]
    async fn failed_mutation_writes_nothing() {
        let (backend, gateway) = gateway_with(Store::default());
        let result: Result<(), _> = gateway
            .mutate(|store| {
                store.jobs.push(job("1", "Acme"));
                Err(ApplicationError::InvalidInput("abort".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(backend.save_count(), 0);
        assert!(backend.snapshot().jobs.is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_are_not_lost() {
        let backend = Arc::new(MemoryBackend::with(Store::default()));
        let gateway = Arc::new(PersistenceGateway::new(backend.clone()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let gateway = gateway.clone();
            handles.push(tokio::spawn(async move {
                gateway.append(job("", &format!("Company {i}"))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(backend.snapshot().jobs.len(), 16);
    }

    #[tokio::test]
    async fn load_failure_is_storage_unavailable() {
        let backend = Arc::new(MemoryBackend::default());
        let gateway = PersistenceGateway::new(backend);
        let err = gateway.append(job("", "Acme")).await.unwrap_err();
        assert!(matches!(err, ApplicationError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn find_distinguishes_missing_records() {
        let (_, gateway) = gateway_with(Store {
            jobs: vec![job("1", "Acme")],
            ..Default::default()
        });
        assert!(gateway.find::<Job>(&RecordId::from("1")).await.unwrap().is_some());
        assert!(gateway.find::<Job>(&RecordId::from("999")).await.unwrap().is_none());
    }
}
