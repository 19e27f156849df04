use application::{ApplicationError, StoreBackend};
use async_trait::async_trait;
use domain::Store;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, instrument};

/// Store backend holding the whole store in one JSON document on disk.
///
/// Saves go to a temp file in the same directory that is then renamed over the
/// document, so a reader sees either the old or the new contents, never a torn write.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes an empty store if no document exists yet. Returns true if one was created.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn initialize_if_missing(&self) -> Result<bool, ApplicationError> {
        if tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| self.unavailable("cannot inspect", e))?
        {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.unavailable("cannot create directory for", e))?;
        }
        self.save(&Store::default()).await?;
        info!("Initialized empty store document");
        Ok(true)
    }

    fn unavailable(&self, action: &str, cause: impl std::fmt::Display) -> ApplicationError {
        ApplicationError::StorageUnavailable(format!(
            "{} {}: {}",
            action,
            self.path.display(),
            cause
        ))
    }

    fn directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Writes `bytes` to a temp file in `dir`, syncs it and renames it over `path`.
/// The temp file is removed on any failure.
fn write_atomically(path: &Path, dir: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl StoreBackend for JsonFileStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Store, ApplicationError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| self.unavailable("cannot read", e))?;
        let store: Store = serde_json::from_slice(&bytes)
            .map_err(|e| self.unavailable("malformed store document", e))?;
        debug!(
            jobs = store.jobs.len(),
            sectors = store.sectors.len(),
            users = store.users.len(),
            applications = store.applications.len(),
            "Store loaded"
        );
        Ok(store)
    }

    #[instrument(skip(self, store), fields(path = %self.path.display()))]
    async fn save(&self, store: &Store) -> Result<(), ApplicationError> {
        let mut bytes = serde_json::to_vec_pretty(store)
            .map_err(|e| self.unavailable("cannot serialize store for", e))?;
        bytes.push(b'\n');

        let len = bytes.len();
        let (path, dir) = (self.path.clone(), self.directory());
        tokio::task::spawn_blocking(move || write_atomically(&path, &dir, &bytes))
            .await
            .map_err(|e| self.unavailable("store write task failed for", e))?
            .map_err(|e| {
                error!("Failed to replace store document: {}", e);
                self.unavailable("cannot write", e)
            })?;
        debug!(bytes = len, "Store saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn document() -> Value {
        json!({
            "jobs": [
                {
                    "id": "1",
                    "company": "Photosnap",
                    "new": true,
                    "featured": true,
                    "position": "Senior Frontend Developer",
                    "level": "Senior",
                    "postedAt": "1d ago",
                    "location": "USA Only",
                    "languages": ["HTML", "CSS"],
                    "category": "Engineering",
                    "slots": 2
                },
                { "id": 2, "company": "Acme", "logo": null, "slots": null },
                { "id": "3", "slots": "3", "featured": "true" }
            ],
            "sectors": [{ "id": "s1", "title": "Engineering", "count": 1 }],
            "users": [
                { "id": "u1", "email": "a@x.com", "password": "pw" },
                { "id": "u2", "email": "b@x.com", "password": null }
            ],
            "applications": [
                {
                    "id": "a1",
                    "jobId": "1",
                    "email": "a@x.com",
                    "firstName": "Ada",
                    "lastName": "Lovelace",
                    "coverLetter": "",
                    "resume": null,
                    "appliedAt": "2024-03-01T10:00:00.000Z",
                    "status": "pending"
                },
                { "id": "a2", "jobId": "1", "email": "b@x.com", "firstName": "A", "lastName": "B" }
            ]
        })
    }

    async fn write_document(path: &Path, value: &Value) {
        tokio::fs::write(path, serde_json::to_vec_pretty(value).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn save_of_load_is_deep_equal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        write_document(&path, &document()).await;

        let backend = JsonFileStore::new(&path);
        let store = backend.load().await.unwrap();
        backend.save(&store).await.unwrap();

        let written: Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        let mut expected = document();
        // Numeric ids are the one normalisation applied on read.
        expected["jobs"][1]["id"] = json!("2");
        assert_eq!(written, expected);
    }

    #[tokio::test]
    async fn save_into_missing_directory_is_storage_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileStore::new(dir.path().join("nested").join("db.json"));
        let err = backend.save(&Store::default()).await.unwrap_err();
        assert!(matches!(err, ApplicationError::StorageUnavailable(_)));
        assert!(!dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn save_leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        let backend = JsonFileStore::new(&path);
        backend.save(&Store::default()).await.unwrap();
        backend.save(&Store::default()).await.unwrap();

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, ["db.json"]);
    }

    #[tokio::test]
    async fn missing_file_is_storage_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileStore::new(dir.path().join("absent.json"));
        let err = backend.load().await.unwrap_err();
        assert!(matches!(err, ApplicationError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn malformed_file_is_storage_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        tokio::fs::write(&path, b"{ \"jobs\": [ ").await.unwrap();
        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(
            matches!(err, ApplicationError::StorageUnavailable(msg) if msg.contains("malformed"))
        );

        write_document(&path, &json!({ "jobs": [] })).await;
        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, ApplicationError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn initialize_creates_an_empty_document_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("db.json");
        let backend = JsonFileStore::new(&path);

        assert!(backend.initialize_if_missing().await.unwrap());
        assert_eq!(backend.load().await.unwrap(), Store::default());
        let written: Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(
            written,
            json!({ "jobs": [], "sectors": [], "users": [], "applications": [] })
        );

        assert!(!backend.initialize_if_missing().await.unwrap());
    }
}
