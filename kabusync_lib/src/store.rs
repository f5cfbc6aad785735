//! Key/value blob storage behind the persisted pipeline state.
//!
//! Every piece of state (cursors, the registry, price series) is one blob
//! addressed by `(namespace, key)`. Each `put` replaces the blob atomically;
//! there are no multi-key transactions.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::DbError;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] DbError),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("corrupt value at {namespace}/{key}: {reason}")]
    Corrupt {
        namespace: String,
        key: String,
        reason: String,
    },
}

pub trait BlobStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StoreError>;
    /// Deleting a missing key is not an error.
    fn delete(&self, namespace: &str, key: &str) -> Result<(), StoreError>;
    /// Keys in `namespace`, sorted ascending.
    fn keys(&self, namespace: &str) -> Result<Vec<String>, StoreError>;

    /// Run-level metadata (`last_run_date`, `last_updated`). Backends with a
    /// dedicated metadata table override these.
    fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.get(META_NAMESPACE, key)? {
            Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|e| StoreError::Corrupt {
                namespace: META_NAMESPACE.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(None),
        }
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put(META_NAMESPACE, key, value.as_bytes())
    }
}

const META_NAMESPACE: &str = "meta";

impl<S: BlobStore + ?Sized> BlobStore for &S {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(namespace, key)
    }

    fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).put(namespace, key, value)
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        (**self).delete(namespace, key)
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>, StoreError> {
        (**self).keys(namespace)
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get_meta(key)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set_meta(key, value)
    }
}

/// Reads and decodes a JSON blob.
pub fn get_json<T, S>(store: &S, namespace: &str, key: &str) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
    S: BlobStore + ?Sized,
{
    match store.get(namespace, key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encodes `value` as JSON and writes it in one `put`.
pub fn put_json<T, S>(store: &S, namespace: &str, key: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
    S: BlobStore + ?Sized,
{
    let bytes = serde_json::to_vec(value)?;
    store.put(namespace, key, &bytes)
}

/// Thread-safe in-memory blob store, used for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    blobs: DashMap<(String, String), Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .blobs
            .get(&(namespace.to_string(), key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.blobs
            .insert((namespace.to_string(), key.to_string()), value.to_vec());
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        self.blobs.remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .blobs
            .iter()
            .filter(|entry| entry.key().0 == namespace)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
