use crate::errors::BackendError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::env;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::error;
use uuid::Uuid;

/// Stored document shape: a flat JSON object per record.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// The persistence seam the store depends on: keyed documents with
/// merge-aware writes, plus append-only log collections. Everything above
/// this trait is backend-agnostic.
pub trait StatBackend: Send + Sync + 'static {
    /// Fetches a document, `None` when it was never written.
    fn read(
        &self,
        collection: &str,
        key: &str,
    ) -> impl Future<Output = Result<Option<FieldMap>, BackendError>> + Send;

    /// Writes a document. With `merge` set, supplied fields are unioned into
    /// the stored document and unmentioned fields keep their prior values;
    /// otherwise the document is replaced.
    fn write(
        &self,
        collection: &str,
        key: &str,
        fields: FieldMap,
        merge: bool,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Appends an immutable log row, returning its generated id.
    fn append(
        &self,
        collection: &str,
        fields: FieldMap,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataFile {
    #[serde(default)]
    pub documents: BTreeMap<String, BTreeMap<String, FieldMap>>,
    #[serde(default)]
    pub logs: BTreeMap<String, Vec<FieldMap>>,
}

impl DataFile {
    fn write_document(&mut self, collection: &str, key: &str, fields: FieldMap, merge: bool) {
        let slot = self
            .documents
            .entry(collection.to_owned())
            .or_default()
            .entry(key.to_owned())
            .or_default();
        if merge {
            for (name, value) in fields {
                slot.insert(name, value);
            }
        } else {
            *slot = fields;
        }
    }

    fn append_log(&mut self, collection: &str, mut fields: FieldMap) -> String {
        let id = Uuid::new_v4().to_string();
        fields.insert("id".into(), id.clone().into());
        self.logs.entry(collection.to_owned()).or_default().push(fields);
        id
    }
}

pub fn resolve_data_path() -> PathBuf {
    match env::var("APP_DATA_PATH") {
        Ok(path) => PathBuf::from(path),
        Err(_) => PathBuf::from("data/fittrackr.json"),
    }
}

/// JSON-file backend: the whole data set lives in one pretty-printed file,
/// rewritten after every mutation.
pub struct JsonFileBackend {
    path: PathBuf,
    data: Mutex<DataFile>,
}

impl JsonFileBackend {
    pub async fn open(path: PathBuf) -> Self {
        let data = load_data(&path).await;
        Self {
            path,
            data: Mutex::new(data),
        }
    }
}

async fn load_data(path: &Path) -> DataFile {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse data file: {err}");
                DataFile::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => DataFile::default(),
        Err(err) => {
            error!("failed to read data file: {err}");
            DataFile::default()
        }
    }
}

async fn persist_data(path: &Path, data: &DataFile) -> Result<(), BackendError> {
    let payload = serde_json::to_vec_pretty(data)?;
    fs::write(path, payload).await?;
    Ok(())
}

impl StatBackend for JsonFileBackend {
    async fn read(&self, collection: &str, key: &str) -> Result<Option<FieldMap>, BackendError> {
        let data = self.data.lock().await;
        Ok(data
            .documents
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn write(
        &self,
        collection: &str,
        key: &str,
        fields: FieldMap,
        merge: bool,
    ) -> Result<(), BackendError> {
        let mut data = self.data.lock().await;
        data.write_document(collection, key, fields, merge);
        persist_data(&self.path, &data).await
    }

    async fn append(&self, collection: &str, fields: FieldMap) -> Result<String, BackendError> {
        let mut data = self.data.lock().await;
        let id = data.append_log(collection, fields);
        persist_data(&self.path, &data).await?;
        Ok(id)
    }
}

/// Ephemeral backend with the same semantics, minus the file. Used by unit
/// tests and available for throwaway runs.
#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<DataFile>,
}

impl MemoryBackend {
    pub async fn contents(&self) -> DataFile {
        self.data.lock().await.clone()
    }
}

impl StatBackend for MemoryBackend {
    async fn read(&self, collection: &str, key: &str) -> Result<Option<FieldMap>, BackendError> {
        let data = self.data.lock().await;
        Ok(data
            .documents
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn write(
        &self,
        collection: &str,
        key: &str,
        fields: FieldMap,
        merge: bool,
    ) -> Result<(), BackendError> {
        let mut data = self.data.lock().await;
        data.write_document(collection, key, fields, merge);
        Ok(())
    }

    async fn append(&self, collection: &str, fields: FieldMap) -> Result<String, BackendError> {
        let mut data = self.data.lock().await;
        Ok(data.append_log(collection, fields))
    }
}
