use anyhow::Context as AnyhowContext;
use async_trait::async_trait;
use botanical_types::folder::FolderRecord;
use botanical_types::state::StateRepository;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use typesafe_repository::{
    async_ops::{Get, List, Save},
    IdentityOf, Repository,
};

/// On-disk layout: `{"folders": {"<id>": {"name", "status", "platforms", ...}}}`.
///
/// Records are kept as raw JSON so a single record this version can't read doesn't take
/// the rest of the document down with it.
#[derive(Serialize, Deserialize, Default, Debug)]
struct StateDocument {
    #[serde(default)]
    folders: serde_json::Map<String, Value>,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

/// State store backed by one JSON file.
///
/// Single writer only: two processes sharing the file will overwrite each other's
/// changes (last write wins).
pub struct FileSystemStateRepository {
    path: PathBuf,
    document: RwLock<StateDocument>,
}

impl FileSystemStateRepository {
    /// Opens the state file. A missing file starts an empty store; an unreadable or
    /// malformed one is logged and replaced by an empty store, losing its history.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let document = match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<StateDocument>(&data) {
                Ok(doc) => doc,
                Err(err) => {
                    log::error!(
                        "State file {path:?} is malformed, starting with an empty state: {err}"
                    );
                    StateDocument::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StateDocument::default(),
            Err(err) => {
                log::error!("Unable to read state file {path:?}, starting with an empty state: {err}");
                StateDocument::default()
            }
        };
        log::debug!("Loaded {} folder records from {path:?}", document.folders.len());
        Self {
            path,
            document: RwLock::new(document),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, document: &StateDocument) -> Result<(), anyhow::Error> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_string_pretty(document)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, payload)
            .await
            .with_context(|| format!("Unable to write state to {tmp:?}"))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Unable to replace state file {:?}", self.path))?;
        Ok(())
    }
}

fn decode(id: &str, value: &Value) -> Result<FolderRecord, anyhow::Error> {
    let record: FolderRecord = serde_json::from_value(value.clone())
        .with_context(|| format!("Malformed state record for folder {id}"))?;
    Ok(record.with_id(id.to_string()))
}

impl Repository<FolderRecord> for FileSystemStateRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Get<FolderRecord> for FileSystemStateRepository {
    async fn get_one(
        &self,
        id: &IdentityOf<FolderRecord>,
    ) -> Result<Option<FolderRecord>, anyhow::Error> {
        let document = self.document.read().await;
        document
            .folders
            .get(id)
            .map(|value| decode(id, value))
            .transpose()
    }
}

#[async_trait]
impl List<FolderRecord> for FileSystemStateRepository {
    async fn list(&self) -> Result<Vec<FolderRecord>, anyhow::Error> {
        let document = self.document.read().await;
        Ok(document
            .folders
            .iter()
            .filter_map(|(id, value)| match decode(id, value) {
                Ok(record) => Some(record),
                Err(err) => {
                    log::warn!("Skipping folder {id}: {err:#}");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl Save<FolderRecord> for FileSystemStateRepository {
    async fn save(&self, record: FolderRecord) -> Result<(), anyhow::Error> {
        let mut document = self.document.write().await;
        let value = serde_json::to_value(&record)?;
        document.folders.insert(record.id, value);
        self.persist(&document).await
    }
}

#[async_trait]
impl StateRepository for FileSystemStateRepository {
    async fn processed_ids(&self) -> Result<HashSet<IdentityOf<FolderRecord>>, anyhow::Error> {
        let document = self.document.read().await;
        Ok(document.folders.keys().cloned().collect())
    }
}
