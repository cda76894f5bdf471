// ABOUTME: Durable store keeping one JSON document per record on disk.
// ABOUTME: Writes go to a temp file first and are renamed into place.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use crate::model::{DeploymentRecord, InstanceRecord};
use crate::types::DeploymentId;

use super::{DeploymentFilter, DeploymentStore, StoreError, sort_newest_first};

const DEPLOYMENTS_DIR: &str = "deployments";
const INSTANCES_DIR: &str = "instances";

/// Store rooted at a directory:
///
/// ```text
/// <root>/deployments/<deployment-id>.json
/// <root>/instances/<deployment-id>.json
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join(DEPLOYMENTS_DIR)).await?;
        tokio::fs::create_dir_all(root.join(INSTANCES_DIR)).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn deployment_path(&self, id: &DeploymentId) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(DEPLOYMENTS_DIR).join(file_name(id)?))
    }

    fn instance_path(&self, id: &DeploymentId) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(INSTANCES_DIR).join(file_name(id)?))
    }
}

/// Ids become file names, so anything that could escape the directory is
/// rejected outright.
fn file_name(id: &DeploymentId) -> Result<String, StoreError> {
    let raw = id.as_str();
    let valid = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(StoreError::Backend(format!("invalid record id: {raw:?}")));
    }
    Ok(format!("{raw}.json"))
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl DeploymentStore for FileStore {
    async fn get_deployment(&self, id: &DeploymentId) -> Result<DeploymentRecord, StoreError> {
        read_json(&self.deployment_path(id)?)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn save_deployment(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        write_json(&self.deployment_path(&record.id)?, record).await
    }

    async fn query_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        let mut entries = tokio::fs::read_dir(self.root.join(DEPLOYMENTS_DIR)).await?;
        let mut records = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<DeploymentRecord>(&path).await {
                Ok(Some(record)) if filter.matches(&record) => records.push(record),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable deployment record");
                }
            }
        }

        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn delete_deployment(&self, id: &DeploymentId) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.deployment_path(id)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_instance(&self, record: &InstanceRecord) -> Result<(), StoreError> {
        write_json(&self.instance_path(&record.deployment_id)?, record).await
    }

    async fn get_instance(
        &self,
        deployment_id: &DeploymentId,
    ) -> Result<Option<InstanceRecord>, StoreError> {
        read_json(&self.instance_path(deployment_id)?).await
    }
}
