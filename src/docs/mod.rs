pub mod types;

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::error::{ResearchError, Result};
use types::Workspace;

/// One JSON file per workspace under `data_dir`. Last writer wins.
pub struct WorkspaceStore {
    data_dir: PathBuf,
}

impl WorkspaceStore {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
        })
    }

    fn path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(ResearchError::NotFound(id.to_string()));
        }
        Ok(self.data_dir.join(format!("{}.json", id)))
    }

    pub async fn load(&self, id: &str) -> Result<Workspace> {
        let path = self.path(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ResearchError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| ResearchError::Decode(format!("workspace {}: {}", id, e)))
    }

    /// Stamp `updated_at` and overwrite the record.
    pub async fn save(&self, ws: &mut Workspace) -> Result<()> {
        ws.updated_at = Utc::now();
        let path = self.path(&ws.id)?;
        let json = serde_json::to_vec_pretty(ws)
            .map_err(|e| ResearchError::Decode(format!("serialize workspace: {}", e)))?;
        tokio::fs::write(&path, json).await?;
        debug!(ws_id = %ws.id, docs = ws.docs.len(), stage = ?ws.stage, "workspace saved");
        Ok(())
    }

    /// Ids of every stored workspace, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.data_dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
