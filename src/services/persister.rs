use futures::future::BoxFuture;
use std::path::PathBuf;
use uuid::Uuid;

use crate::models::job::JobRecord;

/// Durable sink for terminal job records. Best effort: the orchestrator only
/// logs failures.
pub trait ResultPersister: Send + Sync {
    /// Store the record and return where it went.
    fn save<'a>(&'a self, job_id: Uuid, record: &'a JobRecord) -> BoxFuture<'a, Result<String, PersistError>>;
}

/// Writes each terminal record as pretty JSON to `<dir>/<job_id>_result.json`.
#[derive(Debug, Clone)]
pub struct JsonFilePersister {
    dir: PathBuf,
}

impl JsonFilePersister {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, job_id: Uuid) -> PathBuf {
        self.dir.join(format!("{job_id}_result.json"))
    }
}

impl ResultPersister for JsonFilePersister {
    fn save<'a>(&'a self, job_id: Uuid, record: &'a JobRecord) -> BoxFuture<'a, Result<String, PersistError>> {
        Box::pin(async move {
            let body = serde_json::to_vec_pretty(record)?;
            tokio::fs::create_dir_all(&self.dir).await?;
            let path = self.path_for(job_id);
            tokio::fs::write(&path, body).await?;
            tracing::info!(job_id = %job_id, path = %path.display(), "Result saved");
            Ok(path.display().to_string())
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
