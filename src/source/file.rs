use std::path::{Path, PathBuf};

use async_trait::async_trait;
use busfeed_error::FetchError;
use tracing::debug;

use super::{decode_vehicles, DataSource, VehicleSnapshot};

/// Источник, который на каждую загрузку перечитывает документ
/// `getvehicles` из локального файла.
///
/// Годится для разработки без доступа к API: файл можно менять на ходу.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DataSource<VehicleSnapshot> for FileSource {
    async fn load(&self) -> Result<VehicleSnapshot, FetchError> {
        let body = tokio::fs::read(&self.path)
            .await
            .map_err(|e| FetchError::Io {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        let snapshot = decode_vehicles(&body)?;
        debug!(path = %self.path.display(), vehicles = snapshot.len(), "snapshot file loaded");
        Ok(snapshot)
    }
}
