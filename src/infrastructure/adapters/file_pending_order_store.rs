use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::PendingOrderMarker;
use crate::ports::PendingOrderStorePort;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Pending-order marker kept as a JSON file.
///
/// A write goes to a sibling temp file first and is renamed over the
/// marker, so readers see either the old marker or the new one.
#[derive(Debug, Clone)]
pub struct FilePendingOrderStore {
    path: PathBuf,
}

impl FilePendingOrderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "pending_order".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PendingOrderStorePort for FilePendingOrderStore {
    fn set_pending_order(&self, marker: &PendingOrderMarker) -> DomainResult<()> {
        let body = serde_json::to_vec(marker)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp = self.temp_path();
        let written = fs::File::create(&temp).and_then(|mut file| {
            file.write_all(&body)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|_| fs::rename(&temp, &self.path)) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        debug!("Pending order {} written to {}", marker.order_id, self.path.display());
        Ok(())
    }

    fn get_pending_order(&self) -> DomainResult<Option<PendingOrderMarker>> {
        let body = match fs::read(&self.path) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&body) {
            Ok(marker) => Ok(Some(marker)),
            Err(e) => {
                // unreadable marker cannot be resumed, drop it
                warn!("Discarding unreadable pending order marker: {}", e);
                self.clear_pending_order()?;
                Ok(None)
            }
        }
    }

    fn clear_pending_order(&self) -> DomainResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DomainError::StorageError(e)),
        }
    }
}
