//! Durable (layer, cell) progress pointer.
//!
//! Saves are atomic: the record is written to a temp file in the same
//! directory and renamed over the store, so a crash mid-write can never
//! corrupt or partially expose it. Loads clamp the record into the
//! configured range and fall back to the start on absence or corruption;
//! a bad checkpoint costs rework, never a failed start. Write failures are
//! logged and swallowed; the next save point simply tries again.

use crate::models::Checkpoint;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct CheckpointStore {
    path: PathBuf,
    /// Upper clamp for the persisted layer; a record equal to the total
    /// means the job finished its last save before completion.
    max_layer: u32,
    /// Upper clamp for the persisted cell index.
    max_cell: u32,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>, layers_total: u32, cells_per_layer: u32) -> Self {
        CheckpointStore {
            path: path.into(),
            max_layer: layers_total,
            max_cell: cells_per_layer.saturating_sub(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the resume pointer, defaulting to the start.
    pub fn load(&self) -> Checkpoint {
        if !self.path.exists() {
            return Checkpoint::start();
        }

        let parsed = std::fs::read_to_string(&self.path)
            .map_err(display_string)
            .and_then(|raw| serde_json::from_str::<Checkpoint>(&raw).map_err(display_string));

        match parsed {
            Ok(cp) => Checkpoint {
                layer: cp.layer.min(self.max_layer),
                cell: cp.cell.min(self.max_cell),
                updated_at: cp.updated_at,
            },
            Err(err) => {
                log::warn!(
                    "failed to read checkpoint file: {}. Starting from beginning.",
                    err
                );
                Checkpoint::start()
            }
        }
    }

    /// Atomically persist the pointer. Best-effort: failures are logged.
    pub fn save(&self, layer: u32, cell: u32) {
        let record = Checkpoint {
            layer,
            cell,
            updated_at: chrono::Utc::now().timestamp_millis(),
        };

        if let Err(err) = self.write_atomic(&record) {
            log::warn!("failed to save checkpoint: {}", err);
        }
    }

    fn write_atomic(&self, record: &Checkpoint) -> std::io::Result<()> {
        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
            None => tempfile::NamedTempFile::new_in(".")?,
        };

        let payload = serde_json::to_vec_pretty(record)?;
        tmp.write_all(&payload)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Remove the store. Called only after the entire job completes; a
    /// missing checkpoint is the sole signal of true completion.
    pub fn clear(&self) {
        if !self.path.exists() {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            log::warn!("failed to clear checkpoint file: {}", err);
        }
    }
}

fn display_string<E: std::fmt::Display>(err: E) -> String {
    err.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> CheckpointStore {
        CheckpointStore::new(dir.join("build-checkpoint.json"), 18, 256)
    }

    #[test]
    fn test_load_defaults_when_absent() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(store_in(dir.path()).load(), Checkpoint::start());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store_in(dir.path());
        store.save(3, 48);

        let cp = store.load();
        assert_eq!((cp.layer, cp.cell), (3, 48));
        assert!(cp.updated_at > 0);
    }

    #[test]
    fn test_load_clamps_out_of_range() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store_in(dir.path());
        std::fs::write(
            store.path(),
            r#"{"layer": 999, "cell": 4096, "updated_at": 0}"#,
        )
        .unwrap();

        let cp = store.load();
        assert_eq!((cp.layer, cp.cell), (18, 255));
    }

    #[test]
    fn test_corrupt_file_starts_over() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store_in(dir.path());
        std::fs::write(store.path(), "{ truncated").unwrap();
        assert_eq!(store.load(), Checkpoint::start());
    }

    #[test]
    fn test_clear_removes_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store_in(dir.path());
        store.save(1, 16);
        assert!(store.path().exists());

        store.clear();
        assert!(!store.path().exists());
        // Idempotent.
        store.clear();
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store_in(dir.path());
        store.save(0, 16);
        store.save(0, 32);

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
