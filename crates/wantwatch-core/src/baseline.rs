//! Durable whole-snapshot storage for the [`Baseline`].
//!
//! Callers only ever see `load` and `save` of the complete snapshot. The file
//! store writes a sibling temp file, fsyncs it, and renames it over the
//! document, so a reader observes either the old snapshot or the new one.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::ErrorCode;
use crate::model::Baseline;

/// Logical name of the baseline document when none is configured.
pub const DEFAULT_BASELINE_KEY: &str = "notified_counts";

/// Failure to read or write the baseline snapshot.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read baseline {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("baseline document {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write baseline {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode baseline: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("baseline store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Machine-readable code associated with this store error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Corrupt { .. } => ErrorCode::CorruptBaseline,
            Self::Read { .. } | Self::Write { .. } | Self::Encode(_) | Self::Unavailable(_) => {
                ErrorCode::PersistenceFailure
            }
        }
    }
}

/// Whole-snapshot persistence of the baseline.
pub trait BaselineStore {
    /// Load the last saved snapshot. No prior history yields an empty baseline.
    fn load(&self) -> Result<Baseline, StoreError>;

    /// Replace the stored snapshot with `baseline`, atomically.
    fn save(&self, baseline: &Baseline) -> Result<(), StoreError>;
}

/// JSON document on the local filesystem, keyed by a fixed logical name.
#[derive(Debug, Clone)]
pub struct FileBaselineStore {
    path: PathBuf,
}

impl FileBaselineStore {
    /// Store the document `<key>.json` inside `dir`.
    #[must_use]
    pub fn new(dir: &Path, key: &str) -> Self {
        Self {
            path: dir.join(format!("{key}.json")),
        }
    }

    /// Location of the baseline document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the stored document so the next run bootstraps again.
    ///
    /// Returns `false` when there was nothing to remove.
    pub fn reset(&self) -> Result<bool, StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    fn write_err(&self, source: io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl BaselineStore for FileBaselineStore {
    fn load(&self) -> Result<Baseline, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no baseline document yet");
                return Ok(Baseline::new());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let baseline: Baseline =
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), entries = baseline.len(), "baseline loaded");
        Ok(baseline)
    }

    fn save(&self, baseline: &Baseline) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.write_err(source))?;
        }

        let encoded = serde_json::to_vec_pretty(baseline).map_err(StoreError::Encode)?;
        let tmp = self.tmp_path();
        {
            let mut file = File::create(&tmp).map_err(|source| self.write_err(source))?;
            file.write_all(&encoded)
                .and_then(|()| file.write_all(b"\n"))
                .and_then(|()| file.sync_all())
                .map_err(|source| self.write_err(source))?;
        }
        fs::rename(&tmp, &self.path).map_err(|source| self.write_err(source))?;

        debug!(path = %self.path.display(), entries = baseline.len(), "baseline saved");
        Ok(())
    }
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBaselineStore {
    snapshot: Mutex<Option<Baseline>>,
    saves: Mutex<usize>,
}

impl MemoryBaselineStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `baseline` already persisted.
    #[must_use]
    pub fn with_baseline(baseline: Baseline) -> Self {
        Self {
            snapshot: Mutex::new(Some(baseline)),
            saves: Mutex::new(0),
        }
    }

    /// The currently persisted snapshot, if any save happened or one was seeded.
    #[must_use]
    pub fn snapshot(&self) -> Option<Baseline> {
        self.snapshot.lock().ok().and_then(|guard| guard.clone())
    }

    /// Number of successful `save` calls.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.lock().map_or(0, |guard| *guard)
    }
}

impl BaselineStore for MemoryBaselineStore {
    fn load(&self) -> Result<Baseline, StoreError> {
        let guard = self
            .snapshot
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".to_string()))?;
        Ok(guard.clone().unwrap_or_default())
    }

    fn save(&self, baseline: &Baseline) -> Result<(), StoreError> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".to_string()))?;
        *guard = Some(baseline.clone());
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;

    fn sample() -> Baseline {
        [(ItemId::from(1_u64), 3), (ItemId::from(2_u64), 0)]
            .into_iter()
            .collect()
    }

    #[test]
    fn missing_document_loads_as_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileBaselineStore::new(temp.path(), DEFAULT_BASELINE_KEY);

        let baseline = store.load().expect("load should succeed");
        assert!(baseline.is_empty());
    }

    #[test]
    fn save_then_load_returns_same_snapshot() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileBaselineStore::new(&temp.path().join("nested/state"), "counts");

        store.save(&sample()).expect("save");
        assert_eq!(store.load().expect("load"), sample());
        assert!(!store.tmp_path().exists(), "temp file must be renamed away");
    }

    #[test]
    fn save_replaces_whole_snapshot() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileBaselineStore::new(temp.path(), "counts");
        store.save(&sample()).expect("first save");

        let replacement: Baseline = [(ItemId::from(9_u64), 1)].into_iter().collect();
        store.save(&replacement).expect("second save");

        assert_eq!(store.load().expect("load"), replacement);
    }

    #[test]
    fn corrupt_document_is_an_error_not_an_empty_baseline() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileBaselineStore::new(temp.path(), "counts");
        fs::write(store.path(), "{ not json").expect("write garbage");

        let err = store.load().expect_err("corrupt document must fail");
        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert_eq!(err.code(), ErrorCode::CorruptBaseline);
    }

    #[test]
    fn document_layout_is_string_keyed_object() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileBaselineStore::new(temp.path(), "counts");
        store.save(&sample()).expect("save");

        let raw = fs::read_to_string(store.path()).expect("read");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value, serde_json::json!({"1": 3, "2": 0}));
    }

    #[test]
    fn reset_removes_document() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileBaselineStore::new(temp.path(), "counts");
        assert!(!store.reset().expect("reset on empty"));

        store.save(&sample()).expect("save");
        assert!(store.reset().expect("reset"));
        assert!(store.load().expect("load").is_empty());
    }

    #[test]
    fn memory_store_tracks_saves() {
        let store = MemoryBaselineStore::new();
        assert!(store.load().expect("load").is_empty());
        assert!(store.snapshot().is_none());

        store.save(&sample()).expect("save");
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.snapshot(), Some(sample()));
    }
}
