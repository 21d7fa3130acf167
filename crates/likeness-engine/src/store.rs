//! Disk-backed keyed collection of identity records.
//!
//! The whole map is serialized to one JSON snapshot and rewritten on every
//! save. The store itself holds no lock: it is owned by the engine thread,
//! which is the only place it is read or written.

use likeness_core::{IdentityRecord, Person};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SNAPSHOT_FILE: &str = "data_library.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot {} is corrupt: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode snapshot {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// True when the snapshot simply does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// On-disk layout of the snapshot.
#[derive(Deserialize)]
struct Snapshot {
    #[serde(rename = "users_lib", default)]
    identities: BTreeMap<String, IdentityRecord>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    #[serde(rename = "users_lib")]
    identities: &'a BTreeMap<String, IdentityRecord>,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

/// Identity records keyed by [`Person::key`], iterated in key order.
#[derive(Debug)]
pub struct IdentityStore {
    data_dir: PathBuf,
    identities: BTreeMap<String, IdentityRecord>,
}

impl IdentityStore {
    /// An empty store bound to `data_dir`. Nothing is read or written.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            identities: BTreeMap::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    /// Directory holding one identity's crops and renders.
    pub fn record_dir(&self, person: &Person) -> PathBuf {
        self.data_dir.join(person.key())
    }

    pub fn ensure_data_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir).map_err(|source| StoreError::Io {
            path: self.data_dir.clone(),
            source,
        })
    }

    /// Replace the in-memory map with the snapshot on disk.
    ///
    /// On error the in-memory map is left as it was. Returns the number of
    /// identities loaded.
    pub fn load(&mut self) -> Result<usize, StoreError> {
        let path = self.snapshot_path();
        let file = File::open(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| StoreError::Decode { path, source })?;

        self.identities = snapshot.identities;
        Ok(self.identities.len())
    }

    /// Rewrite the whole snapshot.
    ///
    /// Written to a sibling temp file and renamed into place, so a failed
    /// write never truncates the previous snapshot. The temp file is removed
    /// if any step fails.
    pub fn save(&self) -> Result<(), StoreError> {
        let path = self.snapshot_path();
        let tmp = path.with_extension("json.tmp");

        let written = self
            .write_snapshot(&tmp)
            .and_then(|()| fs::rename(&tmp, &path).map_err(io_err(&path)));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %tmp.display(), error = %cleanup, "temp snapshot not removed");
                }
            }
            return Err(e);
        }

        tracing::debug!(path = %path.display(), identities = self.identities.len(), "snapshot saved");
        Ok(())
    }

    fn write_snapshot(&self, tmp: &Path) -> Result<(), StoreError> {
        let file = File::create(tmp).map_err(io_err(tmp))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(
            &mut writer,
            &SnapshotRef {
                identities: &self.identities,
            },
        )
        .map_err(|source| StoreError::Encode {
            path: tmp.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(io_err(tmp))
    }

    /// Insert or overwrite the record under its composite key, then save.
    ///
    /// The record stays in memory even when the save fails.
    pub fn add_identity(&mut self, record: IdentityRecord) -> Result<(), StoreError> {
        let key = record.key();
        if self.identities.insert(key.clone(), record).is_some() {
            tracing::info!(key = %key, "identity overwritten");
        }
        self.save()
    }

    pub fn get(&self, key: &str) -> Option<&IdentityRecord> {
        self.identities.get(key)
    }

    pub fn identities(&self) -> &BTreeMap<String, IdentityRecord> {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn trained_count(&self) -> usize {
        self.identities.values().filter(|r| r.is_trained()).count()
    }
}
