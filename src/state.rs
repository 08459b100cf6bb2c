// SPDX-License-Identifier: MIT
//! Durable store for in-progress sequence blockages.
//!
//! One JSON document per node records, per mount and per kind (arfind /
//! stfind), when the currently observed blocking inode was first seen.
//! Multiple independent check invocations may run concurrently against the
//! same document, so every read-modify-write holds an exclusive `flock` on a
//! sidecar lock file for the entire critical section, and the document itself
//! is replaced atomically (temp file + rename). Reporting-only reads take a
//! shared lock.
//!
//! The store never guesses: if the lock cannot be acquired or the write
//! fails, the caller gets [`CheckError::State`] and reports UNKNOWN.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::CheckError;

/// Default on-disk location of the state document.
pub const DEFAULT_STATE_FILE: &str = "/var/lib/scoutam-check/sequences.json";
/// Environment override for the state file path (fixtures and tests).
pub const STATE_FILE_ENV: &str = "SCOUTAM_CHECK_STATE_FILE";

/// Current document schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Blockage record for one kind (arfind or stfind) on one mount.
///
/// Invariant: `blocked_since` and `inode` are set together, exactly when the
/// most recent observation found a blocking condition. A different blocking
/// inode is a new blockage — the timer restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRecord {
    /// Epoch seconds of the first observation of the current blocking inode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_since: Option<u64>,
    /// The blocking inode, when blocked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inode: Option<u64>,
    /// Diagnostic reason text reported by the cluster, when blocked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Epoch seconds of the most recent observation.
    pub last_seen: u64,
}

/// Arfind and stfind records for one mount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSequences {
    pub arfind: SequenceRecord,
    pub stfind: SequenceRecord,
}

/// The full persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceState {
    pub schema_version: u32,
    /// Keyed by mount path. BTreeMap keeps the serialized form stable.
    pub mounts: BTreeMap<String, MountSequences>,
}

impl Default for SequenceState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            mounts: BTreeMap::new(),
        }
    }
}

/// Handle on the state document location.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve the store location: env override, else the fixed default.
    pub fn from_env() -> Self {
        let path = std::env::var(STATE_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STATE_FILE));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Read the document under a shared lock. A missing file is an empty
    /// state; a corrupt file is reset to empty (and logged) rather than
    /// poisoning every subsequent run.
    pub fn load(&self) -> Result<SequenceState, CheckError> {
        if !self.path.exists() {
            return Ok(SequenceState::default());
        }
        let _lock = FileLock::shared(&self.lock_path())?;
        self.read_unlocked()
    }

    /// Read-modify-write under an exclusive lock spanning the whole critical
    /// section. `apply` receives the current state and returns the state to
    /// persist; the document is rewritten atomically in one pass.
    pub fn update<F>(&self, apply: F) -> Result<SequenceState, CheckError>
    where
        F: FnOnce(SequenceState) -> SequenceState,
    {
        self.ensure_dir()?;
        let _lock = FileLock::exclusive(&self.lock_path())?;
        let current = if self.path.exists() {
            self.read_unlocked()?
        } else {
            SequenceState::default()
        };
        let next = apply(current);
        self.write_unlocked(&next)?;
        Ok(next)
    }

    /// Delete the document if present. Used on non-leader nodes so a demoted
    /// former leader never reports stale blockage durations.
    pub fn remove(&self) -> Result<bool, CheckError> {
        if !self.path.exists() {
            return Ok(false);
        }
        let _lock = FileLock::exclusive(&self.lock_path())?;
        std::fs::remove_file(&self.path)
            .map_err(|e| CheckError::State(format!("cannot remove {}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), "removed stale sequence state");
        Ok(true)
    }

    fn read_unlocked(&self) -> Result<SequenceState, CheckError> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| CheckError::State(format!("cannot read {}: {e}", self.path.display())))?;
        match serde_json::from_str::<SequenceState>(&raw) {
            Ok(state) if state.schema_version == SCHEMA_VERSION => Ok(state),
            Ok(state) => {
                warn!(
                    found = state.schema_version,
                    expected = SCHEMA_VERSION,
                    "state schema version mismatch, resetting"
                );
                Ok(SequenceState::default())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file corrupt, resetting");
                Ok(SequenceState::default())
            }
        }
    }

    fn write_unlocked(&self, state: &SequenceState) -> Result<(), CheckError> {
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(state)
            .map_err(|e| CheckError::State(format!("cannot serialize state: {e}")))?;
        std::fs::write(&tmp, body)
            .map_err(|e| CheckError::State(format!("cannot write {}: {e}", tmp.display())))?;
        restrict_file_mode(&tmp)?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            CheckError::State(format!("cannot replace {}: {e}", self.path.display()))
        })?;
        Ok(())
    }

    /// Create the state directory with group access but no world access.
    fn ensure_dir(&self) -> Result<(), CheckError> {
        let Some(dir) = self.path.parent() else {
            return Ok(());
        };
        if dir.as_os_str().is_empty() || dir.exists() {
            return Ok(());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o750)
                .create(dir)
                .map_err(|e| {
                    CheckError::State(format!("cannot create {}: {e}", dir.display()))
                })?;
        }
        #[cfg(not(unix))]
        std::fs::create_dir_all(dir)
            .map_err(|e| CheckError::State(format!("cannot create {}: {e}", dir.display())))?;
        Ok(())
    }
}

/// Owner/group read only, no world access.
fn restrict_file_mode(path: &Path) -> Result<(), CheckError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o640))
            .map_err(|e| CheckError::State(format!("cannot chmod {}: {e}", path.display())))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// RAII flock on a sidecar file. The sidecar is never renamed, so the lock
/// identity is stable across atomic replacements of the document itself.
struct FileLock {
    _file: File,
}

impl FileLock {
    fn shared(path: &Path) -> Result<Self, CheckError> {
        Self::acquire(path, false)
    }

    fn exclusive(path: &Path) -> Result<Self, CheckError> {
        Self::acquire(path, true)
    }

    #[cfg(unix)]
    fn acquire(path: &Path, exclusive: bool) -> Result<Self, CheckError> {
        use std::os::unix::io::AsRawFd;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| CheckError::State(format!("cannot open lock {}: {e}", path.display())))?;
        let op = if exclusive { libc::LOCK_EX } else { libc::LOCK_SH };
        // Blocks until granted; the overall command timeout bounds the wait.
        let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
        if rc != 0 {
            return Err(CheckError::State(format!(
                "cannot lock {}: {}",
                path.display(),
                std::io::Error::last_os_error()
            )));
        }
        Ok(Self { _file: file })
    }

    #[cfg(not(unix))]
    fn acquire(path: &Path, _exclusive: bool) -> Result<Self, CheckError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| CheckError::State(format!("cannot open lock {}: {e}", path.display())))?;
        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> StateStore {
        StateStore::new(dir.path().join("sequences.json"))
    }

    #[test]
    fn missing_file_loads_as_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = store_in(&dir).load().unwrap();
        assert!(state.mounts.is_empty());
        assert_eq!(state.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn corrupt_file_resets_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{not json").unwrap();
        let state = store.load().unwrap();
        assert!(state.mounts.is_empty());
    }

    #[test]
    fn update_roundtrips_and_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .update(|mut s| {
                s.mounts.entry("/mnt/fs1".into()).or_default().arfind = SequenceRecord {
                    blocked_since: Some(1000),
                    inode: Some(42),
                    reason: Some("pending copy".into()),
                    last_seen: 1000,
                };
                s
            })
            .unwrap();
        // No temp file left behind.
        assert!(!store.path().with_extension("json.tmp").exists());
        let state = store.load().unwrap();
        assert_eq!(state.mounts["/mnt/fs1"].arfind.inode, Some(42));
    }

    #[cfg(unix)]
    #[test]
    fn state_file_excludes_world_access() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.update(|s| s).unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn remove_deletes_existing_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.update(|s| s).unwrap();
        assert!(store.remove().unwrap());
        assert!(!store.path().exists());
        assert!(!store.remove().unwrap());
    }

    /// Two concurrent exclusive updates must not lose either write: each
    /// holds the lock across its whole read-modify-write, so the second
    /// always sees the first's result.
    #[test]
    fn concurrent_updates_do_not_lose_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sequences.json");
        let mut handles = Vec::new();
        for i in 0..2u64 {
            let path = path.clone();
            handles.push(std::thread::spawn(move || {
                let store = StateStore::new(path);
                store
                    .update(|mut s| {
                        s.mounts
                            .entry(format!("/mnt/fs{i}"))
                            .or_default()
                            .arfind
                            .last_seen = i + 1;
                        s
                    })
                    .unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let state = StateStore::new(path).load().unwrap();
        assert_eq!(state.mounts.len(), 2, "one of two updates was dropped");
        assert_eq!(state.mounts["/mnt/fs0"].arfind.last_seen, 1);
        assert_eq!(state.mounts["/mnt/fs1"].arfind.last_seen, 2);
    }
}
