pub mod history;

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::probe::latency::LatencyStats;
use crate::severity::Severity;

use self::history::{ChangelogEntry, HistoryEntry};

pub const MESSAGE_ID_FILE: &str = "ow_message_id.txt";
pub const LAST_PAYLOAD_FILE: &str = "last_payload.json";
pub const HISTORY_FILE: &str = "history.json";
pub const LATENCY_FILE: &str = "last_latency.json";
pub const STATE_FILE: &str = "state.json";
pub const CHANGELOG_FILE: &str = "changelog.json";
pub const PLATFORM_CACHE_FILE: &str = "platform_cache.json";

/// Last known state of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPlatformState {
    pub state: Severity,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub ts: DateTime<Utc>,
}

/// Platform cache keyed by platform name.
pub type PlatformCache = BTreeMap<String, CachedPlatformState>;

/// Latency stats of the previous run keyed by region.
pub type LatencySnapshot = BTreeMap<String, LatencyStats>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct StateRecord {
    state: Severity,
}

/// File-backed run state. Each entity lives in its own file under one
/// directory.
///
/// Reads never fail: a missing or corrupt file yields the entity's default
/// (corruption is logged). Writes propagate errors. There is no locking;
/// only one run may use a directory at a time.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Open (creating if needed) the state directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating state directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str, default: T) -> T {
        let path = self.path(name);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return default,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable state file, using default");
                return default;
            }
        };

        match serde_json::from_slice(&data) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt state file, using default");
                default
            }
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let data = serde_json::to_vec(value).with_context(|| format!("serializing {name}"))?;
        self.write_bytes(name, &data)
    }

    fn write_bytes(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.path(name);
        std::fs::write(&path, data).with_context(|| format!("writing {}", path.display()))
    }

    // --- History ---

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.read_json(HISTORY_FILE, Vec::new())
    }

    pub fn save_history(&self, history: &[HistoryEntry]) -> Result<()> {
        self.write_json(HISTORY_FILE, history)
    }

    // --- Overall state and changelog ---

    /// Previously persisted overall state. Defaults to `ok`.
    pub fn overall_state(&self) -> Severity {
        self.read_json(
            STATE_FILE,
            StateRecord {
                state: Severity::Ok,
            },
        )
        .state
    }

    pub fn save_overall_state(&self, state: Severity) -> Result<()> {
        self.write_json(STATE_FILE, &StateRecord { state })
    }

    pub fn changelog(&self) -> Vec<ChangelogEntry> {
        self.read_json(CHANGELOG_FILE, Vec::new())
    }

    pub fn save_changelog(&self, changelog: &[ChangelogEntry]) -> Result<()> {
        self.write_json(CHANGELOG_FILE, changelog)
    }

    // --- Latency snapshot ---

    pub fn latency_snapshot(&self) -> LatencySnapshot {
        self.read_json(LATENCY_FILE, LatencySnapshot::new())
    }

    pub fn save_latency_snapshot(&self, snapshot: &LatencySnapshot) -> Result<()> {
        self.write_json(LATENCY_FILE, snapshot)
    }

    // --- Platform cache ---

    pub fn platform_cache(&self) -> PlatformCache {
        self.read_json(PLATFORM_CACHE_FILE, PlatformCache::new())
    }

    pub fn save_platform_cache(&self, cache: &PlatformCache) -> Result<()> {
        self.write_json(PLATFORM_CACHE_FILE, cache)
    }

    // --- Publisher state ---

    /// Change-detection snapshot of the last published payload, if any.
    pub fn last_payload(&self) -> Option<Vec<u8>> {
        match std::fs::read(self.path(LAST_PAYLOAD_FILE)) {
            Ok(data) => Some(data),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(error = %e, "unreadable payload snapshot, treating as absent");
                None
            }
        }
    }

    pub fn save_last_payload(&self, payload: &[u8]) -> Result<()> {
        self.write_bytes(LAST_PAYLOAD_FILE, payload)
    }

    /// Identifier of the active message. Blank files count as absent.
    pub fn message_id(&self) -> Option<String> {
        match std::fs::read_to_string(self.path(MESSAGE_ID_FILE)) {
            Ok(raw) => Some(raw.trim().to_string()).filter(|id| !id.is_empty()),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(error = %e, "unreadable message id, treating as absent");
                None
            }
        }
    }

    pub fn save_message_id(&self, id: &str) -> Result<()> {
        self.write_bytes(MESSAGE_ID_FILE, id.as_bytes())
    }

    pub fn clear_message_id(&self) -> Result<()> {
        let path = self.path(MESSAGE_ID_FILE);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
}
