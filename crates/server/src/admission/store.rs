//! Persistent admission state.
//!
//! Rate windows and block records are kept per client IP, keyed by the
//! SHA-256 of the address. The incident log is append-only, one JSON object
//! per line. [`FileStore`] keeps everything under a data directory so that
//! separate server processes on the same node share state; [`MemoryStore`]
//! backs tests.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::filter::IncidentKind;

/// Name of the incident log inside the data directory.
pub const INCIDENT_LOG: &str = "security.log";

/// Errors raised while reading or writing admission state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize admission state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("admission store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Request timestamps of one client within the trailing window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateWindow {
    pub timestamps: Vec<i64>,
}

impl RateWindow {
    /// Drop timestamps older than `now - window_secs`.
    pub fn prune(&mut self, now: i64, window_secs: u64) {
        let start = now.saturating_sub(window_secs as i64);
        self.timestamps.retain(|ts| *ts >= start);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn record(&mut self, now: i64) {
        self.timestamps.push(now);
    }
}

/// A temporary ban of one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub ip: String,
    pub blocked_at: i64,
    pub blocked_until: i64,
    pub reason: String,
}

impl BlockRecord {
    pub fn is_active(&self, now: i64) -> bool {
        now < self.blocked_until
    }
}

/// One line of the incident log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Local time, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    pub ip: String,
    #[serde(rename = "type")]
    pub kind: IncidentKind,
    pub user_agent: String,
    pub request_uri: String,
    pub referer: String,
}

/// Summary of the incident log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentStats {
    pub total_incidents: usize,
    /// The most recent incidents, oldest first.
    pub recent_incidents: Vec<Incident>,
}

/// Backing storage for admission state.
///
/// Implementations need not serialize concurrent updates of the same key;
/// the filter holds a per-key lock around each read-modify-write.
pub trait AdmissionStore: Send + Sync {
    fn load_window(&self, ip: &str) -> Result<RateWindow, StoreError>;

    fn save_window(&self, ip: &str, window: &RateWindow) -> Result<(), StoreError>;

    fn load_block(&self, ip: &str) -> Result<Option<BlockRecord>, StoreError>;

    fn save_block(&self, record: &BlockRecord) -> Result<(), StoreError>;

    fn remove_block(&self, ip: &str) -> Result<(), StoreError>;

    fn append_incident(&self, incident: &Incident) -> Result<(), StoreError>;

    /// Every incident in log order.
    fn incidents(&self) -> Result<Vec<Incident>, StoreError>;

    /// Total count plus the last `recent` incidents.
    fn stats(&self, recent: usize) -> Result<IncidentStats, StoreError> {
        let all = self.incidents()?;
        let total_incidents = all.len();
        let skip = total_incidents.saturating_sub(recent);
        Ok(IncidentStats {
            total_incidents,
            recent_incidents: all.into_iter().skip(skip).collect(),
        })
    }
}

/// Hex SHA-256 of an address, used in state file names.
pub fn ip_key(ip: &str) -> String {
    hex::encode(Sha256::digest(ip.as_bytes()))
}

/// Admission state stored as JSON files in a data directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    log_lock: Mutex<()>,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;

        tracing::debug!("Admission state stored in {:?}", dir);
        Ok(Self {
            dir,
            log_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn window_path(&self, ip: &str) -> PathBuf {
        self.dir.join(format!("rate_{}.json", ip_key(ip)))
    }

    pub fn block_path(&self, ip: &str) -> PathBuf {
        self.dir.join(format!("blocked_{}.json", ip_key(ip)))
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(INCIDENT_LOG)
    }

    /// Read and parse a state file. Missing and corrupt files are `None`.
    fn read_json<T: for<'de> Deserialize<'de>>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };

        match serde_json::from_str(&contents) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("Ignoring corrupt admission state {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    /// Write to a temp file, then rename over the target.
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let contents = serde_json::to_string(value)?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, contents).map_err(|e| StoreError::io(&temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| StoreError::io(path, e))?;
        Ok(())
    }
}

impl AdmissionStore for FileStore {
    fn load_window(&self, ip: &str) -> Result<RateWindow, StoreError> {
        Ok(self.read_json(&self.window_path(ip))?.unwrap_or_default())
    }

    fn save_window(&self, ip: &str, window: &RateWindow) -> Result<(), StoreError> {
        self.write_json(&self.window_path(ip), window)
    }

    fn load_block(&self, ip: &str) -> Result<Option<BlockRecord>, StoreError> {
        self.read_json(&self.block_path(ip))
    }

    fn save_block(&self, record: &BlockRecord) -> Result<(), StoreError> {
        self.write_json(&self.block_path(&record.ip), record)
    }

    fn remove_block(&self, ip: &str) -> Result<(), StoreError> {
        let path = self.block_path(ip);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn append_incident(&self, incident: &Incident) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(incident)?;
        line.push('\n');

        let path = self.log_path();
        let _guard = self.log_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        // One write per line keeps lines whole under O_APPEND.
        file.write_all(line.as_bytes())
            .map_err(|e| StoreError::io(&path, e))?;
        Ok(())
    }

    fn incidents(&self) -> Result<Vec<Incident>, StoreError> {
        let path = self.log_path();
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(incident) => Some(incident),
                Err(e) => {
                    tracing::debug!("Skipping unparsable incident line: {}", e);
                    None
                }
            })
            .collect())
    }
}

/// In-memory admission state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    windows: Mutex<HashMap<String, RateWindow>>,
    blocks: Mutex<HashMap<String, BlockRecord>>,
    incidents: Mutex<Vec<Incident>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AdmissionStore for MemoryStore {
    fn load_window(&self, ip: &str) -> Result<RateWindow, StoreError> {
        let windows = self.windows.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(windows.get(ip).cloned().unwrap_or_default())
    }

    fn save_window(&self, ip: &str, window: &RateWindow) -> Result<(), StoreError> {
        let mut windows = self.windows.lock().map_err(|_| StoreError::LockPoisoned)?;
        windows.insert(ip.to_string(), window.clone());
        Ok(())
    }

    fn load_block(&self, ip: &str) -> Result<Option<BlockRecord>, StoreError> {
        let blocks = self.blocks.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(blocks.get(ip).cloned())
    }

    fn save_block(&self, record: &BlockRecord) -> Result<(), StoreError> {
        let mut blocks = self.blocks.lock().map_err(|_| StoreError::LockPoisoned)?;
        blocks.insert(record.ip.clone(), record.clone());
        Ok(())
    }

    fn remove_block(&self, ip: &str) -> Result<(), StoreError> {
        let mut blocks = self.blocks.lock().map_err(|_| StoreError::LockPoisoned)?;
        blocks.remove(ip);
        Ok(())
    }

    fn append_incident(&self, incident: &Incident) -> Result<(), StoreError> {
        let mut incidents = self.incidents.lock().map_err(|_| StoreError::LockPoisoned)?;
        incidents.push(incident.clone());
        Ok(())
    }

    fn incidents(&self) -> Result<Vec<Incident>, StoreError> {
        let incidents = self.incidents.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(incidents.clone())
    }
}
