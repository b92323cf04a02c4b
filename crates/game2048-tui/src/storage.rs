//! Storage backends for the terminal front end
//!
//! Supports different backends based on environment:
//! - Local: JSON files under the data directory
//! - Test: in-memory stores that vanish on exit

use game2048_billing::Billing;
use game2048_core::{
    MemoryScoreBook, MemorySessionStore, ScoreRecord, ScoreSink, SessionStore, StoreError, UserId,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::AppResult;

/// Environment configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// File-backed storage in the data directory
    Local,
    /// In-memory stores
    Test,
}

impl Environment {
    /// Detect environment from the G2048_ENV variable
    pub fn detect() -> Self {
        Self::from_value(std::env::var("G2048_ENV").ok().as_deref())
    }

    fn from_value(value: Option<&str>) -> Self {
        match value {
            Some("test") | Some("testing") => Environment::Test,
            _ => Environment::Local,
        }
    }
}

/// `G2048_DATA_DIR`, else the platform data directory
pub fn data_dir() -> PathBuf {
    match std::env::var_os("G2048_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("g2048"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn backend_error(e: io::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(backend_error)?;
    }
    let json =
        serde_json::to_string_pretty(value).map_err(|e| StoreError::Backend(e.to_string()))?;
    fs::write(path, json).map_err(backend_error)
}

// ==================== Session files ====================

/// One JSON blob per session under `<dir>/sessions/`
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session: &str) -> PathBuf {
        let name: String = session
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, session: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(session)) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(backend_error(e)),
        }
    }

    fn save(&self, session: &str, blob: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(backend_error)?;
        fs::write(self.path_for(session), blob).map_err(backend_error)
    }

    fn clear(&self, session: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(session)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(backend_error(e)),
        }
    }
}

// ==================== Score file ====================

/// Score log kept in a single JSON file
pub struct LocalScoreBook {
    path: PathBuf,
    cache: Mutex<Option<Vec<ScoreRecord>>>,
}

impl LocalScoreBook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    fn load(&self) -> Result<Vec<ScoreRecord>, StoreError> {
        let mut cache = lock(&self.cache);
        if let Some(records) = cache.as_ref() {
            return Ok(records.clone());
        }
        let records: Vec<ScoreRecord> = match fs::read_to_string(&self.path) {
            Ok(json) => serde_json::from_str(&json).map_err(|e| {
                log::error!("unreadable score file {}: {}", self.path.display(), e);
                StoreError::Backend(e.to_string())
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(backend_error(e)),
        };
        *cache = Some(records.clone());
        Ok(records)
    }
}

impl ScoreSink for LocalScoreBook {
    fn record(&self, record: ScoreRecord) -> Result<(), StoreError> {
        let mut records = self.load()?;
        records.push(record);
        write_json(&self.path, &records)?;
        *lock(&self.cache) = Some(records);
        Ok(())
    }

    fn records(&self) -> Result<Vec<ScoreRecord>, StoreError> {
        self.load()
    }
}

// ==================== Players ====================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PlayerData {
    names: Vec<String>,
}

/// Maps player names to stable user ids (1-based, in order of first use)
pub struct PlayerDirectory {
    path: Option<PathBuf>,
    data: Mutex<PlayerData>,
}

impl PlayerDirectory {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(PlayerData::default()),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(json) => {
                serde_json::from_str(&json).map_err(|e| StoreError::Backend(e.to_string()))?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => PlayerData::default(),
            Err(e) => return Err(backend_error(e)),
        };
        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    /// The id for `name`, registering it on first use
    pub fn id_for(&self, name: &str) -> Result<UserId, StoreError> {
        let mut data = lock(&self.data);
        if let Some(idx) = data.names.iter().position(|n| n == name) {
            return Ok(idx as UserId + 1);
        }
        data.names.push(name.to_string());
        if let Some(path) = &self.path {
            write_json(path, &*data)?;
        }
        log::info!("registered player {}", name);
        Ok(data.names.len() as UserId)
    }

    pub fn name_of(&self, user: UserId) -> String {
        let data = lock(&self.data);
        user.checked_sub(1)
            .and_then(|idx| data.names.get(idx as usize).cloned())
            .unwrap_or_else(|| format!("player #{}", user))
    }
}

// ==================== Backend factory ====================

/// Every collaborator the front end needs
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub scores: Arc<dyn ScoreSink>,
    pub billing: Billing,
    pub players: PlayerDirectory,
}

/// Open the stores for `env`, rooted at `dir` when file backed
pub fn open_stores(env: Environment, dir: &Path) -> AppResult<Stores> {
    let stores = match env {
        Environment::Local => Stores {
            sessions: Arc::new(FileSessionStore::new(dir.join("sessions"))),
            scores: Arc::new(LocalScoreBook::new(dir.join("scores.json"))),
            billing: Billing::open(dir.join("billing.json"))?,
            players: PlayerDirectory::open(dir.join("players.json"))?,
        },
        Environment::Test => Stores {
            sessions: Arc::new(MemorySessionStore::new()),
            scores: Arc::new(MemoryScoreBook::new()),
            billing: Billing::in_memory(),
            players: PlayerDirectory::in_memory(),
        },
    };
    log::debug!("opened {:?} stores at {}", env, dir.display());
    Ok(stores)
}
