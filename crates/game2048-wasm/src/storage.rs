//! `localStorage` backends for the browser build

use game2048_core::{Entitlements, ScoreRecord, ScoreSink, SessionStore, StoreError, UserId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use web_sys::Storage;

const KEY_PREFIX: &str = "g2048:";
pub(crate) const SCORES_KEY: &str = "g2048:scores";

pub(crate) fn warn(message: &str) {
    web_sys::console::warn_1(&message.into());
}

fn local_storage() -> Result<Storage, StoreError> {
    web_sys::window()
        .ok_or_else(|| StoreError::Unavailable("no window".into()))?
        .local_storage()
        .map_err(|_| StoreError::Unavailable("localStorage is blocked".into()))?
        .ok_or_else(|| StoreError::Unavailable("localStorage is missing".into()))
}

fn backend(action: &str, key: &str) -> StoreError {
    let err = StoreError::Backend(format!("{} {} failed", action, key));
    warn(&err.to_string());
    err
}

/// Session blobs under `g2048:<session>`
///
/// The `Storage` handle is looked up per call; it is not `Send`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSessionStore;

impl LocalSessionStore {
    fn key(session: &str) -> String {
        format!("{}{}", KEY_PREFIX, session)
    }
}

impl SessionStore for LocalSessionStore {
    fn load(&self, session: &str) -> Result<Option<String>, StoreError> {
        let key = Self::key(session);
        local_storage()?
            .get_item(&key)
            .map_err(|_| backend("read", &key))
    }

    fn save(&self, session: &str, blob: &str) -> Result<(), StoreError> {
        let key = Self::key(session);
        local_storage()?
            .set_item(&key, blob)
            .map_err(|_| backend("write", &key))
    }

    fn clear(&self, session: &str) -> Result<(), StoreError> {
        let key = Self::key(session);
        local_storage()?
            .remove_item(&key)
            .map_err(|_| backend("remove", &key))
    }
}

/// Finished games kept as one JSON array
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalScoreBook;

impl ScoreSink for LocalScoreBook {
    fn record(&self, record: ScoreRecord) -> Result<(), StoreError> {
        let mut records = self.records()?;
        records.push(record);
        let json =
            serde_json::to_string(&records).map_err(|e| StoreError::Backend(e.to_string()))?;
        local_storage()?
            .set_item(SCORES_KEY, &json)
            .map_err(|_| backend("write", SCORES_KEY))
    }

    fn records(&self) -> Result<Vec<ScoreRecord>, StoreError> {
        let stored = local_storage()?
            .get_item(SCORES_KEY)
            .map_err(|_| backend("read", SCORES_KEY))?;
        match stored {
            Some(json) => serde_json::from_str(&json).map_err(|e| {
                warn(&format!("unreadable score book: {}", e));
                StoreError::Backend(e.to_string())
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// Premium switch flipped by the page once the server confirms a subscription
#[derive(Debug, Default, Clone)]
pub struct PremiumFlag(Arc<AtomicBool>);

impl PremiumFlag {
    pub fn set(&self, active: bool) {
        self.0.store(active, Ordering::Relaxed);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Entitlements for PremiumFlag {
    fn is_premium_active(&self, _user: UserId) -> bool {
        self.get()
    }
}
