//! Keyed session storage with time-based expiry
//!
//! The store holds exactly one [`Session`] per lobby code and carries no game
//! logic. Saves are compare-and-swap on [`Session::version`], so a writer
//! that loaded a stale copy gets [`StoreError::Conflict`] instead of silently
//! overwriting a newer one. Sessions idle for longer than the TTL are treated
//! as absent and eventually removed by the sweeper task.

use crate::session::Session;
use crate::utils::get_timestamp;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

const FILE_EXTENSION: &str = "session";

/// Failures of a [`SessionStore`] operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session record could not be encoded: {0}")]
    Codec(#[from] bincode::Error),
    #[error("session {code} was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        code: String,
        expected: u64,
        found: u64,
    },
    #[error("session {0} no longer exists")]
    Missing(String),
}

/// Storage for lobby sessions keyed by code.
///
/// Implementations must make `insert_new` and `save` atomic per code. The
/// gateway additionally serializes writes to one lobby, so the version
/// check only trips when something outside it writes.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stores a brand new session. Returns false if the code is taken.
    async fn insert_new(&self, session: Session) -> Result<bool, StoreError>;

    /// Loads a live session. Expired sessions are reported as absent.
    async fn load(&self, code: &str) -> Result<Option<Session>, StoreError>;

    /// Replaces the stored session if its version still matches and
    /// returns the stored copy with the bumped version.
    async fn save(&self, session: Session) -> Result<Session, StoreError>;

    /// Deletes sessions idle past the TTL at `now`, regardless of status,
    /// and returns how many went.
    async fn remove_expired(&self, now: u64) -> Result<usize, StoreError>;

    /// Number of stored sessions, expired ones included until swept.
    async fn len(&self) -> Result<usize, StoreError>;
}

fn ttl_millis(ttl: Duration) -> u64 {
    ttl.as_millis().min(u64::MAX as u128) as u64
}

fn check_version(session: &Session, found: u64) -> Result<(), StoreError> {
    if session.version != found {
        return Err(StoreError::Conflict {
            code: session.code.clone(),
            expected: session.version,
            found,
        });
    }
    Ok(())
}

/// Sessions held in process memory.
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl_ms: u64,
}

impl MemoryStore {
    /// An empty store whose sessions expire after `ttl` without activity.
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl_ms: ttl_millis(ttl),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_new(&self, session: Session) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        let now = get_timestamp();
        if let Some(existing) = sessions.get(&session.code) {
            if !existing.is_expired(now, self.ttl_ms) {
                return Ok(false);
            }
        }
        sessions.insert(session.code.clone(), session);
        Ok(true)
    }

    async fn load(&self, code: &str) -> Result<Option<Session>, StoreError> {
        let sessions = self.sessions.read().await;
        let now = get_timestamp();
        Ok(sessions
            .get(code)
            .filter(|s| !s.is_expired(now, self.ttl_ms))
            .cloned())
    }

    async fn save(&self, mut session: Session) -> Result<Session, StoreError> {
        let mut sessions = self.sessions.write().await;
        let found = sessions
            .get(&session.code)
            .map(|s| s.version)
            .ok_or_else(|| StoreError::Missing(session.code.clone()))?;
        check_version(&session, found)?;

        session.version += 1;
        sessions.insert(session.code.clone(), session.clone());
        Ok(session)
    }

    async fn remove_expired(&self, now: u64) -> Result<usize, StoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now, self.ttl_ms));
        Ok(before - sessions.len())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.sessions.read().await.len())
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    version: u64,
    last_activity: u64,
}

/// One bincode record per lobby in a data directory.
///
/// Each code has its own lock, held across the file I/O for that record,
/// so a slow read or write only delays requests for the same lobby. The
/// in-memory index has a separate lock that is never held across I/O.
pub struct FileStore {
    dir: PathBuf,
    index: Mutex<HashMap<String, IndexEntry>>,
    record_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    ttl_ms: u64,
}

impl FileStore {
    /// Opens (or creates) the data directory and indexes existing records.
    ///
    /// Files that fail to decode are logged and skipped rather than
    /// failing the whole store.
    pub async fn open(dir: impl AsRef<Path>, ttl: Duration) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let mut index = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == FILE_EXTENSION) {
                continue;
            }
            match read_record(&path).await {
                Ok(session) => {
                    index.insert(session.code.clone(), IndexEntry::of(&session));
                }
                Err(e) => warn!("Skipping unreadable session file {}: {}", path.display(), e),
            }
        }

        info!("Opened session store at {} ({} sessions)", dir.display(), index.len());
        Ok(Self {
            dir,
            index: Mutex::new(index),
            record_locks: Mutex::new(HashMap::new()),
            ttl_ms: ttl_millis(ttl),
        })
    }

    /// Record path for a code, or `None` for codes that are not plain
    /// alphanumerics.
    fn path_for(&self, code: &str) -> Option<PathBuf> {
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(self.dir.join(format!("{}.{}", code, FILE_EXTENSION)))
    }

    fn is_live(&self, entry: &IndexEntry, now: u64) -> bool {
        now.saturating_sub(entry.last_activity) <= self.ttl_ms
    }

    /// Index entry for `code`, taking the index lock only for the lookup.
    async fn entry(&self, code: &str) -> Option<IndexEntry> {
        self.index.lock().await.get(code).copied()
    }

    async fn set_entry(&self, code: &str, entry: Option<IndexEntry>) {
        let mut index = self.index.lock().await;
        match entry {
            Some(entry) => index.insert(code.to_string(), entry),
            None => index.remove(code),
        };
    }

    /// The lock guarding the file of `code`.
    async fn record_lock(&self, code: &str) -> Arc<Mutex<()>> {
        let mut locks = self.record_locks.lock().await;
        Arc::clone(locks.entry(code.to_string()).or_default())
    }

    /// Forgets record locks nobody holds for codes no longer indexed.
    async fn prune_record_locks(&self) {
        let index = self.index.lock().await;
        let mut locks = self.record_locks.lock().await;
        locks.retain(|code, lock| Arc::strong_count(lock) > 1 || index.contains_key(code));
    }

    async fn write_record(&self, path: &Path, session: &Session) -> Result<(), StoreError> {
        let data = bincode::serialize(session)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

impl IndexEntry {
    fn of(session: &Session) -> Self {
        Self {
            version: session.version,
            last_activity: session.last_activity,
        }
    }
}

async fn read_record(path: &Path) -> Result<Session, StoreError> {
    let data = tokio::fs::read(path).await?;
    Ok(bincode::deserialize(&data)?)
}

#[async_trait]
impl SessionStore for FileStore {
    async fn insert_new(&self, session: Session) -> Result<bool, StoreError> {
        let path = self
            .path_for(&session.code)
            .ok_or_else(|| StoreError::Missing(session.code.clone()))?;
        let lock = self.record_lock(&session.code).await;
        let _record = lock.lock().await;

        let now = get_timestamp();
        if self
            .entry(&session.code)
            .await
            .is_some_and(|entry| self.is_live(&entry, now))
        {
            return Ok(false);
        }

        self.write_record(&path, &session).await?;
        self.set_entry(&session.code, Some(IndexEntry::of(&session)))
            .await;
        Ok(true)
    }

    async fn load(&self, code: &str) -> Result<Option<Session>, StoreError> {
        let Some(path) = self.path_for(code) else {
            return Ok(None);
        };
        if self.entry(code).await.is_none() {
            return Ok(None);
        }

        let lock = self.record_lock(code).await;
        let _record = lock.lock().await;
        match self.entry(code).await {
            Some(entry) if self.is_live(&entry, get_timestamp()) => {
                Ok(Some(read_record(&path).await?))
            }
            _ => Ok(None),
        }
    }

    async fn save(&self, mut session: Session) -> Result<Session, StoreError> {
        let path = self
            .path_for(&session.code)
            .ok_or_else(|| StoreError::Missing(session.code.clone()))?;
        let lock = self.record_lock(&session.code).await;
        let _record = lock.lock().await;

        let found = self
            .entry(&session.code)
            .await
            .map(|entry| entry.version)
            .ok_or_else(|| StoreError::Missing(session.code.clone()))?;
        check_version(&session, found)?;

        session.version += 1;
        self.write_record(&path, &session).await?;
        self.set_entry(&session.code, Some(IndexEntry::of(&session)))
            .await;
        Ok(session)
    }

    async fn remove_expired(&self, now: u64) -> Result<usize, StoreError> {
        let candidates: Vec<String> = self
            .index
            .lock()
            .await
            .iter()
            .filter(|(_, entry)| !self.is_live(entry, now))
            .map(|(code, _)| code.clone())
            .collect();

        let mut removed = 0;
        for code in &candidates {
            let lock = self.record_lock(code).await;
            let _record = lock.lock().await;
            let still_expired = self
                .entry(code)
                .await
                .is_some_and(|entry| !self.is_live(&entry, now));
            // Saved again since the scan
            if !still_expired {
                continue;
            }

            if let Some(path) = self.path_for(code) {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            self.set_entry(code, None).await;
            removed += 1;
        }

        self.prune_record_locks().await;
        Ok(removed)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.index.lock().await.len())
    }
}

/// Spawns the task that periodically drops expired sessions.
pub fn spawn_expiry_sweeper(store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;

            match store.remove_expired(get_timestamp()).await {
                Ok(0) => {}
                Ok(removed) => info!("Expired {} idle sessions", removed),
                Err(e) => error!("Session expiry sweep failed: {}", e),
            }
            debug!("Expiry sweep complete");
        }
    })
}
