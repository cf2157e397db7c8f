//! Process-wide mapping from session id to its open [`SessionStore`].

use crate::models::{
    sanitize_session_id, session_from_file_name, store_file_name, AcademicYear,
};
use crate::services::carry_forward;
use crate::services::metrics::SESSION_STORES_OPENED;
use crate::services::store::{SessionStore, StoreOptions};
use dashmap::DashMap;
use service_core::error::AppError;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

/// Lazily opens one store per session and keeps it for the process lifetime.
///
/// Session ids are canonicalized (trimmed, then reduced to alphanumerics,
/// `_` and `-`) before use, so every spelling of a session shares one handle
/// and the store always carries the canonical id. Opening is serialized per
/// session; a store that did not exist on disk is seeded from the previous
/// session before any caller sees it.
pub struct SessionRegistry {
    sessions_dir: PathBuf,
    default_session: String,
    options: StoreOptions,
    stores: DashMap<String, SessionStore>,
    creation_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionRegistry {
    pub fn new(
        sessions_dir: impl Into<PathBuf>,
        default_session: impl Into<String>,
        options: StoreOptions,
    ) -> Result<Self, AppError> {
        let sessions_dir = sessions_dir.into();
        std::fs::create_dir_all(&sessions_dir)?;

        Ok(Self {
            sessions_dir,
            default_session: sanitize_session_id(default_session.into().trim()),
            options,
            stores: DashMap::new(),
            creation_locks: DashMap::new(),
        })
    }

    pub fn default_session(&self) -> &str {
        &self.default_session
    }

    /// The requested session, or the default one when absent or blank.
    pub fn session_or_default(&self, session_id: Option<&str>) -> String {
        match session_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.default_session.clone(),
        }
    }

    /// Location of the database file backing `session_id`.
    pub fn store_path(&self, session_id: &str) -> Result<PathBuf, AppError> {
        let (_, key) = canonical_session(session_id)?;
        Ok(self.sessions_dir.join(key))
    }

    /// Open the default session at startup. It is treated as pre-existing, so
    /// no carry-forward runs even if its file is new.
    #[instrument(skip(self), fields(session = %self.default_session))]
    pub async fn provision_default(&self) -> Result<SessionStore, AppError> {
        let (session_id, key) = canonical_session(&self.default_session)?;
        if let Some(store) = self.cached(&key) {
            return Ok(store);
        }

        let lock = self.creation_lock(&key);
        let _guard = lock.lock().await;
        if let Some(store) = self.cached(&key) {
            return Ok(store);
        }

        let path = self.sessions_dir.join(&key);
        let created = !tokio::fs::try_exists(&path).await?;
        let store = self.open_store(&session_id, &path, created).await?;
        self.stores.insert(key, store.clone());

        Ok(store)
    }

    /// Return the store for `session_id`, creating it on first use.
    ///
    /// A newly created store is seeded from the previous session. Seeding
    /// failures are logged and leave the new session empty or partially
    /// seeded; they never fail the call.
    #[instrument(skip(self))]
    pub async fn resolve(&self, session_id: &str) -> Result<SessionStore, AppError> {
        let (session_id, key) = canonical_session(session_id)?;
        if let Some(store) = self.cached(&key) {
            return Ok(store);
        }

        let lock = self.creation_lock(&key);
        let _guard = lock.lock().await;
        if let Some(store) = self.cached(&key) {
            return Ok(store);
        }

        let path = self.sessions_dir.join(&key);
        let created = !tokio::fs::try_exists(&path).await?;
        let store = self.open_store(&session_id, &path, created).await?;

        if created {
            match carry_forward::seed_from_previous(self, &store).await {
                Ok(report) => info!(
                    previous_session = report.previous_session.as_deref().unwrap_or(""),
                    seeded = report.seeded,
                    skipped = report.skipped,
                    failed = report.failed,
                    "Carry-forward finished"
                ),
                Err(e) => error!(error = %e, "Carry-forward failed; session starts empty"),
            }
        }

        self.stores.insert(key, store.clone());
        Ok(store)
    }

    /// Return the store for `session_id` only if its file already exists.
    /// Never creates a file and never seeds.
    #[instrument(skip(self))]
    pub async fn resolve_existing(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionStore>, AppError> {
        let (session_id, key) = canonical_session(session_id)?;
        if let Some(store) = self.cached(&key) {
            return Ok(Some(store));
        }

        let lock = self.creation_lock(&key);
        let _guard = lock.lock().await;
        if let Some(store) = self.cached(&key) {
            return Ok(Some(store));
        }

        let path = self.sessions_dir.join(&key);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }

        let store = self.open_store(&session_id, &path, false).await?;
        self.stores.insert(key, store.clone());

        Ok(Some(store))
    }

    /// Every session with a store file on disk, plus the default session.
    ///
    /// Sessions with a well-formed id come first, ordered by start year; any
    /// others follow in lexical order.
    #[instrument(skip(self))]
    pub async fn list_sessions(&self) -> Result<Vec<String>, AppError> {
        let mut sessions = vec![self.default_session.clone()];

        let mut entries = tokio::fs::read_dir(&self.sessions_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            if let Some(session) = file_name.to_str().and_then(session_from_file_name) {
                sessions.push(session.to_string());
            }
        }

        sessions.sort_by(|a, b| compare_sessions(a, b));
        sessions.dedup();
        Ok(sessions)
    }

    /// Close every open pool. Used on shutdown.
    pub async fn close_all(&self) {
        let stores: Vec<SessionStore> = self.stores.iter().map(|s| s.value().clone()).collect();
        for store in stores {
            store.close().await;
        }
        info!("Session stores closed");
    }

    fn cached(&self, key: &str) -> Option<SessionStore> {
        self.stores.get(key).map(|store| store.value().clone())
    }

    fn creation_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.creation_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn open_store(
        &self,
        session_id: &str,
        path: &Path,
        created: bool,
    ) -> Result<SessionStore, AppError> {
        let store = SessionStore::open(session_id, path, &self.options).await?;
        store.run_migrations().await?;

        SESSION_STORES_OPENED
            .with_label_values(&[if created { "true" } else { "false" }])
            .inc();
        info!(session = session_id, created, "Session store ready");

        Ok(store)
    }
}

/// Canonical session id and its store file name.
fn canonical_session(session_id: &str) -> Result<(String, String), AppError> {
    let canonical = sanitize_session_id(session_id.trim());
    if canonical.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid session id: {:?}",
            session_id
        )));
    }
    let file_name = store_file_name(&canonical);
    Ok((canonical, file_name))
}

fn compare_sessions(a: &str, b: &str) -> Ordering {
    match (AcademicYear::parse(a), AcademicYear::parse(b)) {
        (Ok(x), Ok(y)) => x.start_year().cmp(&y.start_year()).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_sort_by_start_year_then_name() {
        let mut sessions = vec!["archive", "2024_25", "2009_10", "2023_24", "alpha"];
        sessions.sort_by(|a, b| compare_sessions(a, b));
        assert_eq!(sessions, ["2009_10", "2023_24", "2024_25", "alpha", "archive"]);
    }

    #[test]
    fn session_ids_without_usable_characters_are_rejected() {
        assert!(matches!(canonical_session("///"), Err(AppError::BadRequest(_))));
        assert!(matches!(canonical_session("   "), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn session_spellings_share_one_canonical_id() {
        for spelling in ["2024_25", " 2024_25 ", "2024_25.", "2024/_25"] {
            let (canonical, file_name) = canonical_session(spelling).unwrap();
            assert_eq!(canonical, "2024_25");
            assert_eq!(file_name, "school_2024_25.db");
        }
    }
}
