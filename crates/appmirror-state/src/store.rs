//! StateStore: redb-backed entity store for AppMirror.
//!
//! Provides typed create/read/update/delete over devices, builds and
//! sessions. All values are JSON-serialized into redb's `&[u8]` value
//! columns on the in-memory backend.

use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::ids::{IdGenerator, UuidGenerator};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe entity store backed by an in-memory redb database.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    ids: Arc<dyn IdGenerator>,
}

impl StateStore {
    /// Create an empty store that hands out UUID identifiers.
    pub fn open_in_memory() -> StateResult<Self> {
        Self::open_in_memory_with_ids(Arc::new(UuidGenerator))
    }

    /// Create an empty store with a custom identifier source.
    pub fn open_in_memory_with_ids(ids: Arc<dyn IdGenerator>) -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            ids,
        };
        store.ensure_tables()?;
        debug!("in-memory entity store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(DEVICES).map_err(map_err!(Table))?;
        txn.open_table(BUILDS).map_err(map_err!(Table))?;
        txn.open_table(BUILD_ORDER).map_err(map_err!(Table))?;
        txn.open_table(SESSIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// A fresh identifier for a record about to be created.
    pub fn generate_id(&self) -> String {
        self.ids.new_id()
    }

    // ── Generic record helpers ─────────────────────────────────────

    fn insert_record<T: Serialize>(&self, def: RecordTable, key: &str, record: &T) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            if table.get(key).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(key.to_string()));
            }
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_record<T: DeserializeOwned>(&self, def: RecordTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn list_records<T: DeserializeOwned>(&self, def: RecordTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }

    fn remove_record(&self, def: RecordTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Devices ────────────────────────────────────────────────────

    /// Store a new device. Fails if the id is already taken.
    pub fn insert_device(&self, device: &Device) -> StateResult<()> {
        self.insert_record(DEVICES, &device.id, device)?;
        debug!(device_id = %device.id, platform = %device.platform, "device stored");
        Ok(())
    }

    pub fn get_device(&self, id: &str) -> StateResult<Option<Device>> {
        self.get_record(DEVICES, id)
    }

    /// Delete a device by id. Returns true if it existed.
    pub fn delete_device(&self, id: &str) -> StateResult<bool> {
        self.remove_record(DEVICES, id)
    }

    // ── Builds ─────────────────────────────────────────────────────

    /// Store a new build and append it to the upload order.
    pub fn insert_build(&self, build: &Build) -> StateResult<()> {
        let key = build.id.as_str();
        let value = serde_json::to_vec(build).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(BUILDS).map_err(map_err!(Table))?;
            if table.get(key).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(key.to_string()));
            }
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;

            let mut order = txn.open_table(BUILD_ORDER).map_err(map_err!(Table))?;
            let seq = match order.last().map_err(map_err!(Read))? {
                Some((last, _)) => last.value() + 1,
                None => 0,
            };
            order.insert(seq, key).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(build_id = %key, platform = %build.platform, "build stored");
        Ok(())
    }

    pub fn get_build(&self, id: &str) -> StateResult<Option<Build>> {
        self.get_record(BUILDS, id)
    }

    /// List builds in upload order, optionally only those of one platform.
    pub fn list_builds(&self, platform: Option<Platform>) -> StateResult<Vec<Build>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let order = txn.open_table(BUILD_ORDER).map_err(map_err!(Table))?;
        let table = txn.open_table(BUILDS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in order.iter().map_err(map_err!(Read))? {
            let (_, id) = entry.map_err(map_err!(Read))?;
            let Some(guard) = table.get(id.value()).map_err(map_err!(Read))? else {
                continue;
            };
            let build: Build =
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            if platform.is_none_or(|p| p == build.platform) {
                results.push(build);
            }
        }
        Ok(results)
    }

    /// Delete a build record and its order entry. Returns true if it existed.
    pub fn delete_build(&self, id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(BUILDS).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();

            let mut order = txn.open_table(BUILD_ORDER).map_err(map_err!(Table))?;
            let seqs: Vec<u64> = order
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (seq, build_id) = entry.ok()?;
                    (build_id.value() == id).then(|| seq.value())
                })
                .collect();
            for seq in seqs {
                order.remove(seq).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(build_id = %id, existed, "build deleted");
        Ok(existed)
    }

    // ── Sessions ───────────────────────────────────────────────────

    /// Store a new session. Fails if the id is already taken.
    pub fn insert_session(&self, session: &Session) -> StateResult<()> {
        self.insert_record(SESSIONS, &session.id, session)?;
        debug!(session_id = %session.id, status = %session.status, "session stored");
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> StateResult<Option<Session>> {
        self.get_record(SESSIONS, id)
    }

    /// List all sessions, oldest first.
    pub fn list_sessions(&self) -> StateResult<Vec<Session>> {
        let mut sessions: Vec<Session> = self.list_records(SESSIONS)?;
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(sessions)
    }

    /// Read-modify-write a session inside one write transaction.
    ///
    /// `mutate` receives `None` when the session does not exist. The record
    /// is written back only if it existed and `mutate` returned `Ok`; an
    /// `Err` aborts the transaction and leaves the stored session untouched.
    pub fn update_session<T, E, F>(&self, id: &str, mutate: F) -> Result<T, E>
    where
        F: FnOnce(Option<&mut Session>) -> Result<T, E>,
        E: From<StateError>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let output;
        {
            let mut table = txn.open_table(SESSIONS).map_err(map_err!(Table))?;
            let mut current: Option<Session> = match table.get(id).map_err(map_err!(Read))? {
                Some(guard) => Some(
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                ),
                None => None,
            };

            output = mutate(current.as_mut())?;

            if let Some(session) = current {
                let value = serde_json::to_vec(&session).map_err(map_err!(Serialize))?;
                table
                    .insert(id, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(output)
    }

    /// Delete a session by id. Returns true if it existed.
    pub fn delete_session(&self, id: &str) -> StateResult<bool> {
        let existed = self.remove_record(SESSIONS, id)?;
        debug!(session_id = %id, existed, "session deleted");
        Ok(existed)
    }
}
