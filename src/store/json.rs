use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use super::{sort_oldest_first, SessionStore, Store, StoreResult, TopicStore};
use crate::error::StorageError;
use crate::models::{Session, Topic};

/// Directory of JSON documents:
///
/// ```text
/// <root>/users/<user_id>/topics.json
/// <root>/sessions/<session_id>.json
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Create the store, creating the directory layout if needed
    pub fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("users"))?;
        fs::create_dir_all(root.join("sessions"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn topics_path(&self, user_id: &str) -> StoreResult<PathBuf> {
        Ok(self
            .root
            .join("users")
            .join(path_key(user_id)?)
            .join("topics.json"))
    }

    fn session_path(&self, session_id: &str) -> StoreResult<PathBuf> {
        Ok(self
            .root
            .join("sessions")
            .join(format!("{}.json", path_key(session_id)?)))
    }
}

/// Rejects ids that could escape the store directory.
fn path_key(id: &str) -> StoreResult<&str> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(id)
    } else {
        Err(StorageError::InvalidKey(id.to_string()))
    }
}

/// Write to `.tmp` then rename so readers never see a half-written file
fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Reads a JSON document; absent or unparsable files come back as `None`.
fn read_lenient<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unreadable JSON document");
            Ok(None)
        }
    }
}

impl TopicStore for JsonFileStore {
    fn load(&self, user_id: &str) -> StoreResult<Vec<Topic>> {
        let path = self.topics_path(user_id)?;
        let mut topics: Vec<Topic> = read_lenient(&path)?.unwrap_or_default();
        for topic in &mut topics {
            topic.normalize();
        }
        Ok(topics)
    }

    fn save(&self, user_id: &str, topics: &[Topic]) -> StoreResult<()> {
        write_atomic(&self.topics_path(user_id)?, topics)
    }
}

impl SessionStore for JsonFileStore {
    fn put(&self, session: &Session) -> StoreResult<()> {
        write_atomic(&self.session_path(&session.session_id)?, session)
    }

    fn get(&self, session_id: &str) -> StoreResult<Option<Session>> {
        match self.session_path(session_id) {
            Ok(path) => read_lenient(&path),
            Err(StorageError::InvalidKey(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn delete(&self, session_id: &str) -> StoreResult<bool> {
        let path = match self.session_path(session_id) {
            Ok(path) => path,
            Err(StorageError::InvalidKey(_)) => return Ok(false),
            Err(err) => return Err(err),
        };
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }

    fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Session>> {
        let mut sessions = Vec::new();
        for entry in fs::read_dir(self.root.join("sessions"))? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(session) = read_lenient::<Session>(&path)? {
                if session.user_id == user_id {
                    sessions.push(session);
                }
            }
        }
        sort_oldest_first(&mut sessions);
        Ok(sessions)
    }
}

impl Store for JsonFileStore {}
