use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{sort_oldest_first, SessionStore, Store, StoreResult, TopicStore};
use crate::error::StorageError;
use crate::models::{Session, Topic};

/// In-process store backed by mutex-guarded maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    topics: Mutex<HashMap<String, Vec<Topic>>>,
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> StoreResult<usize> {
        Ok(lock(&self.sessions)?.len())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| StorageError::Poisoned)
}

impl TopicStore for MemoryStore {
    fn load(&self, user_id: &str) -> StoreResult<Vec<Topic>> {
        Ok(lock(&self.topics)?.get(user_id).cloned().unwrap_or_default())
    }

    fn save(&self, user_id: &str, topics: &[Topic]) -> StoreResult<()> {
        lock(&self.topics)?.insert(user_id.to_string(), topics.to_vec());
        Ok(())
    }
}

impl SessionStore for MemoryStore {
    fn put(&self, session: &Session) -> StoreResult<()> {
        lock(&self.sessions)?.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    fn get(&self, session_id: &str) -> StoreResult<Option<Session>> {
        Ok(lock(&self.sessions)?.get(session_id).cloned())
    }

    fn delete(&self, session_id: &str) -> StoreResult<bool> {
        Ok(lock(&self.sessions)?.remove(session_id).is_some())
    }

    fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Session>> {
        let mut sessions: Vec<Session> = lock(&self.sessions)?
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sort_oldest_first(&mut sessions);
        Ok(sessions)
    }
}

impl Store for MemoryStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionEntry;
    use chrono::Utc;

    #[test]
    fn users_are_isolated() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .save("alice", &[Topic::new("t1", "Heaps", "trees", 40.0, now)])
            .unwrap();

        assert_eq!(store.load("alice").unwrap().len(), 1);
        assert!(store.load("bob").unwrap().is_empty());
    }

    #[test]
    fn save_replaces_collection() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .save(
                "u",
                &[
                    Topic::new("t1", "A", "c", 10.0, now),
                    Topic::new("t2", "B", "c", 10.0, now),
                ],
            )
            .unwrap();
        store
            .save("u", &[Topic::new("t3", "C", "c", 10.0, now)])
            .unwrap();

        let ids: Vec<_> = store.load("u").unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["t3"]);
    }

    #[test]
    fn session_lifecycle() {
        let store = MemoryStore::new();
        let session = Session {
            session_id: "s1".to_string(),
            user_id: "u".to_string(),
            entries: vec![SessionEntry {
                position: 1,
                topic_id: "t1".to_string(),
                category: "c".to_string(),
            }],
            created_at: Utc::now(),
        };

        store.put(&session).unwrap();
        assert_eq!(store.session_count().unwrap(), 1);
        assert_eq!(store.get("s1").unwrap(), Some(session));
        assert!(store.delete("s1").unwrap());
        assert!(!store.delete("s1").unwrap());
        assert!(store.get("s1").unwrap().is_none());
    }

    #[test]
    fn list_for_user_filters_and_orders() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for (id, user, hours_ago) in [("s1", "u", 1), ("s2", "other", 5), ("s3", "u", 3)] {
            store
                .put(&Session {
                    session_id: id.to_string(),
                    user_id: user.to_string(),
                    entries: vec![],
                    created_at: now - chrono::Duration::hours(hours_ago),
                })
                .unwrap();
        }

        let ids: Vec<_> = store
            .list_for_user("u")
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec!["s3", "s1"]);
        assert!(store.list_for_user("nobody").unwrap().is_empty());
    }
}
