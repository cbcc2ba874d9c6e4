//! Persistence seams for topics and open sessions.
//!
//! The engine only talks to these traits. Three backends ship with the crate:
//! an in-process [`MemoryStore`], the SQLite [`Database`](crate::db::Database)
//! and a directory of JSON files ([`JsonFileStore`]).

mod json;
mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::StorageError;
use crate::models::{Session, Topic};

pub type StoreResult<T> = std::result::Result<T, StorageError>;

pub trait TopicStore {
    /// Full collection for `user_id`. Missing or unreadable data yields an
    /// empty collection rather than an error.
    fn load(&self, user_id: &str) -> StoreResult<Vec<Topic>>;

    /// Replaces the user's whole collection in one step.
    fn save(&self, user_id: &str, topics: &[Topic]) -> StoreResult<()>;

    fn get_topic(&self, user_id: &str, topic_id: &str) -> StoreResult<Option<Topic>> {
        Ok(self.load(user_id)?.into_iter().find(|t| t.id == topic_id))
    }

    /// Replaces topics with matching ids and appends the rest.
    fn upsert(&self, user_id: &str, topics: &[Topic]) -> StoreResult<()> {
        let mut current = self.load(user_id)?;
        for topic in topics {
            match current.iter_mut().find(|t| t.id == topic.id) {
                Some(existing) => *existing = topic.clone(),
                None => current.push(topic.clone()),
            }
        }
        self.save(user_id, &current)
    }
}

pub trait SessionStore {
    fn put(&self, session: &Session) -> StoreResult<()>;

    fn get(&self, session_id: &str) -> StoreResult<Option<Session>>;

    /// Returns whether a session was actually removed.
    fn delete(&self, session_id: &str) -> StoreResult<bool>;

    /// Sessions opened for `user_id` that have not been deleted, oldest first.
    fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Session>>;
}

/// A backend that holds both topics and sessions.
pub trait Store: TopicStore + SessionStore {
    /// Saves `topics` (when given) and deletes the session. Returns whether
    /// the session was removed. Transactional backends do both or neither.
    fn close_session(
        &self,
        user_id: &str,
        topics: Option<&[Topic]>,
        session_id: &str,
    ) -> StoreResult<bool> {
        if let Some(topics) = topics {
            self.save(user_id, topics)?;
        }
        self.delete(session_id)
    }
}

pub(crate) fn sort_oldest_first(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
}

impl<T: TopicStore + ?Sized> TopicStore for Box<T> {
    fn load(&self, user_id: &str) -> StoreResult<Vec<Topic>> {
        (**self).load(user_id)
    }

    fn save(&self, user_id: &str, topics: &[Topic]) -> StoreResult<()> {
        (**self).save(user_id, topics)
    }

    fn get_topic(&self, user_id: &str, topic_id: &str) -> StoreResult<Option<Topic>> {
        (**self).get_topic(user_id, topic_id)
    }

    fn upsert(&self, user_id: &str, topics: &[Topic]) -> StoreResult<()> {
        (**self).upsert(user_id, topics)
    }
}

impl<T: SessionStore + ?Sized> SessionStore for Box<T> {
    fn put(&self, session: &Session) -> StoreResult<()> {
        (**self).put(session)
    }

    fn get(&self, session_id: &str) -> StoreResult<Option<Session>> {
        (**self).get(session_id)
    }

    fn delete(&self, session_id: &str) -> StoreResult<bool> {
        (**self).delete(session_id)
    }

    fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Session>> {
        (**self).list_for_user(user_id)
    }
}

impl<T: Store + ?Sized> Store for Box<T> {
    fn close_session(
        &self,
        user_id: &str,
        topics: Option<&[Topic]>,
        session_id: &str,
    ) -> StoreResult<bool> {
        (**self).close_session(user_id, topics, session_id)
    }
}
