use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::{FeedbackConfig, SessionConfig};
use crate::error::{EngineError, Result};
use crate::models::{clamp_score, Difficulty, FeedbackEntry, FeedbackSummary, Topic};
use crate::store::Store;

/// Turns user-reported outcomes into topic updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedbackProcessor {
    config: FeedbackConfig,
    sessions: SessionConfig,
}

impl FeedbackProcessor {
    pub fn new(config: FeedbackConfig) -> Self {
        Self {
            config,
            sessions: SessionConfig::default(),
        }
    }

    pub fn with_sessions(mut self, sessions: SessionConfig) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn target_score(&self, difficulty: Difficulty) -> f64 {
        match difficulty {
            Difficulty::Easy => self.config.easy_score,
            Difficulty::Medium => self.config.medium_score,
            Difficulty::Hard => self.config.hard_score,
        }
    }

    /// Records one attempt on `topic` and nudges its `base_score` toward the
    /// target for `difficulty`.
    pub fn apply(&self, topic: &mut Topic, difficulty: Difficulty, solved: bool, now: DateTime<Utc>) {
        let target = self.target_score(difficulty);

        topic.attempts = topic.attempts.saturating_add(1);
        if solved {
            topic.successes = topic.successes.saturating_add(1);
        }
        topic.last_seen = Some(now);

        let nudged = topic.base_score + (target - topic.base_score) * self.config.adjustment_ratio;
        topic.base_score = clamp_score(nudged);
        topic.rec_scores.push(target);
    }

    /// Applies `entries` against the open session `session_id`, then persists
    /// every touched topic and closes the session in one store call.
    ///
    /// Entries are skipped when their position is not in the session, their
    /// difficulty is not recognised or their topic has since been removed. A
    /// session past its maximum age is discarded and reported as not found.
    pub fn resolve<S: Store + ?Sized>(
        &self,
        store: &S,
        session_id: &str,
        entries: &[FeedbackEntry],
        now: DateTime<Utc>,
    ) -> Result<FeedbackSummary> {
        if entries.is_empty() {
            return Err(EngineError::validation("feedback must contain at least one entry"));
        }

        let session = store
            .get(session_id)?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        if session.is_expired(self.sessions.max_age_days, now) {
            store.delete(session_id)?;
            warn!(session_id, created_at = %session.created_at, "session expired, discarding");
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        }

        let mut topics = store.load(&session.user_id)?;
        let mut applied = 0;
        let mut skipped = 0;

        for entry in entries {
            let Some(topic_id) = session.topic_for(entry.position) else {
                warn!(session_id, position = entry.position, "no topic at position, skipping");
                skipped += 1;
                continue;
            };
            let Some(difficulty) = entry.difficulty() else {
                warn!(session_id, difficulty = %entry.difficulty, "unknown difficulty, skipping");
                skipped += 1;
                continue;
            };
            let Some(topic) = topics.iter_mut().find(|t| t.id == topic_id) else {
                warn!(session_id, topic_id, "topic no longer exists, skipping");
                skipped += 1;
                continue;
            };

            let before = topic.base_score;
            self.apply(topic, difficulty, entry.solved, now);
            debug!(
                topic_id,
                difficulty = difficulty.as_str(),
                solved = entry.solved,
                before,
                after = topic.base_score,
                "applied feedback"
            );
            applied += 1;
        }

        let touched = (applied > 0).then_some(topics.as_slice());
        store.close_session(&session.user_id, touched, session_id)?;

        info!(session_id, applied, skipped, "resolved session");
        Ok(FeedbackSummary {
            session_id: session_id.to_string(),
            applied,
            skipped,
        })
    }
}
