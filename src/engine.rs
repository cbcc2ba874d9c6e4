//! The `Recommender` facade: one entry point per user-facing operation.
//!
//! Every method takes `now` explicitly and the random source is injected at
//! construction, so callers (and tests) fully control time and draws.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{EngineConfig, SessionConfig};
use crate::error::{EmptyReason, EngineError, Result};
use crate::feedback::FeedbackProcessor;
use crate::filter::TopicFilter;
use crate::models::{
    FeedbackEntry, FeedbackSummary, NewTopic, Recommendation, RecommendationSet, Session,
    SessionEntry, SortKey, SortOrder, Stats, Topic,
};
use crate::priority::{PriorityBreakdown, PriorityCalculator};
use crate::sampler::{DiversitySampler, WeightedItem};
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRequest {
    pub user_id: String,
    pub count: usize,
    #[serde(default)]
    pub filter: TopicFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankRequest {
    pub user_id: String,
    pub count: usize,
    pub sort_by: SortKey,
    #[serde(default)]
    pub order: SortOrder,
}

pub struct Recommender<S, R = StdRng> {
    store: S,
    rng: R,
    priority: PriorityCalculator,
    sampler: DiversitySampler,
    feedback: FeedbackProcessor,
    sessions: SessionConfig,
}

impl<S: Store> Recommender<S, StdRng> {
    pub fn new(config: &EngineConfig, store: S) -> Self {
        Self::with_rng(config, store, StdRng::from_entropy())
    }

    pub fn seeded(config: &EngineConfig, store: S, seed: u64) -> Self {
        Self::with_rng(config, store, StdRng::seed_from_u64(seed))
    }
}

impl<S: Store, R: Rng> Recommender<S, R> {
    pub fn with_rng(config: &EngineConfig, store: S, rng: R) -> Self {
        Self {
            store,
            rng,
            priority: PriorityCalculator::new(config.priority),
            sampler: DiversitySampler::new(config.sampler),
            feedback: FeedbackProcessor::new(config.feedback).with_sessions(config.sessions),
            sessions: config.sessions,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Priority-weighted, category-diverse selection of up to `count` topics.
    pub fn recommend(&mut self, request: &SampleRequest, now: DateTime<Utc>) -> Result<RecommendationSet> {
        if request.count == 0 {
            return Err(EngineError::validation("count must be greater than 0"));
        }
        let filter = request.filter.clone().validate()?;

        let topics = self.store.load(&request.user_id)?;
        if topics.is_empty() {
            return Err(EngineError::EmptyResult(EmptyReason::NoTopics));
        }

        let eligible = filter.apply(&topics, now);
        if eligible.is_empty() {
            return Err(EngineError::EmptyResult(EmptyReason::FilteredOut));
        }

        let pool: Vec<_> = eligible
            .into_iter()
            .map(|topic| {
                let (priority, breakdown) = self.priority.score(topic, now);
                WeightedItem::new((topic, breakdown), topic.category.clone(), priority)
            })
            .collect();
        let pool_size = pool.len();

        let picked = self.sampler.sample(pool, request.count, &mut self.rng);
        let recommendations = picked
            .into_iter()
            .enumerate()
            .map(|(i, (topic, breakdown))| to_recommendation(i + 1, topic, breakdown))
            .collect();

        let set = self.open_session(&request.user_id, recommendations, now)?;
        info!(
            user_id = %request.user_id,
            session_id = %set.session_id,
            pool_size,
            picked = set.recommendations.len(),
            "sampled recommendations"
        );
        Ok(set)
    }

    /// Deterministic top or bottom `count` topics by one attribute. Opens a
    /// session just like [`recommend`](Self::recommend).
    pub fn rank(&mut self, request: &RankRequest, now: DateTime<Utc>) -> Result<RecommendationSet> {
        if request.count == 0 {
            return Err(EngineError::validation("count must be greater than 0"));
        }
        if request.sort_by == SortKey::Name {
            return Err(EngineError::validation(
                "sort_by must be one of: success_rate, attempt_count, base_score, last_seen, date_added",
            ));
        }

        let mut topics = self.store.load(&request.user_id)?;
        if topics.is_empty() {
            return Err(EngineError::EmptyResult(EmptyReason::NoTopics));
        }
        sort_topics(&mut topics, request.sort_by, request.order);

        let recommendations = topics
            .iter()
            .take(request.count)
            .enumerate()
            .map(|(i, topic)| {
                let (_, breakdown) = self.priority.score(topic, now);
                to_recommendation(i + 1, topic, breakdown)
            })
            .collect();

        let set = self.open_session(&request.user_id, recommendations, now)?;
        info!(
            user_id = %request.user_id,
            session_id = %set.session_id,
            sort_by = request.sort_by.as_str(),
            order = request.order.as_str(),
            "ranked recommendations"
        );
        Ok(set)
    }

    pub fn resolve_feedback(
        &mut self,
        session_id: &str,
        entries: &[FeedbackEntry],
        now: DateTime<Utc>,
    ) -> Result<FeedbackSummary> {
        self.feedback.resolve(&self.store, session_id, entries, now)
    }

    pub fn add_topic(&mut self, user_id: &str, new_topic: NewTopic, now: DateTime<Utc>) -> Result<Topic> {
        let name = new_topic.name.trim();
        let category = new_topic.category.trim();
        if name.is_empty() {
            return Err(EngineError::validation("topic name is required"));
        }
        if category.is_empty() {
            return Err(EngineError::validation("category is required"));
        }
        if !new_topic.base_score.is_finite() {
            return Err(EngineError::validation("base score must be a number"));
        }

        let mut topics = self.store.load(user_id)?;
        let topic = Topic::new(next_topic_id(&topics)?, name, category, new_topic.base_score, now);
        topics.push(topic.clone());
        self.store.save(user_id, &topics)?;

        debug!(user_id, topic_id = %topic.id, base_score = topic.base_score, "added topic");
        Ok(topic)
    }

    pub fn get_topic(&self, user_id: &str, topic_id: &str) -> Result<Topic> {
        self.store
            .get_topic(user_id, topic_id)?
            .ok_or_else(|| EngineError::TopicNotFound(topic_id.to_string()))
    }

    /// Topics in store order unless `sort_by` is given; `category` matches
    /// case-insensitively.
    pub fn list_topics(
        &self,
        user_id: &str,
        sort_by: Option<SortKey>,
        order: SortOrder,
        category: Option<&str>,
    ) -> Result<Vec<Topic>> {
        let mut topics = self.store.load(user_id)?;

        if let Some(category) = category {
            let wanted = category.trim().to_lowercase();
            topics.retain(|t| t.category.trim().to_lowercase() == wanted);
        }
        if let Some(key) = sort_by {
            sort_topics(&mut topics, key, order);
        }

        Ok(topics)
    }

    /// Sessions still awaiting feedback, oldest first. Expired ones are left
    /// out.
    pub fn open_sessions(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<Session>> {
        let sessions = self.store.list_for_user(user_id)?;
        Ok(sessions
            .into_iter()
            .filter(|s| !s.is_expired(self.sessions.max_age_days, now))
            .collect())
    }

    /// Deletes the user's expired sessions and returns how many went.
    pub fn prune_sessions(&self, user_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let mut pruned = 0;
        for session in self.store.list_for_user(user_id)? {
            if session.is_expired(self.sessions.max_age_days, now)
                && self.store.delete(&session.session_id)?
            {
                pruned += 1;
            }
        }
        if pruned > 0 {
            debug!(user_id, pruned, "pruned expired sessions");
        }
        Ok(pruned)
    }

    pub fn categories(&self, user_id: &str) -> Result<Vec<String>> {
        let topics = self.store.load(user_id)?;
        let unique: BTreeSet<String> = topics.into_iter().map(|t| t.category).collect();
        Ok(unique.into_iter().collect())
    }

    pub fn stats(&self, user_id: &str) -> Result<Stats> {
        let topics = self.store.load(user_id)?;
        Ok(Stats::from_topics(&topics))
    }

    fn open_session(
        &self,
        user_id: &str,
        recommendations: Vec<Recommendation>,
        now: DateTime<Utc>,
    ) -> Result<RecommendationSet> {
        self.prune_sessions(user_id, now)?;

        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            entries: recommendations
                .iter()
                .map(|r| SessionEntry {
                    position: r.position,
                    topic_id: r.topic_id.clone(),
                    category: r.category.clone(),
                })
                .collect(),
            created_at: now,
        };
        self.store.put(&session)?;

        Ok(RecommendationSet {
            session_id: session.session_id,
            recommendations,
        })
    }
}

fn to_recommendation(
    position: usize,
    topic: &Topic,
    breakdown: PriorityBreakdown,
) -> Recommendation {
    Recommendation {
        position,
        topic_id: topic.id.clone(),
        topic_name: topic.name.clone(),
        category: topic.category.clone(),
        base_score: topic.base_score,
        priority: breakdown.priority,
        priority_breakdown: breakdown,
    }
}

/// `t<N>` with N one past the largest numeric suffix in use.
fn next_topic_id(topics: &[Topic]) -> Result<String> {
    let max = topics
        .iter()
        .filter_map(|t| t.id.strip_prefix('t')?.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    let next = max
        .checked_add(1)
        .ok_or_else(|| EngineError::validation(format!("topic id space exhausted after t{}", max)))?;
    Ok(format!("t{}", next))
}

/// Stable sort; `Top` puts the highest values first. Never-seen topics
/// count as the oldest `last_seen`.
pub fn sort_topics(topics: &mut [Topic], key: SortKey, order: SortOrder) {
    let ascending = |a: &Topic, b: &Topic| -> Ordering {
        match key {
            SortKey::SuccessRate => a.success_rate().total_cmp(&b.success_rate()),
            SortKey::AttemptCount => a.attempts.cmp(&b.attempts),
            SortKey::BaseScore => a.base_score.total_cmp(&b.base_score),
            SortKey::LastSeen => a.last_seen.cmp(&b.last_seen),
            SortKey::DateAdded => a.date_added.cmp(&b.date_added),
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        }
    };

    match order {
        SortOrder::Top => topics.sort_by(|a, b| ascending(b, a)),
        SortOrder::Bottom => topics.sort_by(ascending),
    }
}
