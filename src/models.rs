use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::priority::PriorityBreakdown;

pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 100.0;
pub const NEUTRAL_REC_SCORE: f64 = 50.0;

pub fn clamp_score(score: f64) -> f64 {
    score.clamp(MIN_SCORE, MAX_SCORE)
}

/// One learning unit a user can be quizzed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub category: String,
    /// Intrinsic difficulty estimate in [1, 100]; higher is harder.
    pub base_score: f64,
    pub date_added: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub successes: u32,
    /// One target score appended per feedback event.
    #[serde(default)]
    pub rec_scores: Vec<f64>,
}

impl Topic {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        base_score: f64,
        date_added: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            base_score: clamp_score(base_score),
            date_added,
            last_seen: None,
            attempts: 0,
            successes: 0,
            rec_scores: Vec::new(),
        }
    }

    /// Mean of `rec_scores`, or 50 when no feedback has been recorded.
    pub fn rec_score_avg(&self) -> f64 {
        if self.rec_scores.is_empty() {
            NEUTRAL_REC_SCORE
        } else {
            self.rec_scores.iter().sum::<f64>() / self.rec_scores.len() as f64
        }
    }

    /// Laplace-smoothed success rate, `(successes + 1) / (attempts + 2)`.
    pub fn smoothed_success_rate(&self) -> f64 {
        (self.successes as f64 + 1.0) / (self.attempts as f64 + 2.0)
    }

    /// Raw success percentage, 0 when never attempted.
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            (self.successes as f64 / self.attempts as f64) * 100.0
        }
    }

    /// Repairs invariants on records read from storage.
    pub(crate) fn normalize(&mut self) {
        self.base_score = clamp_score(self.base_score);
        for score in &mut self.rec_scores {
            *score = clamp_score(*score);
        }
        self.successes = self.successes.min(self.attempts);
    }
}

/// Input for creating a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTopic {
    pub name: String,
    pub category: String,
    /// Initial difficulty; clamped into [1, 100].
    pub base_score: f64,
}

// User-reported difficulty of a quizzed topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Accepts only the full names, in any case.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// One outcome report for a recommended position. `difficulty` stays a raw
/// string so an unrecognised rating skips only its own entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub position: usize,
    pub difficulty: String,
    pub solved: bool,
}

impl FeedbackEntry {
    pub fn new(position: usize, difficulty: Difficulty, solved: bool) -> Self {
        Self {
            position,
            difficulty: difficulty.as_str().to_string(),
            solved,
        }
    }

    pub fn difficulty(&self) -> Option<Difficulty> {
        Difficulty::from_str(&self.difficulty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub position: usize,
    pub topic_id: String,
    pub category: String,
}

/// A sampled selection awaiting feedback. Resolved at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub entries: Vec<SessionEntry>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Whether more than `max_age_days` have passed since the session opened.
    pub fn is_expired(&self, max_age_days: f64, now: DateTime<Utc>) -> bool {
        let age_days = (now - self.created_at).num_milliseconds() as f64 / 86_400_000.0;
        age_days > max_age_days
    }

    pub fn topic_for(&self, position: usize) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.position == position)
            .map(|e| e.topic_id.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub position: usize,
    pub topic_id: String,
    pub topic_name: String,
    pub category: String,
    pub base_score: f64,
    pub priority: f64,
    pub priority_breakdown: PriorityBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationSet {
    pub session_id: String,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackSummary {
    pub session_id: String,
    pub applied: usize,
    pub skipped: usize,
}

impl FeedbackSummary {
    pub fn message(&self) -> String {
        format!(
            "Processed feedback for {} recommendation(s) in set '{}' ({} skipped).",
            self.applied, self.session_id, self.skipped
        )
    }
}

// Attributes a topic collection can be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    SuccessRate,
    AttemptCount,
    BaseScore,
    LastSeen,
    DateAdded,
    Name,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::SuccessRate => "success_rate",
            SortKey::AttemptCount => "attempt_count",
            SortKey::BaseScore => "base_score",
            SortKey::LastSeen => "last_seen",
            SortKey::DateAdded => "date_added",
            SortKey::Name => "name",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "success_rate" => Some(SortKey::SuccessRate),
            "attempt_count" | "attempts" => Some(SortKey::AttemptCount),
            "base_score" => Some(SortKey::BaseScore),
            "last_seen" => Some(SortKey::LastSeen),
            "date_added" => Some(SortKey::DateAdded),
            "name" | "topic_name" => Some(SortKey::Name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Highest values first.
    #[default]
    Top,
    /// Lowest values first.
    Bottom,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Top => "top",
            SortOrder::Bottom => "bottom",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "top" | "desc" => Some(SortOrder::Top),
            "bottom" | "asc" => Some(SortOrder::Bottom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryStats {
    pub count: u32,
    pub attempts: u64,
    pub successes: u64,
    pub avg_base_score: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub total_topics: usize,
    pub total_attempts: u64,
    pub total_successes: u64,
    pub success_rate: f64,
    pub categories: BTreeMap<String, CategoryStats>,
}

impl Stats {
    pub fn from_topics(topics: &[Topic]) -> Self {
        let mut stats = Stats {
            total_topics: topics.len(),
            ..Default::default()
        };

        for topic in topics {
            stats.total_attempts += topic.attempts as u64;
            stats.total_successes += topic.successes as u64;

            let cat = stats.categories.entry(topic.category.clone()).or_default();
            cat.count += 1;
            cat.attempts += topic.attempts as u64;
            cat.successes += topic.successes as u64;
            // running sum until the pass below
            cat.avg_base_score += topic.base_score;
        }

        stats.success_rate = percent(stats.total_successes, stats.total_attempts);
        for cat in stats.categories.values_mut() {
            cat.avg_base_score /= cat.count as f64;
            cat.success_rate = percent(cat.successes, cat.attempts);
        }

        stats
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
