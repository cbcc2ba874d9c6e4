use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::models::Topic;

/// Optional, AND-combined constraints on which topics are eligible for
/// sampling. An unset field imposes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicFilter {
    pub added_within_days: Option<u32>,
    pub not_seen_within_days: Option<u32>,
    pub min_base_score: Option<u32>,
    /// Case-insensitive allow-list.
    pub categories: Option<Vec<String>>,
}

impl TopicFilter {
    pub fn is_unconstrained(&self) -> bool {
        self.added_within_days.is_none()
            && self.not_seen_within_days.is_none()
            && self.min_base_score.is_none()
            && self.categories.is_none()
    }

    /// Checks ranges and normalizes the category list. An empty list is
    /// treated as no constraint; a list of only blank names is rejected.
    pub fn validate(mut self) -> Result<Self> {
        if let Some(score) = self.min_base_score {
            if !(1..=100).contains(&score) {
                return Err(EngineError::validation(format!(
                    "min_base_score must be between 1 and 100, got {}",
                    score
                )));
            }
        }

        if let Some(categories) = self.categories.take() {
            if !categories.is_empty() {
                let cleaned: Vec<String> = categories
                    .iter()
                    .map(|c| c.trim().to_lowercase())
                    .filter(|c| !c.is_empty())
                    .collect();
                if cleaned.is_empty() {
                    return Err(EngineError::validation(
                        "category filter contains only blank names",
                    ));
                }
                self.categories = Some(cleaned);
            }
        }

        Ok(self)
    }

    pub fn matches(&self, topic: &Topic, now: DateTime<Utc>) -> bool {
        if let Some(days) = self.added_within_days {
            if now - topic.date_added > Duration::days(days as i64) {
                return false;
            }
        }

        if let Some(days) = self.not_seen_within_days {
            if let Some(seen) = topic.last_seen {
                if now - seen < Duration::days(days as i64) {
                    return false;
                }
            }
        }

        if let Some(min) = self.min_base_score {
            if topic.base_score < min as f64 {
                return false;
            }
        }

        if let Some(categories) = self.categories.as_ref().filter(|c| !c.is_empty()) {
            let category = topic.category.trim().to_lowercase();
            if !categories.iter().any(|c| c.trim().to_lowercase() == category) {
                return false;
            }
        }

        true
    }

    pub fn apply<'a>(&self, topics: &'a [Topic], now: DateTime<Utc>) -> Vec<&'a Topic> {
        topics.iter().filter(|t| self.matches(t, now)).collect()
    }
}
