//! Spaced-repetition topic recommender.
//!
//! [`engine::Recommender`] is the entry point: it scores topics with
//! [`priority::PriorityCalculator`], narrows them with [`filter::TopicFilter`],
//! draws a category-diverse set through [`sampler::DiversitySampler`] and
//! folds quiz outcomes back in with [`feedback::FeedbackProcessor`].
//! Persistence goes through the [`store`] traits.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod filter;
pub mod models;
pub mod priority;
pub mod sampler;
pub mod store;

pub use config::EngineConfig;
pub use engine::{RankRequest, Recommender, SampleRequest};
pub use error::{EmptyReason, EngineError, Result};
pub use models::{Difficulty, FeedbackEntry, Topic};
