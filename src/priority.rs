//! Priority scoring.
//!
//! Each topic gets one score that blends four normalized signals:
//!
//! - struggle: `1 - (successes + 1) / (attempts + 2)`
//! - due: time since last exposure relative to a desired interval that
//!   stretches with success and with how easy past ratings were
//! - base: the topic's intrinsic difficulty estimate
//! - novelty: a boost for recently added topics that decays to zero
//!
//! The weighted sum is floored at a small epsilon so every topic can still be
//! sampled.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::PriorityConfig;
use crate::models::{Topic, MAX_SCORE, MIN_SCORE};

/// Never-seen topics count as this many days past their `date_added`...
const UNSEEN_GRACE_DAYS: f64 = 30.0;
/// ...capped here.
const UNSEEN_CAP_DAYS: f64 = 365.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Every intermediate value behind one priority score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriorityBreakdown {
    pub success_rate: f64,
    pub struggle_index: f64,
    pub base_norm: f64,
    pub novelty: f64,
    pub days_since_seen: f64,
    pub rec_score_avg: f64,
    pub due_multiplier: f64,
    pub desired_interval: f64,
    pub due_norm: f64,
    pub priority: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct PriorityCalculator {
    config: PriorityConfig,
}

impl Default for PriorityCalculator {
    fn default() -> Self {
        Self::new(PriorityConfig::default())
    }
}

impl PriorityCalculator {
    pub fn new(config: PriorityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PriorityConfig {
        &self.config
    }

    pub fn score(&self, topic: &Topic, now: DateTime<Utc>) -> (f64, PriorityBreakdown) {
        let cfg = &self.config;

        let success_rate = topic.smoothed_success_rate();
        let struggle_index = 1.0 - success_rate;
        let base_norm = score_norm(topic.base_score);

        let days_since_added = days_between(topic.date_added, now);
        let window = cfg.novelty_window_days;
        let novelty = if days_since_added <= window {
            ((window - days_since_added) / window).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let rec_score_avg = topic.rec_score_avg();
        let due_multiplier = 1.0 + (1.0 - score_norm(rec_score_avg)) * 3.0;
        let desired_interval = cfg.base_interval_days * (1.0 + success_rate * 7.0) * due_multiplier;

        let days_since_seen = match topic.last_seen {
            Some(seen) => days_between(seen, now),
            None => (days_since_added + UNSEEN_GRACE_DAYS).min(UNSEEN_CAP_DAYS),
        };
        let due_raw = days_since_seen / desired_interval.max(1.0);
        let due_norm = due_raw.min(2.0) / 2.0;

        let w = &cfg.weights;
        let weighted = w.struggle * struggle_index
            + w.due * due_norm
            + w.base * base_norm
            + w.novelty * novelty;
        let priority = weighted.max(cfg.epsilon);

        let breakdown = PriorityBreakdown {
            success_rate,
            struggle_index,
            base_norm,
            novelty,
            days_since_seen,
            rec_score_avg,
            due_multiplier,
            desired_interval,
            due_norm,
            priority,
        };

        (priority, breakdown)
    }
}

/// Maps a [1, 100] score onto [0, 1].
fn score_norm(score: f64) -> f64 {
    ((score - MIN_SCORE) / (MAX_SCORE - MIN_SCORE)).clamp(0.0, 1.0)
}

/// Fractional days from `from` to `to`; timestamps in the future count as 0.
fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let seconds = (to - from).num_milliseconds() as f64 / 1000.0;
    (seconds / SECONDS_PER_DAY).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriorityWeights;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn topic(attempts: u32, successes: u32, base_score: f64, added_days_ago: i64) -> Topic {
        let mut t = Topic::new(
            "t1",
            "Sliding Window",
            "arrays",
            base_score,
            now() - Duration::days(added_days_ago),
        );
        t.attempts = attempts;
        t.successes = successes;
        t
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    mod component_tests {
        use super::*;

        #[test]
        fn unattempted_topic_has_half_struggle() {
            let calc = PriorityCalculator::default();
            let (_, b) = calc.score(&topic(0, 0, 50.0, 100), now());
            assert_eq!(b.struggle_index, 0.5);
            assert_eq!(b.success_rate, 0.5);
        }

        #[test]
        fn base_norm_endpoints() {
            let calc = PriorityCalculator::default();
            let (_, low) = calc.score(&topic(0, 0, 1.0, 100), now());
            let (_, high) = calc.score(&topic(0, 0, 100.0, 100), now());
            assert_eq!(low.base_norm, 0.0);
            assert_eq!(high.base_norm, 1.0);
        }

        #[test]
        fn novelty_decays_linearly() {
            let calc = PriorityCalculator::default();
            let (_, fresh) = calc.score(&topic(0, 0, 50.0, 0), now());
            let (_, half) = calc.score(&topic(0, 0, 50.0, 7), now());
            let (_, old) = calc.score(&topic(0, 0, 50.0, 15), now());
            assert_eq!(fresh.novelty, 1.0);
            assert!(approx(half.novelty, 0.5));
            assert_eq!(old.novelty, 0.0);
        }

        #[test]
        fn future_date_added_counts_as_today() {
            let calc = PriorityCalculator::default();
            let (_, b) = calc.score(&topic(0, 0, 50.0, -3), now());
            assert_eq!(b.novelty, 1.0);
        }

        #[test]
        fn never_seen_uses_added_plus_grace() {
            let calc = PriorityCalculator::default();
            let (_, b) = calc.score(&topic(0, 0, 50.0, 10), now());
            assert!(approx(b.days_since_seen, 40.0));
        }

        #[test]
        fn never_seen_is_capped() {
            let calc = PriorityCalculator::default();
            let (_, b) = calc.score(&topic(0, 0, 50.0, 1000), now());
            assert_eq!(b.days_since_seen, 365.0);
        }

        #[test]
        fn last_seen_uses_fractional_days() {
            let calc = PriorityCalculator::default();
            let mut t = topic(1, 1, 50.0, 100);
            t.last_seen = Some(now() - Duration::hours(36));
            let (_, b) = calc.score(&t, now());
            assert!(approx(b.days_since_seen, 1.5));
        }

        #[test]
        fn neutral_history_due_multiplier() {
            let calc = PriorityCalculator::default();
            let (_, b) = calc.score(&topic(0, 0, 50.0, 100), now());
            assert_eq!(b.rec_score_avg, 50.0);
            let expected = 1.0 + (1.0 - 49.0 / 99.0) * 3.0;
            assert!(approx(b.due_multiplier, expected));
            assert!(approx(b.desired_interval, 3.0 * (1.0 + 0.5 * 7.0) * expected));
        }

        #[test]
        fn easy_history_stretches_interval() {
            let calc = PriorityCalculator::default();
            let mut easy = topic(4, 4, 50.0, 100);
            easy.rec_scores = vec![20.0, 20.0];
            let mut hard = easy.clone();
            hard.rec_scores = vec![80.0, 80.0];

            let (_, e) = calc.score(&easy, now());
            let (_, h) = calc.score(&hard, now());
            assert!(e.desired_interval > h.desired_interval);
        }

        #[test]
        fn due_norm_saturates_at_one() {
            let calc = PriorityCalculator::default();
            let mut t = topic(0, 0, 50.0, 400);
            t.last_seen = Some(now() - Duration::days(300));
            let (_, b) = calc.score(&t, now());
            assert_eq!(b.due_norm, 1.0);
        }
    }

    mod scoring_tests {
        use super::*;

        #[test]
        fn struggling_overdue_topic_outranks_mastered_one() {
            let calc = PriorityCalculator::default();

            let mut t = topic(10, 9, 30.0, 60);
            t.last_seen = Some(now() - Duration::days(10));
            t.rec_scores = vec![35.0];

            let mut u = topic(20, 8, 70.0, 60);
            u.id = "t2".to_string();
            u.last_seen = Some(now() - Duration::days(20));
            u.rec_scores = vec![75.0];

            let (pt, bt) = calc.score(&t, now());
            let (pu, bu) = calc.score(&u, now());

            assert!(approx(bt.struggle_index, 1.0 - 10.0 / 12.0));
            assert!(approx(bu.struggle_index, 1.0 - 9.0 / 22.0));
            assert!(bu.struggle_index > bt.struggle_index);
            assert!(pu > pt * 2.0, "expected {pu} to clearly exceed {pt}");
        }

        #[test]
        fn priority_is_weighted_sum() {
            let calc = PriorityCalculator::default();
            let (p, b) = calc.score(&topic(3, 1, 42.0, 5), now());
            let expected =
                0.40 * b.struggle_index + 0.30 * b.due_norm + 0.15 * b.base_norm + 0.15 * b.novelty;
            assert!(approx(p, expected));
            assert_eq!(p, b.priority);
        }

        #[test]
        fn zero_weights_hit_epsilon_floor() {
            let config = PriorityConfig {
                weights: PriorityWeights {
                    struggle: 0.0,
                    due: 0.0,
                    base: 1.0,
                    novelty: 0.0,
                },
                ..PriorityConfig::default()
            };
            let calc = PriorityCalculator::new(config);
            let (p, _) = calc.score(&topic(0, 0, 1.0, 100), now());
            assert_eq!(p, 1e-6);
        }

        #[test]
        fn custom_weights_change_ordering() {
            let struggle_only = PriorityCalculator::new(PriorityConfig {
                weights: PriorityWeights {
                    struggle: 1.0,
                    due: 0.0,
                    base: 0.0,
                    novelty: 0.0,
                },
                ..PriorityConfig::default()
            });
            let failing = topic(10, 0, 1.0, 100);
            let passing = topic(10, 10, 100.0, 100);
            let (pf, _) = struggle_only.score(&failing, now());
            let (pp, _) = struggle_only.score(&passing, now());
            assert!(pf > pp);
        }
    }

    proptest! {
        #[test]
        fn components_stay_in_unit_range(
            attempts in 0u32..500,
            success_pct in 0u32..=100,
            base_score in 1.0f64..=100.0,
            added_days in 0i64..2000,
            seen_days in proptest::option::of(0i64..2000),
            rec_scores in proptest::collection::vec(1.0f64..=100.0, 0..20),
        ) {
            let mut t = topic(attempts, attempts * success_pct / 100, base_score, added_days);
            t.last_seen = seen_days.map(|d| now() - Duration::days(d));
            t.rec_scores = rec_scores;

            let (p, b) = PriorityCalculator::default().score(&t, now());
            prop_assert!(p >= 1e-6);
            for v in [b.success_rate, b.struggle_index, b.base_norm, b.novelty, b.due_norm] {
                prop_assert!((0.0..=1.0).contains(&v));
            }
            prop_assert!((1.0..=4.0).contains(&b.due_multiplier));
        }
    }
}
