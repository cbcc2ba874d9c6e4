use rand::Rng;

use crate::config::SamplerConfig;

/// A candidate in the sampling pool.
#[derive(Debug, Clone)]
pub struct WeightedItem<T> {
    pub item: T,
    pub category: String,
    pub weight: f64,
}

impl<T> WeightedItem<T> {
    pub fn new(item: T, category: impl Into<String>, weight: f64) -> Self {
        Self {
            item,
            category: category.into(),
            weight,
        }
    }
}

/// Weighted sampling without replacement that discourages repeating a
/// category within one draw.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiversitySampler {
    config: SamplerConfig,
}

impl DiversitySampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    /// Picks up to `k` items in selection order. Every pick multiplies the
    /// weight of the remaining items in the same category by the diversity
    /// penalty, so repeated picks from one category compound.
    pub fn sample<T, R: Rng + ?Sized>(
        &self,
        pool: Vec<WeightedItem<T>>,
        k: usize,
        rng: &mut R,
    ) -> Vec<T> {
        let mut pool = pool;
        let take = k.min(pool.len());
        let mut picked = Vec::with_capacity(take);

        while picked.len() < take {
            let index = pick_index(&pool, rng);
            let chosen = pool.remove(index);

            for candidate in pool.iter_mut() {
                if candidate.category == chosen.category {
                    candidate.weight *= self.config.diversity_penalty;
                }
            }
            picked.push(chosen.item);
        }

        picked
    }
}

/// Roulette-wheel selection over a non-empty pool.
fn pick_index<T, R: Rng + ?Sized>(pool: &[WeightedItem<T>], rng: &mut R) -> usize {
    let total: f64 = pool.iter().map(|c| c.weight.max(0.0)).sum();
    if !(total.is_finite() && total > 0.0) {
        return rng.gen_range(0..pool.len());
    }

    let draw = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for (i, candidate) in pool.iter().enumerate() {
        cumulative += candidate.weight.max(0.0);
        if draw < cumulative {
            return i;
        }
    }
    // rounding can leave the draw a hair past the final cumulative sum
    pool.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn pool(items: &[(&str, &str, f64)]) -> Vec<WeightedItem<String>> {
        items.iter()
            .map(|(id, cat, w)| WeightedItem::new(id.to_string(), *cat, *w))
            .collect()
    }

    fn balanced_pool() -> Vec<WeightedItem<String>> {
        pool(&[
            ("a1", "arrays", 1.0),
            ("a2", "arrays", 1.0),
            ("a3", "arrays", 1.0),
            ("g1", "graphs", 1.0),
            ("g2", "graphs", 1.0),
            ("g3", "graphs", 1.0),
        ])
    }

    mod selection_tests {
        use super::*;

        #[test]
        fn never_returns_duplicates() {
            let sampler = DiversitySampler::default();
            let mut rng = StdRng::seed_from_u64(7);
            for _ in 0..200 {
                let picked = sampler.sample(balanced_pool(), 4, &mut rng);
                let unique: HashSet<_> = picked.iter().collect();
                assert_eq!(unique.len(), picked.len());
            }
        }

        #[test]
        fn returns_min_of_k_and_pool() {
            let sampler = DiversitySampler::default();
            let mut rng = StdRng::seed_from_u64(1);
            assert_eq!(sampler.sample(balanced_pool(), 2, &mut rng).len(), 2);
            assert_eq!(sampler.sample(balanced_pool(), 50, &mut rng).len(), 6);
            assert!(sampler.sample(balanced_pool(), 0, &mut rng).is_empty());
            assert!(sampler
                .sample(Vec::<WeightedItem<String>>::new(), 3, &mut rng)
                .is_empty());
        }

        #[test]
        fn seeded_rng_is_deterministic() {
            let sampler = DiversitySampler::default();
            let first = sampler.sample(balanced_pool(), 4, &mut StdRng::seed_from_u64(42));
            let second = sampler.sample(balanced_pool(), 4, &mut StdRng::seed_from_u64(42));
            assert_eq!(first, second);
        }

        #[test]
        fn remaining_pool_keeps_its_order() {
            // a zero draw always lands on the first remaining candidate
            let sampler = DiversitySampler::new(SamplerConfig {
                diversity_penalty: 1.0,
            });
            let mut rng = StepRng::new(0, 0);
            let items = pool(&[("a", "w", 1.0), ("b", "x", 1.0), ("c", "y", 1.0), ("d", "z", 1.0)]);
            assert_eq!(sampler.sample(items, 4, &mut rng), vec!["a", "b", "c", "d"]);
        }

        #[test]
        fn zero_weight_pool_falls_back_to_uniform() {
            let sampler = DiversitySampler::default();
            let mut rng = StdRng::seed_from_u64(3);
            let zeros = pool(&[("x", "a", 0.0), ("y", "b", 0.0), ("z", "c", 0.0)]);
            let picked = sampler.sample(zeros, 3, &mut rng);
            assert_eq!(picked.len(), 3);
        }

        #[test]
        fn heavy_item_usually_comes_first() {
            let sampler = DiversitySampler::default();
            let mut rng = StdRng::seed_from_u64(11);
            let mut heavy_first = 0;
            for _ in 0..1000 {
                let items = pool(&[("heavy", "a", 100.0), ("light", "b", 1.0)]);
                if sampler.sample(items, 1, &mut rng)[0] == "heavy" {
                    heavy_first += 1;
                }
            }
            assert!(heavy_first > 950);
        }

        #[test]
        fn zero_weight_item_is_not_drawn_while_others_remain() {
            let sampler = DiversitySampler::default();
            let mut rng = StdRng::seed_from_u64(5);
            for _ in 0..500 {
                let items = pool(&[("dead", "a", 0.0), ("live", "b", 1.0)]);
                assert_eq!(sampler.sample(items, 1, &mut rng), vec!["live".to_string()]);
            }
        }
    }

    mod diversity_tests {
        use super::*;

        fn single_category_fraction(penalty: f64, trials: usize) -> f64 {
            let sampler = DiversitySampler::new(SamplerConfig {
                diversity_penalty: penalty,
            });
            let mut rng = StdRng::seed_from_u64(2024);
            let mut clustered = 0;
            for _ in 0..trials {
                let picked = sampler.sample(balanced_pool(), 3, &mut rng);
                let first = &picked[0][..1];
                if picked.iter().all(|id| &id[..1] == first) {
                    clustered += 1;
                }
            }
            clustered as f64 / trials as f64
        }

        #[test]
        fn penalty_reduces_single_category_sets() {
            let with_penalty = single_category_fraction(0.70, 5000);
            let without_penalty = single_category_fraction(1.0, 5000);
            assert!(
                with_penalty < without_penalty,
                "penalized {with_penalty} should be below unpenalized {without_penalty}"
            );
        }

        #[test]
        fn penalty_compounds_within_one_call() {
            let sampler = DiversitySampler::new(SamplerConfig {
                diversity_penalty: 0.5,
            });
            let mut items = balanced_pool();
            items.retain(|c| c.category == "arrays");
            items.push(WeightedItem::new("g1".to_string(), "graphs", 0.3));

            // after two arrays picks the last one weighs 0.25 against g1's 0.3
            let mut rng = StdRng::seed_from_u64(9);
            let mut graphs_last = 0;
            for _ in 0..2000 {
                let picked = sampler.sample(items.clone(), 4, &mut rng);
                assert_eq!(picked.len(), 4);
                if picked[3] == "g1" {
                    graphs_last += 1;
                }
            }
            assert!(graphs_last < 800, "g1 came last {graphs_last} times");
        }
    }
}
