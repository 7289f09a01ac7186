use crate::sampler::{Sampler, TokenLogit};
use parking_lot::Mutex;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Greedy sampler: selects the single token with the highest logit.
///
/// Ties go to the earliest entry and NaN logits are never selected over a
/// real value, so the choice is a pure function of the logits row.
#[derive(Debug, Clone, Copy)]
pub struct GreedySampler;

impl GreedySampler {
    pub fn new() -> Self {
        Self
    }

    /// Index of the highest entry in `logits`.
    pub fn argmax(logits: &[TokenLogit]) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, t) in logits.iter().enumerate() {
            match best {
                None if !t.logit.is_nan() => best = Some(i),
                Some(b) if t.logit > logits[b].logit => best = Some(i),
                _ => {}
            }
        }
        best
    }
}

impl Default for GreedySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for GreedySampler {
    fn name(&self) -> &str {
        "greedy"
    }

    fn apply(&self, logits: &mut Vec<TokenLogit>) {
        match Self::argmax(logits) {
            Some(i) => {
                let selected = logits.swap_remove(i);
                logits.clear();
                logits.push(selected);
            }
            // All NaN: keep the first entry.
            None => logits.truncate(1),
        }
    }
}

/// Distribution-based sampler: converts logits to probabilities via softmax,
/// then samples from the resulting distribution using a seeded RNG.
///
/// The RNG stream advances across calls; `reset` rewinds it to the seed.
pub struct DistSampler {
    seed: u64,
    rng: Mutex<StdRng>,
}

impl DistSampler {
    /// Create a new distribution sampler with the given seed for reproducibility.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Sampler for DistSampler {
    fn name(&self) -> &str {
        "dist"
    }

    fn apply(&self, logits: &mut Vec<TokenLogit>) {
        if logits.is_empty() {
            return;
        }

        let max_logit = logits
            .iter()
            .map(|t| t.logit)
            .fold(f32::NEG_INFINITY, f32::max);

        let weights: Vec<f32> = logits.iter().map(|t| (t.logit - max_logit).exp()).collect();

        let dist = match WeightedIndex::new(&weights) {
            Ok(d) => d,
            Err(_) => {
                // Invalid weights (all zero / NaN): fall back to the greedy pick.
                GreedySampler.apply(logits);
                return;
            }
        };

        let selected_index = dist.sample(&mut *self.rng.lock());
        let selected = logits.swap_remove(selected_index);

        logits.clear();
        logits.push(selected);
    }

    fn reset(&mut self) {
        *self.rng.get_mut() = StdRng::seed_from_u64(self.seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[f32]) -> Vec<TokenLogit> {
        values
            .iter()
            .enumerate()
            .map(|(i, &logit)| TokenLogit {
                token_id: i as u32,
                logit,
            })
            .collect()
    }

    #[test]
    fn test_greedy_picks_max() {
        let mut logits = row(&[0.1, 2.5, -1.0, 2.4]);
        GreedySampler.apply(&mut logits);
        assert_eq!(logits.len(), 1);
        assert_eq!(logits[0].token_id, 1);
    }

    #[test]
    fn test_greedy_tie_goes_to_first() {
        let mut logits = row(&[3.0, 1.0, 3.0]);
        GreedySampler.apply(&mut logits);
        assert_eq!(logits[0].token_id, 0);
    }

    #[test]
    fn test_greedy_skips_nan() {
        let mut logits = row(&[f32::NAN, -5.0, f32::NAN]);
        GreedySampler.apply(&mut logits);
        assert_eq!(logits[0].token_id, 1);
    }

    #[test]
    fn test_greedy_all_nan_keeps_first() {
        let mut logits = row(&[f32::NAN, f32::NAN]);
        GreedySampler.apply(&mut logits);
        assert_eq!(logits.len(), 1);
        assert_eq!(logits[0].token_id, 0);
    }

    #[test]
    fn test_dist_single_candidate() {
        let mut logits = row(&[0.5]);
        DistSampler::new(7).apply(&mut logits);
        assert_eq!(logits[0].token_id, 0);
    }

    #[test]
    fn test_dist_reproducible_after_reset() {
        let mut sampler = DistSampler::new(42);
        let draw = |s: &DistSampler| {
            (0..16)
                .map(|_| {
                    let mut logits = row(&[1.0, 1.0, 1.0, 1.0]);
                    s.apply(&mut logits);
                    logits[0].token_id
                })
                .collect::<Vec<_>>()
        };
        let first = draw(&sampler);
        sampler.reset();
        let second = draw(&sampler);
        assert_eq!(first, second);
    }

    #[test]
    fn test_dist_favours_dominant_logit() {
        let sampler = DistSampler::new(1);
        for _ in 0..20 {
            let mut logits = row(&[0.0, 50.0, 0.0]);
            sampler.apply(&mut logits);
            assert_eq!(logits[0].token_id, 1);
        }
    }
}
