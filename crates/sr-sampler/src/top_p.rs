use crate::sampler::{Sampler, TokenLogit};

/// Nucleus filter: sorts candidates by score and drops the tail once the
/// softmax mass of the kept head passes `p`. At least one survives.
pub struct TopPSampler {
    p: f32,
}

impl TopPSampler {
    pub fn new(p: f32) -> Self {
        Self { p }
    }
}

impl Sampler for TopPSampler {
    fn name(&self) -> &str {
        "top_p"
    }

    fn apply(&self, candidates: &mut Vec<TokenLogit>) {
        if candidates.is_empty() || self.p >= 1.0 {
            return;
        }

        candidates.sort_by(|a, b| b.logit.total_cmp(&a.logit));
        let top = candidates[0].logit;
        let weights: Vec<f32> = candidates.iter().map(|c| (c.logit - top).exp()).collect();
        let total: f32 = weights.iter().sum();

        let mut mass = 0.0f32;
        let keep = weights
            .iter()
            .position(|w| {
                mass += w / total;
                mass > self.p
            })
            .map_or(candidates.len(), |i| i + 1);
        candidates.truncate(keep.max(1));
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
    fn test_keeps_nucleus() {
        // softmax([ln 6, ln 3, ln 1]) = [0.6, 0.3, 0.1]
        let mut logits = row(&[3.0f32.ln(), 6.0f32.ln(), 1.0f32.ln()]);
        TopPSampler::new(0.7).apply(&mut logits);
        let kept: Vec<u32> = logits.iter().map(|t| t.token_id).collect();
        assert_eq!(kept, vec![1, 0]);
    }

    #[test]
    fn test_tiny_p_keeps_one() {
        let mut logits = row(&[0.0, 1.0, 2.0]);
        TopPSampler::new(0.0).apply(&mut logits);
        assert_eq!(logits.len(), 1);
        assert_eq!(logits[0].token_id, 2);
    }

    #[test]
    fn test_p_one_is_noop() {
        let mut logits = row(&[0.0, 1.0, 2.0]);
        TopPSampler::new(1.0).apply(&mut logits);
        assert_eq!(logits, row(&[0.0, 1.0, 2.0]));
    }
}
