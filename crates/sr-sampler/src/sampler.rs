/// One entry of a logits row: vocabulary index and score.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenLogit {
    pub token_id: u32,
    pub logit: f32,
}

/// One stage of token selection.
///
/// Stages rescale, filter or reorder the candidate list; the final stage
/// leaves its pick at index 0.
pub trait Sampler: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, candidates: &mut Vec<TokenLogit>);

    /// Forget per-generation state (RNG position and the like).
    fn reset(&mut self) {}
}

/// Ordered stages applied to every logits row. The last stage must be a
/// selector ([`GreedySampler`] or [`DistSampler`]).
///
/// [`GreedySampler`]: crate::GreedySampler
/// [`DistSampler`]: crate::DistSampler
pub struct SamplerChain {
    samplers: Vec<Box<dyn Sampler>>,
}

impl SamplerChain {
    pub fn new() -> Self {
        Self {
            samplers: Vec::new(),
        }
    }

    /// Append a stage.
    pub fn with(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.samplers.push(sampler);
        self
    }

    /// Names of the samplers in application order.
    pub fn names(&self) -> Vec<&str> {
        self.samplers.iter().map(|s| s.name()).collect()
    }

    /// Pick a token id from a raw logits row. `None` for an empty row.
    pub fn sample(&self, logits: &[f32]) -> Option<u32> {
        let mut candidates: Vec<TokenLogit> = (0u32..)
            .zip(logits)
            .map(|(token_id, &logit)| TokenLogit { token_id, logit })
            .collect();
        self.samplers
            .iter()
            .for_each(|stage| stage.apply(&mut candidates));
        candidates.first().map(|c| c.token_id)
    }

    /// Reset every stage before reusing the chain for a new generation.
    pub fn reset(&mut self) {
        for sampler in &mut self.samplers {
            sampler.reset();
        }
    }
}

impl Default for SamplerChain {
    fn default() -> Self {
        Self::new()
    }
}
