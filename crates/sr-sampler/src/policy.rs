use serde::{Deserialize, Serialize};

use crate::greedy::{DistSampler, GreedySampler};
use crate::sampler::SamplerChain;
use crate::temperature::TemperatureSampler;
use crate::top_p::TopPSampler;

/// Per-call sampling parameters as received from the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_p: 1.0,
        }
    }
}

/// How the next token is chosen from a logits row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SamplingPolicy {
    /// Argmax every step. Temperature and top-p are accepted and ignored, so
    /// identical inputs always give identical output.
    #[default]
    Deterministic,
    /// Temperature scaling, nucleus filtering, then a draw from a seeded RNG.
    Stochastic { seed: u64 },
}

impl SamplingPolicy {
    /// Build the sampler chain for one generation.
    pub fn chain(&self, params: &SamplingParams) -> SamplerChain {
        match *self {
            SamplingPolicy::Deterministic => SamplerChain::new().with(Box::new(GreedySampler)),
            SamplingPolicy::Stochastic { seed } => SamplerChain::new()
                .with(Box::new(TemperatureSampler::new(params.temperature)))
                .with(Box::new(TopPSampler::new(params.top_p)))
                .with(Box::new(DistSampler::new(seed))),
        }
    }

    pub fn is_deterministic(&self) -> bool {
        matches!(self, SamplingPolicy::Deterministic)
    }
}
