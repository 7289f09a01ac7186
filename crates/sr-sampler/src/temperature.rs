use crate::sampler::{Sampler, TokenLogit};

/// Smallest temperature applied; non-positive inputs are clamped to it.
const MIN_TEMPERATURE: f32 = 1e-7;

/// Scales all logits by dividing by a temperature value.
///
/// Higher temperatures flatten the distribution, lower ones sharpen it.
pub struct TemperatureSampler {
    temperature: f32,
}

impl TemperatureSampler {
    /// Create a new temperature sampler with the given temperature.
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }
}

impl Sampler for TemperatureSampler {
    fn name(&self) -> &str {
        "temperature"
    }

    fn apply(&self, logits: &mut Vec<TokenLogit>) {
        let temp = if self.temperature.is_nan() || self.temperature <= 0.0 {
            MIN_TEMPERATURE
        } else {
            self.temperature
        };

        for token in logits.iter_mut() {
            token.logit /= temp;
        }
    }
}
