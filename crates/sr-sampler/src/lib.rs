pub mod greedy;
pub mod policy;
pub mod sampler;
pub mod temperature;
pub mod top_p;

pub use greedy::{DistSampler, GreedySampler};
pub use policy::{SamplingParams, SamplingPolicy};
pub use sampler::{Sampler, SamplerChain, TokenLogit};
pub use temperature::TemperatureSampler;
pub use top_p::TopPSampler;
