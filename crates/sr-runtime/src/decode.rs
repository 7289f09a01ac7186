//! The prefill-then-generate loop run against one session's native resources.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use sr_engine::TokenId;
use sr_sampler::{SamplerChain, SamplingParams};

use crate::brace;
use crate::control::{Interrupt, StopControl};
use crate::error::{InferenceError, Result};
use crate::session::NativeResources;

/// Caller-supplied limits for one generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationRequest {
    pub max_tokens: u32,
    pub sampling: SamplingParams,
    pub timeout: Duration,
}

impl GenerationRequest {
    /// Build a request from raw boundary values. Negative counts and
    /// timeouts are clamped to zero.
    ///
    /// The deadline is checked in whole milliseconds, so `timeout_ms = 0`
    /// still lets steps run until the first millisecond has elapsed.
    pub fn from_raw(max_tokens: i32, temperature: f32, top_p: f32, timeout_ms: i64) -> Self {
        Self {
            max_tokens: max_tokens.max(0) as u32,
            sampling: SamplingParams { temperature, top_p },
            timeout: Duration::from_millis(timeout_ms.max(0) as u64),
        }
    }
}

/// Terminal state of a generation. Every variant carries partial output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Eos,
    Cancelled,
    Timeout,
    Closed,
    EngineError,
    MaxTokens,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::Eos => "eos",
            StopReason::Cancelled => "cancelled",
            StopReason::Timeout => "timeout",
            StopReason::Closed => "closed",
            StopReason::EngineError => "engine_error",
            StopReason::MaxTokens => "max_tokens",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Interrupt> for StopReason {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Cancelled => StopReason::Cancelled,
            Interrupt::Timeout => StopReason::Timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub tokens: u32,
    /// Milliseconds from the end of prefill to the first generated token,
    /// 0 when nothing was generated.
    pub ttft_ms: u64,
    pub text: String,
    pub stop: StopReason,
}

/// Greedy (or policy-driven) decode loop with cooperative stop checks.
pub struct DecodeLoop {
    sampler: SamplerChain,
    add_bos: bool,
    n_ctx: Option<usize>,
}

impl DecodeLoop {
    pub fn new(sampler: SamplerChain, add_bos: bool) -> Self {
        Self {
            sampler,
            add_bos,
            n_ctx: None,
        }
    }

    /// Check prompts against the configured context size instead of the one
    /// the engine reports, which may have been rounded up.
    pub fn with_context_limit(mut self, n_ctx: usize) -> Self {
        self.n_ctx = Some(n_ctx);
        self
    }

    /// Tokenize and prefill `prompt`, then generate until a stop condition.
    ///
    /// Errors are only returned before the first generated token; once
    /// generation has started every failure ends the loop with partial output.
    pub fn run(
        &self,
        resources: &mut NativeResources,
        prompt: &str,
        request: &GenerationRequest,
        cancel: &AtomicBool,
    ) -> Result<Generation> {
        let NativeResources { context, model } = resources;

        let prompt_tokens = model
            .tokenize(prompt, self.add_bos)
            .map_err(InferenceError::Tokenize)?;
        let n_ctx = self.n_ctx.unwrap_or_else(|| context.n_ctx());
        if prompt_tokens.len() >= n_ctx {
            tracing::warn!(
                prompt_tokens = prompt_tokens.len(),
                n_ctx,
                "prompt exceeds context window"
            );
            return Err(InferenceError::ContextOverflow {
                prompt_tokens: prompt_tokens.len(),
                n_ctx,
            });
        }

        context.clear_kv();
        context.decode(&prompt_tokens, 0).map_err(|e| {
            tracing::error!(error = %e, "prompt decode failed");
            InferenceError::Decode(e)
        })?;

        let control = StopControl::start(cancel, request.timeout);
        let eos = model.eos();
        let mut n_cur = prompt_tokens.len();
        // max_tokens is caller-controlled; size the hint by what can still fit.
        let room = context.n_ctx().saturating_sub(n_cur);
        let mut output: Vec<u8> = Vec::with_capacity((request.max_tokens as usize).min(room) * 4);
        let mut generated: u32 = 0;
        let mut first_token_at: Option<Instant> = None;
        let mut stop = StopReason::MaxTokens;

        for step in 0..request.max_tokens {
            if let Some(interrupt) = control.check() {
                tracing::warn!(
                    tokens = generated,
                    elapsed_ms = control.elapsed().as_millis() as u64,
                    "generation interrupted: {}",
                    StopReason::from(interrupt)
                );
                stop = interrupt.into();
                break;
            }

            let token = match self.next_token(context.logits()) {
                Some(token) => token,
                None => {
                    tracing::error!(step, "no token could be selected from logits");
                    stop = StopReason::EngineError;
                    break;
                }
            };

            if token == eos {
                stop = StopReason::Eos;
                break;
            }

            match model.token_to_piece(token) {
                Ok(piece) => output.extend_from_slice(&piece),
                Err(e) => tracing::warn!(token, error = %e, "token has no text piece"),
            }
            generated += 1;
            if generated == 1 {
                first_token_at = Some(Instant::now());
            }

            if brace::closes_object(&output) {
                stop = StopReason::Closed;
                break;
            }

            if let Err(e) = context.decode(&[token], n_cur) {
                tracing::error!(step, error = %e, "decode failed, returning partial output");
                stop = StopReason::EngineError;
                break;
            }
            n_cur += 1;
        }

        let ttft_ms = first_token_at
            .map(|t| t.duration_since(control.started()).as_millis() as u64)
            .unwrap_or(0);
        let text = String::from_utf8_lossy(&output).into_owned();

        tracing::info!(
            tokens = generated,
            bytes = output.len(),
            ttft_ms,
            stop = %stop,
            "generation finished"
        );

        Ok(Generation {
            tokens: generated,
            ttft_ms,
            text,
            stop,
        })
    }

    fn next_token(&self, logits: sr_engine::Result<&[f32]>) -> Option<TokenId> {
        let logits = logits.ok()?;
        self.sampler
            .sample(logits)
            .and_then(|id| TokenId::try_from(id).ok())
    }
}
