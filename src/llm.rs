use std::num::NonZeroU32;
use std::path::PathBuf;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info};

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::LlamaModel;
use llama_cpp_2::model::{AddBos, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;
use llama_cpp_2::{send_logs_to_tracing, LogOptions};

/// Faults raised by an inference runtime while producing a reply.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed to tokenize prompt: {0}")]
    Tokenize(String),

    #[error("prompt is {tokens} tokens but the context window is {ctx}")]
    PromptTooLong { tokens: usize, ctx: u32 },

    #[error("unable to create the llama context: {0}")]
    Context(String),

    #[error("llama_decode() failed: {0}")]
    Decode(String),

    #[error("failed to convert token to text: {0}")]
    Detokenize(String),

    #[error("inference worker panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Upper bound on generated tokens, prompt excluded.
    pub max_tokens: u32,
    pub stop: Vec<String>,
    /// Return the prompt in front of the generated text.
    pub echo: bool,
}

/// A blocking text-completion backend.
pub trait InferenceRuntime: Send + Sync {
    fn generate(&self, prompt: &str, request: &GenerationRequest)
        -> Result<String, GenerationError>;
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub path: PathBuf,
    pub ctx_size: u32,
    pub threads: i32,
    pub gpu_layers: u32,
    pub temperature: f32,
    pub seed: u32,
    pub llama_logs: bool,
}

pub struct Llm {
    backend: LlamaBackend,
    model: LlamaModel,
    settings: ModelSettings,
}

impl Llm {
    pub fn new(settings: ModelSettings) -> Result<Self> {
        send_logs_to_tracing(LogOptions::default().with_logs_enabled(settings.llama_logs));

        let backend = LlamaBackend::init()?;
        let params = LlamaModelParams::default().with_n_gpu_layers(settings.gpu_layers);
        let model = LlamaModel::load_from_file(&backend, &settings.path, &params)
            .with_context(|| format!("unable to load model {}", settings.path.display()))?;

        info!(
            model = %settings.path.display(),
            ctx_size = settings.ctx_size,
            threads = settings.threads,
            "model loaded"
        );

        Ok(Self {
            backend,
            model,
            settings,
        })
    }

    fn build_batch(input_tokens: &[LlamaToken], capacity: usize) -> Result<LlamaBatch, GenerationError> {
        let mut batch = LlamaBatch::new(capacity, 1);

        let last_index = input_tokens.len() as i32 - 1;
        for (i, token) in (0_i32..).zip(input_tokens.iter()) {
            // llama_decode will output logits only for the last token of the prompt
            let is_last = i == last_index;
            batch
                .add(*token, i, &[0], is_last)
                .map_err(|e| GenerationError::Decode(e.to_string()))?;
        }

        Ok(batch)
    }

    fn sampler(&self) -> LlamaSampler {
        if self.settings.temperature <= 0.0 {
            return LlamaSampler::greedy();
        }

        LlamaSampler::chain_simple([
            LlamaSampler::top_k(40),
            LlamaSampler::top_p(0.95, 1),
            LlamaSampler::temp(self.settings.temperature),
            LlamaSampler::dist(self.settings.seed),
        ])
    }
}

impl InferenceRuntime for Llm {
    fn generate(
        &self,
        prompt: &str,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError> {
        let input_tokens = self
            .model
            .str_to_token(prompt, AddBos::Always)
            .map_err(|e| GenerationError::Tokenize(e.to_string()))?;

        let n_ctx = self.settings.ctx_size;
        if input_tokens.len() >= n_ctx as usize {
            return Err(GenerationError::PromptTooLong {
                tokens: input_tokens.len(),
                ctx: n_ctx,
            });
        }

        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(n_ctx))
            .with_n_batch(n_ctx)
            .with_n_threads(self.settings.threads)
            .with_n_threads_batch(self.settings.threads);
        let mut ctx = self
            .model
            .new_context(&self.backend, ctx_params)
            .map_err(|e| GenerationError::Context(e.to_string()))?;

        let mut batch = Self::build_batch(&input_tokens, n_ctx as usize)?;
        ctx.decode(&mut batch)
            .map_err(|e| GenerationError::Decode(e.to_string()))?;

        // the reply shares the window with the prompt
        let room = n_ctx as usize - input_tokens.len();
        let max_response_length = (request.max_tokens as usize).min(room) as i32;
        let start_token_idx = batch.n_tokens();
        let end_token_idx = start_token_idx + max_response_length;

        let mut sampler = self.sampler();
        let mut output = Vec::new();

        for token_idx in start_token_idx..end_token_idx {
            let token = sampler.sample(&ctx, batch.n_tokens() - 1);
            if self.model.is_eog_token(token) {
                break;
            }

            let output_bytes = self
                .model
                .token_to_bytes(token, Special::Plaintext)
                .map_err(|e| GenerationError::Detokenize(e.to_string()))?;
            output.extend_from_slice(&output_bytes);

            if find_stop(&String::from_utf8_lossy(&output), &request.stop).is_some() {
                break;
            }

            batch.clear();
            batch
                .add(token, token_idx, &[0], true)
                .map_err(|e| GenerationError::Decode(e.to_string()))?;

            ctx.decode(&mut batch)
                .map_err(|e| GenerationError::Decode(e.to_string()))?;
        }

        debug!(
            prompt_tokens = input_tokens.len(),
            output_bytes = output.len(),
            "generation loop finished"
        );

        let mut text = String::from_utf8_lossy(&output).into_owned();
        if let Some(at) = find_stop(&text, &request.stop) {
            text.truncate(at);
        }

        if request.echo {
            text.insert_str(0, prompt);
        }

        Ok(text)
    }
}

impl Drop for Llm {
    fn drop(&mut self) {
        info!("unloading model");
        send_logs_to_tracing(LogOptions::default());
    }
}

/// Byte offset of the earliest stop sequence in `text`.
pub fn find_stop(text: &str, stop: &[String]) -> Option<usize> {
    stop.iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::prompt;

    #[test]
    fn test_find_stop_earliest_wins() {
        let stop = prompt::stop_sequences();

        assert_eq!(find_stop("Hello there", &stop), None);
        assert_eq!(find_stop("Hello\nUser: more", &stop), Some(5));
        assert_eq!(find_stop("Hi\n\nUser: again", &stop), Some(3));
        assert_eq!(find_stop("User: straight away", &stop), Some(0));
    }

    #[test]
    fn test_find_stop_ignores_empty_sequences() {
        let stop = vec![String::new(), "END".to_string()];

        assert_eq!(find_stop("abc", &stop), None);
        assert_eq!(find_stop("abcEND", &stop), Some(3));
    }

    #[test]
    #[serial]
    #[ignore = "needs a GGUF model on disk"]
    fn test_llm() {
        let path = std::env::var("ADA_TEST_MODEL").unwrap_or_else(|_| {
            "models/bartowski/Llama-3.2-1B-Instruct-GGUF/Llama-3.2-1B-Instruct-Q4_0.gguf"
                .to_string()
        });
        let llm = Llm::new(ModelSettings {
            path: PathBuf::from(path),
            ctx_size: 2048,
            threads: 2,
            gpu_layers: 0,
            temperature: 0.0,
            seed: 1234,
            llama_logs: false,
        })
        .unwrap();

        let request = GenerationRequest {
            max_tokens: 32,
            stop: prompt::stop_sequences(),
            echo: false,
        };
        let reply = llm.generate(&prompt::compose(None, "Hello"), &request).unwrap();

        assert!(!reply.trim().is_empty());
        assert!(find_stop(&reply, &request.stop).is_none());
    }
}
