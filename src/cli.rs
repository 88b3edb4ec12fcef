use std::path::PathBuf;

use clap::Parser;

use crate::llm::{GenerationRequest, ModelSettings};
use crate::prompt;

#[derive(Parser, Debug)]
#[command(
    name = "ada-chat",
    version,
    about = "Desktop chat client for a local GGUF model"
)]
pub struct Args {
    /// GGUF model file
    #[arg(long, default_value = "Dolphin3.0-Llama3.1-8B_Q5_K_M_T.gguf")]
    pub model: PathBuf,
    /// Context window shared by prompt and response
    #[arg(long, default_value_t = 2048)]
    pub ctx_size: u32,
    /// Inference threads, defaults to all cores but two
    #[arg(long)]
    pub threads: Option<i32>,
    #[arg(long, default_value_t = 1000)]
    pub gpu_layers: u32,
    /// Response token budget
    #[arg(long, default_value_t = 1024)]
    pub max_tokens: u32,
    /// 0 selects greedy decoding
    #[arg(long, default_value_t = 0.8)]
    pub temperature: f32,
    #[arg(long, default_value_t = 1234)]
    pub seed: u32,
    /// Path to the pdfium shared library, the system one is used otherwise
    #[arg(long)]
    pub pdfium_lib: Option<PathBuf>,
    /// Forward llama.cpp logs into the application log
    #[arg(long)]
    pub llama_logs: bool,
}

impl Args {
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            path: self.model.clone(),
            ctx_size: self.ctx_size,
            threads: self.threads.unwrap_or_else(default_threads),
            gpu_layers: self.gpu_layers,
            temperature: self.temperature,
            seed: self.seed,
            llama_logs: self.llama_logs,
        }
    }

    pub fn generation_request(&self) -> GenerationRequest {
        GenerationRequest {
            max_tokens: self.max_tokens,
            stop: prompt::stop_sequences(),
            echo: false,
        }
    }
}

fn default_threads() -> i32 {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores.saturating_sub(2).max(1) as i32
}
