use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    /// Directory scanned for source documents.
    #[serde(default = "default_documents_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: default_documents_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the persisted index (`vectors.bin` + `chunks.json`).
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("vectorstore")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks. Must be < chunk_size.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of chunks supplied to the model per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Sentence-embedding model. Must match between ingestion and query;
    /// the index records the model it was built with.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_embedding_batch_size(),
        }
    }
}

fn default_embedding_model() -> String {
    "bge-large-en-v1.5".to_string()
}
fn default_embedding_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Backend selection: "auto" probes for an accelerator, "gpu" and "cpu"
    /// force a path. The DOCQA_DEVICE environment variable overrides "auto".
    #[serde(default = "default_device")]
    pub device: String,
    /// Instruction-tuned model loaded on the accelerated path.
    #[serde(default = "default_gpu_model")]
    pub gpu_model: String,
    /// Hugging Face repository of the quantized CPU model.
    #[serde(default = "default_cpu_model_repo")]
    pub cpu_model_repo: String,
    /// GGUF file within the CPU model repository.
    #[serde(default = "default_cpu_model_file")]
    pub cpu_model_file: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_gen_top_k")]
    pub top_k: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Context window, in tokens, used to budget the prompt.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    /// Prompt-processing batch size for the CPU path.
    #[serde(default = "default_gen_batch_size")]
    pub batch_size: usize,
    /// Upper bound on one generation call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            gpu_model: default_gpu_model(),
            cpu_model_repo: default_cpu_model_repo(),
            cpu_model_file: default_cpu_model_file(),
            max_tokens: default_max_tokens(),
            top_k: default_gen_top_k(),
            temperature: default_temperature(),
            context_window: default_context_window(),
            batch_size: default_gen_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_device() -> String {
    "auto".to_string()
}
fn default_gpu_model() -> String {
    "meta-llama/Meta-Llama-3-8B-Instruct".to_string()
}
fn default_cpu_model_repo() -> String {
    "TheBloke/Llama-2-7B-Chat-GGUF".to_string()
}
fn default_cpu_model_file() -> String {
    "llama-2-7b-chat.Q4_K_M.gguf".to_string()
}
fn default_max_tokens() -> usize {
    512
}
fn default_gen_top_k() -> usize {
    10
}
fn default_temperature() -> f32 {
    0.7
}
fn default_context_window() -> usize {
    8192
}
fn default_gen_batch_size() -> usize {
    512
}
fn default_timeout_secs() -> u64 {
    300
}

/// Load a config file, falling back to built-in defaults when it is absent.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }

        // The splitter's stride is chunk_size - overlap; an overlap at or
        // above chunk_size would never advance.
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!(
                "chunking.chunk_overlap ({}) must be < chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }

        if self.retrieval.top_k < 1 {
            anyhow::bail!("retrieval.top_k must be >= 1");
        }

        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }

        match self.generation.device.as_str() {
            "auto" | "gpu" | "cpu" => {}
            other => anyhow::bail!(
                "Unknown generation device: '{}'. Must be auto, gpu, or cpu.",
                other
            ),
        }

        if self.generation.max_tokens == 0 {
            anyhow::bail!("generation.max_tokens must be > 0");
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
        }

        if self.generation.context_window == 0 {
            anyhow::bail!("generation.context_window must be > 0");
        }

        Ok(())
    }
}
