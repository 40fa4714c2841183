//! Hardware-conditioned generation backends.
//!
//! One probe at startup picks between two terminal states, fixed for the
//! process lifetime:
//!
//! - **Accelerated** — a large instruction-tuned model on the GPU.
//! - **CpuQuantized** — a smaller GGUF model, downloaded on first use and
//!   executed on the CPU.
//!
//! Both implement [`GenerationBackend`], so the answering chain never
//! branches on hardware. Selection order: config `device` setting, then the
//! `DOCQA_DEVICE` environment variable, then a CUDA driver probe; anything
//! unrecognized or undetectable lands on the CPU path.

use async_trait::async_trait;
use mistralrs::{GgufModelBuilder, RequestBuilder, TextMessageRole, TextModelBuilder};
use std::path::Path;
use tracing::{debug, info};

use crate::config::GenerationConfig;

pub const DEVICE_ENV_VAR: &str = "DOCQA_DEVICE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Gpu,
    Cpu,
}

fn parse_device(value: &str) -> Option<Device> {
    match value {
        "gpu" => Some(Device::Gpu),
        "cpu" => Some(Device::Cpu),
        _ => None,
    }
}

/// Resolve which backend to run. Called exactly once, at chain construction.
pub fn select_device(config: &GenerationConfig) -> Device {
    if let Some(device) = parse_device(&config.device) {
        return device;
    }

    if let Ok(value) = std::env::var(DEVICE_ENV_VAR) {
        if let Some(device) = parse_device(&value) {
            return device;
        }
        debug!(value = %value, "ignoring unrecognized {}", DEVICE_ENV_VAR);
    }

    if cuda_driver_present() {
        Device::Gpu
    } else {
        Device::Cpu
    }
}

fn cuda_driver_present() -> bool {
    if Path::new("/proc/driver/nvidia/version").exists() {
        return true;
    }
    std::process::Command::new("nvidia-smi")
        .arg("--list-gpus")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// The fixed sampling policy applied to every generation call.
#[derive(Debug, Clone)]
pub struct SamplingPolicy {
    pub max_tokens: usize,
    pub top_k: usize,
    pub temperature: f32,
}

impl SamplingPolicy {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            top_k: config.top_k,
            temperature: config.temperature,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to load generation model '{model}': {message}")]
    ModelLoad { model: String, message: String },
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("model returned no completion")]
    EmptyCompletion,
}

/// Text in, text out. Implementations hold their loaded model for the
/// process lifetime; `generate` is otherwise stateless.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn model_name(&self) -> &str;
    /// Context window in tokens; the chain budgets the prompt against it.
    fn context_window(&self) -> usize;
    async fn generate(&self, prompt: &str, policy: &SamplingPolicy)
        -> Result<String, BackendError>;
}

/// Probe hardware and load the matching backend. A model download failure
/// (CPU path, first run, no network) surfaces here and is not retried.
pub async fn create_backend(
    config: &GenerationConfig,
) -> Result<Box<dyn GenerationBackend>, BackendError> {
    match select_device(config) {
        Device::Gpu => {
            info!(model = %config.gpu_model, "accelerator available, loading instruction-tuned model");
            Ok(Box::new(AcceleratedBackend::load(config).await?))
        }
        Device::Cpu => {
            info!(model = %config.cpu_model_repo, "no accelerator, loading quantized CPU model");
            Ok(Box::new(CpuQuantizedBackend::load(config).await?))
        }
    }
}

/// Full-precision instruction-tuned model on the accelerator.
pub struct AcceleratedBackend {
    model: mistralrs::Model,
    name: String,
    context_window: usize,
}

impl AcceleratedBackend {
    pub async fn load(config: &GenerationConfig) -> Result<Self, BackendError> {
        let model = TextModelBuilder::new(config.gpu_model.clone())
            .with_logging()
            .build()
            .await
            .map_err(|e| BackendError::ModelLoad {
                model: config.gpu_model.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            model,
            name: config.gpu_model.clone(),
            context_window: config.context_window,
        })
    }
}

#[async_trait]
impl GenerationBackend for AcceleratedBackend {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    async fn generate(
        &self,
        prompt: &str,
        policy: &SamplingPolicy,
    ) -> Result<String, BackendError> {
        send_request(&self.model, prompt, policy).await
    }
}

/// Quantized GGUF model executed on the CPU. The weights file is fetched
/// from the Hugging Face hub on first use and cached.
pub struct CpuQuantizedBackend {
    model: mistralrs::Model,
    name: String,
    context_window: usize,
}

impl CpuQuantizedBackend {
    pub async fn load(config: &GenerationConfig) -> Result<Self, BackendError> {
        let name = format!("{}/{}", config.cpu_model_repo, config.cpu_model_file);
        info!(
            context_window = config.context_window,
            batch_size = config.batch_size,
            "loading GGUF model"
        );
        let model = GgufModelBuilder::new(
            config.cpu_model_repo.clone(),
            vec![config.cpu_model_file.clone()],
        )
        .with_logging()
        .build()
        .await
        .map_err(|e| BackendError::ModelLoad {
            model: name.clone(),
            message: e.to_string(),
        })?;

        Ok(Self {
            model,
            name,
            context_window: config.context_window,
        })
    }
}

#[async_trait]
impl GenerationBackend for CpuQuantizedBackend {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    async fn generate(
        &self,
        prompt: &str,
        policy: &SamplingPolicy,
    ) -> Result<String, BackendError> {
        send_request(&self.model, prompt, policy).await
    }
}

async fn send_request(
    model: &mistralrs::Model,
    prompt: &str,
    policy: &SamplingPolicy,
) -> Result<String, BackendError> {
    let mut sampling = mistralrs::SamplingParams::deterministic();
    sampling.temperature = Some(policy.temperature as f64);
    sampling.top_k = Some(policy.top_k);
    sampling.max_len = Some(policy.max_tokens);

    let request = RequestBuilder::new()
        .add_message(TextMessageRole::User, prompt)
        .set_sampling(sampling);

    let response = model
        .send_chat_request(request)
        .await
        .map_err(|e| BackendError::Generation(e.to_string()))?;

    response
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .filter(|text| !text.trim().is_empty())
        .ok_or(BackendError::EmptyCompletion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_device_known_values() {
        assert_eq!(parse_device("gpu"), Some(Device::Gpu));
        assert_eq!(parse_device("cpu"), Some(Device::Cpu));
        assert_eq!(parse_device("tpu"), None);
        assert_eq!(parse_device(""), None);
    }

    #[test]
    fn config_forces_device() {
        let mut config = GenerationConfig::default();
        config.device = "gpu".to_string();
        assert_eq!(select_device(&config), Device::Gpu);
        config.device = "cpu".to_string();
        assert_eq!(select_device(&config), Device::Cpu);
    }

    #[test]
    fn env_var_overrides_auto_probe() {
        // One test body so the env mutations cannot race each other.
        let mut config = GenerationConfig::default();
        config.device = "auto".to_string();

        std::env::set_var(DEVICE_ENV_VAR, "cpu");
        assert_eq!(select_device(&config), Device::Cpu);

        std::env::set_var(DEVICE_ENV_VAR, "gpu");
        assert_eq!(select_device(&config), Device::Gpu);

        // Config still wins over the environment.
        config.device = "cpu".to_string();
        assert_eq!(select_device(&config), Device::Cpu);

        std::env::remove_var(DEVICE_ENV_VAR);
    }

    #[test]
    fn sampling_policy_mirrors_config() {
        let config = GenerationConfig::default();
        let policy = SamplingPolicy::from_config(&config);
        assert_eq!(policy.max_tokens, 512);
        assert_eq!(policy.top_k, 10);
        assert!((policy.temperature - 0.7).abs() < f32::EPSILON);
    }
}
