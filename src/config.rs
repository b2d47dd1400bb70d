//! Configuration types for training-job launch operations

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Numeric precision requested from the trainer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    /// Full 32-bit floating point
    Fp32,
    /// Half precision (IEEE fp16)
    Fp16,
    /// Brain floating point (bf16)
    Bf16,
}

impl Default for Precision {
    fn default() -> Self {
        // bf16 is the safe default for large-batch training on A100-class GPUs
        Self::Bf16
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fp32 => write!(f, "fp32"),
            Self::Fp16 => write!(f, "fp16"),
            Self::Bf16 => write!(f, "bf16"),
        }
    }
}

/// Target device for the trainer process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    /// Auto-detect: CUDA when NVIDIA GPUs are visible, CPU otherwise
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPUs
    Cuda,
}

impl Default for Device {
    fn default() -> Self {
        Self::Auto
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
        }
    }
}

/// Configuration passed through to the external trainer
///
/// Field for field this mirrors the trainer's command-line contract:
/// embeddings path, output directory, batch geometry, schedule intervals,
/// and the experiment-tracking identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Path to the embeddings artifact consumed by training
    pub embeddings: PathBuf,

    /// Directory receiving checkpoints, logs, and the run summary
    pub output_dir: PathBuf,

    /// Per-device batch size
    pub batch_size: usize,

    /// Number of training epochs
    pub num_epochs: usize,

    /// Target device
    pub device: Device,

    /// Number of GPUs to train on (0 = auto-detect)
    pub num_gpus: usize,

    /// Numeric precision
    pub precision: Precision,

    /// Enable gradient checkpointing to trade compute for memory
    pub gradient_checkpointing: bool,

    /// Peak learning rate
    pub learning_rate: f64,

    /// Linear warmup steps before the peak learning rate
    pub warmup_steps: usize,

    /// Interval (in steps) between metric log lines
    pub logging_steps: usize,

    /// Interval (in steps) between checkpoint saves
    pub save_steps: usize,

    /// Interval (in steps) between evaluation passes
    pub eval_steps: usize,

    /// Experiment-tracking project name
    pub project: String,

    /// Experiment-tracking run name (trainer picks one when absent)
    pub run_name: Option<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            embeddings: PathBuf::from("embeddings.safetensors"),
            output_dir: PathBuf::from("runs"),
            batch_size: 128,
            num_epochs: 10,
            device: Device::default(),
            num_gpus: 0, // Auto-detect visible GPUs
            precision: Precision::default(),
            gradient_checkpointing: false,
            learning_rate: 1e-4,
            warmup_steps: 1_000,
            logging_steps: 50,
            save_steps: 1_000,
            eval_steps: 500,
            project: "eva-to-clip-dit".to_string(),
            run_name: None,
        }
    }
}

impl TrainingConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flowtrain::{TrainingConfig, Precision};
    ///
    /// let config = TrainingConfig::builder()
    ///     .embeddings("embeddings.safetensors")
    ///     .output_dir("runs/exp-01")
    ///     .batch_size(64)
    ///     .precision(Precision::Bf16)
    ///     .build()
    ///     .unwrap();
    /// ```
    #[must_use]
    pub fn builder() -> TrainingConfigBuilder {
        TrainingConfigBuilder::default()
    }

    /// Effective batch size across all participating devices
    ///
    /// A `num_gpus` of 0 (auto-detect not yet resolved) counts as a single
    /// device so the value is always meaningful for step arithmetic.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size * self.num_gpus.max(1)
    }

    /// Optimizer steps per epoch for an artifact with `num_samples` rows
    #[must_use]
    pub fn steps_per_epoch(&self, num_samples: usize) -> usize {
        num_samples.div_ceil(self.effective_batch_size())
    }

    /// Total optimizer steps over the whole schedule
    #[must_use]
    pub fn total_steps(&self, num_samples: usize) -> usize {
        self.steps_per_epoch(num_samples) * self.num_epochs
    }

    /// Validate all configuration parameters
    ///
    /// # Validation Rules
    ///
    /// - Batch size and epoch count: at least 1
    /// - Learning rate: finite and strictly positive
    /// - Logging/save/eval intervals: at least 1
    /// - Project name: non-empty
    ///
    /// # Errors
    /// Returns `LaunchError::InvalidConfig` with the offending parameter,
    /// its value, and the valid range.
    pub fn validate(&self) -> crate::Result<()> {
        if self.batch_size == 0 {
            return Err(crate::error::LaunchError::config_value_error(
                "batch size",
                self.batch_size,
                ">= 1",
                Some(128),
            ));
        }

        if self.num_epochs == 0 {
            return Err(crate::error::LaunchError::config_value_error(
                "epoch count",
                self.num_epochs,
                ">= 1",
                Some(10),
            ));
        }

        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(crate::error::LaunchError::config_value_error(
                "learning rate",
                self.learning_rate,
                "finite and > 0",
                Some(1e-4),
            ));
        }

        if self.logging_steps == 0 {
            return Err(crate::error::LaunchError::config_value_error(
                "logging interval",
                self.logging_steps,
                ">= 1",
                Some(50),
            ));
        }

        if self.save_steps == 0 {
            return Err(crate::error::LaunchError::config_value_error(
                "save interval",
                self.save_steps,
                ">= 1",
                Some(1_000),
            ));
        }

        if self.eval_steps == 0 {
            return Err(crate::error::LaunchError::config_value_error(
                "eval interval",
                self.eval_steps,
                ">= 1",
                Some(500),
            ));
        }

        if self.project.is_empty() {
            return Err(crate::error::LaunchError::invalid_config(
                "Experiment-tracking project name must not be empty",
            ));
        }

        Ok(())
    }
}

/// Builder for `TrainingConfig`
#[derive(Debug, Default)]
pub struct TrainingConfigBuilder {
    config: TrainingConfig,
}

impl TrainingConfigBuilder {
    /// Set the embeddings artifact path
    #[must_use]
    pub fn embeddings<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config.embeddings = path.as_ref().to_path_buf();
        self
    }

    /// Set the output directory
    #[must_use]
    pub fn output_dir<P: AsRef<std::path::Path>>(mut self, dir: P) -> Self {
        self.config.output_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the per-device batch size
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Set the number of epochs
    #[must_use]
    pub fn num_epochs(mut self, num_epochs: usize) -> Self {
        self.config.num_epochs = num_epochs;
        self
    }

    /// Set the target device
    #[must_use]
    pub fn device(mut self, device: Device) -> Self {
        self.config.device = device;
        self
    }

    /// Set the GPU count (0 = auto-detect)
    #[must_use]
    pub fn num_gpus(mut self, num_gpus: usize) -> Self {
        self.config.num_gpus = num_gpus;
        self
    }

    /// Set the numeric precision
    #[must_use]
    pub fn precision(mut self, precision: Precision) -> Self {
        self.config.precision = precision;
        self
    }

    /// Enable or disable gradient checkpointing
    #[must_use]
    pub fn gradient_checkpointing(mut self, enabled: bool) -> Self {
        self.config.gradient_checkpointing = enabled;
        self
    }

    /// Set the peak learning rate
    #[must_use]
    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.config.learning_rate = learning_rate;
        self
    }

    /// Set the warmup step count
    #[must_use]
    pub fn warmup_steps(mut self, warmup_steps: usize) -> Self {
        self.config.warmup_steps = warmup_steps;
        self
    }

    /// Set the logging interval in steps
    #[must_use]
    pub fn logging_steps(mut self, logging_steps: usize) -> Self {
        self.config.logging_steps = logging_steps;
        self
    }

    /// Set the checkpoint-save interval in steps
    #[must_use]
    pub fn save_steps(mut self, save_steps: usize) -> Self {
        self.config.save_steps = save_steps;
        self
    }

    /// Set the evaluation interval in steps
    #[must_use]
    pub fn eval_steps(mut self, eval_steps: usize) -> Self {
        self.config.eval_steps = eval_steps;
        self
    }

    /// Set the experiment-tracking project name
    #[must_use]
    pub fn project<S: Into<String>>(mut self, project: S) -> Self {
        self.config.project = project.into();
        self
    }

    /// Set the experiment-tracking run name
    #[must_use]
    pub fn run_name<S: Into<String>>(mut self, run_name: S) -> Self {
        self.config.run_name = Some(run_name.into());
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Returns `LaunchError::InvalidConfig` when any parameter is outside
    /// its valid range.
    pub fn build(self) -> crate::Result<TrainingConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}

/// Launcher-side options that never reach the trainer's flag list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Trainer program to invoke (name on PATH or explicit path)
    pub trainer: PathBuf,

    /// Custom cache root overriding `FLOWTRAIN_CACHE_DIR` / XDG
    pub cache_dir: Option<PathBuf>,

    /// Redirect cache/temp environment variables for the trainer process
    pub redirect_caches: bool,

    /// Dump GPU diagnostic state when the trainer fails
    pub gpu_diagnostics: bool,

    /// Print the trainer invocation without spawning it
    pub dry_run: bool,

    /// Additional environment variables for the trainer process
    pub extra_env: Vec<(String, String)>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            trainer: PathBuf::from("train-dit"),
            cache_dir: None,
            redirect_caches: true,
            gpu_diagnostics: true,
            dry_run: false,
            extra_env: Vec::new(),
        }
    }
}

impl JobConfig {
    /// Create a new job configuration builder
    #[must_use]
    pub fn builder() -> JobConfigBuilder {
        JobConfigBuilder::default()
    }

    /// Validate launcher options
    ///
    /// # Errors
    /// - Empty trainer program
    /// - Extra environment variable with an empty name
    pub fn validate(&self) -> crate::Result<()> {
        if self.trainer.as_os_str().is_empty() {
            return Err(crate::error::LaunchError::invalid_config(
                "Trainer program must not be empty",
            ));
        }

        for (name, _) in &self.extra_env {
            if name.is_empty() {
                return Err(crate::error::LaunchError::invalid_config(
                    "Environment variable names must not be empty",
                ));
            }
        }

        Ok(())
    }
}

/// Builder for `JobConfig`
#[derive(Debug, Default)]
pub struct JobConfigBuilder {
    config: JobConfig,
}

impl JobConfigBuilder {
    /// Set the trainer program
    #[must_use]
    pub fn trainer<P: AsRef<std::path::Path>>(mut self, trainer: P) -> Self {
        self.config.trainer = trainer.as_ref().to_path_buf();
        self
    }

    /// Set a custom cache root
    #[must_use]
    pub fn cache_dir<P: AsRef<std::path::Path>>(mut self, dir: P) -> Self {
        self.config.cache_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Enable or disable cache redirection
    #[must_use]
    pub fn redirect_caches(mut self, redirect: bool) -> Self {
        self.config.redirect_caches = redirect;
        self
    }

    /// Enable or disable the GPU diagnostics dump on failure
    #[must_use]
    pub fn gpu_diagnostics(mut self, enabled: bool) -> Self {
        self.config.gpu_diagnostics = enabled;
        self
    }

    /// Enable or disable dry-run mode
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    /// Add an extra environment variable for the trainer process
    #[must_use]
    pub fn env<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.config.extra_env.push((name.into(), value.into()));
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Returns `LaunchError::InvalidConfig` for an empty trainer program or
    /// malformed extra environment entries.
    pub fn build(self) -> crate::Result<JobConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
