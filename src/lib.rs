#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # flowtrain
//!
//! A training-job launcher for flow-matching DiT models that map EVA-CLIP
//! embeddings to CLIP embeddings. The crate replaces the ad-hoc job scripting
//! around such trainings with one coherent tool: it validates the embeddings
//! artifact the trainer consumes, redirects cache/temp directories away from
//! `$HOME`, assembles and runs the trainer invocation, branches the post-run
//! summary on the exit code, archives checkpoints with digest manifests, and
//! generates SLURM batch scripts for cluster submission.
//!
//! ## Features
//!
//! - **Artifact Validation**: memory-mapped safetensors inspection against
//!   the trainer's contract ([N, 64, 4096] EVA / [N, 64, 1024] CLIP, F32)
//! - **Workspace Management**: XDG-compliant cache layout exported to the
//!   trainer process (`HF_HOME`, `TORCH_HOME`, `TMPDIR`, `WANDB_DIR`)
//! - **Trainer Orchestration**: process spawning with captured output,
//!   exit-code branching, and GPU diagnostics on failure
//! - **Checkpoint Archiving**: SHA-256 manifests with offline verification
//! - **SLURM Integration**: batch-script generation and `sbatch` submission
//! - **CLI Integration**: optional command-line interface (enable with the
//!   `cli` feature, on by default)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flowtrain::{validate_embeddings_file, run_training_job, JobConfig, TrainingConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! // Validate the artifact up front (also happens at launch)
//! let summary = validate_embeddings_file("embeddings.safetensors")?;
//! println!("{} samples ready", summary.num_samples);
//!
//! // Configure and run the job
//! let training = TrainingConfig::builder()
//!     .embeddings("embeddings.safetensors")
//!     .output_dir("runs/exp-01")
//!     .batch_size(64)
//!     .run_name("exp-01")
//!     .build()?;
//! let job = JobConfig::default();
//!
//! let result = run_training_job(training, job).await?;
//! println!("{}", result.format_report());
//! # Ok(())
//! # }
//! ```
//!
//! ## Library vs CLI Usage
//!
//! All orchestration functionality is available as a library; the `cli`
//! feature only adds the `flowtrain` binary and its progress reporting:
//!
//! ```toml
//! [dependencies]
//! flowtrain = { version = "0.2", default-features = false }
//! ```

pub mod artifact;
pub mod checkpoint;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod launcher;
pub mod services;
pub mod slurm;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod utils;
pub mod workspace;

// Public API exports
pub use artifact::{
    ArtifactMetadata, ArtifactSpec, ArtifactSummary, EmbeddingsArtifact, TensorStats,
};
pub use checkpoint::{
    latest_checkpoint, scan_checkpoints, ArchiveEntry, ArchiveManifest, CheckpointArchiver,
    CheckpointInfo,
};
pub use config::{
    Device, JobConfig, JobConfigBuilder, Precision, TrainingConfig, TrainingConfigBuilder,
};
pub use error::{LaunchError, Result};
pub use launcher::{
    JobRunner, ProcessJobRunner, RunSummary, TrainerCommand, TrainerExit, TrainingLauncher,
};
pub use services::{
    ConsoleProgressReporter, JobStage, NoOpProgressReporter, ProgressReporter, ProgressUpdate,
};
pub use slurm::{render_batch_script, submit, SlurmConfig, SlurmConfigBuilder};
pub use utils::{
    ArtifactValidator, DeviceManager, GpuInfo, NumericValidator, PathValidator,
};
pub use workspace::{format_size, scan_runs, CacheLayout, RunInfo};

#[cfg(feature = "cli")]
pub use tracing_config::{events, init_cli_tracing, spans, TracingConfig, TracingFormat};

use std::path::Path;

/// Validate an embeddings artifact against the default layout
///
/// Opens the file memory-mapped and checks the trainer's contract: both
/// required tensors present, rank-3 shapes with 64 tokens and the expected
/// channel widths, matching sample counts, F32 storage.
///
/// # Arguments
///
/// * `path` - Path to the safetensors embeddings artifact
///
/// # Returns
///
/// An [`ArtifactSummary`] with the sample count and provenance metadata
///
/// # Examples
///
/// ```rust,no_run
/// use flowtrain::validate_embeddings_file;
///
/// # fn example() -> anyhow::Result<()> {
/// let summary = validate_embeddings_file("embeddings.safetensors")?;
/// assert_eq!(summary.tokens, 64);
/// # Ok(())
/// # }
/// ```
pub fn validate_embeddings_file<P: AsRef<Path>>(path: P) -> Result<ArtifactSummary> {
    let artifact = EmbeddingsArtifact::open(path)?;
    artifact.validate(&ArtifactSpec::default())
}

/// Run a training job end to end with the default process runner
///
/// Validates the artifact, prepares the workspace, spawns the trainer, and
/// returns the post-run summary. A trainer that ran but exited non-zero
/// yields `Ok` with `success == false`; inspect the summary to branch.
///
/// # Arguments
///
/// * `training` - The trainer's flag contract
/// * `job` - Launcher-side options (trainer program, caches, dry-run)
///
/// # Examples
///
/// ```rust,no_run
/// use flowtrain::{run_training_job, JobConfig, TrainingConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let training = TrainingConfig::builder()
///     .embeddings("embeddings.safetensors")
///     .output_dir("runs/exp-01")
///     .build()?;
///
/// let summary = run_training_job(training, JobConfig::default()).await?;
/// if !summary.success {
///     eprintln!("trainer failed with {:?}", summary.exit_code);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn run_training_job(training: TrainingConfig, job: JobConfig) -> Result<RunSummary> {
    TrainingLauncher::new(training, job).launch().await
}
