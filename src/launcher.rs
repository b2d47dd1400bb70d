//! Trainer invocation and job orchestration
//!
//! This is the replacement for the original job-script body: validate the
//! embeddings artifact, prepare the workspace, assemble the trainer command
//! line, run it with captured output, and branch the post-run summary on the
//! exit code. The trainer itself stays an external program behind a fixed
//! flag contract; `JobRunner` is the seam between orchestration and process
//! execution so schedulers and tests can substitute their own execution.

use crate::artifact::{ArtifactSpec, ArtifactSummary, EmbeddingsArtifact};
use crate::checkpoint::{scan_checkpoints, CheckpointInfo};
use crate::config::{JobConfig, TrainingConfig};
use crate::error::{LaunchError, Result};
use crate::services::{JobStage, NoOpProgressReporter, ProgressReporter, ProgressUpdate};
use crate::utils::devices::DeviceManager;
use crate::utils::validation::{NumericValidator, PathValidator};
use crate::workspace::CacheLayout;
use async_trait::async_trait;
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// File name of the captured trainer output
pub const TRAIN_LOG_NAME: &str = "train.log";
/// File name of the persisted run summary
pub const RUN_SUMMARY_NAME: &str = "run-summary.json";

/// A fully assembled trainer invocation
///
/// Holds the program, the ordered flag list, and the environment overrides.
/// The same value feeds process spawning, `--dry-run` output, and SLURM
/// batch-script rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainerCommand {
    /// Program to invoke
    pub program: PathBuf,
    /// Ordered argument list
    pub args: Vec<String>,
    /// Environment overrides applied to the child process
    pub envs: Vec<(String, String)>,
}

impl TrainerCommand {
    /// Assemble the trainer invocation from validated configuration
    ///
    /// # Errors
    /// Returns `LaunchError::InvalidConfig` when either configuration fails
    /// validation.
    pub fn build(
        training: &TrainingConfig,
        job: &JobConfig,
        cache: Option<&CacheLayout>,
    ) -> Result<Self> {
        training.validate()?;
        job.validate()?;

        let mut args = vec![
            "--embeddings".to_string(),
            training.embeddings.display().to_string(),
            "--output-dir".to_string(),
            training.output_dir.display().to_string(),
            "--batch-size".to_string(),
            training.batch_size.to_string(),
            "--num-epochs".to_string(),
            training.num_epochs.to_string(),
            "--device".to_string(),
            training.device.to_string(),
            "--num-gpus".to_string(),
            training.num_gpus.to_string(),
            "--precision".to_string(),
            training.precision.to_string(),
        ];

        if training.gradient_checkpointing {
            args.push("--gradient-checkpointing".to_string());
        }

        args.extend([
            "--learning-rate".to_string(),
            training.learning_rate.to_string(),
            "--warmup-steps".to_string(),
            training.warmup_steps.to_string(),
            "--logging-steps".to_string(),
            training.logging_steps.to_string(),
            "--save-steps".to_string(),
            training.save_steps.to_string(),
            "--eval-steps".to_string(),
            training.eval_steps.to_string(),
            "--project".to_string(),
            training.project.clone(),
        ]);

        if let Some(run_name) = &training.run_name {
            args.push("--run-name".to_string());
            args.push(run_name.clone());
        }

        let mut envs = Vec::new();
        if let Some(cache) = cache {
            envs.extend(cache.env_overrides());
        }
        envs.extend(job.extra_env.iter().cloned());

        Ok(Self {
            program: job.trainer.clone(),
            args,
            envs,
        })
    }

    /// Render the invocation as a shell-quoted one-liner
    #[must_use]
    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        for (name, value) in &self.envs {
            parts.push(format!("{}={}", name, shell_quote(value)));
        }
        parts.push(shell_quote(&self.program.display().to_string()));
        for arg in &self.args {
            parts.push(shell_quote(arg));
        }
        parts.join(" ")
    }
}

/// Quote a string for `sh` when it contains anything beyond safe characters
pub(crate) fn shell_quote(value: &str) -> String {
    let safe = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./=:,".contains(c));
    if safe && !value.is_empty() {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

/// Exit state of a finished trainer process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainerExit {
    /// Process exit code (`None` when killed by a signal)
    pub code: Option<i32>,
}

impl TrainerExit {
    /// Whether the trainer reported success (exit code zero)
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Seam between job orchestration and process execution
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run the trainer to completion
    ///
    /// Implementations stream trainer output into `log_path` when given.
    ///
    /// # Errors
    /// - Trainer could not be spawned or awaited
    async fn run(&self, command: &TrainerCommand, log_path: Option<&Path>) -> Result<TrainerExit>;
}

/// Default runner spawning the trainer as a child process
pub struct ProcessJobRunner;

#[async_trait]
impl JobRunner for ProcessJobRunner {
    async fn run(&self, command: &TrainerCommand, log_path: Option<&Path>) -> Result<TrainerExit> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (name, value) in &command.envs {
            cmd.env(name, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            LaunchError::launch_error_with_context(
                "spawn",
                &command.program,
                &e.to_string(),
                &[
                    "check the trainer is on PATH",
                    "pass an explicit path via the trainer option",
                ],
            )
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LaunchError::internal("Trainer stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LaunchError::internal("Trainer stderr was not captured"))?;

        // Both channels funnel through one writer so log lines stay whole
        let (tx, mut rx) = mpsc::unbounded_channel::<(bool, String)>();

        let out_tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if out_tx.send((false, line)).is_err() {
                    break;
                }
            }
        });

        let err_tx = tx;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if err_tx.send((true, line)).is_err() {
                    break;
                }
            }
        });

        let mut log_file = match log_path {
            Some(path) => Some(tokio::fs::File::create(path).await.map_err(|e| {
                LaunchError::file_io_error("create trainer log", path, &e)
            })?),
            None => None,
        };

        while let Some((is_stderr, line)) = rx.recv().await {
            if is_stderr {
                log::warn!(target: "trainer", "{}", line);
            } else {
                log::info!(target: "trainer", "{}", line);
            }
            if let Some(file) = log_file.as_mut() {
                file.write_all(line.as_bytes()).await.map_err(|e| {
                    LaunchError::launch(format!("Failed to write trainer log: {}", e))
                })?;
                file.write_all(b"\n").await.map_err(|e| {
                    LaunchError::launch(format!("Failed to write trainer log: {}", e))
                })?;
            }
        }

        if let Some(file) = log_file.as_mut() {
            file.flush()
                .await
                .map_err(|e| LaunchError::launch(format!("Failed to flush trainer log: {}", e)))?;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| LaunchError::launch(format!("Failed to await trainer: {}", e)))?;

        Ok(TrainerExit {
            code: status.code(),
        })
    }
}

/// Post-run summary persisted as `run-summary.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Experiment-tracking run name
    pub run_name: Option<String>,
    /// Whether the trainer exited with code zero
    pub success: bool,
    /// Trainer exit code (`None` for dry runs or signal deaths)
    pub exit_code: Option<i32>,
    /// Whether this was a dry run (nothing was spawned)
    pub dry_run: bool,
    /// Wall-clock job duration in seconds
    pub duration_secs: f64,
    /// Sample count of the validated artifact
    pub num_samples: usize,
    /// Batch size across all participating devices
    pub effective_batch_size: usize,
    /// Total optimizer steps of the schedule
    pub total_steps: usize,
    /// Checkpoints discovered in the output directory
    pub checkpoints: Vec<CheckpointInfo>,
    /// Captured trainer log, when one was written
    pub log_path: Option<PathBuf>,
    /// Run output directory
    pub output_dir: PathBuf,
}

impl RunSummary {
    /// Render the post-run report block
    #[must_use]
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        if self.dry_run {
            report.push_str("Dry run: trainer command assembled, nothing spawned\n");
        } else if self.success {
            report.push_str("Training completed successfully\n");
        } else {
            match self.exit_code {
                Some(code) => {
                    report.push_str(&format!("Training FAILED (exit code {})\n", code));
                },
                None => report.push_str("Training FAILED (killed by signal)\n"),
            }
        }

        report.push_str(&format!("  ├─ Samples: {}\n", self.num_samples));
        report.push_str(&format!(
            "  ├─ Effective batch size: {}\n",
            self.effective_batch_size
        ));
        report.push_str(&format!("  ├─ Total steps: {}\n", self.total_steps));
        report.push_str(&format!("  ├─ Duration: {:.2}s\n", self.duration_secs));

        if let Some(log_path) = &self.log_path {
            report.push_str(&format!("  ├─ Trainer log: {}\n", log_path.display()));
        }

        if self.checkpoints.is_empty() {
            report.push_str("  └─ Checkpoints: none\n");
        } else {
            report.push_str(&format!("  └─ Checkpoints: {}\n", self.checkpoints.len()));
            for checkpoint in &self.checkpoints {
                report.push_str(&format!(
                    "       • {} ({})\n",
                    checkpoint.name,
                    crate::workspace::format_size(checkpoint.size_bytes)
                ));
            }
        }

        report
    }
}

/// Orchestrates a training job from artifact validation to the run summary
pub struct TrainingLauncher {
    training: TrainingConfig,
    job: JobConfig,
    artifact_spec: ArtifactSpec,
    runner: Box<dyn JobRunner>,
    progress: Box<dyn ProgressReporter>,
}

impl TrainingLauncher {
    /// Create a launcher with the default process runner
    #[must_use]
    pub fn new(training: TrainingConfig, job: JobConfig) -> Self {
        Self {
            training,
            job,
            artifact_spec: ArtifactSpec::default(),
            runner: Box::new(ProcessJobRunner),
            progress: Box::new(NoOpProgressReporter),
        }
    }

    /// Substitute the job runner (schedulers, tests)
    #[must_use]
    pub fn with_runner(mut self, runner: Box<dyn JobRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Substitute the progress reporter
    #[must_use]
    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Override the expected artifact layout
    #[must_use]
    pub fn with_artifact_spec(mut self, spec: ArtifactSpec) -> Self {
        self.artifact_spec = spec;
        self
    }

    /// Training configuration
    #[must_use]
    pub fn training(&self) -> &TrainingConfig {
        &self.training
    }

    /// Launcher configuration
    #[must_use]
    pub fn job(&self) -> &JobConfig {
        &self.job
    }

    /// Open and validate the configured embeddings artifact
    ///
    /// # Errors
    /// - Embeddings file missing (`LaunchError::Io`)
    /// - Artifact violating the layout contract (`LaunchError::Artifact`)
    pub fn validate_artifact(&self) -> Result<ArtifactSummary> {
        PathValidator::validate_input_file(&self.training.embeddings)?;
        let artifact = EmbeddingsArtifact::open(&self.training.embeddings)?;
        artifact.validate(&self.artifact_spec)
    }

    /// Run the job end to end
    ///
    /// Validation failures and spawn failures are errors; a trainer that ran
    /// and exited non-zero is NOT an error — it produces a summary with
    /// `success == false` so callers can branch, mirroring the exit-code
    /// handling of the original job scripts.
    ///
    /// # Errors
    /// - Artifact missing or invalid
    /// - Warmup longer than the training schedule
    /// - Workspace preparation failures
    /// - Trainer spawn failures
    pub async fn launch(&self) -> Result<RunSummary> {
        let start = Instant::now();

        self.progress
            .report_progress(ProgressUpdate::new(JobStage::Validation, start));
        let artifact_summary = self.validate_artifact()?;

        // Resolve auto device/GPU count before the command is assembled
        let (device, num_gpus) =
            DeviceManager::resolve(self.training.device, self.training.num_gpus)?;
        let mut training = self.training.clone();
        training.device = device;
        training.num_gpus = num_gpus;

        let total_steps = training.total_steps(artifact_summary.num_samples);
        NumericValidator::validate_warmup(training.warmup_steps, total_steps)?;

        self.progress
            .report_progress(ProgressUpdate::new(JobStage::WorkspaceSetup, start));
        PathValidator::validate_output_dir(&training.output_dir)?;

        let cache = if self.job.redirect_caches {
            Some(match &self.job.cache_dir {
                Some(dir) => CacheLayout::with_custom_root(dir)?,
                None => CacheLayout::new()?,
            })
        } else {
            None
        };

        let command = TrainerCommand::build(&training, &self.job, cache.as_ref())?;

        if self.job.dry_run {
            log::info!("Dry run: {}", command.render());
            return Ok(RunSummary {
                run_name: training.run_name.clone(),
                success: true,
                exit_code: None,
                dry_run: true,
                duration_secs: start.elapsed().as_secs_f64(),
                num_samples: artifact_summary.num_samples,
                effective_batch_size: training.effective_batch_size(),
                total_steps,
                checkpoints: Vec::new(),
                log_path: None,
                output_dir: training.output_dir.clone(),
            });
        }

        self.progress
            .report_progress(ProgressUpdate::new(JobStage::Launch, start));
        log::info!("Launching trainer: {}", command.render());

        let log_path = training.output_dir.join(TRAIN_LOG_NAME);
        self.progress
            .report_progress(ProgressUpdate::new(JobStage::Training, start));
        let exit = self.runner.run(&command, Some(&log_path)).await?;
        let duration = start.elapsed();

        self.progress
            .report_progress(ProgressUpdate::new(JobStage::CheckpointScan, start));
        let checkpoints = scan_checkpoints(&training.output_dir)?;

        let success = exit.success();
        if success {
            log::info!(
                "Trainer finished in {:.2}s with {} checkpoint(s)",
                duration.as_secs_f64(),
                checkpoints.len()
            );
        } else {
            self.progress.report_error(
                JobStage::Training,
                &match exit.code {
                    Some(code) => format!("trainer exited with code {}", code),
                    None => "trainer was killed by a signal".to_string(),
                },
            );
            if self.job.gpu_diagnostics {
                for line in DeviceManager::diagnostics_dump().lines() {
                    log::error!(target: "gpu", "{}", line);
                }
            }
        }

        let run_summary = RunSummary {
            run_name: training.run_name.clone(),
            success,
            exit_code: exit.code,
            dry_run: false,
            duration_secs: duration.as_secs_f64(),
            num_samples: artifact_summary.num_samples,
            effective_batch_size: training.effective_batch_size(),
            total_steps,
            checkpoints,
            log_path: Some(log_path),
            output_dir: training.output_dir.clone(),
        };

        let summary_path = training.output_dir.join(RUN_SUMMARY_NAME);
        let json = serde_json::to_string_pretty(&run_summary)
            .map_err(|e| LaunchError::internal(format!("Failed to encode run summary: {}", e)))?;
        tokio::fs::write(&summary_path, json)
            .await
            .map_err(|e| LaunchError::file_io_error("write run summary", &summary_path, &e))?;

        self.progress
            .report_progress(ProgressUpdate::new(JobStage::Completed, start));
        Ok(run_summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Device;
    use safetensors::tensor::TensorView;
    use safetensors::Dtype;
    use tempfile::TempDir;

    /// Runner returning a fixed exit code without spawning anything
    struct StaticRunner {
        code: i32,
    }

    #[async_trait]
    impl JobRunner for StaticRunner {
        async fn run(
            &self,
            _command: &TrainerCommand,
            log_path: Option<&Path>,
        ) -> Result<TrainerExit> {
            if let Some(path) = log_path {
                tokio::fs::write(path, b"mock trainer output\n").await.ok();
            }
            Ok(TrainerExit {
                code: Some(self.code),
            })
        }
    }

    fn tiny_spec() -> ArtifactSpec {
        ArtifactSpec {
            tokens: 4,
            eva_dim: 16,
            clip_dim: 8,
            ..ArtifactSpec::default()
        }
    }

    fn write_tiny_artifact(path: &Path, n: usize) {
        let spec = tiny_spec();
        let eva: Vec<u8> = vec![0.5_f32; n * spec.tokens * spec.eva_dim]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let clip: Vec<u8> = vec![0.5_f32; n * spec.tokens * spec.clip_dim]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let views = vec![
            (
                "eva_embeddings".to_string(),
                TensorView::new(Dtype::F32, vec![n, spec.tokens, spec.eva_dim], &eva).unwrap(),
            ),
            (
                "clip_embeddings".to_string(),
                TensorView::new(Dtype::F32, vec![n, spec.tokens, spec.clip_dim], &clip).unwrap(),
            ),
        ];
        safetensors::serialize_to_file(views, &None, path).unwrap();
    }

    fn test_configs(temp: &TempDir) -> (TrainingConfig, JobConfig) {
        let embeddings = temp.path().join("embeddings.safetensors");
        write_tiny_artifact(&embeddings, 8);

        let training = TrainingConfig::builder()
            .embeddings(&embeddings)
            .output_dir(temp.path().join("out"))
            .batch_size(4)
            .num_epochs(2)
            .device(Device::Cpu)
            .warmup_steps(1)
            .build()
            .unwrap();
        let job = JobConfig::builder()
            .redirect_caches(false)
            .gpu_diagnostics(false)
            .build()
            .unwrap();
        (training, job)
    }

    #[test]
    fn test_trainer_command_carries_full_contract() {
        let training = TrainingConfig::builder()
            .embeddings("emb.safetensors")
            .output_dir("out")
            .batch_size(32)
            .num_epochs(5)
            .gradient_checkpointing(true)
            .run_name("contract-check")
            .build()
            .unwrap();
        let job = JobConfig::default();

        let command = TrainerCommand::build(&training, &job, None).unwrap();
        assert_eq!(command.program, PathBuf::from("train-dit"));

        for flag in [
            "--embeddings",
            "--output-dir",
            "--batch-size",
            "--num-epochs",
            "--device",
            "--num-gpus",
            "--precision",
            "--gradient-checkpointing",
            "--learning-rate",
            "--warmup-steps",
            "--logging-steps",
            "--save-steps",
            "--eval-steps",
            "--project",
            "--run-name",
        ] {
            assert!(command.args.contains(&flag.to_string()), "missing {}", flag);
        }

        // Flag values follow their flags
        let idx = command.args.iter().position(|a| a == "--batch-size").unwrap();
        assert_eq!(command.args.get(idx + 1).map(String::as_str), Some("32"));
    }

    #[test]
    fn test_trainer_command_omits_optional_flags() {
        let training = TrainingConfig::default();
        let command = TrainerCommand::build(&training, &JobConfig::default(), None).unwrap();

        assert!(!command.args.contains(&"--gradient-checkpointing".to_string()));
        assert!(!command.args.contains(&"--run-name".to_string()));
    }

    #[test]
    fn test_trainer_command_env_overrides() {
        let temp = TempDir::new().unwrap();
        let cache = CacheLayout::with_custom_root(temp.path()).unwrap();

        let job = JobConfig::builder().env("NCCL_DEBUG", "INFO").build().unwrap();
        let command =
            TrainerCommand::build(&TrainingConfig::default(), &job, Some(&cache)).unwrap();

        let names: Vec<&str> = command.envs.iter().map(|(k, _)| k.as_str()).collect();
        assert!(names.contains(&"HF_HOME"));
        assert!(names.contains(&"TMPDIR"));
        assert!(names.contains(&"NCCL_DEBUG"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain-value_1.0"), "plain-value_1.0");
        assert_eq!(shell_quote("has space"), "'has space'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_render_contains_env_and_flags() {
        let training = TrainingConfig::builder().run_name("render-check").build().unwrap();
        let job = JobConfig::builder().env("WANDB_MODE", "offline").build().unwrap();
        let command = TrainerCommand::build(&training, &job, None).unwrap();

        let rendered = command.render();
        assert!(rendered.contains("WANDB_MODE=offline"));
        assert!(rendered.contains("train-dit"));
        assert!(rendered.contains("--run-name render-check"));
    }

    #[test]
    fn test_trainer_exit_success() {
        assert!(TrainerExit { code: Some(0) }.success());
        assert!(!TrainerExit { code: Some(1) }.success());
        assert!(!TrainerExit { code: None }.success());
    }

    #[tokio::test]
    async fn test_launch_fails_for_missing_embeddings() {
        let temp = TempDir::new().unwrap();
        let training = TrainingConfig::builder()
            .embeddings(temp.path().join("absent.safetensors"))
            .output_dir(temp.path().join("out"))
            .device(Device::Cpu)
            .build()
            .unwrap();
        let job = JobConfig::builder().redirect_caches(false).build().unwrap();

        let launcher = TrainingLauncher::new(training, job)
            .with_runner(Box::new(StaticRunner { code: 0 }))
            .with_artifact_spec(tiny_spec());

        let err = launcher.launch().await.unwrap_err();
        assert!(matches!(err, LaunchError::Io(_)));
    }

    #[tokio::test]
    async fn test_launch_success_branch() {
        let temp = TempDir::new().unwrap();
        let (training, job) = test_configs(&temp);

        let launcher = TrainingLauncher::new(training, job)
            .with_runner(Box::new(StaticRunner { code: 0 }))
            .with_artifact_spec(tiny_spec());

        let summary = launcher.launch().await.unwrap();
        assert!(summary.success);
        assert_eq!(summary.exit_code, Some(0));
        assert_eq!(summary.num_samples, 8);
        assert_eq!(summary.effective_batch_size, 4);
        assert_eq!(summary.total_steps, 4); // ceil(8/4) * 2 epochs

        // Summary was persisted alongside the trainer log
        assert!(summary.output_dir.join(RUN_SUMMARY_NAME).is_file());
        assert!(summary.log_path.as_ref().unwrap().is_file());
        assert!(summary.format_report().contains("completed successfully"));
    }

    #[tokio::test]
    async fn test_launch_failure_branch() {
        let temp = TempDir::new().unwrap();
        let (training, job) = test_configs(&temp);

        let launcher = TrainingLauncher::new(training, job)
            .with_runner(Box::new(StaticRunner { code: 7 }))
            .with_artifact_spec(tiny_spec());

        let summary = launcher.launch().await.unwrap();
        assert!(!summary.success);
        assert_eq!(summary.exit_code, Some(7));

        let report = summary.format_report();
        assert!(report.contains("FAILED"));
        assert!(report.contains("exit code 7"));
    }

    #[tokio::test]
    async fn test_launch_dry_run_spawns_nothing() {
        let temp = TempDir::new().unwrap();
        let (training, mut job) = test_configs(&temp);
        job.dry_run = true;
        let output_dir = training.output_dir.clone();

        /// Runner that must never be called in dry-run mode
        struct PanicRunner;

        #[async_trait]
        impl JobRunner for PanicRunner {
            async fn run(
                &self,
                _command: &TrainerCommand,
                _log_path: Option<&Path>,
            ) -> Result<TrainerExit> {
                panic!("dry run must not spawn the trainer");
            }
        }

        let launcher = TrainingLauncher::new(training, job)
            .with_runner(Box::new(PanicRunner))
            .with_artifact_spec(tiny_spec());

        let summary = launcher.launch().await.unwrap();
        assert!(summary.dry_run);
        assert!(summary.checkpoints.is_empty());
        assert!(!output_dir.join(RUN_SUMMARY_NAME).exists());
    }

    #[tokio::test]
    async fn test_launch_rejects_excessive_warmup() {
        let temp = TempDir::new().unwrap();
        let (mut training, job) = test_configs(&temp);
        training.warmup_steps = 10_000; // Far beyond the 4-step schedule

        let launcher = TrainingLauncher::new(training, job)
            .with_runner(Box::new(StaticRunner { code: 0 }))
            .with_artifact_spec(tiny_spec());

        let err = launcher.launch().await.unwrap_err();
        assert!(err.to_string().contains("Warmup"));
    }

    #[tokio::test]
    async fn test_launch_collects_checkpoints() {
        let temp = TempDir::new().unwrap();
        let (training, job) = test_configs(&temp);
        let output_dir = training.output_dir.clone();

        /// Runner that simulates a trainer dropping checkpoints
        struct CheckpointingRunner;

        #[async_trait]
        impl JobRunner for CheckpointingRunner {
            async fn run(
                &self,
                command: &TrainerCommand,
                _log_path: Option<&Path>,
            ) -> Result<TrainerExit> {
                let idx = command
                    .args
                    .iter()
                    .position(|a| a == "--output-dir")
                    .expect("output dir flag present");
                let out = PathBuf::from(command.args.get(idx + 1).expect("output dir value"));
                for step in [2, 4] {
                    let dir = out.join(format!("checkpoint-{}", step));
                    tokio::fs::create_dir_all(&dir).await.unwrap();
                    tokio::fs::write(dir.join("weights.safetensors"), b"w").await.unwrap();
                }
                Ok(TrainerExit { code: Some(0) })
            }
        }

        let launcher = TrainingLauncher::new(training, job)
            .with_runner(Box::new(CheckpointingRunner))
            .with_artifact_spec(tiny_spec());

        let summary = launcher.launch().await.unwrap();
        assert_eq!(summary.checkpoints.len(), 2);
        assert_eq!(summary.checkpoints[1].name, "checkpoint-4");
        assert!(output_dir.join(RUN_SUMMARY_NAME).is_file());
    }
}
