//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliPrecision};
use crate::{
    config::{JobConfig, Precision, TrainingConfig},
    slurm::SlurmConfig,
    utils::DeviceManager,
};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Convert CLI arguments to launcher configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build `TrainingConfig` from CLI arguments
    pub(crate) fn training_from_cli(cli: &Cli) -> Result<TrainingConfig> {
        let embeddings = cli
            .embeddings
            .as_ref()
            .context("An embeddings artifact is required")?;

        let device = DeviceManager::parse_device_string(&cli.device)
            .context("Invalid device")?;

        let precision = match cli.precision {
            CliPrecision::Fp32 => Precision::Fp32,
            CliPrecision::Fp16 => Precision::Fp16,
            CliPrecision::Bf16 => Precision::Bf16,
        };

        // A stable run name keeps the output directory and the tracking run
        // aligned even when the user provided neither.
        let run_name = cli.run_name.clone().unwrap_or_else(generate_run_name);
        let output_dir = cli
            .output_dir
            .clone()
            .map_or_else(|| PathBuf::from("runs").join(&run_name), PathBuf::from);

        let config = TrainingConfig::builder()
            .embeddings(embeddings)
            .output_dir(output_dir)
            .batch_size(cli.batch_size)
            .num_epochs(cli.num_epochs)
            .device(device)
            .num_gpus(cli.num_gpus)
            .precision(precision)
            .gradient_checkpointing(cli.gradient_checkpointing)
            .learning_rate(cli.learning_rate)
            .warmup_steps(cli.warmup_steps)
            .logging_steps(cli.logging_steps)
            .save_steps(cli.save_steps)
            .eval_steps(cli.eval_steps)
            .project(cli.project.clone())
            .run_name(run_name)
            .build()
            .context("Invalid training configuration")?;

        Ok(config)
    }

    /// Build `JobConfig` from CLI arguments
    pub(crate) fn job_from_cli(cli: &Cli) -> Result<JobConfig> {
        let mut builder = JobConfig::builder()
            .trainer(&cli.trainer)
            .redirect_caches(!cli.no_cache_redirect)
            .gpu_diagnostics(!cli.no_gpu_diagnostics)
            .dry_run(cli.dry_run);

        if let Some(cache_dir) = &cli.cache_dir {
            builder = builder.cache_dir(cache_dir);
        }

        for entry in &cli.env {
            let (name, value) = entry
                .split_once('=')
                .with_context(|| format!("Invalid --env entry '{}'. Use NAME=VALUE", entry))?;
            builder = builder.env(name, value);
        }

        builder.build().context("Invalid job configuration")
    }

    /// Build `SlurmConfig` from CLI arguments
    pub(crate) fn slurm_from_cli(cli: &Cli) -> Result<SlurmConfig> {
        let mut builder = SlurmConfig::builder()
            .job_name(cli.slurm_job_name.clone().unwrap_or_else(|| cli.project.clone()))
            .nodes(cli.slurm_nodes)
            .gpus_per_node(if cli.slurm_gpus > 0 { cli.slurm_gpus } else { cli.num_gpus })
            .cpus_per_task(cli.slurm_cpus)
            .mem(cli.slurm_mem.clone())
            .time_limit(cli.slurm_time.clone());

        if let Some(partition) = &cli.slurm_partition {
            builder = builder.partition(partition);
        }
        if let Some(account) = &cli.slurm_account {
            builder = builder.account(account);
        }

        builder.build().context("Invalid SLURM configuration")
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        DeviceManager::parse_device_string(&cli.device).context("Invalid device")?;

        for entry in &cli.env {
            if !entry.contains('=') {
                anyhow::bail!("Invalid --env entry '{}'. Use NAME=VALUE", entry);
            }
        }

        if cli.emit_slurm.is_some() {
            Self::slurm_from_cli(cli).context("Invalid SLURM options")?;
        }

        Ok(())
    }
}

/// Generate a short random run name
fn generate_run_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}", id.get(..8).unwrap_or("00000000"))
}
