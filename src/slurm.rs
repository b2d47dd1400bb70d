//! SLURM batch-script generation and submission
//!
//! The launcher can emit the batch script a cluster run needs instead of
//! hand-maintained job files: resource directives from `SlurmConfig`, cache
//! environment exports, then the exact trainer invocation. `submit` hands a
//! generated script to `sbatch` and reports the allocated job id.

use crate::config::{JobConfig, TrainingConfig};
use crate::error::{LaunchError, Result};
use crate::launcher::TrainerCommand;
use crate::workspace::CacheLayout;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Resource directives for a SLURM allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlurmConfig {
    /// Job name shown in the queue
    pub job_name: String,
    /// Partition to submit to
    pub partition: Option<String>,
    /// Account to charge
    pub account: Option<String>,
    /// Node count
    pub nodes: usize,
    /// GPUs per node (`--gres=gpu:N`; 0 omits the directive)
    pub gpus_per_node: usize,
    /// CPU cores per task
    pub cpus_per_task: usize,
    /// Memory request, e.g. `64G`
    pub mem: String,
    /// Wall-clock limit, e.g. `24:00:00` or `1-12:00:00`
    pub time_limit: String,
}

impl Default for SlurmConfig {
    fn default() -> Self {
        Self {
            job_name: "flowtrain".to_string(),
            partition: None,
            account: None,
            nodes: 1,
            gpus_per_node: 4,
            cpus_per_task: 8,
            mem: "64G".to_string(),
            time_limit: "24:00:00".to_string(),
        }
    }
}

impl SlurmConfig {
    /// Create a new SLURM configuration builder
    #[must_use]
    pub fn builder() -> SlurmConfigBuilder {
        SlurmConfigBuilder::default()
    }

    /// Validate resource directives
    ///
    /// # Errors
    /// - Empty job name or memory request
    /// - Zero nodes or CPU cores
    /// - Malformed time limit
    pub fn validate(&self) -> Result<()> {
        if self.job_name.is_empty() {
            return Err(LaunchError::invalid_config("SLURM job name must not be empty"));
        }

        if self.nodes == 0 {
            return Err(LaunchError::config_value_error("node count", self.nodes, ">= 1", Some(1)));
        }

        if self.cpus_per_task == 0 {
            return Err(LaunchError::config_value_error(
                "CPUs per task",
                self.cpus_per_task,
                ">= 1",
                Some(8),
            ));
        }

        if self.mem.is_empty() {
            return Err(LaunchError::invalid_config("Memory request must not be empty"));
        }

        validate_time_limit(&self.time_limit)
    }
}

/// Validate a SLURM time limit (`HH:MM:SS` or `D-HH:MM:SS`)
fn validate_time_limit(time_limit: &str) -> Result<()> {
    let invalid = || {
        LaunchError::invalid_config(format!(
            "Invalid time limit '{}'. Expected HH:MM:SS or D-HH:MM:SS",
            time_limit
        ))
    };

    let clock = match time_limit.split_once('-') {
        Some((days, clock)) => {
            if days.is_empty() || days.parse::<u32>().is_err() {
                return Err(invalid());
            }
            clock
        },
        None => time_limit,
    };

    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }
    for part in parts {
        if part.is_empty() || part.parse::<u32>().is_err() {
            return Err(invalid());
        }
    }

    Ok(())
}

/// Builder for `SlurmConfig`
#[derive(Debug, Default)]
pub struct SlurmConfigBuilder {
    config: SlurmConfig,
}

impl SlurmConfigBuilder {
    /// Set the job name
    #[must_use]
    pub fn job_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.job_name = name.into();
        self
    }

    /// Set the partition
    #[must_use]
    pub fn partition<S: Into<String>>(mut self, partition: S) -> Self {
        self.config.partition = Some(partition.into());
        self
    }

    /// Set the account
    #[must_use]
    pub fn account<S: Into<String>>(mut self, account: S) -> Self {
        self.config.account = Some(account.into());
        self
    }

    /// Set the node count
    #[must_use]
    pub fn nodes(mut self, nodes: usize) -> Self {
        self.config.nodes = nodes;
        self
    }

    /// Set GPUs per node
    #[must_use]
    pub fn gpus_per_node(mut self, gpus: usize) -> Self {
        self.config.gpus_per_node = gpus;
        self
    }

    /// Set CPU cores per task
    #[must_use]
    pub fn cpus_per_task(mut self, cpus: usize) -> Self {
        self.config.cpus_per_task = cpus;
        self
    }

    /// Set the memory request
    #[must_use]
    pub fn mem<S: Into<String>>(mut self, mem: S) -> Self {
        self.config.mem = mem.into();
        self
    }

    /// Set the wall-clock limit
    #[must_use]
    pub fn time_limit<S: Into<String>>(mut self, time_limit: S) -> Self {
        self.config.time_limit = time_limit.into();
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Returns `LaunchError::InvalidConfig` for malformed directives.
    pub fn build(self) -> Result<SlurmConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}

/// Render the batch script for a training job
///
/// The script carries the `#SBATCH` resource header, the cache environment
/// exports, and the exact trainer invocation `flowtrain` would run locally.
///
/// # Errors
/// - Invalid SLURM, training, or job configuration
pub fn render_batch_script(
    slurm: &SlurmConfig,
    training: &TrainingConfig,
    job: &JobConfig,
    cache: Option<&CacheLayout>,
) -> Result<String> {
    slurm.validate()?;
    let command = TrainerCommand::build(training, job, cache)?;

    let mut script = String::new();
    script.push_str("#!/bin/bash\n");
    script.push_str(&format!("#SBATCH --job-name={}\n", slurm.job_name));
    if let Some(partition) = &slurm.partition {
        script.push_str(&format!("#SBATCH --partition={}\n", partition));
    }
    if let Some(account) = &slurm.account {
        script.push_str(&format!("#SBATCH --account={}\n", account));
    }
    script.push_str(&format!("#SBATCH --nodes={}\n", slurm.nodes));
    if slurm.gpus_per_node > 0 {
        script.push_str(&format!("#SBATCH --gres=gpu:{}\n", slurm.gpus_per_node));
    }
    script.push_str(&format!("#SBATCH --cpus-per-task={}\n", slurm.cpus_per_task));
    script.push_str(&format!("#SBATCH --mem={}\n", slurm.mem));
    script.push_str(&format!("#SBATCH --time={}\n", slurm.time_limit));
    script.push_str(&format!(
        "#SBATCH --output={}\n",
        training.output_dir.join("slurm-%j.out").display()
    ));
    script.push('\n');
    script.push_str("set -euo pipefail\n\n");

    script.push_str(&format!("mkdir -p {}\n", crate::launcher::shell_quote(
        &training.output_dir.display().to_string(),
    )));

    if !command.envs.is_empty() {
        script.push('\n');
        for (name, value) in &command.envs {
            script.push_str(&format!(
                "export {}={}\n",
                name,
                crate::launcher::shell_quote(value)
            ));
        }
    }

    script.push('\n');
    let mut exec_line = format!(
        "exec {}",
        crate::launcher::shell_quote(&command.program.display().to_string())
    );
    for arg in &command.args {
        exec_line.push(' ');
        exec_line.push_str(&crate::launcher::shell_quote(arg));
    }
    script.push_str(&exec_line);
    script.push('\n');

    Ok(script)
}

/// Submit a batch script via `sbatch` and return the job id
///
/// # Errors
/// - `sbatch` missing or exiting non-zero
/// - Unparseable `sbatch` output
pub async fn submit(script_path: &Path) -> Result<u64> {
    let output = tokio::process::Command::new("sbatch")
        .arg(script_path)
        .output()
        .await
        .map_err(|e| LaunchError::launch(format!("Failed to invoke sbatch: {}", e)))?;

    if !output.status.success() {
        return Err(LaunchError::launch(format!(
            "sbatch failed with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_job_id(&stdout)
}

/// Parse the job id out of `sbatch` output ("Submitted batch job 12345")
fn parse_job_id(stdout: &str) -> Result<u64> {
    stdout
        .split_whitespace()
        .last()
        .and_then(|token| token.parse::<u64>().ok())
        .ok_or_else(|| {
            LaunchError::launch(format!("Unexpected sbatch output: '{}'", stdout.trim()))
        })
}
