//! Training launcher CLI
//!
//! Command-line interface for validating embeddings artifacts and launching
//! flow-matching DiT training jobs through the unified launcher.

use super::config::CliConfigBuilder;
use crate::{
    artifact::{ArtifactSpec, EmbeddingsArtifact},
    checkpoint::{scan_checkpoints, CheckpointArchiver},
    launcher::TrainingLauncher,
    services::ConsoleProgressReporter,
    slurm,
    utils::DeviceManager,
    workspace::{format_size, scan_runs, CacheLayout},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Training-job launcher CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "flowtrain")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Embeddings artifact consumed by training (safetensors)
    #[arg(value_name = "EMBEDDINGS", required_unless_present_any = &["list_runs", "clear_cache", "show_cache_dir", "show_devices", "archive_run"])]
    pub embeddings: Option<String>,

    /// Output directory for checkpoints and logs [default: runs/RUN_NAME]
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<String>,

    /// Per-device batch size
    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,

    /// Number of training epochs
    #[arg(long, default_value_t = 10)]
    pub num_epochs: usize,

    /// Device (auto, cpu, cuda)
    #[arg(short, long, default_value = "auto")]
    pub device: String,

    /// Number of GPUs to train on (0 = all visible)
    #[arg(long, default_value_t = 0)]
    pub num_gpus: usize,

    /// Numeric precision
    #[arg(short, long, value_enum, default_value_t = CliPrecision::Bf16)]
    pub precision: CliPrecision,

    /// Enable gradient checkpointing
    #[arg(long)]
    pub gradient_checkpointing: bool,

    /// Peak learning rate
    #[arg(long, default_value_t = 1e-4)]
    pub learning_rate: f64,

    /// Linear warmup steps
    #[arg(long, default_value_t = 1000)]
    pub warmup_steps: usize,

    /// Interval in steps between metric log lines
    #[arg(long, default_value_t = 50)]
    pub logging_steps: usize,

    /// Interval in steps between checkpoint saves
    #[arg(long, default_value_t = 1000)]
    pub save_steps: usize,

    /// Interval in steps between evaluation passes
    #[arg(long, default_value_t = 500)]
    pub eval_steps: usize,

    /// Experiment-tracking project name
    #[arg(long, default_value = "eva-to-clip-dit")]
    pub project: String,

    /// Experiment-tracking run name [default: generated]
    #[arg(long)]
    pub run_name: Option<String>,

    /// Trainer program to invoke
    #[arg(long, default_value = "train-dit")]
    pub trainer: String,

    /// Validate the artifact, print its summary, and exit
    #[arg(long)]
    pub validate_only: bool,

    /// Include per-tensor statistics in the validation summary
    #[arg(long)]
    pub stats: bool,

    /// Print the trainer command without spawning it
    #[arg(long)]
    pub dry_run: bool,

    /// Write a SLURM batch script to PATH instead of launching locally
    #[arg(long, value_name = "PATH")]
    pub emit_slurm: Option<String>,

    /// Submit the emitted batch script via sbatch
    #[arg(long, requires = "emit_slurm")]
    pub submit: bool,

    /// SLURM job name [default: the project name]
    #[arg(long, value_name = "NAME")]
    pub slurm_job_name: Option<String>,

    /// SLURM partition
    #[arg(long, value_name = "PARTITION")]
    pub slurm_partition: Option<String>,

    /// SLURM account
    #[arg(long, value_name = "ACCOUNT")]
    pub slurm_account: Option<String>,

    /// SLURM node count
    #[arg(long, default_value_t = 1)]
    pub slurm_nodes: usize,

    /// SLURM GPUs per node (0 = follow --num-gpus)
    #[arg(long, default_value_t = 0)]
    pub slurm_gpus: usize,

    /// SLURM CPU cores per task
    #[arg(long, default_value_t = 8)]
    pub slurm_cpus: usize,

    /// SLURM memory request
    #[arg(long, default_value = "64G")]
    pub slurm_mem: String,

    /// SLURM wall-clock limit
    #[arg(long, default_value = "24:00:00")]
    pub slurm_time: String,

    /// Archive checkpoints of a finished run directory and exit
    #[arg(long, value_name = "DIR")]
    pub archive_run: Option<String>,

    /// Archive destination root
    #[arg(long, value_name = "DIR", default_value = "archives")]
    pub archive_dir: String,

    /// Pattern selecting checkpoints to archive (e.g. "checkpoint-1*")
    #[arg(long)]
    pub pattern: Option<String>,

    /// List runs under the runs directory and exit
    #[arg(long)]
    pub list_runs: bool,

    /// Runs directory scanned by --list-runs
    #[arg(long, default_value = "runs")]
    pub runs_dir: String,

    /// Show device diagnostics and exit
    #[arg(long)]
    pub show_devices: bool,

    /// Show current cache directory and exit
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Clear the trainer cache directory and exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Use custom cache directory
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<String>,

    /// Do not redirect trainer cache/temp directories
    #[arg(long)]
    pub no_cache_redirect: bool,

    /// Disable the GPU diagnostics dump on trainer failure
    #[arg(long)]
    pub no_gpu_diagnostics: bool,

    /// Extra NAME=VALUE environment variable for the trainer (repeatable)
    #[arg(long = "env", value_name = "NAME=VALUE")]
    pub env: Vec<String>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliPrecision {
    Fp32,
    Fp16,
    Bf16,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose).context("Failed to initialize tracing")?;

    // Handle special flags that don't require an embeddings artifact
    if cli.show_devices {
        show_device_diagnostics();
        return Ok(());
    }

    if cli.list_runs {
        return list_runs_command(&cli);
    }

    if cli.clear_cache {
        return clear_cache_command(&cli);
    }

    if cli.show_cache_dir {
        return show_current_cache_dir(&cli);
    }

    if let Some(run_dir) = cli.archive_run.clone() {
        return archive_run_command(&cli, Path::new(&run_dir));
    }

    if cli.embeddings.is_none() {
        anyhow::bail!("An embeddings artifact is required");
    }

    // Validate CLI arguments and convert to launcher configuration
    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let training = CliConfigBuilder::training_from_cli(&cli)
        .context("Failed to build training configuration")?;
    let job = CliConfigBuilder::job_from_cli(&cli).context("Failed to build job configuration")?;

    info!("Starting training launcher");
    info!("Embeddings: {}", training.embeddings.display());
    info!("Output: {}", training.output_dir.display());
    info!(
        "Trainer: {}, device: {}, precision: {}",
        job.trainer.display(),
        training.device,
        training.precision
    );

    // Validate the artifact up front so contract violations surface before
    // any workspace mutation
    let summary = validate_with_spinner(&training.embeddings, cli.stats)?;
    print!("{}", summary);

    if cli.validate_only {
        println!("✅ Artifact is valid");
        return Ok(());
    }

    if let Some(script_path) = &cli.emit_slurm {
        return emit_slurm_command(&cli, &training, &job, Path::new(script_path)).await;
    }

    // Launch the job and propagate the trainer's outcome as the exit status
    let launcher = TrainingLauncher::new(training, job)
        .with_progress(Box::new(ConsoleProgressReporter::new(cli.verbose > 0)));

    let run_summary = launcher.launch().await.context("Failed to run training job")?;
    print!("{}", run_summary.format_report());

    if run_summary.dry_run {
        return Ok(());
    }

    if run_summary.success {
        println!("✅ Training run complete");
        Ok(())
    } else {
        match run_summary.exit_code {
            Some(code) => anyhow::bail!("Trainer failed with exit code {}", code),
            None => anyhow::bail!("Trainer was killed by a signal"),
        }
    }
}

/// Initialize tracing based on verbosity level
fn init_tracing(verbose_count: u8) -> Result<()> {
    use crate::tracing_config::{TracingConfig, TracingFormat};

    TracingConfig::new()
        .with_verbosity(verbose_count)
        .with_format(TracingFormat::Console)
        .init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}

/// Validate the artifact behind a spinner, optionally with tensor statistics
fn validate_with_spinner(embeddings: &Path, stats: bool) -> Result<String> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.set_message(format!("Validating {}", embeddings.display()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let spec = ArtifactSpec::default();
    let artifact = EmbeddingsArtifact::open(embeddings)
        .with_context(|| format!("Failed to open embeddings artifact: {}", embeddings.display()))?;
    let summary = artifact
        .validate(&spec)
        .context("Embeddings artifact failed validation")?;

    let mut report = summary.format_report();

    if stats {
        for key in [&spec.eva_key, &spec.clip_key] {
            spinner.set_message(format!("Computing statistics for {}", key));
            let tensor_stats = artifact
                .tensor_stats(key)
                .with_context(|| format!("Failed to compute statistics for '{}'", key))?;
            report.push_str(&format!(
                "  {}: mean {:.4}, std {:.4}, range [{:.4}, {:.4}], non-finite {}\n",
                key,
                tensor_stats.mean,
                tensor_stats.std,
                tensor_stats.min,
                tensor_stats.max,
                tensor_stats.non_finite
            ));
        }
    }

    spinner.finish_and_clear();
    Ok(report)
}

/// Display device diagnostics
fn show_device_diagnostics() {
    println!("🔍 Device Diagnostics");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    let gpu_count = DeviceManager::detect_gpu_count();
    if gpu_count == 0 {
        println!("🎛  GPUs: none visible (training would resolve auto → cpu)");
    } else {
        println!("🎛  GPUs: {gpu_count} visible");
        match DeviceManager::query_gpus() {
            Ok(gpus) => {
                for gpu in gpus {
                    println!(
                        "  • [{}] {} — {} MiB used / {} MiB",
                        gpu.index, gpu.name, gpu.memory_used_mib, gpu.memory_total_mib
                    );
                }
            },
            Err(e) => println!("  (details unavailable: {e})"),
        }
    }

    println!("\n💡 Usage Examples:");
    println!("  --device auto          # CUDA when GPUs are visible, else CPU (default)");
    println!("  --device cuda --num-gpus 4");
    println!("  --device cpu           # Force CPU execution");
}

/// List runs under the runs directory
fn list_runs_command(cli: &Cli) -> Result<()> {
    let runs_dir = PathBuf::from(&cli.runs_dir);
    let runs = scan_runs(&runs_dir).context("Failed to scan runs directory")?;

    println!("📦 Runs in {}", runs_dir.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if runs.is_empty() {
        println!("No runs found.");
        println!("\n💡 Launch one with:");
        println!("  flowtrain embeddings.safetensors --run-name my-first-run");
        return Ok(());
    }

    for run in runs {
        println!("📁 {}", run.name);
        println!("  ├─ Path: {}", run.path.display());
        println!("  ├─ Checkpoints: {}", run.checkpoints);
        println!("  ├─ Size: {}", format_size(run.size_bytes));
        let status = if run.has_summary {
            "✅ finished (run-summary.json present)"
        } else {
            "⚠️  no run summary"
        };
        println!("  └─ Status: {}", status);
        println!();
    }

    Ok(())
}

/// Clear the trainer cache directory
fn clear_cache_command(cli: &Cli) -> Result<()> {
    let layout = cache_layout(cli)?;

    println!("🗑️  Clearing trainer cache...");
    let removed = layout.clear().context("Failed to clear cache")?;

    if removed.is_empty() {
        println!("💡 Cache was already empty");
    } else {
        println!("✅ Removed {} cache entr(ies):", removed.len());
        for name in &removed {
            println!("   • {}", name);
        }
    }
    println!("   Cache location: {}", layout.root().display());

    Ok(())
}

/// Show the current cache directory
fn show_current_cache_dir(cli: &Cli) -> Result<()> {
    let layout = cache_layout(cli)?;

    println!("📁 Current cache directory:");
    println!("   Path: {}", layout.root().display());
    println!("   Size: {}", format_size(layout.size_bytes().unwrap_or(0)));

    if std::env::var(crate::workspace::CACHE_DIR_ENV).is_ok() {
        println!("   Source: {} environment variable", crate::workspace::CACHE_DIR_ENV);
    } else if cli.cache_dir.is_some() {
        println!("   Source: --cache-dir argument");
    } else {
        println!("   Source: XDG cache directory specification");
    }

    println!("\n💡 To use a custom cache directory:");
    println!("   flowtrain --cache-dir /path/to/custom/cache ...");
    println!("   or set {} environment variable", crate::workspace::CACHE_DIR_ENV);

    Ok(())
}

/// Archive checkpoints of a finished run
fn archive_run_command(cli: &Cli, run_dir: &Path) -> Result<()> {
    let checkpoints = scan_checkpoints(run_dir).context("Failed to scan run directory")?;

    let selected: Vec<_> = match &cli.pattern {
        Some(pattern) => {
            let matcher = glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid pattern '{}'", pattern))?;
            checkpoints
                .into_iter()
                .filter(|c| matcher.matches(&c.name))
                .collect()
        },
        None => checkpoints,
    };

    if selected.is_empty() {
        anyhow::bail!("No checkpoints to archive in '{}'", run_dir.display());
    }

    println!("📦 Archiving {} checkpoint(s) from {}", selected.len(), run_dir.display());

    let archiver = CheckpointArchiver::new(&cli.archive_dir)
        .context("Failed to prepare archive root")?;
    let manifest = archiver
        .archive_run(run_dir, &selected)
        .context("Failed to archive run")?;

    println!("✅ Archived run '{}'", manifest.run_name);
    println!("   ├─ Checkpoints: {}", manifest.checkpoints.len());
    println!("   ├─ Files: {}", manifest.entries.len());
    println!("   ├─ Total size: {}", format_size(manifest.total_bytes));
    println!(
        "   └─ Manifest: {}",
        archiver
            .archive_root()
            .join(&manifest.run_name)
            .join(crate::checkpoint::MANIFEST_NAME)
            .display()
    );

    Ok(())
}

/// Emit (and optionally submit) a SLURM batch script
async fn emit_slurm_command(
    cli: &Cli,
    training: &crate::config::TrainingConfig,
    job: &crate::config::JobConfig,
    script_path: &Path,
) -> Result<()> {
    let slurm = CliConfigBuilder::slurm_from_cli(cli)?;

    let cache = if job.redirect_caches {
        Some(match &job.cache_dir {
            Some(dir) => CacheLayout::with_custom_root(dir)?,
            None => CacheLayout::new()?,
        })
    } else {
        None
    };

    let script = slurm::render_batch_script(&slurm, training, job, cache.as_ref())
        .context("Failed to render batch script")?;
    std::fs::write(script_path, script)
        .with_context(|| format!("Failed to write batch script: {}", script_path.display()))?;

    println!("✅ Batch script written to {}", script_path.display());

    if cli.submit {
        let job_id = slurm::submit(script_path)
            .await
            .context("Failed to submit batch script")?;
        println!("🚀 Submitted batch job {}", job_id);
    } else {
        println!("💡 Submit it with: sbatch {}", script_path.display());
    }

    Ok(())
}

/// Resolve the cache layout from CLI arguments
fn cache_layout(cli: &Cli) -> Result<CacheLayout> {
    match &cli.cache_dir {
        Some(dir) => CacheLayout::with_custom_root(Path::new(dir))
            .context("Failed to create cache with custom directory"),
        None => CacheLayout::new().context("Failed to access cache directory"),
    }
}
