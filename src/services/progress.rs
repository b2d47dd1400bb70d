//! Progress reporting service
//!
//! Separates progress reporting concerns from launch logic, allowing
//! different frontends to implement their own progress handling.

use instant::Instant;

/// Stages a training job moves through from validation to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStage {
    /// Validating the embeddings artifact
    Validation,
    /// Preparing output and cache directories
    WorkspaceSetup,
    /// Spawning the trainer process
    Launch,
    /// Trainer running (the long stage)
    Training,
    /// Scanning the output directory for checkpoints
    CheckpointScan,
    /// Archiving checkpoints
    Archiving,
    /// Job finished
    Completed,
}

impl JobStage {
    /// Get a human-readable description of the job stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            JobStage::Validation => "Validating embeddings artifact",
            JobStage::WorkspaceSetup => "Preparing workspace directories",
            JobStage::Launch => "Launching trainer process",
            JobStage::Training => "Training in progress",
            JobStage::CheckpointScan => "Scanning checkpoints",
            JobStage::Archiving => "Archiving checkpoints",
            JobStage::Completed => "Job completed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            JobStage::Validation => 5,
            JobStage::WorkspaceSetup => 10,
            JobStage::Launch => 15,
            JobStage::Training => 80, // Variable: dominated by the trainer
            JobStage::CheckpointScan => 90,
            JobStage::Archiving => 95,
            JobStage::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current job stage
    pub stage: JobStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since the job started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: JobStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }

    /// Create a progress update with custom description
    #[must_use]
    pub fn with_description(stage: JobStage, description: String, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
            description,
        }
    }
}

/// Trait for reporting progress during launch operations
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report an error during a stage
    fn report_error(&self, stage: JobStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {
        // Intentionally empty - discards progress updates
    }

    fn report_error(&self, _stage: JobStage, _error: &str) {
        // Intentionally empty - discards error notifications
    }
}

/// Console progress reporter emitting through the logging layer
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a console reporter
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{:>3}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{:>3}%] {}", update.progress, update.description);
        }
    }

    fn report_error(&self, stage: JobStage, error: &str) {
        log::error!("{} failed: {}", stage.description(), error);
    }
}
