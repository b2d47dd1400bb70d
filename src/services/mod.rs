//! Support services shared by the library and the CLI

pub mod progress;

pub use progress::{
    ConsoleProgressReporter, JobStage, NoOpProgressReporter, ProgressReporter, ProgressUpdate,
};
