//! flowtrain CLI
//!
//! Command-line interface for validating embeddings artifacts and launching
//! flow-matching DiT training jobs with the flowtrain library.

#[cfg(feature = "cli")]
use flowtrain::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
