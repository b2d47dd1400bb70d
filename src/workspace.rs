//! Cache and run-directory management
//!
//! Training jobs on shared HPC nodes must not write into `$HOME`; this module
//! owns the redirected cache layout handed to the trainer process and the
//! run-directory scanning behind the `--list-runs` functionality. The cache
//! root follows the XDG Base Directory specification with an environment
//! override, mirroring how the original job scripts exported cache paths
//! before invoking training.

use crate::error::{LaunchError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "FLOWTRAIN_CACHE_DIR";

/// Redirected cache layout for trainer processes
///
/// Layout under the root:
/// - `hub/`   — model-hub downloads (`HF_HOME`)
/// - `torch/` — torch kernel/weights caches (`TORCH_HOME`)
/// - `tmp/`   — scratch space (`TMPDIR`)
/// - `wandb/` — experiment-tracking offline store (`WANDB_DIR`)
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    /// Create a cache layout at the default root
    ///
    /// Uses `$FLOWTRAIN_CACHE_DIR` when set, otherwise the XDG cache
    /// directory (`~/.cache/flowtrain/` on Linux/macOS).
    ///
    /// # Errors
    /// - Failed to determine the cache directory
    /// - Failed to create the cache directory
    pub fn new() -> Result<Self> {
        let root = Self::default_root()?;
        Self::with_custom_root(&root)
    }

    /// Create a cache layout rooted at a custom directory
    ///
    /// # Errors
    /// - Failed to create the cache directory
    pub fn with_custom_root(root: &Path) -> Result<Self> {
        let layout = Self {
            root: root.to_path_buf(),
        };
        layout.ensure()?;
        Ok(layout)
    }

    /// Resolve the default cache root
    fn default_root() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(cache_override));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                LaunchError::invalid_config(format!(
                    "Failed to determine cache directory. Set {} environment variable.",
                    CACHE_DIR_ENV
                ))
            })?
            .join("flowtrain"))
    }

    /// Cache root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Model-hub cache directory (`HF_HOME`)
    #[must_use]
    pub fn hub_dir(&self) -> PathBuf {
        self.root.join("hub")
    }

    /// Torch cache directory (`TORCH_HOME`)
    #[must_use]
    pub fn torch_dir(&self) -> PathBuf {
        self.root.join("torch")
    }

    /// Scratch directory (`TMPDIR`)
    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Experiment-tracking directory (`WANDB_DIR`)
    #[must_use]
    pub fn wandb_dir(&self) -> PathBuf {
        self.root.join("wandb")
    }

    /// Create the root and every subdirectory
    ///
    /// # Errors
    /// - Failed to create any directory in the layout
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.hub_dir(),
            self.torch_dir(),
            self.tmp_dir(),
            self.wandb_dir(),
        ] {
            if !dir.exists() {
                fs::create_dir_all(&dir)
                    .map_err(|e| LaunchError::file_io_error("create cache directory", &dir, &e))?;
            }
        }
        Ok(())
    }

    /// Environment variables redirecting the trainer's caches
    #[must_use]
    pub fn env_overrides(&self) -> Vec<(String, String)> {
        vec![
            ("HF_HOME".to_string(), self.hub_dir().display().to_string()),
            ("TORCH_HOME".to_string(), self.torch_dir().display().to_string()),
            ("TMPDIR".to_string(), self.tmp_dir().display().to_string()),
            ("WANDB_DIR".to_string(), self.wandb_dir().display().to_string()),
        ]
    }

    /// Total size of the cache tree in bytes
    ///
    /// # Errors
    /// - I/O errors while walking the tree
    pub fn size_bytes(&self) -> Result<u64> {
        let mut total = 0;
        visit_dir(&self.root, &mut total)
            .map_err(|e| LaunchError::file_io_error("measure cache directory", &self.root, &e))?;
        Ok(total)
    }

    /// Remove every entry under the cache root and recreate the layout
    ///
    /// # Returns
    /// Names of the removed top-level entries for user feedback
    ///
    /// # Errors
    /// - Failed to read or remove cache entries
    pub fn clear(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();

        if !self.root.exists() {
            return Ok(removed);
        }

        let entries = fs::read_dir(&self.root)
            .map_err(|e| LaunchError::file_io_error("read cache directory", &self.root, &e))?;

        for entry in entries {
            let entry = entry
                .map_err(|e| LaunchError::file_io_error("read cache entry", &self.root, &e))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();

            log::info!("Removing cache entry: {}", name);
            if path.is_dir() {
                fs::remove_dir_all(&path)
                    .map_err(|e| LaunchError::file_io_error("remove cache entry", &path, &e))?;
            } else {
                fs::remove_file(&path)
                    .map_err(|e| LaunchError::file_io_error("remove cache entry", &path, &e))?;
            }
            removed.push(name);
        }

        self.ensure()?;
        Ok(removed)
    }
}

/// Recursively visit directory and accumulate file sizes
fn visit_dir(dir: &Path, total: &mut u64) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            visit_dir(&path, total)?;
        } else {
            *total += entry.metadata()?.len();
        }
    }
    Ok(())
}

/// Information about a run directory
#[derive(Debug, Clone)]
pub struct RunInfo {
    /// Run directory name
    pub name: String,
    /// Path to the run directory
    pub path: PathBuf,
    /// Number of `checkpoint-<step>` entries
    pub checkpoints: usize,
    /// Total size of the run directory in bytes
    pub size_bytes: u64,
    /// Whether a `run-summary.json` is present (the run finished)
    pub has_summary: bool,
}

/// Scan a runs directory and return all run directories
///
/// Used by the `--list-runs` functionality. Non-directory entries are
/// skipped; results are sorted by name for consistent output.
///
/// # Errors
/// - Failed to read the runs directory or its entries
pub fn scan_runs(runs_dir: &Path) -> Result<Vec<RunInfo>> {
    let mut runs = Vec::new();

    if !runs_dir.exists() {
        return Ok(runs); // No runs yet
    }

    let entries = fs::read_dir(runs_dir)
        .map_err(|e| LaunchError::file_io_error("read runs directory", runs_dir, &e))?;

    for entry in entries {
        let entry =
            entry.map_err(|e| LaunchError::file_io_error("read runs entry", runs_dir, &e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        let checkpoints = crate::checkpoint::scan_checkpoints(&path)?.len();
        let has_summary = path.join("run-summary.json").is_file();

        let mut size_bytes = 0;
        visit_dir(&path, &mut size_bytes)
            .map_err(|e| LaunchError::file_io_error("measure run directory", &path, &e))?;

        runs.push(RunInfo {
            name,
            path,
            checkpoints,
            size_bytes,
            has_summary,
        });
    }

    runs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(runs)
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn test_custom_root_creates_layout() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache");

        let layout = CacheLayout::with_custom_root(&root).unwrap();

        assert!(layout.hub_dir().is_dir());
        assert!(layout.torch_dir().is_dir());
        assert!(layout.tmp_dir().is_dir());
        assert!(layout.wandb_dir().is_dir());
    }

    #[test]
    fn test_env_overrides_cover_all_caches() {
        let temp = TempDir::new().unwrap();
        let layout = CacheLayout::with_custom_root(temp.path()).unwrap();

        let overrides = layout.env_overrides();
        let names: Vec<&str> = overrides.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["HF_HOME", "TORCH_HOME", "TMPDIR", "WANDB_DIR"]);

        for (_, value) in &overrides {
            assert!(value.starts_with(&temp.path().display().to_string()));
        }
    }

    #[test]
    fn test_clear_removes_entries_and_recreates_layout() {
        let temp = TempDir::new().unwrap();
        let layout = CacheLayout::with_custom_root(temp.path()).unwrap();

        std::fs::write(layout.tmp_dir().join("scratch.bin"), b"junk").unwrap();
        std::fs::write(layout.root().join("stray-file"), b"junk").unwrap();

        let removed = layout.clear().unwrap();
        assert!(removed.contains(&"tmp".to_string()));
        assert!(removed.contains(&"stray-file".to_string()));

        // Layout is usable again after clearing
        assert!(layout.tmp_dir().is_dir());
        assert!(!layout.tmp_dir().join("scratch.bin").exists());
    }

    #[test]
    fn test_size_bytes_accumulates() {
        let temp = TempDir::new().unwrap();
        let layout = CacheLayout::with_custom_root(temp.path()).unwrap();

        std::fs::write(layout.tmp_dir().join("a.bin"), vec![0_u8; 100]).unwrap();
        std::fs::write(layout.hub_dir().join("b.bin"), vec![0_u8; 28]).unwrap();

        assert_eq!(layout.size_bytes().unwrap(), 128);
    }

    #[test]
    fn test_scan_runs_empty_and_missing() {
        let temp = TempDir::new().unwrap();
        assert!(scan_runs(&temp.path().join("missing")).unwrap().is_empty());
        assert!(scan_runs(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_scan_runs_reports_checkpoints_and_summary() {
        let temp = TempDir::new().unwrap();

        let run_a = temp.path().join("run-a");
        std::fs::create_dir_all(run_a.join("checkpoint-100")).unwrap();
        std::fs::create_dir_all(run_a.join("checkpoint-200")).unwrap();
        std::fs::write(run_a.join("run-summary.json"), b"{}").unwrap();

        let run_b = temp.path().join("run-b");
        std::fs::create_dir_all(&run_b).unwrap();

        // Stray files in the runs dir are not runs
        std::fs::write(temp.path().join("notes.txt"), b"x").unwrap();

        let runs = scan_runs(temp.path()).unwrap();
        assert_eq!(runs.len(), 2);

        assert_eq!(runs[0].name, "run-a");
        assert_eq!(runs[0].checkpoints, 2);
        assert!(runs[0].has_summary);

        assert_eq!(runs[1].name, "run-b");
        assert_eq!(runs[1].checkpoints, 0);
        assert!(!runs[1].has_summary);
    }
}
