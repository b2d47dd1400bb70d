//! Checkpoint discovery and archiving
//!
//! Trainers drop `checkpoint-<step>` entries into the run directory as they
//! go. This module scans those entries for the post-run summary, picks the
//! latest checkpoint, and archives finished runs into a content-addressed
//! layout: files are copied under the archive root and recorded in a
//! `manifest.json` carrying per-file sizes and SHA-256 digests so an archive
//! can be verified long after the run directory is gone.

use crate::error::{LaunchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File name of the archive manifest
pub const MANIFEST_NAME: &str = "manifest.json";

/// A discovered `checkpoint-<step>` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    /// Entry name, e.g. `checkpoint-2000`
    pub name: String,
    /// Full path to the checkpoint entry
    pub path: PathBuf,
    /// Parsed step number (`None` for non-numeric suffixes like `checkpoint-final`)
    pub step: Option<u64>,
    /// Size of the entry in bytes (recursive for directories)
    pub size_bytes: u64,
}

/// Scan a run directory for checkpoint entries
///
/// Matches files and directories named `checkpoint-<suffix>`, sorted by step
/// number with non-numeric suffixes last.
///
/// # Errors
/// - Failed to read the run directory
pub fn scan_checkpoints(run_dir: &Path) -> Result<Vec<CheckpointInfo>> {
    let mut checkpoints = Vec::new();

    if !run_dir.exists() {
        return Ok(checkpoints);
    }

    let entries = fs::read_dir(run_dir)
        .map_err(|e| LaunchError::file_io_error("read run directory", run_dir, &e))?;

    for entry in entries {
        let entry =
            entry.map_err(|e| LaunchError::file_io_error("read run entry", run_dir, &e))?;
        let name = entry.file_name().to_string_lossy().to_string();

        let Some(suffix) = name.strip_prefix("checkpoint-") else {
            continue;
        };

        let path = entry.path();
        checkpoints.push(CheckpointInfo {
            step: suffix.parse::<u64>().ok(),
            size_bytes: entry_size(&path)?,
            name,
            path,
        });
    }

    checkpoints.sort_by(|a, b| match (a.step, b.step) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    });
    Ok(checkpoints)
}

/// Latest checkpoint by step number, if any
///
/// # Errors
/// - Failed to read the run directory
pub fn latest_checkpoint(run_dir: &Path) -> Result<Option<CheckpointInfo>> {
    let checkpoints = scan_checkpoints(run_dir)?;
    Ok(checkpoints
        .into_iter()
        .filter(|c| c.step.is_some())
        .max_by_key(|c| c.step))
}

/// Size of a file or directory tree in bytes
fn entry_size(path: &Path) -> Result<u64> {
    if path.is_file() {
        return Ok(path
            .metadata()
            .map_err(|e| LaunchError::file_io_error("stat checkpoint entry", path, &e))?
            .len());
    }

    let mut total = 0;
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|e| {
            LaunchError::archive(format!("Failed to walk '{}': {}", path.display(), e))
        })?;
        if entry.file_type().is_file() {
            total += entry
                .metadata()
                .map_err(|e| {
                    LaunchError::archive(format!(
                        "Failed to stat '{}': {}",
                        entry.path().display(),
                        e
                    ))
                })?
                .len();
        }
    }
    Ok(total)
}

/// One archived file in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Path relative to the archived run directory
    pub path: String,
    /// File size in bytes
    pub size_bytes: u64,
    /// Hex SHA-256 digest of the file contents
    pub sha256: String,
}

/// Manifest written next to every archived run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    /// Name of the archived run
    pub run_name: String,
    /// Archive creation time
    pub created_at: DateTime<Utc>,
    /// Archived checkpoint names
    pub checkpoints: Vec<String>,
    /// Every archived file with its digest
    pub entries: Vec<ArchiveEntry>,
    /// Sum of archived file sizes
    pub total_bytes: u64,
}

/// Copies run checkpoints into an archive root with a digest manifest
#[derive(Debug)]
pub struct CheckpointArchiver {
    archive_root: PathBuf,
}

impl CheckpointArchiver {
    /// Create an archiver rooted at the given directory
    ///
    /// # Errors
    /// - Failed to create the archive root
    pub fn new<P: AsRef<Path>>(archive_root: P) -> Result<Self> {
        let archive_root = archive_root.as_ref().to_path_buf();
        if !archive_root.exists() {
            fs::create_dir_all(&archive_root).map_err(|e| {
                LaunchError::file_io_error("create archive root", &archive_root, &e)
            })?;
        }
        Ok(Self { archive_root })
    }

    /// Archive root directory
    #[must_use]
    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    /// Archive every checkpoint of a run
    ///
    /// # Errors
    /// - Run directory has no checkpoints
    /// - Destination already archived
    /// - I/O failures while copying or hashing
    pub fn archive_all(&self, run_dir: &Path) -> Result<ArchiveManifest> {
        let checkpoints = scan_checkpoints(run_dir)?;
        self.archive_run(run_dir, &checkpoints)
    }

    /// Archive selected checkpoints of a run
    ///
    /// The destination is `<archive_root>/<run_name>/`; an existing
    /// destination is refused rather than overwritten.
    ///
    /// # Errors
    /// - Empty checkpoint selection
    /// - Destination already exists
    /// - I/O failures while copying or hashing
    pub fn archive_run(
        &self,
        run_dir: &Path,
        checkpoints: &[CheckpointInfo],
    ) -> Result<ArchiveManifest> {
        if checkpoints.is_empty() {
            return Err(LaunchError::archive(format!(
                "No checkpoints to archive in '{}'",
                run_dir.display()
            )));
        }

        let run_name = run_dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                LaunchError::archive(format!("Invalid run directory name: {}", run_dir.display()))
            })?
            .to_string();

        let dest = self.archive_root.join(&run_name);
        if dest.exists() {
            return Err(LaunchError::archive(format!(
                "Archive destination already exists: {}",
                dest.display()
            )));
        }

        let mut entries = Vec::new();
        let mut total_bytes = 0;

        for checkpoint in checkpoints {
            log::info!("Archiving checkpoint: {}", checkpoint.name);
            let checkpoint_dest = dest.join(&checkpoint.name);
            copy_and_hash(&checkpoint.path, &checkpoint_dest, &checkpoint.name, &mut entries)?;
        }

        for entry in &entries {
            total_bytes += entry.size_bytes;
        }

        let manifest = ArchiveManifest {
            run_name,
            created_at: Utc::now(),
            checkpoints: checkpoints.iter().map(|c| c.name.clone()).collect(),
            entries,
            total_bytes,
        };

        let manifest_path = dest.join(MANIFEST_NAME);
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| LaunchError::archive(format!("Failed to encode manifest: {}", e)))?;
        fs::write(&manifest_path, json)
            .map_err(|e| LaunchError::file_io_error("write archive manifest", &manifest_path, &e))?;

        Ok(manifest)
    }

    /// Verify an archived run against its manifest
    ///
    /// # Returns
    /// Relative paths of files that are missing or whose digest no longer
    /// matches; an empty list means the archive is intact.
    ///
    /// # Errors
    /// - Missing or unreadable manifest
    /// - I/O failures while re-hashing
    pub fn verify(&self, run_name: &str) -> Result<Vec<String>> {
        let dest = self.archive_root.join(run_name);
        let manifest_path = dest.join(MANIFEST_NAME);

        let json = fs::read_to_string(&manifest_path)
            .map_err(|e| LaunchError::file_io_error("read archive manifest", &manifest_path, &e))?;
        let manifest: ArchiveManifest = serde_json::from_str(&json)
            .map_err(|e| LaunchError::archive(format!("Malformed manifest: {}", e)))?;

        let mut mismatches = Vec::new();
        for entry in &manifest.entries {
            let path = dest.join(&entry.path);
            if !path.is_file() {
                mismatches.push(entry.path.clone());
                continue;
            }
            let (size, digest) = hash_file(&path)?;
            if size != entry.size_bytes || digest != entry.sha256 {
                mismatches.push(entry.path.clone());
            }
        }

        Ok(mismatches)
    }
}

/// Copy a checkpoint file or directory, hashing every file on the way
fn copy_and_hash(
    src: &Path,
    dest: &Path,
    rel_prefix: &str,
    entries: &mut Vec<ArchiveEntry>,
) -> Result<()> {
    if src.is_file() {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| LaunchError::file_io_error("create archive directory", parent, &e))?;
        }
        let (size_bytes, sha256) = copy_file_hashed(src, dest)?;
        entries.push(ArchiveEntry {
            path: rel_prefix.to_string(),
            size_bytes,
            sha256,
        });
        return Ok(());
    }

    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| {
            LaunchError::archive(format!("Failed to walk '{}': {}", src.display(), e))
        })?;
        let rel = entry.path().strip_prefix(src).map_err(|e| {
            LaunchError::internal(format!("Path outside checkpoint root: {}", e))
        })?;
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| LaunchError::file_io_error("create archive directory", &target, &e))?;
        } else {
            let (size_bytes, sha256) = copy_file_hashed(entry.path(), &target)?;
            let rel_path = Path::new(rel_prefix).join(rel);
            entries.push(ArchiveEntry {
                path: rel_path.to_string_lossy().replace('\\', "/"),
                size_bytes,
                sha256,
            });
        }
    }

    Ok(())
}

/// Copy one file while computing its SHA-256 digest
fn copy_file_hashed(src: &Path, dest: &Path) -> Result<(u64, String)> {
    let mut reader = fs::File::open(src)
        .map_err(|e| LaunchError::file_io_error("open checkpoint file", src, &e))?;
    let mut writer = fs::File::create(dest)
        .map_err(|e| LaunchError::file_io_error("create archive file", dest, &e))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 64 * 1024];
    let mut total = 0_u64;

    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| LaunchError::file_io_error("read checkpoint file", src, &e))?;
        if read == 0 {
            break;
        }
        let chunk = buffer.get(..read).unwrap_or(&buffer);
        hasher.update(chunk);
        writer
            .write_all(chunk)
            .map_err(|e| LaunchError::file_io_error("write archive file", dest, &e))?;
        total += read as u64;
    }

    Ok((total, format!("{:x}", hasher.finalize())))
}

/// Hash one file without copying it
fn hash_file(path: &Path) -> Result<(u64, String)> {
    let mut reader =
        fs::File::open(path).map_err(|e| LaunchError::file_io_error("open archive file", path, &e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 64 * 1024];
    let mut total = 0_u64;

    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| LaunchError::file_io_error("read archive file", path, &e))?;
        if read == 0 {
            break;
        }
        hasher.update(buffer.get(..read).unwrap_or(&buffer));
        total += read as u64;
    }

    Ok((total, format!("{:x}", hasher.finalize())))
}
