//! Path validation utilities

use crate::error::{LaunchError, Result};
use std::path::Path;

/// Validator for filesystem paths used by launch operations
pub struct PathValidator;

impl PathValidator {
    /// Validate an input file exists and is a regular file
    pub fn validate_input_file(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(LaunchError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Input file not found: {}", path.display()),
            )));
        }

        if !path.is_file() {
            return Err(LaunchError::invalid_config(format!(
                "Input path is not a file: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Validate an output directory, creating it when missing
    pub fn validate_output_dir(path: &Path) -> Result<()> {
        if path.exists() {
            if path.is_file() {
                return Err(LaunchError::invalid_config(format!(
                    "Output path exists and is a file, not a directory: {}",
                    path.display()
                )));
            }
            return Ok(());
        }

        std::fs::create_dir_all(path)
            .map_err(|e| LaunchError::file_io_error("create output directory", path, &e))
    }

    /// Validate a directory exists (no creation)
    pub fn validate_existing_dir(path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Err(LaunchError::invalid_config(format!(
                "Not a directory: {}",
                path.display()
            )));
        }
        Ok(())
    }
}
