//! Numeric validation utilities
//!
//! Provides safe numeric conversions and range validation for schedule
//! parameters and artifact header metadata.

use crate::error::{LaunchError, Result};

/// Validator for numeric operations and conversions
pub struct NumericValidator;

impl NumericValidator {
    /// Validate a learning rate is finite and strictly positive
    pub fn validate_learning_rate(value: f64) -> Result<f64> {
        if !value.is_finite() {
            return Err(LaunchError::invalid_config(format!(
                "Learning rate must be finite, got {}",
                value
            )));
        }

        if value <= 0.0 {
            return Err(LaunchError::invalid_config(format!(
                "Learning rate must be > 0, got {}",
                value
            )));
        }

        Ok(value)
    }

    /// Validate a step interval is at least 1
    pub fn validate_interval(name: &str, value: usize) -> Result<usize> {
        if value == 0 {
            return Err(LaunchError::invalid_config(format!(
                "{} must be at least 1 step",
                name
            )));
        }
        Ok(value)
    }

    /// Validate the warmup schedule fits inside the total step count
    pub fn validate_warmup(warmup_steps: usize, total_steps: usize) -> Result<()> {
        if warmup_steps >= total_steps {
            return Err(LaunchError::invalid_config(format!(
                "Warmup ({} steps) must be shorter than the total schedule ({} steps)",
                warmup_steps, total_steps
            )));
        }
        Ok(())
    }

    /// Safely convert u64 to usize with bounds checking
    pub fn validate_u64_to_usize(value: u64) -> Result<usize> {
        usize::try_from(value).map_err(|_| {
            LaunchError::internal(format!(
                "Value {} exceeds usize::MAX on this platform ({})",
                value,
                usize::MAX
            ))
        })
    }

    /// Parse an integer header-metadata field
    pub fn parse_metadata_usize(name: &str, raw: &str) -> Result<usize> {
        raw.trim().parse::<usize>().map_err(|_| {
            LaunchError::artifact(format!(
                "Header metadata field '{}' is not an integer: '{}'",
                name, raw
            ))
        })
    }
}
