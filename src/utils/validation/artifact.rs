//! Embeddings-artifact validation utilities
//!
//! Provides centralized validation for the tensor keys, shapes, and dtypes
//! the trainer expects from an embeddings artifact.

use crate::error::{LaunchError, Result};
use safetensors::Dtype;

/// Validator for embeddings-artifact contents
pub struct ArtifactValidator;

impl ArtifactValidator {
    /// Validate that every required tensor key is present
    pub fn validate_required_keys(available: &[&str], required: &[&str]) -> Result<()> {
        for key in required {
            if !available.contains(key) {
                return Err(LaunchError::artifact(format!(
                    "Missing required tensor '{}' (found: {})",
                    key,
                    if available.is_empty() {
                        "none".to_string()
                    } else {
                        available.join(", ")
                    }
                )));
            }
        }
        Ok(())
    }

    /// Validate an embedding tensor shape of [N, tokens, dim]
    ///
    /// The leading dimension N is free (any sample count is accepted); the
    /// token and channel dimensions must match exactly.
    pub fn validate_embedding_shape(
        name: &str,
        shape: &[usize],
        tokens: usize,
        dim: usize,
    ) -> Result<usize> {
        if shape.len() != 3 {
            return Err(LaunchError::artifact(format!(
                "Tensor '{}' must have 3 dimensions [N, {}, {}], got {} ({:?})",
                name,
                tokens,
                dim,
                shape.len(),
                shape
            )));
        }

        let n = shape.first().copied().unwrap_or(0);
        let actual_tokens = shape.get(1).copied().unwrap_or(0);
        let actual_dim = shape.get(2).copied().unwrap_or(0);

        if actual_tokens != tokens || actual_dim != dim {
            return Err(LaunchError::artifact_shape_error(
                name,
                &format!("[N, {}, {}]", tokens, dim),
                shape,
            ));
        }

        if n == 0 {
            return Err(LaunchError::artifact(format!(
                "Tensor '{}' contains no samples",
                name
            )));
        }

        Ok(n)
    }

    /// Validate that both embedding tensors carry the same sample count
    pub fn validate_sample_consistency(eva_samples: usize, clip_samples: usize) -> Result<usize> {
        if eva_samples != clip_samples {
            return Err(LaunchError::artifact(format!(
                "Sample count mismatch: eva has {} rows, clip has {} rows",
                eva_samples, clip_samples
            )));
        }
        Ok(eva_samples)
    }

    /// Validate a declared metadata sample count against the tensor shape
    pub fn validate_metadata_samples(declared: Option<usize>, actual: usize) -> Result<()> {
        if let Some(declared) = declared {
            if declared != actual {
                return Err(LaunchError::artifact(format!(
                    "Header metadata declares {} samples but tensors contain {}",
                    declared, actual
                )));
            }
        }
        Ok(())
    }

    /// Validate the tensor dtype (extraction writes full precision)
    pub fn validate_dtype(name: &str, dtype: Dtype) -> Result<()> {
        if dtype != Dtype::F32 {
            return Err(LaunchError::artifact(format!(
                "Tensor '{}' has dtype {:?}, expected F32",
                name, dtype
            )));
        }
        Ok(())
    }
}
