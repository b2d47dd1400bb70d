//! Embeddings artifact loading and validation
//!
//! The trainer consumes a safetensors file produced by an external extraction
//! job: a paired set of EVA-CLIP and CLIP embedding tensors plus scalar
//! provenance metadata in the header map. This module opens the artifact
//! memory-mapped, checks the contract the trainer relies on (required keys,
//! rank-3 shapes with fixed token/channel dimensions, matching sample counts,
//! F32 storage), and exposes per-tensor statistics for inspection output.
//! The artifact is treated as read-only throughout.

use crate::error::{LaunchError, Result};
use crate::utils::validation::{ArtifactValidator, NumericValidator};
use memmap2::Mmap;
use ndarray::Array3;
use safetensors::SafeTensors;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Header-metadata key declaring the sample count
pub const META_NUM_SAMPLES: &str = "num_samples";
/// Header-metadata key recording the extraction GPU count
pub const META_GPU_COUNT: &str = "gpu_count";
/// Header-metadata key recording the extraction batch size
pub const META_BATCH_SIZE: &str = "batch_size";

/// Expected artifact layout
///
/// Defaults describe the production contract: `eva_embeddings` carries the
/// conditioning features at [N, 64, 4096], `clip_embeddings` the generation
/// targets at [N, 64, 1024].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Key of the EVA-derived tensor
    pub eva_key: String,
    /// Key of the CLIP-derived tensor
    pub clip_key: String,
    /// Token count per sample (second dimension of both tensors)
    pub tokens: usize,
    /// Channel width of the EVA tensor
    pub eva_dim: usize,
    /// Channel width of the CLIP tensor
    pub clip_dim: usize,
}

impl Default for ArtifactSpec {
    fn default() -> Self {
        Self {
            eva_key: "eva_embeddings".to_string(),
            clip_key: "clip_embeddings".to_string(),
            tokens: 64,
            eva_dim: 4096,
            clip_dim: 1024,
        }
    }
}

/// Scalar provenance metadata from the artifact header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Declared sample count (must match tensor shapes when present)
    pub num_samples: Option<usize>,
    /// GPU count used by the extraction job
    pub gpu_count: Option<usize>,
    /// Batch size used by the extraction job
    pub batch_size: Option<usize>,
}

impl ArtifactMetadata {
    /// Parse the safetensors header map into typed metadata
    ///
    /// Unknown keys are ignored; known keys must parse as integers.
    pub fn from_header(header: Option<&HashMap<String, String>>) -> Result<Self> {
        let mut metadata = Self::default();
        let Some(header) = header else {
            return Ok(metadata);
        };

        if let Some(raw) = header.get(META_NUM_SAMPLES) {
            metadata.num_samples = Some(NumericValidator::parse_metadata_usize(META_NUM_SAMPLES, raw)?);
        }
        if let Some(raw) = header.get(META_GPU_COUNT) {
            metadata.gpu_count = Some(NumericValidator::parse_metadata_usize(META_GPU_COUNT, raw)?);
        }
        if let Some(raw) = header.get(META_BATCH_SIZE) {
            metadata.batch_size = Some(NumericValidator::parse_metadata_usize(META_BATCH_SIZE, raw)?);
        }

        Ok(metadata)
    }
}

/// Result of a successful artifact validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    /// Artifact location
    pub path: PathBuf,
    /// Sample count shared by both tensors
    pub num_samples: usize,
    /// Tokens per sample
    pub tokens: usize,
    /// EVA channel width
    pub eva_dim: usize,
    /// CLIP channel width
    pub clip_dim: usize,
    /// On-disk size of the artifact
    pub size_bytes: u64,
    /// Header provenance metadata
    pub metadata: ArtifactMetadata,
}

impl ArtifactSummary {
    /// Render the human-readable validation report
    #[must_use]
    pub fn format_report(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!("Embeddings artifact: {}\n", self.path.display()));
        report.push_str(&format!(
            "  samples: {}  ({} on disk)\n",
            self.num_samples,
            crate::workspace::format_size(self.size_bytes)
        ));
        report.push_str(&format!(
            "  eva_embeddings:  [{}, {}, {}]\n",
            self.num_samples, self.tokens, self.eva_dim
        ));
        report.push_str(&format!(
            "  clip_embeddings: [{}, {}, {}]\n",
            self.num_samples, self.tokens, self.clip_dim
        ));

        if let Some(gpus) = self.metadata.gpu_count {
            report.push_str(&format!("  extracted with: {} GPU(s)", gpus));
            if let Some(batch) = self.metadata.batch_size {
                report.push_str(&format!(", batch size {}", batch));
            }
            report.push('\n');
        }

        report
    }
}

/// Basic statistics over one embedding tensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TensorStats {
    pub mean: f64,
    pub std: f64,
    pub min: f32,
    pub max: f32,
    /// Count of NaN/infinite values (should always be 0)
    pub non_finite: usize,
}

/// A memory-mapped embeddings artifact
pub struct EmbeddingsArtifact {
    path: PathBuf,
    mmap: Mmap,
    size_bytes: u64,
    metadata: ArtifactMetadata,
}

impl std::fmt::Debug for EmbeddingsArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingsArtifact")
            .field("path", &self.path)
            .field("size_bytes", &self.size_bytes)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl EmbeddingsArtifact {
    /// Open an artifact file memory-mapped and parse its header
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Malformed safetensors container
    /// - Non-integer values in known header-metadata keys
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| LaunchError::file_io_error("open embeddings artifact", path, &e))?;
        let size_bytes = file
            .metadata()
            .map_err(|e| LaunchError::file_io_error("stat embeddings artifact", path, &e))?
            .len();

        // Read-only mapping; the artifact is never mutated
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| LaunchError::file_io_error("memory-map embeddings artifact", path, &e))?;

        let (_header_len, header) = SafeTensors::read_metadata(&mmap)?;
        let metadata = ArtifactMetadata::from_header(header.metadata().as_ref())?;

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            size_bytes,
            metadata,
        })
    }

    /// Artifact location
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// On-disk size in bytes
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Header provenance metadata
    #[must_use]
    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    /// Parse the tensor table (cheap; reuses the existing mapping)
    fn tensors(&self) -> Result<SafeTensors<'_>> {
        Ok(SafeTensors::deserialize(&self.mmap)?)
    }

    /// Tensor names present in the artifact
    pub fn tensor_names(&self) -> Result<Vec<String>> {
        let tensors = self.tensors()?;
        let mut names: Vec<String> = tensors.names().iter().map(|s| s.to_string()).collect();
        names.sort();
        Ok(names)
    }

    /// Validate the artifact against an expected layout
    ///
    /// Checks required keys, dtype, rank-3 shapes with the exact token and
    /// channel dimensions, sample-count agreement between both tensors, and
    /// the declared `num_samples` header field when present.
    ///
    /// # Errors
    /// `LaunchError::Artifact` naming the first violated constraint.
    pub fn validate(&self, spec: &ArtifactSpec) -> Result<ArtifactSummary> {
        let tensors = self.tensors()?;

        let names = tensors.names();
        let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        ArtifactValidator::validate_required_keys(
            &names,
            &[spec.eva_key.as_str(), spec.clip_key.as_str()],
        )?;

        let eva = tensors.tensor(&spec.eva_key)?;
        ArtifactValidator::validate_dtype(&spec.eva_key, eva.dtype())?;
        let eva_samples = ArtifactValidator::validate_embedding_shape(
            &spec.eva_key,
            eva.shape(),
            spec.tokens,
            spec.eva_dim,
        )?;

        let clip = tensors.tensor(&spec.clip_key)?;
        ArtifactValidator::validate_dtype(&spec.clip_key, clip.dtype())?;
        let clip_samples = ArtifactValidator::validate_embedding_shape(
            &spec.clip_key,
            clip.shape(),
            spec.tokens,
            spec.clip_dim,
        )?;

        let num_samples =
            ArtifactValidator::validate_sample_consistency(eva_samples, clip_samples)?;
        ArtifactValidator::validate_metadata_samples(self.metadata.num_samples, num_samples)?;

        Ok(ArtifactSummary {
            path: self.path.clone(),
            num_samples,
            tokens: spec.tokens,
            eva_dim: spec.eva_dim,
            clip_dim: spec.clip_dim,
            size_bytes: self.size_bytes,
            metadata: self.metadata.clone(),
        })
    }

    /// Copy a tensor out of the mapping as an owned rank-3 array
    ///
    /// The safetensors data section carries no alignment guarantee, so the
    /// bytes are decoded rather than reinterpreted in place.
    pub fn to_array3(&self, name: &str) -> Result<Array3<f32>> {
        let tensors = self.tensors()?;
        let view = tensors.tensor(name)?;
        ArtifactValidator::validate_dtype(name, view.dtype())?;

        let shape = view.shape();
        if shape.len() != 3 {
            return Err(LaunchError::artifact(format!(
                "Tensor '{}' must have 3 dimensions, got {}",
                name,
                shape.len()
            )));
        }
        let dims = (
            shape.first().copied().unwrap_or(0),
            shape.get(1).copied().unwrap_or(0),
            shape.get(2).copied().unwrap_or(0),
        );

        let values = decode_f32(view.data());
        Array3::from_shape_vec(dims, values).map_err(|e| {
            LaunchError::internal(format!("Tensor '{}' shape/data mismatch: {}", name, e))
        })
    }

    /// Compute summary statistics over one tensor
    pub fn tensor_stats(&self, name: &str) -> Result<TensorStats> {
        let tensors = self.tensors()?;
        let view = tensors.tensor(name)?;
        ArtifactValidator::validate_dtype(name, view.dtype())?;

        let values = decode_f32(view.data());
        if values.is_empty() {
            return Err(LaunchError::artifact(format!("Tensor '{}' is empty", name)));
        }

        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0_f64;
        let mut sum_sq = 0.0_f64;
        let mut non_finite = 0_usize;

        for &value in &values {
            if !value.is_finite() {
                non_finite += 1;
                continue;
            }
            min = min.min(value);
            max = max.max(value);
            sum += f64::from(value);
            sum_sq += f64::from(value) * f64::from(value);
        }

        let finite = values.len() - non_finite;
        let (mean, std) = if finite == 0 {
            (0.0, 0.0)
        } else {
            let mean = sum / finite as f64;
            let variance = (sum_sq / finite as f64 - mean * mean).max(0.0);
            (mean, variance.sqrt())
        };

        Ok(TensorStats {
            mean,
            std,
            min,
            max,
            non_finite,
        })
    }
}

/// Decode little-endian F32 tensor bytes into owned values
fn decode_f32(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap_or([0; 4])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetensors::tensor::TensorView;
    use safetensors::Dtype;
    use tempfile::TempDir;

    /// Reduced layout keeps unit-test fixtures small
    fn tiny_spec() -> ArtifactSpec {
        ArtifactSpec {
            tokens: 4,
            eva_dim: 16,
            clip_dim: 8,
            ..ArtifactSpec::default()
        }
    }

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn write_artifact(
        path: &Path,
        tensors: &[(&str, Vec<usize>, Vec<f32>)],
        header: Option<HashMap<String, String>>,
    ) {
        let encoded: Vec<(String, Vec<usize>, Vec<u8>)> = tensors
            .iter()
            .map(|(name, shape, values)| ((*name).to_string(), shape.clone(), f32_bytes(values)))
            .collect();
        let views: Vec<(String, TensorView<'_>)> = encoded
            .iter()
            .map(|(name, shape, bytes)| {
                (
                    name.clone(),
                    TensorView::new(Dtype::F32, shape.clone(), bytes).unwrap(),
                )
            })
            .collect();
        safetensors::serialize_to_file(views, &header, path).unwrap();
    }

    fn write_valid_artifact(path: &Path, n: usize, spec: &ArtifactSpec) {
        write_artifact(
            path,
            &[
                (
                    "eva_embeddings",
                    vec![n, spec.tokens, spec.eva_dim],
                    vec![0.5; n * spec.tokens * spec.eva_dim],
                ),
                (
                    "clip_embeddings",
                    vec![n, spec.tokens, spec.clip_dim],
                    vec![-0.5; n * spec.tokens * spec.clip_dim],
                ),
            ],
            None,
        );
    }

    #[test]
    fn test_open_missing_file() {
        let err = EmbeddingsArtifact::open("/nonexistent/embeddings.safetensors").unwrap_err();
        assert!(matches!(err, LaunchError::Io(_)));
    }

    #[test]
    fn test_open_malformed_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.safetensors");
        std::fs::write(&path, b"not a safetensors file").unwrap();

        let err = EmbeddingsArtifact::open(&path).unwrap_err();
        assert!(matches!(err, LaunchError::Format(_)));
    }

    #[test]
    fn test_validate_accepts_contract_shapes() {
        let temp = TempDir::new().unwrap();
        let spec = tiny_spec();

        for n in [1, 3, 17] {
            let path = temp.path().join(format!("emb-{}.safetensors", n));
            write_valid_artifact(&path, n, &spec);

            let artifact = EmbeddingsArtifact::open(&path).unwrap();
            let summary = artifact.validate(&spec).unwrap();
            assert_eq!(summary.num_samples, n);
            assert_eq!(summary.tokens, spec.tokens);
            assert_eq!(summary.eva_dim, spec.eva_dim);
            assert_eq!(summary.clip_dim, spec.clip_dim);
        }
    }

    #[test]
    fn test_validate_rejects_missing_key() {
        let temp = TempDir::new().unwrap();
        let spec = tiny_spec();
        let path = temp.path().join("missing.safetensors");

        write_artifact(
            &path,
            &[(
                "eva_embeddings",
                vec![2, spec.tokens, spec.eva_dim],
                vec![0.0; 2 * spec.tokens * spec.eva_dim],
            )],
            None,
        );

        let artifact = EmbeddingsArtifact::open(&path).unwrap();
        let err = artifact.validate(&spec).unwrap_err();
        assert!(err.to_string().contains("clip_embeddings"));
    }

    #[test]
    fn test_validate_rejects_wrong_dims() {
        let temp = TempDir::new().unwrap();
        let spec = tiny_spec();
        let path = temp.path().join("dims.safetensors");

        // CLIP tensor has the wrong channel width
        write_artifact(
            &path,
            &[
                (
                    "eva_embeddings",
                    vec![2, spec.tokens, spec.eva_dim],
                    vec![0.0; 2 * spec.tokens * spec.eva_dim],
                ),
                (
                    "clip_embeddings",
                    vec![2, spec.tokens, spec.clip_dim + 1],
                    vec![0.0; 2 * spec.tokens * (spec.clip_dim + 1)],
                ),
            ],
            None,
        );

        let artifact = EmbeddingsArtifact::open(&path).unwrap();
        let err = artifact.validate(&spec).unwrap_err();
        assert!(err.to_string().contains("clip_embeddings"));
    }

    #[test]
    fn test_validate_rejects_sample_mismatch() {
        let temp = TempDir::new().unwrap();
        let spec = tiny_spec();
        let path = temp.path().join("mismatch.safetensors");

        write_artifact(
            &path,
            &[
                (
                    "eva_embeddings",
                    vec![3, spec.tokens, spec.eva_dim],
                    vec![0.0; 3 * spec.tokens * spec.eva_dim],
                ),
                (
                    "clip_embeddings",
                    vec![2, spec.tokens, spec.clip_dim],
                    vec![0.0; 2 * spec.tokens * spec.clip_dim],
                ),
            ],
            None,
        );

        let artifact = EmbeddingsArtifact::open(&path).unwrap();
        let err = artifact.validate(&spec).unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn test_metadata_round_trip() {
        let temp = TempDir::new().unwrap();
        let spec = tiny_spec();
        let path = temp.path().join("meta.safetensors");

        let mut header = HashMap::new();
        header.insert(META_NUM_SAMPLES.to_string(), "2".to_string());
        header.insert(META_GPU_COUNT.to_string(), "8".to_string());
        header.insert(META_BATCH_SIZE.to_string(), "32".to_string());
        write_artifact(
            &path,
            &[
                (
                    "eva_embeddings",
                    vec![2, spec.tokens, spec.eva_dim],
                    vec![0.0; 2 * spec.tokens * spec.eva_dim],
                ),
                (
                    "clip_embeddings",
                    vec![2, spec.tokens, spec.clip_dim],
                    vec![0.0; 2 * spec.tokens * spec.clip_dim],
                ),
            ],
            Some(header),
        );

        let artifact = EmbeddingsArtifact::open(&path).unwrap();
        assert_eq!(artifact.metadata().num_samples, Some(2));
        assert_eq!(artifact.metadata().gpu_count, Some(8));
        assert_eq!(artifact.metadata().batch_size, Some(32));

        let summary = artifact.validate(&spec).unwrap();
        assert_eq!(summary.metadata.gpu_count, Some(8));
    }

    #[test]
    fn test_metadata_sample_count_mismatch_rejected() {
        let temp = TempDir::new().unwrap();
        let spec = tiny_spec();
        let path = temp.path().join("meta-bad.safetensors");

        let mut header = HashMap::new();
        header.insert(META_NUM_SAMPLES.to_string(), "99".to_string());
        write_artifact(
            &path,
            &[
                (
                    "eva_embeddings",
                    vec![2, spec.tokens, spec.eva_dim],
                    vec![0.0; 2 * spec.tokens * spec.eva_dim],
                ),
                (
                    "clip_embeddings",
                    vec![2, spec.tokens, spec.clip_dim],
                    vec![0.0; 2 * spec.tokens * spec.clip_dim],
                ),
            ],
            Some(header),
        );

        let artifact = EmbeddingsArtifact::open(&path).unwrap();
        let err = artifact.validate(&spec).unwrap_err();
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn test_tensor_stats() {
        let temp = TempDir::new().unwrap();
        let spec = tiny_spec();
        let path = temp.path().join("stats.safetensors");

        let count = 2 * spec.tokens * spec.clip_dim;
        let values: Vec<f32> = (0..count).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        write_artifact(
            &path,
            &[("clip_embeddings", vec![2, spec.tokens, spec.clip_dim], values)],
            None,
        );

        let artifact = EmbeddingsArtifact::open(&path).unwrap();
        let stats = artifact.tensor_stats("clip_embeddings").unwrap();
        assert!(stats.mean.abs() < 1e-9);
        assert!((stats.std - 1.0).abs() < 1e-6);
        assert_eq!(stats.min, -1.0);
        assert_eq!(stats.max, 1.0);
        assert_eq!(stats.non_finite, 0);
    }

    #[test]
    fn test_to_array3() {
        let temp = TempDir::new().unwrap();
        let spec = tiny_spec();
        let path = temp.path().join("array.safetensors");

        let count = spec.tokens * spec.clip_dim;
        let values: Vec<f32> = (0..count).map(|i| i as f32).collect();
        write_artifact(
            &path,
            &[("clip_embeddings", vec![1, spec.tokens, spec.clip_dim], values)],
            None,
        );

        let artifact = EmbeddingsArtifact::open(&path).unwrap();
        let array = artifact.to_array3("clip_embeddings").unwrap();
        assert_eq!(array.dim(), (1, spec.tokens, spec.clip_dim));
        assert_eq!(array[[0, 0, 0]], 0.0);
        assert_eq!(array[[0, 1, 0]], spec.clip_dim as f32);
    }

    #[test]
    fn test_summary_report_contents() {
        let summary = ArtifactSummary {
            path: PathBuf::from("/data/embeddings.safetensors"),
            num_samples: 50_000,
            tokens: 64,
            eva_dim: 4096,
            clip_dim: 1024,
            size_bytes: 1024 * 1024,
            metadata: ArtifactMetadata {
                num_samples: Some(50_000),
                gpu_count: Some(8),
                batch_size: Some(32),
            },
        };

        let report = summary.format_report();
        assert!(report.contains("50000"));
        assert!(report.contains("[50000, 64, 4096]"));
        assert!(report.contains("[50000, 64, 1024]"));
        assert!(report.contains("8 GPU(s)"));
    }
}
