//! Shared fixtures for integration tests

#![allow(dead_code)]

use safetensors::tensor::TensorView;
use safetensors::Dtype;
use std::collections::HashMap;
use std::path::Path;

/// Token count of the production artifact contract
pub const TOKENS: usize = 64;
/// EVA channel width of the production artifact contract
pub const EVA_DIM: usize = 4096;
/// CLIP channel width of the production artifact contract
pub const CLIP_DIM: usize = 1024;

/// Encode f32 values as little-endian bytes
pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Write a safetensors artifact with arbitrary F32 tensors
pub fn write_artifact(
    path: &Path,
    tensors: &[(&str, Vec<usize>)],
    header: Option<HashMap<String, String>>,
) {
    let encoded: Vec<(String, Vec<usize>, Vec<u8>)> = tensors
        .iter()
        .map(|(name, shape)| {
            let len: usize = shape.iter().product();
            ((*name).to_string(), shape.clone(), f32_bytes(&vec![0.25; len]))
        })
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

/// Write an artifact honoring the production contract for `n` samples
pub fn write_valid_artifact(path: &Path, n: usize) {
    write_artifact(
        path,
        &[
            ("eva_embeddings", vec![n, TOKENS, EVA_DIM]),
            ("clip_embeddings", vec![n, TOKENS, CLIP_DIM]),
        ],
        None,
    );
}

/// Write an executable stub trainer script (unix only)
///
/// The stub echoes its arguments and the redirected cache location, drops a
/// checkpoint when asked to, and exits with the given code.
#[cfg(unix)]
pub fn write_trainer_stub(path: &Path, exit_code: i32, drop_checkpoint: bool) {
    use std::os::unix::fs::PermissionsExt;

    let checkpoint_block = if drop_checkpoint {
        concat!(
            "mkdir -p \"$out/checkpoint-100\"\n",
            "printf 'weights' > \"$out/checkpoint-100/weights.bin\"\n",
        )
    } else {
        ""
    };

    let script = format!(
        "#!/bin/sh\n\
         out=\"\"\n\
         prev=\"\"\n\
         for a in \"$@\"; do\n\
         \tif [ \"$prev\" = \"--output-dir\" ]; then out=\"$a\"; fi\n\
         \tprev=\"$a\"\n\
         done\n\
         echo \"stub trainer: $*\"\n\
         echo \"HF_HOME=$HF_HOME\"\n\
         {}\
         echo 'step 100 loss 0.5'\n\
         if [ {} -ne 0 ]; then echo 'CUDA error: out of memory' >&2; fi\n\
         exit {}\n",
        checkpoint_block, exit_code, exit_code
    );

    std::fs::write(path, script).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}
