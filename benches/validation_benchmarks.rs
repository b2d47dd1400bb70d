//! Benchmarks for embeddings-artifact validation
//!
//! Validation runs on every launch, so opening and checking the artifact has
//! to stay cheap regardless of sample count (only the header is parsed).

use criterion::{criterion_group, criterion_main, Criterion};
use flowtrain::{ArtifactSpec, EmbeddingsArtifact};
use safetensors::tensor::TensorView;
use safetensors::Dtype;
use std::path::Path;
use tempfile::TempDir;

fn write_artifact(path: &Path, n: usize, spec: &ArtifactSpec) {
    let eva: Vec<u8> = vec![0.25_f32; n * spec.tokens * spec.eva_dim]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let clip: Vec<u8> = vec![0.25_f32; n * spec.tokens * spec.clip_dim]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();

    let views = vec![
        (
            "eva_embeddings".to_string(),
            TensorView::new(Dtype::F32, vec![n, spec.tokens, spec.eva_dim], &eva).unwrap(),
        ),
        (
            "clip_embeddings".to_string(),
            TensorView::new(Dtype::F32, vec![n, spec.tokens, spec.clip_dim], &clip).unwrap(),
        ),
    ];
    safetensors::serialize_to_file(views, &None, path).unwrap();
}

fn bench_open_and_validate(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let spec = ArtifactSpec::default();
    let path = temp.path().join("embeddings.safetensors");
    write_artifact(&path, 4, &spec);

    c.bench_function("open_and_validate", |b| {
        b.iter(|| {
            let artifact = EmbeddingsArtifact::open(&path).unwrap();
            artifact.validate(&spec).unwrap()
        });
    });
}

fn bench_tensor_stats(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let spec = ArtifactSpec::default();
    let path = temp.path().join("embeddings.safetensors");
    write_artifact(&path, 4, &spec);
    let artifact = EmbeddingsArtifact::open(&path).unwrap();

    c.bench_function("tensor_stats_clip", |b| {
        b.iter(|| artifact.tensor_stats("clip_embeddings").unwrap());
    });
}

criterion_group!(benches, bench_open_and_validate, bench_tensor_stats);
criterion_main!(benches);
