//! Benchmarks for the classifier forward pass and attention post-processing.
//!
//! Run with: cargo bench --bench forward_bench

use attnskin::all::*;
use burn::prelude::*;
use burn::tensor::Distribution;
use burn_ndarray::NdArray;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

type BenchBackend = NdArray;

fn images(n: usize, size: usize) -> Tensor<BenchBackend, 4> {
    Tensor::random([n, 3, size, size], Distribution::Normal(0.0, 1.0), &Default::default())
}

fn bench_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward");
    group.sample_size(10);
    let device = Default::default();

    for (name, normalization) in [
        ("softmax", AttentionNormalization::Softmax),
        ("sigmoid", AttentionNormalization::Sigmoid),
    ] {
        let model = AttnClassifierConfig::new(2)
            .with_base_width(8)
            .with_normalization(normalization)
            .init::<BenchBackend>(&device)
            .unwrap();

        for batch_size in [1, 4] {
            let x = images(batch_size, 128);
            group.bench_with_input(BenchmarkId::new(name, batch_size), &batch_size, |b, _| {
                b.iter(|| black_box(model.forward_attention(black_box(x.clone())).unwrap()))
            });
        }
    }

    let model = AttnClassifierConfig::new(2)
        .with_base_width(8)
        .with_attention(false)
        .init::<BenchBackend>(&device)
        .unwrap();
    let x = images(4, 128);
    group.bench_function("no_attention/4", |b| {
        b.iter(|| black_box(model.forward_attention(black_box(x.clone())).unwrap()))
    });

    group.finish();
}

fn bench_display_maps(c: &mut Criterion) {
    let device = Default::default();
    let model = AttnClassifierConfig::new(2)
        .with_base_width(4)
        .init::<BenchBackend>(&device)
        .unwrap();
    let capture = AttentionCapture::capture(&model, images(16, 224)).unwrap();

    c.bench_function("display_maps/16x224", |b| {
        b.iter(|| black_box(capture.display_maps(black_box(8))))
    });
    c.bench_function("attention_summary/16x224", |b| {
        b.iter(|| black_box(capture.summary().unwrap()))
    });
}

criterion_group!(benches, bench_forward, bench_display_maps);
criterion_main!(benches);
