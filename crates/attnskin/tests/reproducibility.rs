//! Seeding the backend makes initialization and the first loss repeatable.
//!
//! The backend seed is process-global, so this file holds a single test.

use attnskin::all::*;
use burn::prelude::*;
use burn::tensor::{Distribution, Int};
use burn_ndarray::NdArray;

type TestBackend = NdArray;

fn first_loss(seed: u64) -> f32 {
    TestBackend::seed(seed);
    let device = Default::default();
    let model = AttnClassifierConfig::new(2)
        .with_base_width(2)
        .init::<TestBackend>(&device)
        .unwrap();

    let images = Tensor::<TestBackend, 4>::random([4, 3, 224, 224], Distribution::Normal(0.0, 1.0), &device);
    let labels = Tensor::<TestBackend, 1, Int>::from_ints([0, 1, 1, 0], &device);

    let criterion = LossConfig::focal(2.0).init(2).unwrap();
    let logits = model.forward(images).unwrap();
    assert_eq!(logits.dims(), [4, 2]);
    criterion.forward(logits, labels).into_scalar()
}

#[test]
fn test_same_seed_same_loss() {
    let a = first_loss(42);
    let b = first_loss(42);
    let c = first_loss(7);
    assert!(a.is_finite());
    assert_eq!(a, b);
    assert_ne!(a, c);
}
