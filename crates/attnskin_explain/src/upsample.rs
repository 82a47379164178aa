//! Bring attention maps back to image resolution for display.

use attnskin_core::{AttentionMap, AttentionNormalization, N_ATTENTION_STAGES};
use burn::nn::interpolate::{Interpolate2dConfig, InterpolateMode};
use burn::prelude::*;

/// Smallest value range used when stretching a map to `[0, 1]`.
const MIN_RANGE: f32 = 1e-5;

/// Upsampling factors of the three stages: `base`, `2 * base`, `4 * base`.
pub fn up_factors(base: usize) -> [usize; N_ATTENTION_STAGES] {
    [base, 2 * base, 4 * base]
}

/// Bilinear upsampling of `(N, H, W)` maps by an integer factor.
pub fn upsample<B: Backend>(map: Tensor<B, 3>, factor: usize) -> Tensor<B, 3> {
    if factor <= 1 {
        return map;
    }
    let [n, h, w] = map.dims();
    let (out_h, out_w) = (h * factor, w * factor);
    Interpolate2dConfig::new()
        .with_output_size(Some([out_h, out_w]))
        .with_mode(InterpolateMode::Linear)
        .init()
        .forward(map.reshape([n, 1, h, w]))
        .reshape([n, out_h, out_w])
}

/// Stretch every map of the batch to `[0, 1]` independently.
pub fn min_max_per_image<B: Backend>(map: Tensor<B, 3>) -> Tensor<B, 3> {
    let [n, h, w] = map.dims();
    let flat = map.reshape([n, h * w]);
    let min = flat.clone().min_dim(1);
    let max = flat.clone().max_dim(1);
    let range = (max - min.clone()).clamp_min(MIN_RANGE);
    ((flat - min) / range).reshape([n, h, w])
}

/// Prepare a map for display.
///
/// Softmax maps are tiny and are stretched per image; sigmoid maps are
/// already in `(0, 1)` and are left as is.
pub fn display_map<B: Backend>(
    map: Tensor<B, 3>,
    normalization: AttentionNormalization,
    factor: usize,
) -> Tensor<B, 3> {
    let up = upsample(map, factor);
    match normalization {
        AttentionNormalization::Softmax => min_max_per_image(up),
        AttentionNormalization::Sigmoid => up,
    }
}

/// Display maps of all stages at `base_up_factor × {1, 2, 4}`.
///
/// Stages without attention yield `None`.
pub fn upsample_attention<B: Backend>(
    maps: &[AttentionMap<B>; N_ATTENTION_STAGES],
    base_up_factor: usize,
) -> [Option<Tensor<B, 3>>; N_ATTENTION_STAGES] {
    let factors = up_factors(base_up_factor);
    let mut out: [Option<Tensor<B, 3>>; N_ATTENTION_STAGES] = [None, None, None];
    for ((slot, map), factor) in out.iter_mut().zip(maps).zip(factors) {
        if let (Some(weights), Some(normalization)) = (map.weights(), map.normalization()) {
            *slot = Some(display_map(weights.clone(), normalization, factor));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn values(t: Tensor<TestBackend, 3>) -> Vec<f32> {
        t.into_data().convert::<f32>().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_up_factors() {
        assert_eq!(up_factors(8), [8, 16, 32]);
    }

    #[test]
    fn test_upsample_shape_and_constant() {
        let device = Default::default();
        let map = Tensor::<TestBackend, 3>::full([2, 3, 3], 0.5, &device);
        let up = upsample(map, 4);
        assert_eq!(up.dims(), [2, 12, 12]);
        assert!(values(up).iter().all(|v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_min_max_per_image() {
        let device = Default::default();
        let map = Tensor::<TestBackend, 3>::from_floats(
            [[[0.1, 0.3], [0.2, 0.4]], [[2.0, 2.0], [2.0, 2.0]]],
            &device,
        );
        let v = values(min_max_per_image(map));
        assert!((v[0] - 0.0).abs() < 1e-6);
        assert!((v[3] - 1.0).abs() < 1e-6);
        // A flat map has no range and maps to zero.
        assert!(v[4..].iter().all(|x| x.abs() < 1e-6));
    }

    #[test]
    fn test_upsample_attention_respects_disabled() {
        let device = Default::default();
        let w = |s: usize| Tensor::<TestBackend, 3>::full([1, s, s], 0.3, &device);
        let maps = [
            AttentionMap::Computed {
                weights: w(4),
                scores: w(4),
                normalization: AttentionNormalization::Sigmoid,
            },
            AttentionMap::Computed {
                weights: w(2),
                scores: w(2),
                normalization: AttentionNormalization::Softmax,
            },
            AttentionMap::Disabled,
        ];
        let [a, b, c] = upsample_attention(&maps, 8);
        let a = a.unwrap();
        assert_eq!(a.dims(), [1, 32, 32]);
        assert!(values(a).iter().all(|v| (v - 0.3).abs() < 1e-6));
        assert_eq!(b.unwrap().dims(), [1, 32, 32]);
        assert!(c.is_none());
    }
}
