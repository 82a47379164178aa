//! Transform trait for per-sample preprocessing and augmentation.

use rand_chacha::ChaCha8Rng;

use crate::error::Result;
use crate::split::Split;

/// A transform applied to one sample on its way into a batch.
///
/// `T` is the sample representation (a decoded image, or a `CHW` array after
/// tensor conversion). Random transforms draw from the `rng` they are handed,
/// so a loader that seeds the generator reproduces the same augmentations.
///
/// # Example
///
/// ```rust,ignore
/// use attnskin_core::{Result, Split, Transform};
/// use rand::Rng;
/// use rand_chacha::ChaCha8Rng;
///
/// struct Jitter(f32);
///
/// impl Transform<Vec<f32>> for Jitter {
///     fn apply(&self, mut x: Vec<f32>, _split: Split, rng: &mut ChaCha8Rng) -> Result<Vec<f32>> {
///         x.iter_mut().for_each(|v| *v += rng.gen_range(-self.0..self.0));
///         Ok(x)
///     }
///
///     fn should_apply(&self, split: Split) -> bool {
///         split.is_train()
///     }
/// }
/// ```
pub trait Transform<T>: Send + Sync {
    /// Apply the transform to a sample.
    fn apply(&self, input: T, split: Split, rng: &mut ChaCha8Rng) -> Result<T>;

    /// Get the name of this transform for logging/debugging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Check if this transform should be applied for the given split.
    ///
    /// By default, transforms are applied to all splits.
    fn should_apply(&self, _split: Split) -> bool {
        true
    }
}

/// Identity transform that passes through data unchanged.
#[derive(Debug, Clone, Default)]
pub struct Identity;

impl<T> Transform<T> for Identity {
    fn apply(&self, input: T, _split: Split, _rng: &mut ChaCha8Rng) -> Result<T> {
        Ok(input)
    }

    fn name(&self) -> &str {
        "Identity"
    }
}

/// A composed transform that applies multiple transforms in sequence.
pub struct Compose<T> {
    transforms: Vec<Box<dyn Transform<T>>>,
}

impl<T> Default for Compose<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Compose<T> {
    /// Create a new empty composition.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
        }
    }

    /// Add a transform to the composition.
    pub fn push<X: Transform<T> + 'static>(&mut self, transform: X) {
        self.transforms.push(Box::new(transform));
    }

    /// Builder form of [`Compose::push`].
    #[must_use]
    pub fn then<X: Transform<T> + 'static>(mut self, transform: X) -> Self {
        self.push(transform);
        self
    }

    /// Names of the transforms that run for `split`, in order.
    pub fn active_names(&self, split: Split) -> Vec<&str> {
        self.transforms
            .iter()
            .filter(|t| t.should_apply(split))
            .map(|t| t.name())
            .collect()
    }

    /// Number of transforms in the composition.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Check if the composition is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl<T> Transform<T> for Compose<T> {
    fn apply(&self, mut input: T, split: Split, rng: &mut ChaCha8Rng) -> Result<T> {
        for transform in &self.transforms {
            if transform.should_apply(split) {
                input = transform.apply(input, split, rng)?;
            }
        }
        Ok(input)
    }

    fn name(&self) -> &str {
        "Compose"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Seed;

    struct AddOne;

    impl Transform<i32> for AddOne {
        fn apply(&self, input: i32, _split: Split, _rng: &mut ChaCha8Rng) -> Result<i32> {
            Ok(input + 1)
        }

        fn name(&self) -> &str {
            "AddOne"
        }
    }

    struct TrainOnlyDouble;

    impl Transform<i32> for TrainOnlyDouble {
        fn apply(&self, input: i32, _split: Split, _rng: &mut ChaCha8Rng) -> Result<i32> {
            Ok(input * 2)
        }

        fn should_apply(&self, split: Split) -> bool {
            split.is_train()
        }
    }

    #[test]
    fn test_identity_name() {
        assert_eq!(<Identity as Transform<i32>>::name(&Identity), "Identity");
    }

    #[test]
    fn test_compose_respects_split() {
        let compose = Compose::new().then(AddOne).then(TrainOnlyDouble);
        let mut rng = Seed::new(0).to_rng();

        assert_eq!(compose.apply(1, Split::Train, &mut rng).unwrap(), 4);
        assert_eq!(compose.apply(1, Split::Test, &mut rng).unwrap(), 2);
        assert_eq!(compose.active_names(Split::Test), vec!["AddOne"]);
        assert_eq!(compose.len(), 2);
    }
}
