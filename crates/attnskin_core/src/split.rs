//! Data split types for training and testing.

use serde::{Deserialize, Serialize};

/// The data split a sample is drawn from.
///
/// Transforms use this to decide whether augmentation runs: random crops and
/// flips only apply to [`Split::Train`].
///
/// ```rust
/// use attnskin_core::Split;
///
/// assert!(Split::Train.is_train());
/// assert!(Split::Test.is_eval());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Training split, augmentation applied.
    #[default]
    Train,
    /// Held-out test split, deterministic preprocessing only.
    Test,
}

impl Split {
    /// Check if this is the training split.
    #[must_use]
    pub const fn is_train(&self) -> bool {
        matches!(self, Split::Train)
    }

    /// Check if this is an evaluation split.
    #[must_use]
    pub const fn is_eval(&self) -> bool {
        !self.is_train()
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test => write!(f, "test"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_predicates() {
        assert!(Split::Train.is_train());
        assert!(!Split::Train.is_eval());
        assert!(Split::Test.is_eval());
        assert_eq!(Split::default(), Split::Train);
        assert_eq!(Split::Test.to_string(), "test");
    }
}
