#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default nesting limit for freezing. Deeper trees fail with `Error::TooDeep`.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Maximum nesting depth the freezer will walk.
    pub max_depth: usize,
    /// Whether `produce_with_patches` also records inverse patches.
    pub inverse_patches: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            inverse_patches: true,
        }
    }
}

impl Config {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_inverse_patches(mut self, enabled: bool) -> Self {
        self.inverse_patches = enabled;
        self
    }
}
