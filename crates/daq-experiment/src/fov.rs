//! Field-of-view identifiers.

use serde::{Deserialize, Serialize};

/// One imaging position within a timepoint: a region (e.g. a well) and the
/// index of the FOV inside it.
///
/// Immutable once built, compared and hashed by value, so it can key a
/// `HashSet`/`HashMap` and be shared freely between threads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FovIdentifier {
    region_id: String,
    fov_index: usize,
}

impl FovIdentifier {
    /// Identify FOV `fov_index` of `region_id`.
    #[must_use]
    pub fn new(region_id: impl Into<String>, fov_index: usize) -> Self {
        Self {
            region_id: region_id.into(),
            fov_index,
        }
    }

    /// Region (well, tile set) this FOV belongs to.
    #[must_use]
    pub fn region_id(&self) -> &str {
        &self.region_id
    }

    /// Position of the FOV within its region.
    #[must_use]
    pub fn fov_index(&self) -> usize {
        self.fov_index
    }
}

impl std::fmt::Display for FovIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.region_id, self.fov_index)
    }
}
