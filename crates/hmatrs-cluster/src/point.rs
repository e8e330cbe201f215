//! Degrees of freedom as points in 3-space.

/// A degree of freedom: a cartesian location, its index in the caller's
/// original ordering, and an optional influence radius (0 when unused).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DofPoint {
    /// Physical coordinate.
    pub coordinate: [f64; 3],
    /// Index in the caller's (pre-permutation) ordering.
    pub global_index: usize,
    /// Influence radius for radius-based admissibility.
    pub radius: f64,
}

impl DofPoint {
    /// Point with no influence radius.
    pub fn new(coordinate: [f64; 3], global_index: usize) -> Self {
        Self {
            coordinate,
            global_index,
            radius: 0.0,
        }
    }

    /// Point with an influence radius.
    pub fn with_radius(coordinate: [f64; 3], global_index: usize, radius: f64) -> Self {
        Self {
            coordinate,
            global_index,
            radius,
        }
    }
}

/// Vector of points.
pub type Points = Vec<DofPoint>;
