use std::fmt::{Display, Formatter};

use derive_new::new;

/// Rectangular region `[v_min, v_max) x [d_min, d_max)` over the two HMM
/// boundary parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct KBounds {
    pub v_min: usize,
    pub v_max: usize,
    pub d_min: usize,
    pub d_max: usize,
}

impl KBounds {
    /// Component-wise hull of the two rectangles.
    pub fn logical_or(&self, other: &KBounds) -> KBounds {
        KBounds {
            v_min: self.v_min.min(other.v_min),
            v_max: self.v_max.max(other.v_max),
            d_min: self.d_min.min(other.d_min),
            d_max: self.d_max.max(other.d_max),
        }
    }

    pub fn contains(&self, other: &KBounds) -> bool {
        self.v_min <= other.v_min
            && self.v_max >= other.v_max
            && self.d_min <= other.d_min
            && self.d_max >= other.d_max
    }
}

impl Display for KBounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "v [{}, {})  d [{}, {})",
            self.v_min, self.v_max, self.d_min, self.d_max
        )
    }
}
