//! Percentage threshold configuration type

use nutype::nutype;

/// A usage threshold expressed as a percentage in `(0, 100]`
///
/// Used for memory alert and emergency thresholds.
#[nutype(
    validate(finite, greater = 0.0, less_or_equal = 100.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, TryFrom, Into, Serialize, Deserialize)
)]
pub struct ThresholdPercent(f64);

impl ThresholdPercent {
    /// Get the threshold as a raw percentage
    #[inline]
    #[must_use]
    pub fn get(&self) -> f64 {
        self.into_inner()
    }

    /// Check whether an observed usage percentage is above this threshold
    #[inline]
    #[must_use]
    pub fn is_exceeded_by(&self, usage_percent: f64) -> bool {
        usage_percent > self.into_inner()
    }
}

impl std::fmt::Display for ThresholdPercent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}%", self.get())
    }
}
