use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("progress must be between 0 and 100, got {0}")]
    OutOfRange(u64),
}

//
// ─── PERCENT ───────────────────────────────────────────────────────────────────
//

/// Whole-number completion percentage, always within `0..=100`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ProgressPercent(u8);

impl ProgressPercent {
    pub const ZERO: Self = Self(0);
    pub const FULL: Self = Self(100);

    /// Builds a percentage from a stored value.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::OutOfRange` for values above 100.
    pub fn new(value: u64) -> Result<Self, ProgressError> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .map(Self)
            .ok_or(ProgressError::OutOfRange(value))
    }

    /// `floor(100 * completed / total)`, or zero when there is nothing to complete.
    ///
    /// Completion counts above the total clamp to 100.
    #[must_use]
    pub fn from_counts(completed: u64, total: u64) -> Self {
        if total == 0 {
            return Self::ZERO;
        }
        let pct = u128::from(completed) * 100 / u128::from(total);
        // Clamped above, so the narrowing cannot truncate.
        #[allow(clippy::cast_possible_truncation)]
        Self(pct.min(100) as u8)
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for ProgressPercent {
    type Error = ProgressError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(u64::from(value))
    }
}

impl From<ProgressPercent> for u8 {
    fn from(value: ProgressPercent) -> Self {
        value.0
    }
}

impl std::fmt::Display for ProgressPercent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

//
// ─── COUNTS ────────────────────────────────────────────────────────────────────
//

/// Completed-versus-total module counts for one scope (a course, or everything).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleCounts {
    pub completed: u64,
    pub total: u64,
}

impl ModuleCounts {
    #[must_use]
    pub fn new(completed: u64, total: u64) -> Self {
        Self { completed, total }
    }

    /// A course is complete when it has modules and every one of them is done.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }

    #[must_use]
    pub fn percent(&self) -> ProgressPercent {
        ProgressPercent::from_counts(self.completed, self.total)
    }
}

/// Cached per-user aggregates stored on the user row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAggregates {
    pub progress: ProgressPercent,
    pub completed_courses: u32,
}

impl UserAggregates {
    #[must_use]
    pub fn new(progress: ProgressPercent, completed_courses: u32) -> Self {
        Self {
            progress,
            completed_courses,
        }
    }
}
