use chrono::{DateTime, Utc};

/// Where the progress engine reads "now" from.
///
/// Three timestamps come from it: `enrolled_at` when a first toggle enrolls
/// a learner, `completed_at` on each recorded module, and the moment an
/// enrollment's completion latch flips. Services copy the clock they are
/// built with, so every write of one service instance sees the same source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    /// Wall-clock UTC. Used by `progressctl` and any real deployment.
    #[default]
    System,
    /// Every read returns the same instant; rows written in tests stay comparable.
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(at) => *at,
        }
    }
}

// 2023-11-14T22:13:20Z
const TEST_EPOCH_SECS: i64 = 1_700_000_000;

/// The instant every fixture enrollment and completion is stamped with.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(TEST_EPOCH_SECS, 0).unwrap_or_default()
}

/// Clock for service tests; pairs with `fixed_now` in assertions.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fixed_clock_stamps_every_write_alike() {
        let clock = fixed_clock();
        let enrolled_at = clock.now();
        let completed_at = clock.now();
        assert_eq!(enrolled_at, completed_at);
        assert_eq!(enrolled_at.timestamp(), TEST_EPOCH_SECS);
    }

    #[test]
    fn clocks_are_compared_by_source() {
        let later = Clock::fixed(fixed_now() + Duration::days(1));
        assert_ne!(later, fixed_clock());
        assert_eq!(Clock::default(), Clock::system());
    }

    #[test]
    fn system_clock_is_not_before_the_test_epoch() {
        assert!(Clock::system().now() > fixed_now());
    }
}
