use progress_core::model::{CourseId, ProgressPercent, UserAggregates, UserId};
use progress_core::time::Clock;
use storage::repository::ProgressUnit;
use tracing::{debug, info};

use crate::error::ProgressError;

/// Result of re-deriving one course's status and the user's aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recomputed {
    /// Every module of the course currently has a completion.
    pub course_completed: bool,
    /// The enrollment latch flipped during this recompute.
    pub newly_completed: bool,
    pub aggregates: UserAggregates,
}

/// Derives completion status and the cached user counters from completion rows.
///
/// The only writer of `progress` and `completed_courses` on the toggle path.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateRecomputer {
    clock: Clock,
}

impl AggregateRecomputer {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self { clock }
    }

    /// Re-derive `course_id`'s status for the user, then refresh their aggregates.
    ///
    /// The enrollment latch only ever moves from open to completed; a later
    /// uncomplete leaves it set even though `course_completed` reports `false`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Transaction` if any read or write fails.
    pub async fn recompute(
        &self,
        unit: &mut dyn ProgressUnit,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Recomputed, ProgressError> {
        let counts = unit.course_counts(user_id, course_id).await?;
        let course_completed = counts.is_complete();
        debug!(
            user_id = %user_id,
            course_id = %course_id,
            completed = counts.completed,
            total = counts.total,
            "course counts"
        );

        let newly_completed = if course_completed {
            unit.mark_enrollment_completed(user_id, course_id, self.clock.now())
                .await?
        } else {
            false
        };
        if newly_completed {
            info!(user_id = %user_id, course_id = %course_id, "course completed");
        }

        let aggregates = self.refresh_user(unit, user_id).await?;
        Ok(Recomputed {
            course_completed,
            newly_completed,
            aggregates,
        })
    }

    /// Recompute and persist both cached counters for a user.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Transaction` if any read or write fails,
    /// including `StorageError::NotFound` when the user row is gone.
    pub async fn refresh_user(
        &self,
        unit: &mut dyn ProgressUnit,
        user_id: UserId,
    ) -> Result<UserAggregates, ProgressError> {
        let global = unit.global_counts(user_id).await?;
        let completed_courses = unit.count_completed_enrollments(user_id).await?;
        let aggregates = UserAggregates::new(
            ProgressPercent::from_counts(global.completed, global.total),
            completed_courses,
        );

        unit.write_aggregates(user_id, aggregates).await?;
        info!(
            user_id = %user_id,
            progress = aggregates.progress.value(),
            completed_courses,
            "aggregates written"
        );
        Ok(aggregates)
    }
}
