use progress_core::model::{CourseId, Enrollment, UserId};
use progress_core::time::Clock;
use storage::repository::ProgressUnit;
use tracing::info;

use crate::error::ProgressError;

/// Makes sure a user is enrolled in a course before progress is recorded in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrollmentService {
    clock: Clock,
}

impl EnrollmentService {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self { clock }
    }

    /// Create the enrollment if it is missing. Returns `true` when a row was created.
    ///
    /// Calling it again for the same pair is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Transaction` if the store fails; the caller's
    /// unit of work must then be abandoned.
    pub async fn ensure_enrolled(
        &self,
        unit: &mut dyn ProgressUnit,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<bool, ProgressError> {
        if unit.enrollment(user_id, course_id).await?.is_some() {
            return Ok(false);
        }

        let enrollment = Enrollment::new(user_id, course_id, self.clock.now());
        let created = unit.insert_enrollment(&enrollment).await?;
        if created {
            info!(user_id = %user_id, course_id = %course_id, "enrollment created");
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{Course, Role, User};
    use progress_core::time::{fixed_clock, fixed_now};
    use storage::memory::InMemoryRepository;
    use storage::repository::{CatalogRepository, ProfileRepository, ProgressStore};

    #[tokio::test]
    async fn creates_once_then_noops() {
        let repo = InMemoryRepository::new();
        repo.upsert_user(&User::new(UserId::new(5), "rina", "r@example.com", Role::User).unwrap())
            .await
            .unwrap();
        repo.upsert_course(&Course::new(CourseId::new(7), "Rust", "beginner").unwrap())
            .await
            .unwrap();

        let svc = EnrollmentService::new(fixed_clock());
        let mut unit = repo.begin().await.unwrap();
        assert!(
            svc.ensure_enrolled(unit.as_mut(), UserId::new(5), CourseId::new(7))
                .await
                .unwrap()
        );
        assert!(
            !svc.ensure_enrolled(unit.as_mut(), UserId::new(5), CourseId::new(7))
                .await
                .unwrap()
        );
        unit.commit().await.unwrap();

        let enrollment = repo
            .get_enrollment(UserId::new(5), CourseId::new(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.enrolled_at(), fixed_now());
        assert!(!enrollment.is_completed());
    }
}
