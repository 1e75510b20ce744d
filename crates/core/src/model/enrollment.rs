use chrono::{DateTime, Utc};

use crate::model::ids::{CourseId, ModuleId, UserId};

/// A user's engagement with a course.
///
/// `completed` is a one-way latch: once set it stays set even if a module is
/// later uncompleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    user_id: UserId,
    course_id: CourseId,
    enrolled_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    #[must_use]
    pub fn new(user_id: UserId, course_id: CourseId, enrolled_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            course_id,
            enrolled_at,
            completed_at: None,
        }
    }

    #[must_use]
    pub fn from_persisted(
        user_id: UserId,
        course_id: CourseId,
        enrolled_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            user_id,
            course_id,
            enrolled_at,
            completed_at,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn enrolled_at(&self) -> DateTime<Utc> {
        self.enrolled_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Flip the latch. Returns `true` only on the first call.
    pub fn mark_completed(&mut self, at: DateTime<Utc>) -> bool {
        if self.completed_at.is_some() {
            return false;
        }
        self.completed_at = Some(at);
        true
    }
}

/// Persisted fact that a user finished a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub module_id: ModuleId,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn latch_only_flips_once() {
        let mut enrollment = Enrollment::new(UserId::new(5), CourseId::new(7), fixed_now());
        assert!(!enrollment.is_completed());

        let first = fixed_now() + Duration::hours(1);
        assert!(enrollment.mark_completed(first));
        assert!(!enrollment.mark_completed(first + Duration::hours(1)));
        assert_eq!(enrollment.completed_at(), Some(first));
    }
}
