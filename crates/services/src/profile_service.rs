use std::sync::Arc;

use serde::Serialize;

use progress_core::model::{CourseId, ModuleId, ProgressPercent, Role, User, UserId};
use storage::repository::ProfileRepository;

use crate::error::ProfileError;

/// Display view of a user, taken from the cached aggregates as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub progress: ProgressPercent,
    pub completed_courses: u32,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        let aggregates = user.aggregates();
        Self {
            id: user.id(),
            username: user.username().to_owned(),
            email: user.email().to_owned(),
            role: user.role(),
            progress: aggregates.progress,
            completed_courses: aggregates.completed_courses,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleStatus {
    pub id: ModuleId,
    pub title: String,
    pub completed: bool,
}

/// A user's checklist for one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseProgress {
    pub course_id: CourseId,
    pub title: String,
    pub enrolled: bool,
    /// The enrollment latch, not a live recount.
    pub completed: bool,
    pub modules: Vec<ModuleStatus>,
}

/// Read-only projection of progress for display. Never repairs drift.
#[derive(Clone)]
pub struct ProfileProjector {
    profiles: Arc<dyn ProfileRepository>,
}

impl ProfileProjector {
    #[must_use]
    pub fn new(profiles: Arc<dyn ProfileRepository>) -> Self {
        Self { profiles }
    }

    /// # Errors
    ///
    /// Returns `ProfileError::UserNotFound` if the user is missing.
    pub async fn profile(&self, user_id: UserId) -> Result<UserProfile, ProfileError> {
        let user = self
            .profiles
            .get_user(user_id)
            .await?
            .ok_or(ProfileError::UserNotFound(user_id))?;
        Ok(UserProfile::from(&user))
    }

    /// # Errors
    ///
    /// Returns `ProfileError::CourseNotFound` if the course is missing.
    pub async fn course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgress, ProfileError> {
        let course = self
            .profiles
            .get_course(course_id)
            .await?
            .ok_or(ProfileError::CourseNotFound(course_id))?;
        let enrollment = self.profiles.get_enrollment(user_id, course_id).await?;
        let modules = self
            .profiles
            .course_checklist(user_id, course_id)
            .await?
            .into_iter()
            .map(|record| ModuleStatus {
                id: record.module_id,
                title: record.title,
                completed: record.completed,
            })
            .collect();

        Ok(CourseProgress {
            course_id,
            title: course.title().to_owned(),
            enrolled: enrollment.is_some(),
            completed: enrollment.is_some_and(|e| e.is_completed()),
            modules,
        })
    }
}
