use std::sync::Arc;

use progress_core::model::{CourseId, UserId};
use progress_core::time::Clock;
use storage::repository::{ProgressStore, ProgressUnit, SoftStep};
use tracing::{info, warn};

use crate::error::CleanupError;
use crate::progress::AggregateRecomputer;

/// A best-effort deletion that failed without aborting the cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialWarning {
    pub step: SoftStep,
    pub message: String,
}

/// What a committed cleanup did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub modules_removed: u64,
    pub completions_removed: u64,
    pub enrollments_removed: u64,
    /// Users whose aggregates were recomputed after the removal.
    pub refreshed_users: Vec<UserId>,
    pub warnings: Vec<PartialWarning>,
}

impl CleanupReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Removes the progress rows of a deleted course or user.
///
/// Primary rows are deleted hard: any failure aborts the whole unit.
/// Dependent completion and enrollment rows are removed in soft steps whose
/// failures are collected as warnings; foreign-key cascades still clear
/// them when the primary row goes.
#[derive(Clone)]
pub struct ProgressCleanup {
    store: Arc<dyn ProgressStore>,
    recomputer: AggregateRecomputer,
}

impl ProgressCleanup {
    #[must_use]
    pub fn new(clock: Clock, store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            recomputer: AggregateRecomputer::new(clock),
        }
    }

    /// Delete a course with its modules, then re-derive the aggregates of
    /// every user with progress anywhere.
    ///
    /// Progress is a share of all modules, so dropping a course moves it for
    /// users who never touched that course.
    ///
    /// # Errors
    ///
    /// Returns `CleanupError::CourseNotFound` if the course is missing, or
    /// `CleanupError::Transaction` if a hard step or the commit fails.
    pub async fn remove_course(&self, course_id: CourseId) -> Result<CleanupReport, CleanupError> {
        let mut unit = self.store.begin().await?;
        if !unit.lock_course(course_id).await? {
            return Err(CleanupError::CourseNotFound(course_id));
        }

        let users = unit.users_with_progress().await?;
        let mut warnings = Vec::new();
        let completions_removed = soft_step(
            unit.as_mut(),
            SoftStep::CourseCompletions(course_id),
            &mut warnings,
        )
        .await;
        let enrollments_removed = soft_step(
            unit.as_mut(),
            SoftStep::CourseEnrollments(course_id),
            &mut warnings,
        )
        .await;
        let modules_removed = unit.delete_course_modules(course_id).await?;
        if !unit.delete_course(course_id).await? {
            return Err(CleanupError::CourseNotFound(course_id));
        }

        for user_id in &users {
            self.recomputer.refresh_user(unit.as_mut(), *user_id).await?;
        }

        unit.commit().await?;
        let report = CleanupReport {
            modules_removed,
            completions_removed,
            enrollments_removed,
            refreshed_users: users,
            warnings,
        };
        info!(
            course_id = %course_id,
            modules = report.modules_removed,
            refreshed = report.refreshed_users.len(),
            warnings = report.warnings.len(),
            "course removed"
        );
        Ok(report)
    }

    /// Delete a user and their progress rows.
    ///
    /// # Errors
    ///
    /// Returns `CleanupError::UserNotFound` if the user is missing, or
    /// `CleanupError::Transaction` if a hard step or the commit fails.
    pub async fn remove_user(&self, user_id: UserId) -> Result<CleanupReport, CleanupError> {
        let mut unit = self.store.begin().await?;
        if !unit.lock_user(user_id).await? {
            return Err(CleanupError::UserNotFound(user_id));
        }

        let mut warnings = Vec::new();
        let completions_removed =
            soft_step(unit.as_mut(), SoftStep::UserCompletions(user_id), &mut warnings).await;
        let enrollments_removed =
            soft_step(unit.as_mut(), SoftStep::UserEnrollments(user_id), &mut warnings).await;
        if !unit.delete_user(user_id).await? {
            return Err(CleanupError::UserNotFound(user_id));
        }

        unit.commit().await?;
        let report = CleanupReport {
            completions_removed,
            enrollments_removed,
            warnings,
            ..CleanupReport::default()
        };
        info!(user_id = %user_id, warnings = report.warnings.len(), "user removed");
        Ok(report)
    }
}

async fn soft_step(
    unit: &mut dyn ProgressUnit,
    step: SoftStep,
    warnings: &mut Vec<PartialWarning>,
) -> u64 {
    match unit.run_soft_step(step).await {
        Ok(removed) => removed,
        Err(err) => {
            warn!(step = %step, error = %err, "soft cleanup step failed");
            warnings.push(PartialWarning {
                step,
                message: err.to_string(),
            });
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{Course, Module, ModuleId, Role, User};
    use progress_core::time::fixed_clock;
    use storage::memory::{Fault, InMemoryRepository};
    use storage::repository::{CatalogRepository, ProfileRepository};

    use crate::progress::{ProgressService, ToggleProgress};
    use crate::sync_service::SyncService;

    async fn seeded() -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        repo.upsert_user(&User::new(UserId::new(5), "rina", "r@example.com", Role::User).unwrap())
            .await
            .unwrap();
        repo.upsert_course(&Course::new(CourseId::new(7), "Rust", "beginner").unwrap())
            .await
            .unwrap();
        repo.upsert_module(
            &Module::new(ModuleId::new(41), CourseId::new(7), "Intro", "", "", None).unwrap(),
        )
        .await
        .unwrap();
        ProgressService::new(fixed_clock(), Arc::new(repo.clone()))
            .toggle_progress(
                UserId::new(5),
                ToggleProgress {
                    course_id: CourseId::new(7),
                    module_id: ModuleId::new(41),
                    completed: true,
                },
            )
            .await
            .unwrap();
        repo
    }

    #[tokio::test]
    async fn removing_course_refreshes_enrolled_users() {
        let repo = seeded().await;
        let cleanup = ProgressCleanup::new(fixed_clock(), Arc::new(repo.clone()));
        let report = cleanup.remove_course(CourseId::new(7)).await.unwrap();

        assert!(report.is_clean());
        assert_eq!(report.completions_removed, 1);
        assert_eq!(report.enrollments_removed, 1);
        assert_eq!(report.modules_removed, 1);
        assert_eq!(report.refreshed_users, vec![UserId::new(5)]);

        let user = repo.get_user(UserId::new(5)).await.unwrap().unwrap();
        assert_eq!(user.aggregates().progress.value(), 0);
        assert_eq!(user.aggregates().completed_courses, 0);
    }

    #[tokio::test]
    async fn removing_another_course_refreshes_users_outside_it() {
        let repo = seeded().await;
        repo.upsert_course(&Course::new(CourseId::new(8), "Go", "beginner").unwrap())
            .await
            .unwrap();
        for (id, course) in [(42, 7), (43, 7), (50, 8), (51, 8), (52, 8)] {
            repo.upsert_module(
                &Module::new(ModuleId::new(id), CourseId::new(course), "M", "", "", None)
                    .unwrap(),
            )
            .await
            .unwrap();
        }
        repo.upsert_user(&User::new(UserId::new(6), "tomo", "t@example.com", Role::User).unwrap())
            .await
            .unwrap();
        let sync = SyncService::new(fixed_clock(), Arc::new(repo.clone()));
        let before = sync.sync_user_progress(UserId::new(5)).await.unwrap();
        assert_eq!(before.progress.value(), 16);

        let cleanup = ProgressCleanup::new(fixed_clock(), Arc::new(repo.clone()));
        let report = cleanup.remove_course(CourseId::new(8)).await.unwrap();
        assert_eq!(report.enrollments_removed, 0);
        assert_eq!(report.refreshed_users, vec![UserId::new(5)]);

        let user = repo.get_user(UserId::new(5)).await.unwrap().unwrap();
        assert_eq!(user.aggregates().progress.value(), 33);
        let resynced = sync.sync_user_progress(UserId::new(5)).await.unwrap();
        assert_eq!(resynced.progress.value(), 33);
    }

    #[tokio::test]
    async fn failed_soft_step_is_a_warning() {
        let repo = seeded().await;
        repo.inject_fault(Fault::SoftStep(SoftStep::UserEnrollments(UserId::new(5))))
            .unwrap();
        let cleanup = ProgressCleanup::new(fixed_clock(), Arc::new(repo.clone()));
        let report = cleanup.remove_user(UserId::new(5)).await.unwrap();

        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            report.warnings[0].step,
            SoftStep::UserEnrollments(UserId::new(5))
        );
        assert!(repo.get_user(UserId::new(5)).await.unwrap().is_none());
        assert_eq!(repo.completion_count(UserId::new(5)).await, 0);
    }

    #[tokio::test]
    async fn unknown_course_is_not_found() {
        let cleanup = ProgressCleanup::new(fixed_clock(), Arc::new(InMemoryRepository::new()));
        assert!(matches!(
            cleanup.remove_course(CourseId::new(9)).await,
            Err(CleanupError::CourseNotFound(_))
        ));
    }
}
