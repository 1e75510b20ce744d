use std::sync::Arc;

use progress_core::model::{CourseId, ModuleId, ProgressPercent, UserId};
use progress_core::time::Clock;
use storage::repository::ProgressStore;
use tracing::info;

use super::aggregate::AggregateRecomputer;
use super::enrollment::EnrollmentService;
use super::reconciler::{ModuleReconciler, Reconciled};
use super::toggle::CompletionToggle;
use crate::error::ProgressError;

/// One completion toggle requested by an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleProgress {
    pub course_id: CourseId,
    pub module_id: ModuleId,
    pub completed: bool,
}

/// Everything a toggle changed or derived, after commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub course_completed: bool,
    pub completed_courses: u32,
    pub progress: ProgressPercent,
    pub enrolled: bool,
    pub module: Reconciled,
    pub changed: bool,
}

/// Runs a completion toggle as one atomic unit of work.
///
/// Order: lock the user row, check the course, ensure enrollment, reconcile
/// the module, toggle the completion, recompute aggregates, commit. Any error
/// drops the unit and rolls every step back.
#[derive(Clone)]
pub struct ProgressService {
    store: Arc<dyn ProgressStore>,
    enrollment: EnrollmentService,
    reconciler: ModuleReconciler,
    toggle: CompletionToggle,
    recomputer: AggregateRecomputer,
}

impl ProgressService {
    #[must_use]
    pub fn new(clock: Clock, store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            enrollment: EnrollmentService::new(clock),
            reconciler: ModuleReconciler::new(),
            toggle: CompletionToggle::new(clock),
            recomputer: AggregateRecomputer::new(clock),
        }
    }

    /// # Errors
    ///
    /// - `ProgressError::UserNotFound` / `CourseNotFound` when either row is missing.
    /// - `ProgressError::Transaction` on any store failure, commit included.
    pub async fn toggle_progress(
        &self,
        user_id: UserId,
        request: ToggleProgress,
    ) -> Result<ToggleOutcome, ProgressError> {
        let ToggleProgress {
            course_id,
            module_id,
            completed,
        } = request;

        let mut unit = self.store.begin().await?;
        if !unit.lock_user(user_id).await? {
            return Err(ProgressError::UserNotFound(user_id));
        }
        if !unit.course_exists(course_id).await? {
            return Err(ProgressError::CourseNotFound(course_id));
        }

        let enrolled = self
            .enrollment
            .ensure_enrolled(unit.as_mut(), user_id, course_id)
            .await?;
        let module = self
            .reconciler
            .ensure_module(unit.as_mut(), module_id, course_id)
            .await?;
        let changed = self
            .toggle
            .set_completion(unit.as_mut(), user_id, course_id, module_id, completed)
            .await?;
        let recomputed = self
            .recomputer
            .recompute(unit.as_mut(), user_id, course_id)
            .await?;

        unit.commit().await?;
        info!(
            user_id = %user_id,
            course_id = %course_id,
            module_id = %module_id,
            completed,
            course_completed = recomputed.course_completed,
            "progress toggled"
        );

        Ok(ToggleOutcome {
            course_completed: recomputed.course_completed,
            completed_courses: recomputed.aggregates.completed_courses,
            progress: recomputed.aggregates.progress,
            enrolled,
            module,
            changed,
        })
    }
}
