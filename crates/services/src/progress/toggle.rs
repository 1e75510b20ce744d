use progress_core::model::{Completion, CourseId, ModuleId, UserId};
use progress_core::time::Clock;
use storage::repository::ProgressUnit;
use tracing::debug;

use crate::error::ProgressError;

/// Sets or clears one (user, course, module) completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionToggle {
    clock: Clock,
}

impl CompletionToggle {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self { clock }
    }

    /// Bring the completion row in line with `completed`. Returns `true` when a row changed.
    ///
    /// Both directions are idempotent. Deletes are scoped by the full key so
    /// the same module id under another course is never touched.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Transaction` if the store fails.
    pub async fn set_completion(
        &self,
        unit: &mut dyn ProgressUnit,
        user_id: UserId,
        course_id: CourseId,
        module_id: ModuleId,
        completed: bool,
    ) -> Result<bool, ProgressError> {
        let changed = if completed {
            let completion = Completion {
                user_id,
                course_id,
                module_id,
                completed_at: self.clock.now(),
            };
            unit.insert_completion(&completion).await?
        } else {
            unit.delete_completion(user_id, course_id, module_id)
                .await?
        };

        debug!(
            user_id = %user_id,
            module_id = %module_id,
            completed,
            changed,
            "completion toggled"
        );
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{Course, Module, Role, User};
    use progress_core::time::fixed_clock;
    use storage::memory::InMemoryRepository;
    use storage::repository::{CatalogRepository, ProgressStore};

    #[tokio::test]
    async fn both_directions_are_idempotent() {
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

        let toggle = CompletionToggle::new(fixed_clock());
        let (user, course, module) = (UserId::new(5), CourseId::new(7), ModuleId::new(41));
        let mut unit = repo.begin().await.unwrap();

        assert!(toggle.set_completion(unit.as_mut(), user, course, module, true).await.unwrap());
        assert!(!toggle.set_completion(unit.as_mut(), user, course, module, true).await.unwrap());
        assert_eq!(unit.course_counts(user, course).await.unwrap().completed, 1);

        assert!(toggle.set_completion(unit.as_mut(), user, course, module, false).await.unwrap());
        assert!(!toggle.set_completion(unit.as_mut(), user, course, module, false).await.unwrap());
        assert_eq!(unit.course_counts(user, course).await.unwrap().completed, 0);
    }
}
