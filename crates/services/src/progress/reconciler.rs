use progress_core::model::{CourseId, Module, ModuleId};
use storage::repository::{ProgressUnit, StorageError};
use tracing::{debug, info, warn};

use crate::error::ProgressError;

/// What `ModuleReconciler::ensure_module` found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The module was already in the catalog.
    Existing,
    /// A placeholder module was inserted.
    Created,
    /// Another writer inserted the module between our check and our insert.
    Concurrent,
}

/// Repairs references to modules the client knows about but the store does not.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleReconciler;

impl ModuleReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Guarantee that `module_id` exists.
    ///
    /// Missing modules get a placeholder row under `course_id`. An id already
    /// owned by another course is left as it is, and so is a collision with a
    /// concurrent insert of the same id.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Transaction` on store failure.
    pub async fn ensure_module(
        &self,
        unit: &mut dyn ProgressUnit,
        module_id: ModuleId,
        course_id: CourseId,
    ) -> Result<Reconciled, ProgressError> {
        if let Some(owner) = unit.module_owner(module_id).await? {
            note_owner(module_id, owner, course_id);
            return Ok(Reconciled::Existing);
        }

        let placeholder = Module::placeholder(module_id, course_id);
        if unit.insert_module_if_absent(&placeholder).await? {
            info!(module_id = %module_id, course_id = %course_id, "placeholder module created");
            return Ok(Reconciled::Created);
        }

        debug!(module_id = %module_id, "module inserted concurrently");
        match unit.module_owner(module_id).await? {
            Some(owner) => {
                note_owner(module_id, owner, course_id);
                Ok(Reconciled::Concurrent)
            }
            None => Err(ProgressError::Transaction(StorageError::NotFound)),
        }
    }
}

fn note_owner(module: ModuleId, owner: CourseId, requested: CourseId) {
    if owner != requested {
        warn!(
            module_id = %module,
            owner = %owner,
            requested = %requested,
            "module id belongs to another course"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::Course;
    use storage::memory::InMemoryRepository;
    use storage::repository::{CatalogRepository, ProgressStore};

    async fn repo_with_courses() -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        for id in [7, 8] {
            repo.upsert_course(&Course::new(CourseId::new(id), "Course", "beginner").unwrap())
                .await
                .unwrap();
        }
        repo.upsert_module(
            &Module::new(ModuleId::new(41), CourseId::new(7), "Intro", "", "", None).unwrap(),
        )
        .await
        .unwrap();
        repo
    }

    #[tokio::test]
    async fn existing_module_is_left_alone() {
        let repo = repo_with_courses().await;
        let mut unit = repo.begin().await.unwrap();
        let outcome = ModuleReconciler::new()
            .ensure_module(unit.as_mut(), ModuleId::new(41), CourseId::new(7))
            .await
            .unwrap();
        assert_eq!(outcome, Reconciled::Existing);
    }

    #[tokio::test]
    async fn missing_module_becomes_placeholder() {
        let repo = repo_with_courses().await;
        let mut unit = repo.begin().await.unwrap();
        let outcome = ModuleReconciler::new()
            .ensure_module(unit.as_mut(), ModuleId::new(99), CourseId::new(7))
            .await
            .unwrap();
        assert_eq!(outcome, Reconciled::Created);
        unit.commit().await.unwrap();

        let module = repo.module(ModuleId::new(99)).await.unwrap();
        assert_eq!(module.title(), "Module 99");
        assert_eq!(module.course_id(), CourseId::new(7));
    }

    #[tokio::test]
    async fn module_of_another_course_keeps_its_owner() {
        let repo = repo_with_courses().await;
        let mut unit = repo.begin().await.unwrap();
        let outcome = ModuleReconciler::new()
            .ensure_module(unit.as_mut(), ModuleId::new(41), CourseId::new(8))
            .await
            .unwrap();
        assert_eq!(outcome, Reconciled::Existing);
        unit.commit().await.unwrap();

        let module = repo.module(ModuleId::new(41)).await.unwrap();
        assert_eq!(module.course_id(), CourseId::new(7));
        assert_eq!(module.title(), "Intro");
    }
}
