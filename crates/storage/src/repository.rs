use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::model::{
    Completion, Course, CourseId, Enrollment, Module, ModuleCounts, ModuleId, User,
    UserAggregates, UserId,
};
use thiserror::Error;

use crate::memory::InMemoryRepository;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Secondary deletions that cleanup runs best-effort.
///
/// Each step executes in its own savepoint so a failure leaves the enclosing
/// unit of work usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoftStep {
    CourseCompletions(CourseId),
    CourseEnrollments(CourseId),
    UserCompletions(UserId),
    UserEnrollments(UserId),
}

impl fmt::Display for SoftStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoftStep::CourseCompletions(id) => write!(f, "completed modules of course {id}"),
            SoftStep::CourseEnrollments(id) => write!(f, "enrollments of course {id}"),
            SoftStep::UserCompletions(id) => write!(f, "completed modules of user {id}"),
            SoftStep::UserEnrollments(id) => write!(f, "enrollments of user {id}"),
        }
    }
}

/// One row of a course checklist: a module and whether the user finished it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleProgressRecord {
    pub module_id: ModuleId,
    pub title: String,
    pub completed: bool,
}

/// Opens units of work against the progress tables.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Start a unit of work. Dropping it without `commit` rolls everything back.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if no connection can be acquired.
    async fn begin(&self) -> Result<Box<dyn ProgressUnit>, StorageError>;
}

/// A single atomic unit of work over users, enrollments, modules and completions.
///
/// All methods return `StorageError` when the underlying store fails; callers
/// abort the unit on any such error.
#[async_trait]
pub trait ProgressUnit: Send {
    /// Take the write lock on a user's aggregate row for the rest of the unit.
    /// Returns `false` if the user does not exist.
    async fn lock_user(&mut self, user_id: UserId) -> Result<bool, StorageError>;

    /// Take the write lock on a course row. Returns `false` if the course does not exist.
    async fn lock_course(&mut self, course_id: CourseId) -> Result<bool, StorageError>;

    async fn course_exists(&mut self, course_id: CourseId) -> Result<bool, StorageError>;

    async fn enrollment(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError>;

    /// Insert unless a row for the same (user, course) exists. Returns `true` if inserted.
    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> Result<bool, StorageError>;

    /// Course that owns the module, if the module exists at all.
    async fn module_owner(&mut self, module_id: ModuleId)
    -> Result<Option<CourseId>, StorageError>;

    /// Insert unless the module id is taken. Returns `true` if inserted.
    async fn insert_module_if_absent(&mut self, module: &Module) -> Result<bool, StorageError>;

    /// Insert unless the (user, module) completion exists. Returns `true` if inserted.
    ///
    /// The module only has to exist; it may belong to a course other than
    /// `completion.course_id`.
    async fn insert_completion(&mut self, completion: &Completion) -> Result<bool, StorageError>;

    /// Delete the completion matching the full (user, course, module) key.
    async fn delete_completion(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
        module_id: ModuleId,
    ) -> Result<bool, StorageError>;

    /// Modules of one course, and the user's completions among them.
    async fn course_counts(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<ModuleCounts, StorageError>;

    /// Modules across every course, and all of the user's completions.
    async fn global_counts(&mut self, user_id: UserId) -> Result<ModuleCounts, StorageError>;

    /// Flip the enrollment latch if still open. Returns `true` only when it flipped.
    async fn mark_enrollment_completed(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    async fn count_completed_enrollments(&mut self, user_id: UserId) -> Result<u32, StorageError>;

    async fn write_aggregates(
        &mut self,
        user_id: UserId,
        aggregates: UserAggregates,
    ) -> Result<(), StorageError>;

    async fn write_completed_courses(
        &mut self,
        user_id: UserId,
        completed_courses: u32,
    ) -> Result<(), StorageError>;

    /// Every user with at least one completion or enrollment, in id order.
    async fn users_with_progress(&mut self) -> Result<Vec<UserId>, StorageError>;

    async fn delete_course_modules(&mut self, course_id: CourseId) -> Result<u64, StorageError>;

    async fn delete_course(&mut self, course_id: CourseId) -> Result<bool, StorageError>;

    async fn delete_user(&mut self, user_id: UserId) -> Result<bool, StorageError>;

    /// Run a best-effort deletion inside a savepoint. On error the savepoint is
    /// rolled back and the unit stays usable.
    async fn run_soft_step(&mut self, step: SoftStep) -> Result<u64, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the commit fails; nothing is persisted then.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;
}

/// Read-only queries behind the profile projection.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StorageError>;

    async fn get_course(&self, course_id: CourseId) -> Result<Option<Course>, StorageError>;

    async fn get_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError>;

    /// Modules of a course in id order, flagged with the user's completion state.
    async fn course_checklist(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<ModuleProgressRecord>, StorageError>;
}

/// Minimal catalog writes used for seeding and fixtures.
///
/// `upsert_user` never touches the cached aggregates of an existing user.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn upsert_user(&self, user: &User) -> Result<(), StorageError>;

    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError>;

    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError>;
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressStore>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_memory(&InMemoryRepository::new())
    }

    /// Share an existing in-memory repository, keeping a handle for fault injection.
    #[must_use]
    pub fn from_memory(repo: &InMemoryRepository) -> Self {
        let progress: Arc<dyn ProgressStore> = Arc::new(repo.clone());
        let profiles: Arc<dyn ProfileRepository> = Arc::new(repo.clone());
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo.clone());
        Self {
            progress,
            profiles,
            catalog,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_step_display_names_the_target() {
        let step = SoftStep::CourseEnrollments(CourseId::new(7));
        assert_eq!(step.to_string(), "enrollments of course 7");
    }

    #[test]
    fn storage_handles_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Storage>();
    }
}
