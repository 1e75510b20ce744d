use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::model::{
    Completion, Course, CourseId, Enrollment, Module, ModuleCounts, ModuleId, User,
    UserAggregates, UserId,
};
use tokio::sync::OwnedMutexGuard;

use crate::repository::{
    CatalogRepository, ModuleProgressRecord, ProfileRepository, ProgressStore, ProgressUnit,
    SoftStep, StorageError,
};

/// Failures the in-memory backend can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Every write to a user's cached aggregates fails.
    AggregateWrite,
    /// The given best-effort deletion fails.
    SoftStep(SoftStep),
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: BTreeMap<UserId, User>,
    courses: BTreeMap<CourseId, Course>,
    modules: BTreeMap<ModuleId, Module>,
    enrollments: BTreeMap<(UserId, CourseId), Enrollment>,
    completions: BTreeMap<(UserId, ModuleId), Completion>,
}

impl MemoryState {
    fn drop_module_completions(&mut self, module_ids: &HashSet<ModuleId>) {
        self.completions
            .retain(|(_, module_id), _| !module_ids.contains(module_id));
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// A unit of work holds the whole store's lock until it is committed or
/// dropped, so units are fully serialized. Writes go to a private copy that
/// replaces the shared state only on commit.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<tokio::sync::Mutex<MemoryState>>,
    faults: Arc<Mutex<HashSet<Fault>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent units of work fail in the given way.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the fault registry is poisoned.
    pub fn inject_fault(&self, fault: Fault) -> Result<(), StorageError> {
        let mut guard = self
            .faults
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(fault);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the fault registry is poisoned.
    pub fn clear_faults(&self) -> Result<(), StorageError> {
        let mut guard = self
            .faults
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.clear();
        Ok(())
    }

    /// Overwrite a user's cached aggregates without recomputing them.
    ///
    /// Simulates a writer that bypasses the engine, for drift-repair tests.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user does not exist.
    pub async fn overwrite_aggregates(
        &self,
        user_id: UserId,
        aggregates: UserAggregates,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        let user = state.users.remove(&user_id).ok_or(StorageError::NotFound)?;
        state
            .users
            .insert(user_id, user.with_aggregates(aggregates));
        Ok(())
    }

    /// Number of completion rows stored for a user.
    pub async fn completion_count(&self, user_id: UserId) -> usize {
        let state = self.state.lock().await;
        state
            .completions
            .keys()
            .filter(|(uid, _)| *uid == user_id)
            .count()
    }

    /// Look up a module by id regardless of course.
    pub async fn module(&self, module_id: ModuleId) -> Option<Module> {
        let state = self.state.lock().await;
        state.modules.get(&module_id).cloned()
    }

    fn fault_snapshot(&self) -> Result<HashSet<Fault>, StorageError> {
        let guard = self
            .faults
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.clone())
    }
}

struct MemoryUnit {
    shared: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    faults: HashSet<Fault>,
}

impl MemoryUnit {
    fn fail_if(&self, fault: Fault) -> Result<(), StorageError> {
        if self.faults.contains(&fault) {
            return Err(StorageError::Connection(format!("injected fault: {fault:?}")));
        }
        Ok(())
    }

    fn store_aggregates(
        &mut self,
        user_id: UserId,
        update: impl FnOnce(UserAggregates) -> UserAggregates,
    ) -> Result<(), StorageError> {
        self.fail_if(Fault::AggregateWrite)?;
        let user = self
            .working
            .users
            .remove(&user_id)
            .ok_or(StorageError::NotFound)?;
        let aggregates = update(user.aggregates());
        self.working
            .users
            .insert(user_id, user.with_aggregates(aggregates));
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for InMemoryRepository {
    async fn begin(&self) -> Result<Box<dyn ProgressUnit>, StorageError> {
        let faults = self.fault_snapshot()?;
        let shared = Arc::clone(&self.state).lock_owned().await;
        let working = shared.clone();
        Ok(Box::new(MemoryUnit {
            shared,
            working,
            faults,
        }))
    }
}

fn as_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

#[async_trait]
impl ProgressUnit for MemoryUnit {
    async fn lock_user(&mut self, user_id: UserId) -> Result<bool, StorageError> {
        Ok(self.working.users.contains_key(&user_id))
    }

    async fn lock_course(&mut self, course_id: CourseId) -> Result<bool, StorageError> {
        Ok(self.working.courses.contains_key(&course_id))
    }

    async fn course_exists(&mut self, course_id: CourseId) -> Result<bool, StorageError> {
        Ok(self.working.courses.contains_key(&course_id))
    }

    async fn enrollment(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        Ok(self.working.enrollments.get(&(user_id, course_id)).cloned())
    }

    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> Result<bool, StorageError> {
        let key = (enrollment.user_id(), enrollment.course_id());
        if self.working.enrollments.contains_key(&key) {
            return Ok(false);
        }
        self.working.enrollments.insert(key, enrollment.clone());
        Ok(true)
    }

    async fn module_owner(
        &mut self,
        module_id: ModuleId,
    ) -> Result<Option<CourseId>, StorageError> {
        Ok(self.working.modules.get(&module_id).map(Module::course_id))
    }

    async fn insert_module_if_absent(&mut self, module: &Module) -> Result<bool, StorageError> {
        if !self.working.courses.contains_key(&module.course_id()) {
            return Err(StorageError::Conflict);
        }
        if self.working.modules.contains_key(&module.id()) {
            return Ok(false);
        }
        self.working.modules.insert(module.id(), module.clone());
        Ok(true)
    }

    async fn insert_completion(&mut self, completion: &Completion) -> Result<bool, StorageError> {
        if !self.working.modules.contains_key(&completion.module_id) {
            return Err(StorageError::NotFound);
        }
        let key = (completion.user_id, completion.module_id);
        if self.working.completions.contains_key(&key) {
            return Ok(false);
        }
        self.working.completions.insert(key, completion.clone());
        Ok(true)
    }

    async fn delete_completion(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
        module_id: ModuleId,
    ) -> Result<bool, StorageError> {
        let key = (user_id, module_id);
        match self.working.completions.get(&key) {
            Some(existing) if existing.course_id == course_id => {
                self.working.completions.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn course_counts(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<ModuleCounts, StorageError> {
        let modules: HashSet<ModuleId> = self
            .working
            .modules
            .values()
            .filter(|m| m.course_id() == course_id)
            .map(Module::id)
            .collect();
        let completed = self
            .working
            .completions
            .values()
            .filter(|c| {
                c.user_id == user_id && c.course_id == course_id && modules.contains(&c.module_id)
            })
            .count();
        Ok(ModuleCounts::new(as_u64(completed), as_u64(modules.len())))
    }

    async fn global_counts(&mut self, user_id: UserId) -> Result<ModuleCounts, StorageError> {
        let completed = self
            .working
            .completions
            .keys()
            .filter(|(uid, _)| *uid == user_id)
            .count();
        Ok(ModuleCounts::new(
            as_u64(completed),
            as_u64(self.working.modules.len()),
        ))
    }

    async fn mark_enrollment_completed(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        Ok(self
            .working
            .enrollments
            .get_mut(&(user_id, course_id))
            .is_some_and(|e| e.mark_completed(at)))
    }

    async fn count_completed_enrollments(&mut self, user_id: UserId) -> Result<u32, StorageError> {
        let n = self
            .working
            .enrollments
            .values()
            .filter(|e| e.user_id() == user_id && e.is_completed())
            .count();
        u32::try_from(n).map_err(|_| StorageError::Serialization("completed_courses overflow".into()))
    }

    async fn write_aggregates(
        &mut self,
        user_id: UserId,
        aggregates: UserAggregates,
    ) -> Result<(), StorageError> {
        self.store_aggregates(user_id, |_| aggregates)
    }

    async fn write_completed_courses(
        &mut self,
        user_id: UserId,
        completed_courses: u32,
    ) -> Result<(), StorageError> {
        self.store_aggregates(user_id, |current| {
            UserAggregates::new(current.progress, completed_courses)
        })
    }

    async fn users_with_progress(&mut self) -> Result<Vec<UserId>, StorageError> {
        let users: BTreeSet<UserId> = self
            .working
            .completions
            .keys()
            .map(|(uid, _)| *uid)
            .chain(self.working.enrollments.keys().map(|(uid, _)| *uid))
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn delete_course_modules(&mut self, course_id: CourseId) -> Result<u64, StorageError> {
        let doomed: HashSet<ModuleId> = self
            .working
            .modules
            .values()
            .filter(|m| m.course_id() == course_id)
            .map(Module::id)
            .collect();
        self.working.modules.retain(|id, _| !doomed.contains(id));
        self.working.drop_module_completions(&doomed);
        Ok(as_u64(doomed.len()))
    }

    async fn delete_course(&mut self, course_id: CourseId) -> Result<bool, StorageError> {
        if self.working.courses.remove(&course_id).is_none() {
            return Ok(false);
        }
        self.delete_course_modules(course_id).await?;
        self.working
            .enrollments
            .retain(|(_, cid), _| *cid != course_id);
        self.working
            .completions
            .retain(|_, c| c.course_id != course_id);
        Ok(true)
    }

    async fn delete_user(&mut self, user_id: UserId) -> Result<bool, StorageError> {
        if self.working.users.remove(&user_id).is_none() {
            return Ok(false);
        }
        self.working.enrollments.retain(|(uid, _), _| *uid != user_id);
        self.working.completions.retain(|(uid, _), _| *uid != user_id);
        Ok(true)
    }

    async fn run_soft_step(&mut self, step: SoftStep) -> Result<u64, StorageError> {
        self.fail_if(Fault::SoftStep(step))?;
        let before = self.working.completions.len() + self.working.enrollments.len();
        match step {
            SoftStep::CourseCompletions(course_id) => {
                self.working.completions.retain(|_, c| c.course_id != course_id);
            }
            SoftStep::CourseEnrollments(course_id) => {
                self.working
                    .enrollments
                    .retain(|(_, cid), _| *cid != course_id);
            }
            SoftStep::UserCompletions(user_id) => {
                self.working.completions.retain(|(uid, _), _| *uid != user_id);
            }
            SoftStep::UserEnrollments(user_id) => {
                self.working.enrollments.retain(|(uid, _), _| *uid != user_id);
            }
        }
        let after = self.working.completions.len() + self.working.enrollments.len();
        Ok(as_u64(before - after))
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let MemoryUnit {
            mut shared,
            working,
            ..
        } = *self;
        *shared = working;
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.users.get(&user_id).cloned())
    }

    async fn get_course(&self, course_id: CourseId) -> Result<Option<Course>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.courses.get(&course_id).cloned())
    }

    async fn get_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.enrollments.get(&(user_id, course_id)).cloned())
    }

    async fn course_checklist(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<ModuleProgressRecord>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .modules
            .values()
            .filter(|m| m.course_id() == course_id)
            .map(|m| ModuleProgressRecord {
                module_id: m.id(),
                title: m.title().to_owned(),
                completed: state
                    .completions
                    .get(&(user_id, m.id()))
                    .is_some_and(|c| c.course_id == course_id),
            })
            .collect())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn upsert_user(&self, user: &User) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        let aggregates = state
            .users
            .get(&user.id())
            .map_or_else(|| user.aggregates(), User::aggregates);
        state
            .users
            .insert(user.id(), user.clone().with_aggregates(aggregates));
        Ok(())
    }

    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.courses.insert(course.id(), course.clone());
        Ok(())
    }

    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        if !state.courses.contains_key(&module.course_id()) {
            return Err(StorageError::Conflict);
        }
        if let Some(existing) = state.modules.get(&module.id()) {
            if existing.course_id() != module.course_id() {
                return Err(StorageError::Conflict);
            }
        }
        state.modules.insert(module.id(), module.clone());
        Ok(())
    }
}
