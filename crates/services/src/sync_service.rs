use std::sync::Arc;

use progress_core::model::{UserAggregates, UserId};
use progress_core::time::Clock;
use storage::repository::ProgressStore;
use tracing::info;

use crate::error::ProgressError;
use crate::progress::AggregateRecomputer;

/// Out-of-band repair of a user's cached counters.
///
/// Both entry points recompute from scratch inside their own unit of work,
/// so running them repeatedly converges on the same values.
#[derive(Clone)]
pub struct SyncService {
    store: Arc<dyn ProgressStore>,
    recomputer: AggregateRecomputer,
}

impl SyncService {
    #[must_use]
    pub fn new(clock: Clock, store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            recomputer: AggregateRecomputer::new(clock),
        }
    }

    /// Recount completed enrollments and overwrite only `completed_courses`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::UserNotFound` if the user is missing, or
    /// `ProgressError::Transaction` on store failure.
    pub async fn sync_completed_courses(&self, user_id: UserId) -> Result<u32, ProgressError> {
        let mut unit = self.store.begin().await?;
        if !unit.lock_user(user_id).await? {
            return Err(ProgressError::UserNotFound(user_id));
        }

        let completed_courses = unit.count_completed_enrollments(user_id).await?;
        unit.write_completed_courses(user_id, completed_courses)
            .await?;
        unit.commit().await?;

        info!(user_id = %user_id, completed_courses, "completed courses synced");
        Ok(completed_courses)
    }

    /// Recompute and overwrite both `progress` and `completed_courses`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::UserNotFound` if the user is missing, or
    /// `ProgressError::Transaction` on store failure.
    pub async fn sync_user_progress(
        &self,
        user_id: UserId,
    ) -> Result<UserAggregates, ProgressError> {
        let mut unit = self.store.begin().await?;
        if !unit.lock_user(user_id).await? {
            return Err(ProgressError::UserNotFound(user_id));
        }

        let aggregates = self.recomputer.refresh_user(unit.as_mut(), user_id).await?;
        unit.commit().await?;

        info!(user_id = %user_id, progress = aggregates.progress.value(), "user progress synced");
        Ok(aggregates)
    }
}
