use std::sync::Arc;

use storage::repository::Storage;
use storage::sqlite::PoolConfig;

use crate::Clock;
use crate::api::ProgressApi;
use crate::auth::TokenVerifier;
use crate::cleanup_service::ProgressCleanup;
use crate::error::AppServicesError;
use crate::profile_service::ProfileProjector;
use crate::progress::ProgressService;
use crate::sync_service::SyncService;

/// Assembles the progress services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    progress: Arc<ProgressService>,
    sync: Arc<SyncService>,
    profiles: Arc<ProfileProjector>,
    cleanup: Arc<ProgressCleanup>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage, running migrations first.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if connecting or migrating fails.
    pub async fn new_sqlite(
        db_url: &str,
        pool: &PoolConfig,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url, pool).await?;
        Ok(Self::from_storage(clock, storage))
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: Storage) -> Self {
        let progress = Arc::new(ProgressService::new(clock, Arc::clone(&storage.progress)));
        let sync = Arc::new(SyncService::new(clock, Arc::clone(&storage.progress)));
        let profiles = Arc::new(ProfileProjector::new(Arc::clone(&storage.profiles)));
        let cleanup = Arc::new(ProgressCleanup::new(clock, Arc::clone(&storage.progress)));

        Self {
            storage,
            progress,
            sync,
            profiles,
            cleanup,
        }
    }

    /// Request edge over these services, authenticating with `verifier`.
    #[must_use]
    pub fn api(&self, verifier: Arc<dyn TokenVerifier>) -> ProgressApi {
        ProgressApi::new(
            verifier,
            ProgressService::clone(&self.progress),
            SyncService::clone(&self.sync),
            ProfileProjector::clone(&self.profiles),
        )
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn sync(&self) -> Arc<SyncService> {
        Arc::clone(&self.sync)
    }

    #[must_use]
    pub fn profiles(&self) -> Arc<ProfileProjector> {
        Arc::clone(&self.profiles)
    }

    #[must_use]
    pub fn cleanup(&self) -> Arc<ProgressCleanup> {
        Arc::clone(&self.cleanup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn services_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AppServices>();
        assert_send_sync::<ProgressApi>();
    }
}
