//! Transport-agnostic request edge: credential in, typed response out.
//!
//! Every entry point authenticates before touching the engine, so a bad
//! credential never opens a unit of work.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use progress_core::model::{CourseId, ModuleId, ProgressPercent};

use crate::auth::{Principal, TokenVerifier, bearer_token};
use crate::error::ApiError;
use crate::profile_service::{ProfileProjector, UserProfile};
use crate::progress::{ProgressService, ToggleProgress};
use crate::sync_service::SyncService;

/// Body of a toggle request, as sent by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleProgressRequest {
    pub course_id: u64,
    pub module_id: u64,
    pub completed: bool,
}

impl ToggleProgressRequest {
    /// # Errors
    ///
    /// Returns `ApiError::Validation` for zero ids.
    pub fn validate(self) -> Result<ToggleProgress, ApiError> {
        if self.course_id == 0 {
            return Err(ApiError::Validation("courseId must be positive".into()));
        }
        if self.module_id == 0 {
            return Err(ApiError::Validation("moduleId must be positive".into()));
        }
        Ok(ToggleProgress {
            course_id: CourseId::new(self.course_id),
            module_id: ModuleId::new(self.module_id),
            completed: self.completed,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleProgressResponse {
    pub success: bool,
    pub course_completed: bool,
    pub completed_courses: u32,
    pub progress: ProgressPercent,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncCompletedCoursesResponse {
    pub success: bool,
    pub completed_courses: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncUserProgressResponse {
    pub progress: ProgressPercent,
    pub completed_courses: u32,
    pub message: String,
}

#[derive(Clone)]
pub struct ProgressApi {
    verifier: Arc<dyn TokenVerifier>,
    progress: ProgressService,
    sync: SyncService,
    profiles: ProfileProjector,
}

impl ProgressApi {
    #[must_use]
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        progress: ProgressService,
        sync: SyncService,
        profiles: ProfileProjector,
    ) -> Self {
        Self {
            verifier,
            progress,
            sync,
            profiles,
        }
    }

    /// Record or clear a module completion for the caller.
    ///
    /// # Errors
    ///
    /// `Auth` for a missing or rejected credential, `Validation` for a
    /// malformed body, `NotFound` for an
    /// unknown course or user, `Transaction` for store failures.
    pub async fn toggle_progress(
        &self,
        authorization: Option<&str>,
        body: &str,
    ) -> Result<ToggleProgressResponse, ApiError> {
        let principal = self.authenticate(authorization)?;
        let request = serde_json::from_str::<ToggleProgressRequest>(body)
            .map_err(ApiError::from)
            .and_then(ToggleProgressRequest::validate)
            .inspect_err(reject)?;

        let outcome = self
            .progress
            .toggle_progress(principal.user_id, request)
            .await
            .map_err(ApiError::from)
            .inspect_err(reject)?;

        Ok(ToggleProgressResponse {
            success: true,
            course_completed: outcome.course_completed,
            completed_courses: outcome.completed_courses,
            progress: outcome.progress,
            message: "Progress updated successfully".to_owned(),
        })
    }

    /// # Errors
    ///
    /// `Auth`, `NotFound` or `Transaction`, as for `toggle_progress`.
    pub async fn sync_completed_courses(
        &self,
        authorization: Option<&str>,
    ) -> Result<SyncCompletedCoursesResponse, ApiError> {
        let principal = self.authenticate(authorization)?;
        let completed_courses = self
            .sync
            .sync_completed_courses(principal.user_id)
            .await
            .map_err(ApiError::from)
            .inspect_err(reject)?;
        Ok(SyncCompletedCoursesResponse {
            success: true,
            completed_courses,
        })
    }

    /// # Errors
    ///
    /// `Auth`, `NotFound` or `Transaction`, as for `toggle_progress`.
    pub async fn sync_user_progress(
        &self,
        authorization: Option<&str>,
    ) -> Result<SyncUserProgressResponse, ApiError> {
        let principal = self.authenticate(authorization)?;
        let aggregates = self
            .sync
            .sync_user_progress(principal.user_id)
            .await
            .map_err(ApiError::from)
            .inspect_err(reject)?;
        Ok(SyncUserProgressResponse {
            progress: aggregates.progress,
            completed_courses: aggregates.completed_courses,
            message: "User progress synchronized successfully".to_owned(),
        })
    }

    /// # Errors
    ///
    /// `Auth` for a bad credential, `NotFound` if the caller's user row is gone.
    pub async fn profile(&self, authorization: Option<&str>) -> Result<UserProfile, ApiError> {
        let principal = self.authenticate(authorization)?;
        self.profiles
            .profile(principal.user_id)
            .await
            .map_err(ApiError::from)
            .inspect_err(reject)
    }

    fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, ApiError> {
        let principal = bearer_token(authorization)
            .and_then(|token| self.verifier.verify(token))
            .map_err(ApiError::from)
            .inspect_err(reject)?;
        debug!(user_id = %principal.user_id, role = principal.role.as_str(), "authenticated");
        Ok(principal)
    }
}

fn reject(err: &ApiError) {
    warn!(status = err.status(), error = %err, "request rejected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_keys() {
        let request: ToggleProgressRequest =
            serde_json::from_str(r#"{"courseId":7,"moduleId":41,"completed":true}"#).unwrap();
        let toggle = request.validate().unwrap();
        assert_eq!(toggle.course_id, CourseId::new(7));
        assert_eq!(toggle.module_id, ModuleId::new(41));
        assert!(toggle.completed);
    }

    #[test]
    fn zero_ids_are_invalid() {
        let request = ToggleProgressRequest {
            course_id: 0,
            module_id: 41,
            completed: true,
        };
        assert!(matches!(request.validate(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn toggle_response_serializes_with_wire_names() {
        let response = ToggleProgressResponse {
            success: true,
            course_completed: false,
            completed_courses: 1,
            progress: ProgressPercent::new(33).unwrap(),
            message: "Progress updated successfully".into(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["courseCompleted"], false);
        assert_eq!(json["completedCourses"], 1);
        assert_eq!(json["progress"], 33);
    }

    #[test]
    fn sync_responses_keep_snake_case() {
        let json = serde_json::to_value(SyncCompletedCoursesResponse {
            success: true,
            completed_courses: 2,
        })
        .unwrap();
        assert_eq!(json["completed_courses"], 2);
    }
}
