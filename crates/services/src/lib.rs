#![forbid(unsafe_code)]

pub mod api;
pub mod app_services;
pub mod auth;
pub mod cleanup_service;
pub mod error;
pub mod profile_service;
pub mod progress;
pub mod sync_service;

pub use progress_core::Clock;

pub use api::{
    ProgressApi, SyncCompletedCoursesResponse, SyncUserProgressResponse, ToggleProgressRequest,
    ToggleProgressResponse,
};
pub use app_services::AppServices;
pub use auth::{Principal, StaticTokenVerifier, TokenVerifier};
pub use cleanup_service::{CleanupReport, PartialWarning, ProgressCleanup};
pub use error::{
    ApiError, AppServicesError, AuthError, CleanupError, ErrorBody, ProfileError, ProgressError,
};
pub use profile_service::{CourseProgress, ModuleStatus, ProfileProjector, UserProfile};
pub use progress::{
    AggregateRecomputer, CompletionToggle, EnrollmentService, ModuleReconciler, ProgressService,
    Reconciled, Recomputed, ToggleOutcome, ToggleProgress,
};
pub use sync_service::SyncService;
