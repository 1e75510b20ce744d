mod course;
mod enrollment;
mod ids;
mod progress;
mod user;

pub use ids::{CourseId, ModuleId, ParseIdError, UserId};

pub use course::{Course, CourseError, Module, PLACEHOLDER_CONTENT, PLACEHOLDER_DESCRIPTION};
pub use enrollment::{Completion, Enrollment};
pub use progress::{ModuleCounts, ProgressError, ProgressPercent, UserAggregates};
pub use user::{Role, User, UserError};
