use thiserror::Error;

use crate::model::{CourseError, ParseIdError, ProgressError, UserError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    ParseId(#[from] ParseIdError),
}
