use thiserror::Error;

use crate::model::ids::{CourseId, ModuleId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("module title cannot be empty")]
    EmptyModuleTitle,
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// Catalog course. Its module count is derived from the module table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    id: CourseId,
    title: String,
    level: String,
}

impl Course {
    /// # Errors
    ///
    /// Returns `CourseError::EmptyTitle` if the title is blank.
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        level: impl Into<String>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyTitle);
        }
        Ok(Self {
            id,
            title,
            level: level.into(),
        })
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn level(&self) -> &str {
        &self.level
    }
}

//
// ─── MODULE ────────────────────────────────────────────────────────────────────
//

pub const PLACEHOLDER_DESCRIPTION: &str = "Auto-generated module";
pub const PLACEHOLDER_CONTENT: &str = "<p>This module was automatically generated.</p>";

/// A learning module. Belongs to exactly one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    id: ModuleId,
    course_id: CourseId,
    title: String,
    description: String,
    content: String,
    video_url: Option<String>,
}

impl Module {
    /// # Errors
    ///
    /// Returns `CourseError::EmptyModuleTitle` if the title is blank.
    pub fn new(
        id: ModuleId,
        course_id: CourseId,
        title: impl Into<String>,
        description: impl Into<String>,
        content: impl Into<String>,
        video_url: Option<String>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyModuleTitle);
        }
        Ok(Self {
            id,
            course_id,
            title,
            description: description.into(),
            content: content.into(),
            video_url,
        })
    }

    /// Stand-in row for a module that a client referenced before it was stored.
    #[must_use]
    pub fn placeholder(id: ModuleId, course_id: CourseId) -> Self {
        Self {
            id,
            course_id,
            title: format!("Module {id}"),
            description: PLACEHOLDER_DESCRIPTION.to_owned(),
            content: PLACEHOLDER_CONTENT.to_owned(),
            video_url: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn video_url(&self) -> Option<&str> {
        self.video_url.as_deref()
    }
}
