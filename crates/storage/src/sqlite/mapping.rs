use chrono::{DateTime, Utc};
use progress_core::model::{
    Course, CourseId, Enrollment, ModuleId, ProgressPercent, Role, User, UserAggregates, UserId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn db(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn count_from_i64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    i64_to_u64(field, v)
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn module_id_from_i64(v: i64) -> Result<ModuleId, StorageError> {
    Ok(ModuleId::new(i64_to_u64("module_id", v)?))
}

pub(crate) fn map_user_row(row: &sqlx::sqlite::SqliteRow) -> Result<User, StorageError> {
    let id = user_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let username: String = row.try_get("username").map_err(ser)?;
    let email: String = row.try_get("email").map_err(ser)?;
    let role_str: String = row.try_get("role").map_err(ser)?;
    let role = Role::parse(&role_str).map_err(ser)?;
    let progress = ProgressPercent::new(i64_to_u64(
        "progress",
        row.try_get::<i64, _>("progress").map_err(ser)?,
    )?)
    .map_err(ser)?;
    let completed_courses = u32_from_i64(
        "completed_courses",
        row.try_get::<i64, _>("completed_courses").map_err(ser)?,
    )?;

    User::from_persisted(
        id,
        username,
        email,
        role,
        UserAggregates::new(progress, completed_courses),
    )
    .map_err(ser)
}

pub(crate) fn map_course_row(row: &sqlx::sqlite::SqliteRow) -> Result<Course, StorageError> {
    let id = course_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let title: String = row.try_get("title").map_err(ser)?;
    let level: String = row.try_get("level").map_err(ser)?;
    Course::new(id, title, level).map_err(ser)
}

pub(crate) fn map_enrollment_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<Enrollment, StorageError> {
    let user_id = user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?;
    let course_id = course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?;
    let completed: bool = row.try_get("completed").map_err(ser)?;
    let enrolled_at: DateTime<Utc> = row.try_get("enrolled_at").map_err(ser)?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(ser)?;

    // A completed row always carries a timestamp; older rows without one fall
    // back to the enrollment time so the latch is not lost.
    let completed_at = match (completed, completed_at) {
        (false, _) => None,
        (true, Some(at)) => Some(at),
        (true, None) => Some(enrolled_at),
    };
    Ok(Enrollment::from_persisted(
        user_id,
        course_id,
        enrolled_at,
        completed_at,
    ))
}
