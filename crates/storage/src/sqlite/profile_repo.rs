use progress_core::model::{Course, CourseId, Enrollment, User, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    db, id_i64, map_course_row, map_enrollment_row, map_user_row, module_id_from_i64, ser,
};
use crate::repository::{ModuleProgressRecord, ProfileRepository, StorageError};

#[async_trait::async_trait]
impl ProfileRepository for SqliteRepository {
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, username, email, role, progress, completed_courses
                FROM users
                WHERE id = ?1
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(map_user_row).transpose()
    }

    async fn get_course(&self, course_id: CourseId) -> Result<Option<Course>, StorageError> {
        let row = sqlx::query("SELECT id, title, level FROM courses WHERE id = ?1")
            .bind(id_i64("course_id", course_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.as_ref().map(map_course_row).transpose()
    }

    async fn get_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT user_id, course_id, completed, enrolled_at, completed_at
                FROM user_courses
                WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(map_enrollment_row).transpose()
    }

    async fn course_checklist(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<ModuleProgressRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    m.id, m.title,
                    EXISTS (
                        SELECT 1 FROM completed_modules cm
                        WHERE cm.user_id = ?1
                          AND cm.course_id = m.course_id
                          AND cm.module_id = m.id
                    ) AS completed
                FROM course_modules m
                WHERE m.course_id = ?2
                ORDER BY m.id ASC
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(ModuleProgressRecord {
                module_id: module_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
                title: row.try_get("title").map_err(ser)?,
                completed: row.try_get("completed").map_err(ser)?,
            });
        }
        Ok(out)
    }
}
