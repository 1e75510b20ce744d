use progress_core::model::{Course, Module, User};

use super::SqliteRepository;
use super::mapping::{db, id_i64};
use crate::repository::{CatalogRepository, StorageError};

#[async_trait::async_trait]
impl CatalogRepository for SqliteRepository {
    async fn upsert_user(&self, user: &User) -> Result<(), StorageError> {
        let aggregates = user.aggregates();
        sqlx::query(
            r"
                INSERT INTO users (id, username, email, role, progress, completed_courses)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    -- cached aggregates belong to the progress engine
                    username = excluded.username,
                    email = excluded.email,
                    role = excluded.role
            ",
        )
        .bind(id_i64("user_id", user.id().value())?)
        .bind(user.username())
        .bind(user.email())
        .bind(user.role().as_str())
        .bind(i64::from(aggregates.progress.value()))
        .bind(i64::from(aggregates.completed_courses))
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO courses (id, title, level)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    level = excluded.level
            ",
        )
        .bind(id_i64("course_id", course.id().value())?)
        .bind(course.title())
        .bind(course.level())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO course_modules (id, course_id, title, description, content, video_url)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    content = excluded.content,
                    video_url = excluded.video_url
                WHERE course_modules.course_id = excluded.course_id
            ",
        )
        .bind(id_i64("module_id", module.id().value())?)
        .bind(id_i64("course_id", module.course_id().value())?)
        .bind(module.title())
        .bind(module.description())
        .bind(module.content())
        .bind(module.video_url())
        .execute(&self.pool)
        .await
        .map_err(db)?;

        // A module id already owned by another course is left untouched.
        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }
}
