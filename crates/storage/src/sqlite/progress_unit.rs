use chrono::{DateTime, Utc};
use progress_core::model::{
    Completion, CourseId, Enrollment, Module, ModuleCounts, ModuleId, UserAggregates, UserId,
};
use sqlx::{Connection, Row, Sqlite, Transaction};

use super::SqliteRepository;
use super::mapping::{
    count_from_i64, course_id_from_i64, db, id_i64, map_enrollment_row, ser, u32_from_i64,
    user_id_from_i64,
};
use crate::repository::{ProgressStore, ProgressUnit, SoftStep, StorageError};

/// A unit of work over one pooled connection.
///
/// Callers issue a write (`lock_user`/`lock_course`) as the first statement, so
/// the transaction holds SQLite's write lock from its start and concurrent
/// read-then-write recomputations are serialized instead of interleaved.
pub(crate) struct SqliteProgressUnit {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait::async_trait]
impl ProgressStore for SqliteRepository {
    async fn begin(&self) -> Result<Box<dyn ProgressUnit>, StorageError> {
        let tx = self.pool.begin().await.map_err(db)?;
        Ok(Box::new(SqliteProgressUnit { tx }))
    }
}

#[async_trait::async_trait]
impl ProgressUnit for SqliteProgressUnit {
    async fn lock_user(&mut self, user_id: UserId) -> Result<bool, StorageError> {
        let res = sqlx::query("UPDATE users SET progress = progress WHERE id = ?1")
            .bind(id_i64("user_id", user_id.value())?)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(res.rows_affected() == 1)
    }

    async fn lock_course(&mut self, course_id: CourseId) -> Result<bool, StorageError> {
        let res = sqlx::query("UPDATE courses SET title = title WHERE id = ?1")
            .bind(id_i64("course_id", course_id.value())?)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(res.rows_affected() == 1)
    }

    async fn course_exists(&mut self, course_id: CourseId) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM courses WHERE id = ?1")
            .bind(id_i64("course_id", course_id.value())?)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(row.is_some())
    }

    async fn enrollment(
        &mut self,
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
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)?;

        row.as_ref().map(map_enrollment_row).transpose()
    }

    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> Result<bool, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO user_courses (user_id, course_id, completed, enrolled_at, completed_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(user_id, course_id) DO NOTHING
            ",
        )
        .bind(id_i64("user_id", enrollment.user_id().value())?)
        .bind(id_i64("course_id", enrollment.course_id().value())?)
        .bind(enrollment.is_completed())
        .bind(enrollment.enrolled_at())
        .bind(enrollment.completed_at())
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(res.rows_affected() == 1)
    }

    async fn module_owner(
        &mut self,
        module_id: ModuleId,
    ) -> Result<Option<CourseId>, StorageError> {
        let owner: Option<i64> =
            sqlx::query_scalar("SELECT course_id FROM course_modules WHERE id = ?1")
                .bind(id_i64("module_id", module_id.value())?)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db)?;
        owner.map(course_id_from_i64).transpose()
    }

    async fn insert_module_if_absent(&mut self, module: &Module) -> Result<bool, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO course_modules (id, course_id, title, description, content, video_url)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(id_i64("module_id", module.id().value())?)
        .bind(id_i64("course_id", module.course_id().value())?)
        .bind(module.title())
        .bind(module.description())
        .bind(module.content())
        .bind(module.video_url())
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(res.rows_affected() == 1)
    }

    async fn insert_completion(&mut self, completion: &Completion) -> Result<bool, StorageError> {
        // The module may belong to another course; the row still carries the
        // requested course so course-scoped counts ignore it.
        if self.module_owner(completion.module_id).await?.is_none() {
            return Err(StorageError::NotFound);
        }

        let res = sqlx::query(
            r"
                INSERT INTO completed_modules (user_id, course_id, module_id, completed_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(user_id, module_id) DO NOTHING
            ",
        )
        .bind(id_i64("user_id", completion.user_id.value())?)
        .bind(id_i64("course_id", completion.course_id.value())?)
        .bind(id_i64("module_id", completion.module_id.value())?)
        .bind(completion.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(res.rows_affected() == 1)
    }

    async fn delete_completion(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
        module_id: ModuleId,
    ) -> Result<bool, StorageError> {
        let res = sqlx::query(
            r"
                DELETE FROM completed_modules
                WHERE user_id = ?1 AND course_id = ?2 AND module_id = ?3
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .bind(id_i64("module_id", module_id.value())?)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(res.rows_affected() > 0)
    }

    async fn course_counts(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<ModuleCounts, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    (SELECT COUNT(*) FROM course_modules WHERE course_id = ?2) AS total,
                    (
                        SELECT COUNT(*)
                        FROM completed_modules cm
                        JOIN course_modules m
                            ON m.id = cm.module_id AND m.course_id = cm.course_id
                        WHERE cm.user_id = ?1 AND cm.course_id = ?2
                    ) AS completed
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db)?;

        Ok(ModuleCounts::new(
            count_from_i64("completed", row.try_get("completed").map_err(ser)?)?,
            count_from_i64("total", row.try_get("total").map_err(ser)?)?,
        ))
    }

    async fn global_counts(&mut self, user_id: UserId) -> Result<ModuleCounts, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    (SELECT COUNT(*) FROM course_modules) AS total,
                    (SELECT COUNT(*) FROM completed_modules WHERE user_id = ?1) AS completed
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db)?;

        Ok(ModuleCounts::new(
            count_from_i64("completed", row.try_get("completed").map_err(ser)?)?,
            count_from_i64("total", row.try_get("total").map_err(ser)?)?,
        ))
    }

    async fn mark_enrollment_completed(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let res = sqlx::query(
            r"
                UPDATE user_courses
                SET completed = 1, completed_at = ?3
                WHERE user_id = ?1 AND course_id = ?2 AND completed = 0
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(res.rows_affected() == 1)
    }

    async fn count_completed_enrollments(&mut self, user_id: UserId) -> Result<u32, StorageError> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_courses WHERE user_id = ?1 AND completed = 1",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db)?;
        u32_from_i64("completed_courses", n)
    }

    async fn write_aggregates(
        &mut self,
        user_id: UserId,
        aggregates: UserAggregates,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            "UPDATE users SET progress = ?1, completed_courses = ?2 WHERE id = ?3",
        )
        .bind(i64::from(aggregates.progress.value()))
        .bind(i64::from(aggregates.completed_courses))
        .bind(id_i64("user_id", user_id.value())?)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn write_completed_courses(
        &mut self,
        user_id: UserId,
        completed_courses: u32,
    ) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE users SET completed_courses = ?1 WHERE id = ?2")
            .bind(i64::from(completed_courses))
            .bind(id_i64("user_id", user_id.value())?)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn users_with_progress(&mut self) -> Result<Vec<UserId>, StorageError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r"
                SELECT user_id FROM completed_modules
                UNION
                SELECT user_id FROM user_courses
                ORDER BY user_id
            ",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db)?;
        ids.into_iter().map(user_id_from_i64).collect()
    }

    async fn delete_course_modules(&mut self, course_id: CourseId) -> Result<u64, StorageError> {
        let res = sqlx::query("DELETE FROM course_modules WHERE course_id = ?1")
            .bind(id_i64("course_id", course_id.value())?)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(res.rows_affected())
    }

    async fn delete_course(&mut self, course_id: CourseId) -> Result<bool, StorageError> {
        let res = sqlx::query("DELETE FROM courses WHERE id = ?1")
            .bind(id_i64("course_id", course_id.value())?)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(res.rows_affected() == 1)
    }

    async fn delete_user(&mut self, user_id: UserId) -> Result<bool, StorageError> {
        let res = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id_i64("user_id", user_id.value())?)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(res.rows_affected() == 1)
    }

    async fn run_soft_step(&mut self, step: SoftStep) -> Result<u64, StorageError> {
        let (sql, id) = match step {
            SoftStep::CourseCompletions(id) => (
                "DELETE FROM completed_modules WHERE course_id = ?1",
                id_i64("course_id", id.value())?,
            ),
            SoftStep::CourseEnrollments(id) => (
                "DELETE FROM user_courses WHERE course_id = ?1",
                id_i64("course_id", id.value())?,
            ),
            SoftStep::UserCompletions(id) => (
                "DELETE FROM completed_modules WHERE user_id = ?1",
                id_i64("user_id", id.value())?,
            ),
            SoftStep::UserEnrollments(id) => (
                "DELETE FROM user_courses WHERE user_id = ?1",
                id_i64("user_id", id.value())?,
            ),
        };

        // Nested begin issues a SAVEPOINT; dropping it on error rolls back to it.
        let mut savepoint = Connection::begin(&mut *self.tx).await.map_err(db)?;
        let res = sqlx::query(sql)
            .bind(id)
            .execute(&mut *savepoint)
            .await
            .map_err(db)?;
        savepoint.commit().await.map_err(db)?;
        Ok(res.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.commit().await.map_err(db)
    }
}
