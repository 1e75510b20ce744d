use progress_core::model::{
    Completion, Course, CourseId, Enrollment, Module, ModuleCounts, ModuleId, ProgressPercent,
    Role, User, UserAggregates, UserId,
};
use progress_core::time::fixed_now;
use storage::repository::{
    CatalogRepository, ProfileRepository, ProgressStore, SoftStep, StorageError,
};
use storage::sqlite::SqliteRepository;

async fn seeded(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");

    repo.upsert_user(&User::new(UserId::new(5), "rina", "rina@example.com", Role::User).unwrap())
        .await
        .unwrap();
    repo.upsert_course(&Course::new(CourseId::new(7), "Rust Basics", "beginner").unwrap())
        .await
        .unwrap();
    for id in [41, 42, 43] {
        let module = Module::new(
            ModuleId::new(id),
            CourseId::new(7),
            format!("Lesson {id}"),
            "",
            "",
            None,
        )
        .unwrap();
        repo.upsert_module(&module).await.unwrap();
    }
    repo
}

fn completion(module: u64) -> Completion {
    Completion {
        user_id: UserId::new(5),
        course_id: CourseId::new(7),
        module_id: ModuleId::new(module),
        completed_at: fixed_now(),
    }
}

#[tokio::test]
async fn migrate_is_repeatable() {
    let repo = seeded("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
    let user = repo.get_user(UserId::new(5)).await.unwrap().unwrap();
    assert_eq!(user.username(), "rina");
    assert_eq!(user.aggregates(), UserAggregates::default());
}

#[tokio::test]
async fn uncommitted_unit_leaves_no_trace() {
    let repo = seeded("memdb_rollback").await;
    {
        let mut unit = repo.begin().await.unwrap();
        assert!(unit.lock_user(UserId::new(5)).await.unwrap());
        unit.insert_enrollment(&Enrollment::new(UserId::new(5), CourseId::new(7), fixed_now()))
            .await
            .unwrap();
        unit.insert_completion(&completion(41)).await.unwrap();
    }

    assert!(
        repo.get_enrollment(UserId::new(5), CourseId::new(7))
            .await
            .unwrap()
            .is_none()
    );
    let checklist = repo
        .course_checklist(UserId::new(5), CourseId::new(7))
        .await
        .unwrap();
    assert!(checklist.iter().all(|m| !m.completed));
}

#[tokio::test]
async fn completion_writes_are_idempotent_and_course_scoped() {
    let repo = seeded("memdb_completion_scope").await;
    let mut unit = repo.begin().await.unwrap();
    unit.lock_user(UserId::new(5)).await.unwrap();

    assert!(unit.insert_completion(&completion(41)).await.unwrap());
    assert!(!unit.insert_completion(&completion(41)).await.unwrap());

    // Same module id under the wrong course neither deletes nor inserts.
    assert!(
        !unit
            .delete_completion(UserId::new(5), CourseId::new(8), ModuleId::new(41))
            .await
            .unwrap()
    );
    assert!(matches!(
        unit.insert_completion(&completion(99)).await,
        Err(StorageError::NotFound)
    ));

    let counts = unit
        .course_counts(UserId::new(5), CourseId::new(7))
        .await
        .unwrap();
    assert_eq!(counts, ModuleCounts::new(1, 3));

    assert!(
        unit.delete_completion(UserId::new(5), CourseId::new(7), ModuleId::new(41))
            .await
            .unwrap()
    );
    assert!(
        !unit
            .delete_completion(UserId::new(5), CourseId::new(7), ModuleId::new(41))
            .await
            .unwrap()
    );
    unit.commit().await.unwrap();
}

#[tokio::test]
async fn reconciled_module_insert_is_first_writer_wins() {
    let repo = seeded("memdb_module_insert").await;
    let mut unit = repo.begin().await.unwrap();
    unit.lock_course(CourseId::new(7)).await.unwrap();

    let placeholder = Module::placeholder(ModuleId::new(99), CourseId::new(7));
    assert!(unit.insert_module_if_absent(&placeholder).await.unwrap());
    assert!(!unit.insert_module_if_absent(&placeholder).await.unwrap());
    assert_eq!(
        unit.module_owner(ModuleId::new(99)).await.unwrap(),
        Some(CourseId::new(7))
    );
    unit.commit().await.unwrap();

    let checklist = repo
        .course_checklist(UserId::new(5), CourseId::new(7))
        .await
        .unwrap();
    assert_eq!(checklist.len(), 4);
    assert_eq!(checklist[3].title, "Module 99");
}

#[tokio::test]
async fn enrollment_latch_flips_once_and_persists_timestamp() {
    let repo = seeded("memdb_latch").await;
    let mut unit = repo.begin().await.unwrap();
    unit.lock_user(UserId::new(5)).await.unwrap();
    let enrollment = Enrollment::new(UserId::new(5), CourseId::new(7), fixed_now());
    assert!(unit.insert_enrollment(&enrollment).await.unwrap());
    assert!(!unit.insert_enrollment(&enrollment).await.unwrap());

    let at = fixed_now() + chrono::Duration::hours(2);
    assert!(
        unit.mark_enrollment_completed(UserId::new(5), CourseId::new(7), at)
            .await
            .unwrap()
    );
    assert!(
        !unit
            .mark_enrollment_completed(UserId::new(5), CourseId::new(7), fixed_now())
            .await
            .unwrap()
    );
    assert_eq!(
        unit.count_completed_enrollments(UserId::new(5))
            .await
            .unwrap(),
        1
    );
    unit.commit().await.unwrap();

    let stored = repo
        .get_enrollment(UserId::new(5), CourseId::new(7))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.completed_at(), Some(at));
}

#[tokio::test]
async fn aggregates_round_trip_and_upsert_preserves_them() {
    let repo = seeded("memdb_aggregates").await;
    let mut unit = repo.begin().await.unwrap();
    unit.lock_user(UserId::new(5)).await.unwrap();
    let cached = UserAggregates::new(ProgressPercent::new(66).unwrap(), 1);
    unit.write_aggregates(UserId::new(5), cached).await.unwrap();
    unit.write_completed_courses(UserId::new(5), 2).await.unwrap();
    unit.commit().await.unwrap();

    repo.upsert_user(&User::new(UserId::new(5), "rina", "new@example.com", Role::Admin).unwrap())
        .await
        .unwrap();
    let user = repo.get_user(UserId::new(5)).await.unwrap().unwrap();
    assert_eq!(user.email(), "new@example.com");
    assert_eq!(user.role(), Role::Admin);
    assert_eq!(
        user.aggregates(),
        UserAggregates::new(ProgressPercent::new(66).unwrap(), 2)
    );
}

#[tokio::test]
async fn module_owned_by_other_course_is_a_conflict() {
    let repo = seeded("memdb_module_conflict").await;
    repo.upsert_course(&Course::new(CourseId::new(8), "Go", "beginner").unwrap())
        .await
        .unwrap();
    let clash = Module::placeholder(ModuleId::new(41), CourseId::new(8));
    assert!(matches!(
        repo.upsert_module(&clash).await,
        Err(StorageError::Conflict)
    ));
}

#[tokio::test]
async fn completion_under_another_course_counts_only_globally() {
    let repo = seeded("memdb_cross_course_completion").await;
    repo.upsert_course(&Course::new(CourseId::new(8), "Go", "beginner").unwrap())
        .await
        .unwrap();
    let mut unit = repo.begin().await.unwrap();
    unit.lock_user(UserId::new(5)).await.unwrap();

    let mut foreign = completion(41);
    foreign.course_id = CourseId::new(8);
    assert!(unit.insert_completion(&foreign).await.unwrap());
    assert!(!unit.insert_completion(&completion(41)).await.unwrap());

    assert_eq!(
        unit.course_counts(UserId::new(5), CourseId::new(7))
            .await
            .unwrap(),
        ModuleCounts::new(0, 3)
    );
    assert_eq!(
        unit.course_counts(UserId::new(5), CourseId::new(8))
            .await
            .unwrap(),
        ModuleCounts::new(0, 0)
    );
    assert_eq!(
        unit.global_counts(UserId::new(5)).await.unwrap(),
        ModuleCounts::new(1, 3)
    );
    assert!(
        unit.delete_completion(UserId::new(5), CourseId::new(8), ModuleId::new(41))
            .await
            .unwrap()
    );
    unit.commit().await.unwrap();
}

#[tokio::test]
async fn soft_steps_and_hard_deletes_clear_a_course() {
    let repo = seeded("memdb_course_cleanup").await;
    let mut unit = repo.begin().await.unwrap();
    unit.lock_user(UserId::new(5)).await.unwrap();
    unit.insert_enrollment(&Enrollment::new(UserId::new(5), CourseId::new(7), fixed_now()))
        .await
        .unwrap();
    unit.insert_completion(&completion(41)).await.unwrap();
    unit.commit().await.unwrap();

    let mut unit = repo.begin().await.unwrap();
    assert!(unit.lock_course(CourseId::new(7)).await.unwrap());
    assert_eq!(
        unit.users_with_progress().await.unwrap(),
        vec![UserId::new(5)]
    );
    assert_eq!(
        unit.run_soft_step(SoftStep::CourseCompletions(CourseId::new(7)))
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        unit.run_soft_step(SoftStep::CourseEnrollments(CourseId::new(7)))
            .await
            .unwrap(),
        1
    );
    assert_eq!(unit.delete_course_modules(CourseId::new(7)).await.unwrap(), 3);
    assert!(unit.delete_course(CourseId::new(7)).await.unwrap());
    let counts = unit.global_counts(UserId::new(5)).await.unwrap();
    assert_eq!(counts, ModuleCounts::new(0, 0));
    unit.commit().await.unwrap();

    assert!(repo.get_course(CourseId::new(7)).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_user_cannot_be_locked() {
    let repo = seeded("memdb_unknown_user").await;
    let mut unit = repo.begin().await.unwrap();
    assert!(!unit.lock_user(UserId::new(404)).await.unwrap());
    assert!(matches!(
        unit.write_aggregates(UserId::new(404), UserAggregates::default())
            .await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn file_database_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("progress.db").display());

    {
        let repo = SqliteRepository::connect(&url).await.unwrap();
        repo.migrate().await.unwrap();
        repo.upsert_user(
            &User::new(UserId::new(5), "rina", "rina@example.com", Role::User).unwrap(),
        )
        .await
        .unwrap();
        let mut unit = repo.begin().await.unwrap();
        assert!(unit.lock_user(UserId::new(5)).await.unwrap());
        unit.write_aggregates(
            UserId::new(5),
            UserAggregates::new(ProgressPercent::new(40).unwrap(), 1),
        )
        .await
        .unwrap();
        unit.commit().await.unwrap();
        repo.pool().close().await;
    }

    let repo = SqliteRepository::connect(&url).await.unwrap();
    repo.migrate().await.unwrap();
    let user = repo.get_user(UserId::new(5)).await.unwrap().unwrap();
    assert_eq!(user.aggregates().progress.value(), 40);
    assert_eq!(user.aggregates().completed_courses, 1);
}
