use import_server::store::migration::MIGRATOR;
use import_server::test_support::{TestDatabase, TestDatabaseError};

const TABLE_COUNT_SQL: &str = "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'public' AND table_name IN ('entities', 'import_jobs')";

#[tokio::test]
async fn migrations_apply_and_revert_cleanly() {
    let test_db = match TestDatabase::new_from_env().await {
        Ok(db) => db,
        Err(TestDatabaseError::MissingUrl) => {
            eprintln!("skipping migration revert test: no test database available");
            return;
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    };

    let pool = test_db.pool_clone();

    MIGRATOR.run(&pool).await.expect("migrations run");

    let tables: i64 = sqlx::query_scalar(TABLE_COUNT_SQL)
        .fetch_one(&pool)
        .await
        .expect("lookup succeeded");
    assert_eq!(tables, 2);

    MIGRATOR.undo(&pool, 0).await.expect("migrations revert");

    let tables_after_revert: i64 = sqlx::query_scalar(TABLE_COUNT_SQL)
        .fetch_one(&pool)
        .await
        .expect("lookup succeeded");
    assert_eq!(
        tables_after_revert, 0,
        "import tables should be dropped after revert"
    );

    MIGRATOR.run(&pool).await.expect("migrations rerun");

    let tables_after_rerun: i64 = sqlx::query_scalar(TABLE_COUNT_SQL)
        .fetch_one(&pool)
        .await
        .expect("lookup succeeded");
    assert_eq!(tables_after_rerun, 2);

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn uniqueness_constraints_exist() {
    let test_db = match TestDatabase::new_from_env().await {
        Ok(db) => db,
        Err(TestDatabaseError::MissingUrl) => {
            eprintln!("skipping constraint test: no test database available");
            return;
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    };

    let pool = test_db.pool_clone();

    let constraints: Vec<String> = sqlx::query_scalar(
        "SELECT conname::text FROM pg_constraint WHERE contype = 'u' AND conrelid IN ('entities'::regclass, 'import_jobs'::regclass) ORDER BY conname",
    )
    .fetch_all(&pool)
    .await
    .expect("constraint lookup");

    assert_eq!(constraints, vec!["entities_email_key", "import_jobs_token_key"]);

    test_db.close().await.expect("failed to drop test database");
}
