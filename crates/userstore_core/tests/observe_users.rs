mod common;

use common::RecordingSink;
use futures::stream::BoxStream;
use futures::StreamExt;
use rusqlite::Connection;
use std::time::Duration;
use tokio::time::timeout;
use userstore_core::{DaoError, DbError, OperationPhase, User, UserDatabase, UserRepository};

const EMIT_TIMEOUT: Duration = Duration::from_secs(5);
const QUIET_WINDOW: Duration = Duration::from_millis(300);

type Snapshots = BoxStream<'static, Result<Vec<User>, DaoError>>;

async fn next_snapshot(stream: &mut Snapshots) -> Vec<User> {
    timeout(EMIT_TIMEOUT, stream.next())
        .await
        .expect("snapshot should arrive in time")
        .expect("stream should stay open")
        .expect("snapshot query should succeed")
}

async fn assert_quiet(stream: &mut Snapshots) {
    assert!(
        timeout(QUIET_WINDOW, stream.next()).await.is_err(),
        "no snapshot expected"
    );
}

async fn raw(database: &UserDatabase, sql: &'static str) {
    database
        .executor()
        .run(move |conn: &mut Connection| conn.execute_batch(sql).map_err(DbError::from))
        .await
        .unwrap();
}

#[tokio::test]
async fn emits_initial_snapshot_then_after_each_change() {
    let database = UserDatabase::open_in_memory().unwrap();
    let repository = UserRepository::new(&database);
    let mut stream = repository.observe();

    assert!(next_snapshot(&mut stream).await.is_empty());

    repository
        .insert_or_update(User::new("Ada", "Lovelace"))
        .await
        .unwrap();
    let after_insert = next_snapshot(&mut stream).await;
    assert_eq!(after_insert.len(), 1);
    assert_eq!(after_insert[0].display_name(), "Ada Lovelace");

    let mut ada = after_insert[0].clone();
    ada.last_name = Some("King".to_string());
    repository.insert_or_update(ada.clone()).await.unwrap();
    let after_update = next_snapshot(&mut stream).await;
    assert_eq!(after_update.len(), 1);
    assert_eq!(after_update[0].last_name.as_deref(), Some("King"));

    repository.delete(ada).await.unwrap();
    assert!(next_snapshot(&mut stream).await.is_empty());

    repository
        .insert_or_update_all(vec![User::new("a", "1"), User::new("b", "2")])
        .await
        .unwrap();
    assert_eq!(next_snapshot(&mut stream).await.len(), 2);

    repository.delete_all().await.unwrap();
    assert!(next_snapshot(&mut stream).await.is_empty());
}

#[tokio::test]
async fn unrelated_table_changes_do_not_emit() {
    let database = UserDatabase::open_in_memory().unwrap();
    let repository = UserRepository::new(&database);
    raw(&database, "CREATE TABLE audit (id INTEGER PRIMARY KEY, note TEXT);").await;

    let mut stream = repository.observe();
    assert!(next_snapshot(&mut stream).await.is_empty());

    raw(&database, "INSERT INTO audit (note) VALUES ('unrelated');").await;
    assert_quiet(&mut stream).await;

    repository
        .insert_or_update(User::new("Ada", "Lovelace"))
        .await
        .unwrap();
    assert_eq!(next_snapshot(&mut stream).await.len(), 1);
}

#[tokio::test]
async fn failed_writes_do_not_emit() {
    let database = UserDatabase::open_in_memory().unwrap();
    let repository = UserRepository::new(&database);
    let mut stream = repository.observe();
    assert!(next_snapshot(&mut stream).await.is_empty());

    let err = repository
        .insert_or_update(User::new("Bad", "Id").with_id(0))
        .await;
    assert!(err.is_err());
    assert_quiet(&mut stream).await;
}

#[tokio::test]
async fn rows_committed_by_a_failing_write_still_emit() {
    let database = UserDatabase::open_in_memory().unwrap();
    let repository = UserRepository::new(&database);
    let mut stream = repository.observe();
    assert!(next_snapshot(&mut stream).await.is_empty());

    let result = database
        .operations("Import")
        .execute_write("import", |conn: &mut Connection| {
            conn.execute(
                "INSERT INTO users (first_name, last_name) VALUES ('Ada', 'Lovelace')",
                [],
            )?;
            conn.execute("INSERT INTO missing_table (x) VALUES (1)", [])?;
            Ok::<_, DaoError>(())
        })
        .await;
    assert!(matches!(result, Err(DaoError::Db(DbError::Sqlite(_)))));

    let snapshot = next_snapshot(&mut stream).await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].display_name(), "Ada Lovelace");
}

#[tokio::test]
async fn rolled_back_write_does_not_emit() {
    let database = UserDatabase::open_in_memory().unwrap();
    let repository = UserRepository::new(&database);
    let mut stream = repository.observe();
    assert!(next_snapshot(&mut stream).await.is_empty());

    database
        .operations("Import")
        .execute_write("import", |conn: &mut Connection| {
            let tx = conn.transaction()?;
            tx.execute("INSERT INTO users (first_name) VALUES ('draft')", [])?;
            tx.rollback()?;
            Ok::<_, DaoError>(())
        })
        .await
        .unwrap();
    assert_quiet(&mut stream).await;
    assert!(repository.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn query_errors_are_delivered_and_subscription_continues() {
    let database = UserDatabase::open_in_memory().unwrap();
    let sink = RecordingSink::shared();
    let repository = UserRepository::with_sink(&database, sink.clone());
    let mut stream = repository.observe();
    assert!(next_snapshot(&mut stream).await.is_empty());

    raw(&database, "INSERT INTO users (id, first_name) VALUES (-1, 'ghost');").await;
    let failed = timeout(EMIT_TIMEOUT, stream.next())
        .await
        .expect("error item should arrive in time")
        .expect("stream should stay open");
    assert!(matches!(failed, Err(DaoError::InvalidData(_))));

    raw(&database, "DELETE FROM users WHERE id = -1;").await;
    assert!(next_snapshot(&mut stream).await.is_empty());

    assert_eq!(
        sink.phases(),
        vec![
            ("observe", OperationPhase::Call),
            ("observe", OperationPhase::Success),
            ("observe", OperationPhase::Failure),
            ("observe", OperationPhase::Success),
        ]
    );
}

#[tokio::test]
async fn independent_observers_each_receive_changes() {
    let database = UserDatabase::open_in_memory().unwrap();
    let repository = UserRepository::new(&database);
    let mut first = repository.observe();
    let mut second = repository.observe();
    assert!(next_snapshot(&mut first).await.is_empty());
    assert!(next_snapshot(&mut second).await.is_empty());

    repository
        .insert_or_update(User::new("Ada", "Lovelace"))
        .await
        .unwrap();

    assert_eq!(next_snapshot(&mut first).await.len(), 1);
    assert_eq!(next_snapshot(&mut second).await.len(), 1);
}
