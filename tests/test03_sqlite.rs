#![cfg(feature = "sqlite")]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use sql_fluent::prelude::*;
use sql_fluent::sqlite::{
    SQLITE_CONSTRAINT_FOREIGNKEY, SQLITE_CONSTRAINT_PRIMARYKEY, SQLITE_CONSTRAINT_UNIQUE,
};
use tempfile::{TempDir, tempdir};

const SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        name TEXT,
        balance TEXT,
        joined TEXT,
        avatar BLOB
    );
    CREATE TABLE orders (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id),
        qty INTEGER NOT NULL
    );
    CREATE TABLE tags (code TEXT PRIMARY KEY, label TEXT);
";

/// A fresh database file with the test schema. Keep the guard alive for the test's duration.
fn unique_db(prefix: &str) -> Result<(TempDir, PathBuf), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join(format!("{prefix}.db"));
    let conn = rusqlite::Connection::open(&path)?;
    conn.execute_batch(SCHEMA)?;
    Ok((dir, path))
}

fn executor(path: &PathBuf, mode: ConnectionMode) -> SqlExecutor {
    SqlExecutor::new(
        Arc::new(SqliteProvider),
        format!("Data Source={}", path.display()),
        mode,
    )
}

fn insert_user(exec: &mut SqlExecutor, email: &str, name: &str) -> Result<i64, SqlFluentDbError> {
    exec.set_sql("INSERT INTO users (email, name) VALUES (@email, @name) RETURNING id")?
        .add_in_string("@email", Some(email), 100)?
        .add_in_string("@name", Some(name), 100)?
        .add_out_parameter("@id", NumericType::Int64)?
        .execute()?;
    exec.get("@id")
}

#[test]
fn insert_returning_fills_output_parameters() -> Result<(), Box<dyn std::error::Error>> {
    let (_guard, path) = unique_db("returning")?;
    let mut exec = executor(&path, ConnectionMode::Normal);

    let first = insert_user(&mut exec, "ada@example.com", "Ada")?;
    let second = insert_user(&mut exec, "alan@example.com", "Alan")?;
    assert_eq!(second, first + 1);
    assert!(!exec.is_open());

    let count: Option<i64> = exec
        .set_sql("SELECT COUNT(*) FROM users WHERE id >= @min")?
        .add_in_parameter("@min", first)?
        .scalar()?;
    assert_eq!(count, Some(2));
    Ok(())
}

#[test]
fn affected_row_counts() -> Result<(), Box<dyn std::error::Error>> {
    let (_guard, path) = unique_db("affected")?;
    let mut exec = executor(&path, ConnectionMode::Normal);
    for i in 0..3 {
        insert_user(&mut exec, &format!("u{i}@example.com"), "user")?;
    }
    let renamed = exec
        .set_sql("UPDATE users SET name = @name WHERE name = @old")?
        .add_in_string("@name", Some("renamed"), 50)?
        .add_in_string("@old", Some("user"), 50)?
        .execute()?;
    assert_eq!(renamed, 3);

    let selected = exec
        .set_sql("SELECT id FROM users WHERE name = @name")?
        .add_in_string("@name", Some("renamed"), 50)?
        .execute()?;
    assert_eq!(selected, 0, "queries affect no rows");

    let untouched = exec
        .set_sql("UPDATE users SET name = @name WHERE name = @old")?
        .add_in_string("@name", Some("again"), 50)?
        .add_in_string("@old", Some("nobody"), 50)?
        .execute()?;
    assert_eq!(untouched, 0, "an update that matches nothing reports the same count");
    Ok(())
}

#[test]
fn integrity_violations_map_to_their_kinds() -> Result<(), Box<dyn std::error::Error>> {
    let (_guard, path) = unique_db("constraints")?;
    let mut exec = executor(&path, ConnectionMode::Normal);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    exec.on_constraint_violation(move |v| sink.lock().unwrap().push((v.kind, v.code)));

    insert_user(&mut exec, "dup@example.com", "first")?;
    let err = insert_user(&mut exec, "dup@example.com", "second").unwrap_err();
    assert_eq!(err.constraint_kind(), Some(ConstraintViolationKind::DuplicateKey));

    let err = exec
        .set_sql("INSERT INTO orders (user_id, qty) VALUES (@user, @qty)")?
        .add_in_parameter("@user", 9_999_i64)?
        .add_in_parameter("@qty", 1)?
        .execute()
        .unwrap_err();
    assert_eq!(err.constraint_kind(), Some(ConstraintViolationKind::ForeignKey));

    exec.set_sql("INSERT INTO tags (code, label) VALUES (@code, @label)")?
        .add_in_string("@code", Some("rust"), 10)?
        .add_in_string("@label", Some("Rust"), 10)?
        .execute()?;
    let err = exec.execute().unwrap_err();
    assert_eq!(err.constraint_kind(), Some(ConstraintViolationKind::PrimaryKey));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (ConstraintViolationKind::DuplicateKey, SQLITE_CONSTRAINT_UNIQUE),
            (ConstraintViolationKind::ForeignKey, SQLITE_CONSTRAINT_FOREIGNKEY),
            (ConstraintViolationKind::PrimaryKey, SQLITE_CONSTRAINT_PRIMARYKEY),
        ]
    );
    assert!(!exec.is_open());
    Ok(())
}

#[test]
fn non_integrity_errors_are_not_classified() -> Result<(), Box<dyn std::error::Error>> {
    let (_guard, path) = unique_db("not-null")?;
    let mut exec = executor(&path, ConnectionMode::Normal);
    let err = exec
        .set_sql("INSERT INTO users (email, name) VALUES (@email, @name)")?
        .add_in_string("@email", None, 100)?
        .add_in_string("@name", Some("nobody"), 100)?
        .execute()
        .unwrap_err();
    assert!(err.constraint_kind().is_none());
    assert!(matches!(err, SqlFluentDbError::Provider(_)));
    Ok(())
}

#[test]
fn read_streams_every_row() -> Result<(), Box<dyn std::error::Error>> {
    let (_guard, path) = unique_db("read")?;
    let mut exec = executor(&path, ConnectionMode::Normal);
    for (email, name) in [("a@x.io", "Ada"), ("b@x.io", "Brian"), ("c@x.io", "Cleo")] {
        insert_user(&mut exec, email, name)?;
    }

    let mut names = Vec::new();
    exec.set_sql("SELECT id, name FROM users WHERE id > @after ORDER BY id")?
        .add_in_parameter("@after", 0_i64)?
        .read(
            |schema| schema.ordinal("name"),
            |&name_col, row| {
                names.push(row.get::<String>(name_col)?.unwrap_or_default());
                Ok(())
            },
        )?;
    assert_eq!(names, ["Ada", "Brian", "Cleo"]);
    assert!(!exec.is_open());

    let mut first = None;
    exec.read_with_behavior(
        |_| Ok(()),
        |_, row| {
            first = row.get_by_name::<String>("name")?;
            Ok(())
        },
        CommandBehavior::default().with_single_row(true),
    )?;
    assert_eq!(first.as_deref(), Some("Ada"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_paths_match_sync_results() -> Result<(), Box<dyn std::error::Error>> {
    let (_guard, path) = unique_db("async")?;
    let mut exec = executor(&path, ConnectionMode::Normal);

    exec.set_sql("INSERT INTO users (email, name) VALUES (@email, @name) RETURNING id")?
        .add_in_string("@email", Some("async@example.com"), 100)?
        .add_in_string("@name", Some("Async"), 100)?
        .add_out_parameter("@id", NumericType::Int64)?;
    assert_eq!(exec.execute_async().await?, 1);
    let id: i64 = exec.get("@id")?;

    let name: Option<String> = exec
        .set_sql("SELECT name FROM users WHERE id = @id")?
        .add_in_parameter("@id", id)?
        .scalar_async()
        .await?;
    assert_eq!(name.as_deref(), Some("Async"));

    let mut emails = Vec::new();
    exec.set_sql("SELECT email FROM users WHERE id = @id")?
        .add_in_parameter("@id", id)?
        .read_async(
            |schema| schema.ordinal("email"),
            |&email_col, row| {
                emails.push(row.get::<String>(email_col)?);
                Ok(())
            },
        )
        .await?;
    assert_eq!(emails, vec![Some("async@example.com".to_string())]);
    assert!(!exec.is_open());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_interrupts_a_running_statement() -> Result<(), Box<dyn std::error::Error>> {
    let (_guard, path) = unique_db("cancel")?;
    let mut exec = executor(&path, ConnectionMode::Normal);
    exec.set_sql(
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < @n) \
         SELECT COUNT(*) FROM c",
    )?
    .add_in_parameter("@n", 5_000_000_000_i64)?;

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = exec.scalar_async_with_cancel::<i64>(&token).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(!exec.is_open());

    let pre_cancelled = CancellationToken::new();
    pre_cancelled.cancel();
    let err = exec
        .execute_async_with_cancel(&pre_cancelled)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    Ok(())
}

const ENDLESS: &str =
    "WITH RECURSIVE n(x) AS (SELECT @start UNION ALL SELECT x + 1 FROM n) SELECT x FROM n";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_read_delivers_rows_while_the_statement_runs()
-> Result<(), Box<dyn std::error::Error>> {
    let (_guard, path) = unique_db("streaming")?;
    let mut exec = executor(&path, ConnectionMode::Transactional);
    exec.set_sql(ENDLESS)?.add_in_parameter("@start", 1_i64)?;

    // The result never ends, so the first row can only arrive if rows are streamed.
    let mut first = None;
    let read = exec.read_async(
        |schema| schema.ordinal("x"),
        |&x, row| {
            first = row.get::<i64>(x)?;
            Err(SqlFluentDbError::InvalidState("stop after the first row".into()))
        },
    );
    let err = tokio::time::timeout(Duration::from_secs(10), read)
        .await
        .expect("the first row should arrive before the statement finishes")
        .unwrap_err();
    assert!(matches!(err, SqlFluentDbError::InvalidState(_)));
    assert_eq!(first, Some(1));

    let mut rows = 0;
    let single_token = CancellationToken::new();
    let single = exec.read_async_with_cancel(
        |_| Ok(()),
        |_, _| {
            rows += 1;
            Ok(())
        },
        CommandBehavior::default().with_single_row(true),
        &single_token,
    );
    tokio::time::timeout(Duration::from_secs(10), single).await??;
    assert_eq!(rows, 1);

    // The abandoned statements released the connection.
    assert!(exec.is_open());
    let count: Option<i64> = exec
        .set_sql("SELECT COUNT(*) FROM users WHERE id > @after")?
        .add_in_parameter("@after", 0_i64)?
        .scalar_async()
        .await?;
    assert_eq!(count, Some(0));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_an_async_read_stops_the_scan() -> Result<(), Box<dyn std::error::Error>> {
    let (_guard, path) = unique_db("read_cancel")?;
    let mut exec = executor(&path, ConnectionMode::Transactional);
    exec.set_sql(ENDLESS)?.add_in_parameter("@start", 1_i64)?;

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let mut rows = 0_u64;
    let read = exec.read_async_with_cancel(
        |_| Ok(()),
        |_, _| {
            rows += 1;
            Ok(())
        },
        CommandBehavior::default(),
        &token,
    );
    let err = tokio::time::timeout(Duration::from_secs(10), read)
        .await
        .expect("cancellation should end the read")
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(rows > 0, "rows were delivered before the cancel fired");

    let one: Option<i64> = exec
        .set_sql("SELECT @one")?
        .add_in_parameter("@one", 1_i64)?
        .scalar_async()
        .await?;
    assert_eq!(one, Some(1));
    Ok(())
}

#[test]
fn prepared_insert_reruns_with_new_values() -> Result<(), Box<dyn std::error::Error>> {
    let (_guard, path) = unique_db("prepared")?;
    let mut exec = executor(&path, ConnectionMode::Transactional);
    exec.set_sql("INSERT INTO tags (code, label) VALUES (@code, @label)")?
        .add_in_string_typed("@code", 10)?
        .add_in_string_typed("@label", 40)?
        .prepare()?;

    for (code, label) in [("db", "Databases"), ("net", "Networking"), ("os", "Systems")] {
        let affected = exec
            .set_parameter("@code", code)?
            .set_parameter("@label", label)?
            .execute()?;
        assert_eq!(affected, 1);
    }
    assert!(exec.is_open());

    let labels: Option<String> = exec
        .set_sql("SELECT group_concat(label, ',') FROM (SELECT label FROM tags WHERE code <> @skip ORDER BY code)")?
        .add_in_string("@skip", Some(""), 10)?
        .scalar()?;
    assert_eq!(labels.as_deref(), Some("Databases,Networking,Systems"));
    exec.dispose()?;
    Ok(())
}

#[test]
fn transactions_commit_and_roll_back() -> Result<(), Box<dyn std::error::Error>> {
    let (_guard, path) = unique_db("transactions")?;
    let mut exec = executor(&path, ConnectionMode::Transactional);

    exec.begin_transaction()?;
    insert_user(&mut exec, "keep@example.com", "keep")?;
    exec.commit()?;

    exec.begin_transaction()?;
    insert_user(&mut exec, "drop@example.com", "drop")?;
    exec.rollback()?;

    let emails: Option<String> = exec
        .set_sql("SELECT group_concat(email) FROM users WHERE id > @min")?
        .add_in_parameter("@min", 0_i64)?
        .scalar()?;
    assert_eq!(emails.as_deref(), Some("keep@example.com"));

    let mut normal = executor(&path, ConnectionMode::Normal);
    assert!(matches!(
        normal.begin_transaction(),
        Err(SqlFluentDbError::InvalidState(_))
    ));
    Ok(())
}

#[test]
fn typed_values_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let (_guard, path) = unique_db("values")?;
    let mut exec = executor(&path, ConnectionMode::Normal);
    let joined = NaiveDate::from_ymd_opt(2024, 2, 29)
        .and_then(|d| d.and_hms_opt(13, 45, 0))
        .ok_or("bad date")?;

    exec.set_sql(
        "INSERT INTO users (email, name, balance, joined, avatar) \
         VALUES (@email, @name, @balance, @joined, @avatar) RETURNING id",
    )?
    .add_in_string("@email", Some("typed@example.com"), 100)?
    .add_in_string("@name", None, 100)?
    .add_in_decimal("@balance", "1234.567".parse::<Decimal>()?, 12, 2)?
    .add_in_parameter("@joined", joined)?
    .add_in_binary("@avatar", Some(&[0x89_u8, 0x50, 0x4e, 0x47][..]))?
    .add_out_parameter("@id", NumericType::Int64)?
    .execute()?;
    let id: i64 = exec.get("@id")?;

    let balance: Option<Decimal> = exec
        .set_sql("SELECT balance FROM users WHERE id = @id")?
        .add_in_parameter("@id", id)?
        .scalar()?;
    assert_eq!(balance, Some("1234.57".parse::<Decimal>()?));

    let when: Option<chrono::NaiveDateTime> = exec
        .set_sql("SELECT joined FROM users WHERE id = @id")?
        .add_in_parameter("@id", id)?
        .scalar()?;
    assert_eq!(when, Some(joined));

    let avatar = exec
        .set_sql("SELECT avatar FROM users WHERE id = @id")?
        .add_in_parameter("@id", id)?
        .scalar_binary()?;
    assert_eq!(avatar, Some(vec![0x89, 0x50, 0x4e, 0x47]));

    let name: Option<String> = exec
        .set_sql("SELECT name FROM users WHERE id = @id")?
        .add_in_parameter("@id", id)?
        .scalar()?;
    assert_eq!(name, None);
    Ok(())
}

#[test]
fn positional_placeholders_bind_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let (_guard, path) = unique_db("positional")?;
    let mut exec = executor(&path, ConnectionMode::Normal);
    let sum: Option<i64> = exec
        .set_sql("SELECT ?1 * 10 + ?2")?
        .add_in_parameter("first", 4_i64)?
        .add_in_parameter("second", 2_i64)?
        .scalar()?;
    assert_eq!(sum, Some(42));

    let err = exec
        .set_sql("SELECT @a + @b")?
        .add_in_parameter("@a", 1)?
        .scalar::<i64>()
        .unwrap_err();
    assert!(matches!(err, SqlFluentDbError::ParameterError(_)));
    Ok(())
}

#[test]
fn unsupported_and_misconfigured_commands() -> Result<(), Box<dyn std::error::Error>> {
    let (_guard, path) = unique_db("unsupported")?;
    let mut exec = executor(&path, ConnectionMode::Normal);
    assert!(matches!(
        exec.set_stored_procedure("usp_anything")?.execute(),
        Err(SqlFluentDbError::Unsupported(_))
    ));
    assert!(!exec.is_open());
    assert!(matches!(
        exec.set_sql("SELECT @doc")?.add_in_xml("@doc", Some("<a/>")),
        Err(SqlFluentDbError::Unsupported(_))
    ));

    let mut bad = SqlExecutor::new(
        Arc::new(SqliteProvider),
        "Data Source=whatever.db;Journal=wal",
        ConnectionMode::Normal,
    );
    let err = bad
        .set_sql("SELECT @a")?
        .add_in_parameter("@a", 1)?
        .execute()
        .unwrap_err();
    assert!(matches!(
        err,
        SqlFluentDbError::Provider(ProviderError::Connection(_))
    ));
    Ok(())
}

#[test]
fn read_only_connections_reject_writes() -> Result<(), Box<dyn std::error::Error>> {
    let (_guard, path) = unique_db("read-only")?;
    let opts = SqliteOptions::new(path.display().to_string()).read_only(true);
    let mut exec = SqlExecutor::new(Arc::new(SqliteProvider), opts.to_string(), ConnectionMode::Normal);
    let err = exec
        .set_sql("INSERT INTO tags (code) VALUES (@code)")?
        .add_in_string("@code", Some("ro"), 10)?
        .execute()
        .unwrap_err();
    assert!(matches!(err, SqlFluentDbError::Provider(_)));

    let count: Option<i64> = exec
        .set_sql("SELECT COUNT(*) FROM tags WHERE code = @code")?
        .add_in_string("@code", Some("ro"), 10)?
        .scalar()?;
    assert_eq!(count, Some(0));
    Ok(())
}

#[test]
fn settings_file_drives_the_builder() -> Result<(), Box<dyn std::error::Error>> {
    let (guard, path) = unique_db("settings")?;
    let settings_path = guard.path().join("settings.json");
    let json = serde_json::json!({
        "ConnectionStrings": { "Main": format!("Data Source={}", path.display()) },
        "executor": { "variable_length_threshold": 4 },
        "mode": "Transactional"
    });
    std::fs::write(&settings_path, json.to_string())?;

    let settings = Settings::from_file(&settings_path)?;
    let builder = ConfiguredExecutorBuilder::new(Arc::new(SqliteProvider), settings, "Main");
    let mut exec = builder.build();
    assert_eq!(exec.mode(), ConnectionMode::Transactional);
    assert_eq!(exec.options().variable_length_threshold, 4);

    insert_user(&mut exec, "cfg@example.com", "Config")?;
    assert!(exec.is_open());
    Ok(())
}
