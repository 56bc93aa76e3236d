use std::sync::Arc;
use std::time::Duration;

use sql_fluent::prelude::*;
use sql_fluent::test_utils::{ScriptedProvider, Step};
use sql_fluent::{ProviderError, TransactionOp};

fn executor(provider: &ScriptedProvider, mode: ConnectionMode) -> SqlExecutor {
    SqlExecutor::new(Arc::new(provider.clone()), "scripted", mode)
}

#[test]
fn normal_mode_closes_after_every_statement() -> Result<(), SqlFluentDbError> {
    let provider = ScriptedProvider::new();
    provider.push(Step::affected(1)).push(Step::affected(2));
    let mut exec = executor(&provider, ConnectionMode::Normal);

    exec.set_sql("UPDATE t SET a = @a")?.add_in_parameter("@a", 1)?;
    assert_eq!(exec.execute()?, 1);
    assert!(!exec.is_open());
    assert_eq!(exec.execute()?, 2);
    assert!(!exec.is_open());

    let counters = provider.counters();
    assert_eq!(counters.connects, 1, "connection object is created once and reused");
    assert_eq!(counters.opens, 2);
    assert_eq!(counters.closes, 2);
    Ok(())
}

#[test]
fn normal_mode_closes_after_provider_failure() -> Result<(), SqlFluentDbError> {
    let provider = ScriptedProvider::new();
    provider.push(Step::fail(50_000, "deadlock victim"));
    let mut exec = executor(&provider, ConnectionMode::Normal);

    let err = exec
        .set_sql("UPDATE t SET a = @a")?
        .add_in_parameter("@a", 1)?
        .execute()
        .unwrap_err();
    assert!(matches!(
        err,
        SqlFluentDbError::Provider(ProviderError::Native { code: 50_000, .. })
    ));
    assert!(!exec.is_open());
    assert_eq!(provider.counters().closes, 1);
    Ok(())
}

#[test]
fn transactional_mode_holds_connection_until_dispose() -> Result<(), SqlFluentDbError> {
    let provider = ScriptedProvider::new();
    let mut exec = executor(&provider, ConnectionMode::Transactional);
    exec.set_sql("UPDATE t SET a = @a")?.add_in_parameter("@a", 1)?;
    for _ in 0..3 {
        exec.execute()?;
        assert!(exec.is_open());
    }
    exec.close()?;
    assert!(exec.is_open(), "close is a no-op outside normal mode");

    let counters = provider.counters();
    assert_eq!(counters.opens, 1);
    assert_eq!(counters.closes, 0);

    exec.dispose()?;
    exec.dispose()?;
    assert!(!exec.is_open());
    assert_eq!(provider.counters().closes, 1, "second dispose must not close again");
    Ok(())
}

#[test]
fn multiple_result_sets_mode_also_holds_connection() -> Result<(), SqlFluentDbError> {
    let provider = ScriptedProvider::new();
    let mut exec = executor(&provider, ConnectionMode::MultipleResultSets);
    exec.set_sql("SELECT @a")?.add_in_parameter("@a", 1)?;
    exec.scalar::<i32>()?;
    exec.scalar::<i32>()?;
    assert!(exec.is_open());
    assert_eq!(provider.counters().opens, 1);
    Ok(())
}

#[test]
fn dropping_an_executor_closes_its_connection() -> Result<(), SqlFluentDbError> {
    let provider = ScriptedProvider::new();
    {
        let mut exec = executor(&provider, ConnectionMode::Transactional);
        exec.set_sql("UPDATE t SET a = @a")?.add_in_parameter("@a", 1)?;
        exec.execute()?;
    }
    assert_eq!(provider.counters().closes, 1);
    Ok(())
}

#[test]
fn dispose_without_open_connection_closes_nothing() -> Result<(), SqlFluentDbError> {
    let provider = ScriptedProvider::new();
    let mut exec = executor(&provider, ConnectionMode::Normal);
    exec.set_sql("UPDATE t SET a = @a")?.add_in_parameter("@a", 1)?;
    exec.execute()?;
    exec.dispose()?;
    assert_eq!(provider.counters().closes, 1);
    Ok(())
}

#[test]
fn executor_is_unusable_after_dispose() -> Result<(), SqlFluentDbError> {
    let provider = ScriptedProvider::new();
    let mut exec = executor(&provider, ConnectionMode::Normal);
    exec.dispose()?;
    assert!(exec.is_disposed());
    assert!(matches!(
        exec.set_sql("SELECT @a")
            .and_then(|e| e.add_in_parameter("@a", 1))
            .map(|_| ()),
        Err(SqlFluentDbError::InvalidState(_))
    ));
    assert!(matches!(exec.open(), Err(SqlFluentDbError::InvalidState(_))));
    Ok(())
}

#[test]
fn text_commands_without_parameters_never_touch_the_connection() -> Result<(), SqlFluentDbError> {
    let provider = ScriptedProvider::new();
    let mut exec = executor(&provider, ConnectionMode::Normal);

    exec.set_sql("DELETE FROM t")?;
    assert!(matches!(exec.execute(), Err(SqlFluentDbError::InvalidState(_))));
    assert!(matches!(
        exec.scalar::<i32>(),
        Err(SqlFluentDbError::InvalidState(_))
    ));
    assert!(matches!(
        exec.read(|_| Ok(()), |_, _| Ok(())),
        Err(SqlFluentDbError::InvalidState(_))
    ));
    assert!(matches!(exec.prepare(), Err(SqlFluentDbError::InvalidState(_))));
    assert_eq!(provider.counters().connects, 0);

    // Stored procedures may legitimately take no parameters.
    exec.set_stored_procedure("usp_purge")?;
    exec.execute()?;
    assert_eq!(provider.counters().executions, 1);
    Ok(())
}

#[test]
fn running_without_a_command_is_invalid() {
    let provider = ScriptedProvider::new();
    let mut exec = executor(&provider, ConnectionMode::Normal);
    let err = exec.execute().unwrap_err();
    assert!(matches!(err, SqlFluentDbError::InvalidState(_)));
    assert!(matches!(
        exec.set_sql(""),
        Err(SqlFluentDbError::MissingArgument(_))
    ));
    assert!(matches!(
        exec.set_command("users", CommandKind::TableDirect),
        Err(SqlFluentDbError::Unsupported(_))
    ));
}

#[test]
fn replacing_the_command_clears_parameters() -> Result<(), SqlFluentDbError> {
    let provider = ScriptedProvider::new();
    let mut exec = executor(&provider, ConnectionMode::Normal);
    exec.set_sql("SELECT @a")?.add_in_parameter("@a", 1)?;
    exec.set_sql("SELECT @b")?;
    assert!(exec.command().parameters().is_empty());
    Ok(())
}

#[test]
fn open_failures_are_returned_unclassified() -> Result<(), SqlFluentDbError> {
    let provider = ScriptedProvider::new().failing_open("server unreachable");
    let mut exec = executor(&provider, ConnectionMode::Normal);
    let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    exec.on_constraint_violation(move |_| {
        seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    });

    let err = exec
        .set_sql("SELECT @a")?
        .add_in_parameter("@a", 1)?
        .execute()
        .unwrap_err();
    assert!(matches!(
        err,
        SqlFluentDbError::Provider(ProviderError::Connection(ref m)) if m == "server unreachable"
    ));
    assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn unknown_connection_name_fails_on_open_not_on_build() -> Result<(), SqlFluentDbError> {
    let provider = ScriptedProvider::new();
    let settings = Settings::from_json(r#"{ "ConnectionStrings": { "Main": "scripted" } }"#)?;
    let mut exec =
        ConfiguredExecutorBuilder::new(Arc::new(provider.clone()), settings, "Missing").build();
    let err = exec
        .set_sql("SELECT @a")?
        .add_in_parameter("@a", 1)?
        .execute()
        .unwrap_err();
    assert!(matches!(
        err,
        SqlFluentDbError::Provider(ProviderError::Connection(_))
    ));
    assert_eq!(provider.counters().opens, 0);
    Ok(())
}

#[test]
fn transactions_require_transactional_mode() -> Result<(), SqlFluentDbError> {
    let provider = ScriptedProvider::new();
    let mut exec = executor(&provider, ConnectionMode::Normal);
    assert!(matches!(
        exec.begin_transaction(),
        Err(SqlFluentDbError::InvalidState(_))
    ));

    let mut exec = executor(&provider, ConnectionMode::Transactional);
    assert!(matches!(exec.commit(), Err(SqlFluentDbError::InvalidState(_))));
    exec.begin_transaction()?;
    exec.set_sql("UPDATE t SET a = @a")?.add_in_parameter("@a", 1)?;
    exec.execute()?;
    exec.commit()?;
    exec.begin_transaction()?;
    exec.rollback()?;
    assert_eq!(
        provider.counters().transactions,
        vec![
            TransactionOp::Begin,
            TransactionOp::Commit,
            TransactionOp::Begin,
            TransactionOp::Rollback
        ]
    );
    Ok(())
}

#[tokio::test]
async fn async_execution_follows_the_same_lifecycle() -> Result<(), SqlFluentDbError> {
    let provider = ScriptedProvider::new();
    provider.push(Step::affected(4));
    let mut exec = executor(&provider, ConnectionMode::Normal);
    exec.set_sql("DELETE FROM t WHERE a = @a")?.add_in_parameter("@a", 1)?;
    assert_eq!(exec.execute_async().await?, 4);
    assert!(!exec.is_open());

    let mut exec = executor(&provider, ConnectionMode::Transactional);
    let token = CancellationToken::new();
    exec.begin_transaction_async(&token).await?;
    exec.set_sql("DELETE FROM t WHERE a = @a")?.add_in_parameter("@a", 1)?;
    exec.execute_async_with_cancel(&token).await?;
    exec.commit_async(&token).await?;
    assert!(exec.is_open());
    Ok(())
}

#[tokio::test]
async fn cancellation_before_start_is_reported_distinctly() -> Result<(), SqlFluentDbError> {
    let provider = ScriptedProvider::new();
    let mut exec = executor(&provider, ConnectionMode::Normal);
    exec.set_sql("SELECT @a")?.add_in_parameter("@a", 1)?;
    let token = CancellationToken::new();
    token.cancel();
    let err = exec.execute_async_with_cancel(&token).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(provider.counters().executions, 0);
    Ok(())
}

#[tokio::test]
async fn cancellation_mid_statement_still_closes() -> Result<(), SqlFluentDbError> {
    let provider = ScriptedProvider::new();
    provider.push(Step::affected(1).with_delay(Duration::from_secs(30)));
    let mut exec = executor(&provider, ConnectionMode::Normal);
    exec.set_sql("SELECT @a")?.add_in_parameter("@a", 1)?;

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = exec.execute_async_with_cancel(&token).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(!exec.is_open());
    assert_eq!(provider.counters().closes, 1);
    Ok(())
}
