mod common;

use common::{account, account_type, session};
use serde_json::json;
use surijpa::{
    FlushMode, InMemorySession, Jpql, Params, PersistenceError, PersistenceSession,
    SessionConfig, Value,
};

#[tokio::test]
async fn test_commit_mode_hides_pending_changes() -> anyhow::Result<()> {
    let session = InMemorySession::new(
        SessionConfig::new("commit")
            .flush_mode(FlushMode::Commit)
            .record_queries(false),
    )?;
    session.register_entity(&account_type()).await;

    session.persist(&account_type(), &mut account("ann", 1)).await?;
    let before = Jpql::new(&session).from(["Account"]).get_result_list().await?;
    assert!(before.is_empty());

    let stats = session.flush_with_stats().await?;
    assert_eq!(stats.inserted, 1);
    let after = Jpql::new(&session).from(["Account"]).get_result_list().await?;
    assert_eq!(after.len(), 1);

    assert!(session.executed_queries().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_persist_rejects_existing_key() -> anyhow::Result<()> {
    let session = session().await;
    let ty = account_type();
    let mut ann = account("ann", 1);
    session.persist(&ty, &mut ann).await?;

    let mut twin = ann.clone();
    let err = session.persist(&ty, &mut twin).await.unwrap_err();
    assert!(matches!(err, PersistenceError::EntityExists(_)));
    Ok(())
}

#[tokio::test]
async fn test_find_returns_pending_state() -> anyhow::Result<()> {
    let session = session().await;
    let ty = account_type();
    let mut ann = account("ann", 1);
    session.persist(&ty, &mut ann).await?;

    ann.balance = 50;
    session.merge(&ty, &ann).await?;
    let found = session.find(&ty, &1).await?;
    assert_eq!(found.map(|a| a.balance), Some(50));
    assert!(session.stored_rows("Account").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_clear_detaches_everything() -> anyhow::Result<()> {
    let session = session().await;
    let ty = account_type();
    let mut ann = account("ann", 1);
    session.persist(&ty, &mut ann).await?;
    session.flush().await?;

    session.clear().await;
    assert!(!session.contains(&ty, &ann).await?);

    // Lookups attach stored rows again.
    assert!(session.find(&ty, &1).await?.is_some());
    assert!(session.contains(&ty, &ann).await?);
    Ok(())
}

#[tokio::test]
async fn test_named_handler() -> anyhow::Result<()> {
    let session = session().await;
    session
        .register_named_handler("Account.richest", |params, store| {
            let limit = params.get("limit").and_then(Value::as_i64).unwrap_or(1) as usize;
            let mut rows: Vec<_> = store.rows("Account")?.cloned().collect();
            rows.sort_by_key(|row| -row["balance"].as_i64().unwrap_or_default());
            rows.truncate(limit);
            Ok(rows)
        })
        .await;

    let ty = account_type();
    for (owner, balance) in [("ann", 5), ("bob", 50), ("cid", 20)] {
        session.persist(&ty, &mut account(owner, balance)).await?;
    }

    let mut params = Params::new();
    params.insert("limit".into(), Value::from(2));
    let rows = session.execute_named_query("Account.richest", &params).await?;
    let owners: Vec<_> = rows.iter().map(|row| row["owner"].clone()).collect();
    assert_eq!(owners, vec![json!("bob"), json!("cid")]);
    Ok(())
}

#[tokio::test]
async fn test_queries_on_unknown_entities_fail() {
    let session = session().await;
    let err = Jpql::new(&session)
        .from(["Ledger l"])
        .get_result_list()
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Execution(_)));
}

#[tokio::test]
async fn test_unbound_parameter_fails() {
    let session = session().await;
    let err = Jpql::new(&session)
        .from(["Account a"])
        .where_(["a.owner = :owner"])
        .get_result_list()
        .await
        .unwrap_err();
    assert!(err.to_string().contains(":owner"));
}

#[test]
fn test_flush_mode_parsing() {
    assert_eq!("AUTO".parse::<FlushMode>().unwrap(), FlushMode::Auto);
    assert_eq!("commit".parse::<FlushMode>().unwrap(), FlushMode::Commit);
    assert!(matches!(
        "eager".parse::<FlushMode>(),
        Err(PersistenceError::InvalidConfig(_))
    ));
}
