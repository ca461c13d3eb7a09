mod common;

use common::{Account, RecordingSession, account, account_type, seeded, session};
use surijpa::{
    EntityRepository, EntityType, GenericEntityRepository, Params, PersistenceError, Value,
};

#[tokio::test]
async fn test_save_new_entity_persists_once() -> anyhow::Result<()> {
    let session = RecordingSession::new(session().await);
    let repo = EntityRepository::new(session.clone(), account_type());

    let saved = repo.save(account("ann", 10)).await?;

    assert_eq!(saved.id, Some(1));
    assert_eq!(session.calls(), vec!["persist -"]);
    assert!(repo.contains(&saved).await?);
    Ok(())
}

#[tokio::test]
async fn test_save_existing_entity_merges_once() -> anyhow::Result<()> {
    let session = RecordingSession::new(seeded(&[("ann", 10)]).await);
    let repo = EntityRepository::new(session.clone(), account_type());

    let mut existing = account("ann", 99);
    existing.id = Some(1);
    let merged = repo.save(existing.clone()).await?;

    assert_eq!(merged, existing);
    assert_eq!(session.calls(), vec!["merge 1"]);

    repo.flush().await?;
    assert_eq!(repo.find_by(&1).await?.map(|a| a.balance), Some(99));
    Ok(())
}

#[tokio::test]
async fn test_save_all_keeps_input_order() -> anyhow::Result<()> {
    let session = RecordingSession::new(session().await);
    let repo = EntityRepository::new(session.clone(), account_type());

    let mut existing = account("bob", 5);
    existing.id = Some(100);

    let saved = repo
        .save_all(vec![account("ann", 1), existing, account("cid", 2)])
        .await?;

    assert_eq!(session.calls(), vec!["persist -", "merge 100", "persist -"]);
    let ids: Vec<_> = saved.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![Some(1), Some(100), Some(2)]);
    Ok(())
}

#[tokio::test]
async fn test_generated_key_skips_explicit_key() -> anyhow::Result<()> {
    let repo = EntityRepository::new(session().await, account_type());

    let mut explicit = account("ann", 1);
    explicit.id = Some(1);
    repo.save(explicit).await?;
    let generated = repo.save(account("bob", 2)).await?;

    assert_eq!(generated.id, Some(2));
    repo.flush().await?;
    assert_eq!(repo.find_by(&1).await?.map(|a| a.owner), Some("ann".into()));
    assert_eq!(repo.find_by(&2).await?.map(|a| a.owner), Some("bob".into()));
    Ok(())
}

#[tokio::test]
async fn test_batch_failure_leaves_earlier_elements_applied() -> anyhow::Result<()> {
    let session = session().await;
    let repo = EntityRepository::new(session.clone(), account_type());
    repo.save(account("ann", 1)).await?;
    repo.flush().await?;

    // The second element has no key and this descriptor cannot generate one.
    let no_generator = EntityType::<Account>::new("Account");
    let generic = GenericEntityRepository::new(session.clone());
    let err = generic
        .save_all(&no_generator, vec![
            Account { id: Some(7), ..account("bob", 2) },
            account("cid", 3),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Execution(_)));

    repo.flush().await?;
    assert!(repo.find_by(&7).await?.is_some());
    assert_eq!(repo.find_all().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_remove_managed_and_detached() -> anyhow::Result<()> {
    let session = RecordingSession::new(seeded(&[("ann", 1), ("bob", 2)]).await);
    let repo = EntityRepository::new(session.clone(), account_type());

    let ann = repo.find_by(&1).await?.expect("ann exists");
    repo.remove(&ann).await?;

    let bob = repo.find_by(&2).await?.expect("bob exists");
    let bob = repo.detached(bob).await?;
    assert!(!repo.contains(&bob).await?);
    repo.remove(&bob).await?;

    assert_eq!(
        session.calls(),
        vec![
            "contains 1",
            "remove 1",
            "detach 2",
            "contains 2",
            "contains 2",
            "merge 2",
            "remove 2",
        ]
    );

    repo.flush().await?;
    assert!(repo.find_all().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_remove_all() -> anyhow::Result<()> {
    let session = seeded(&[("ann", 1), ("bob", 2), ("cid", 3)]).await;
    let repo = EntityRepository::new(session, account_type());

    let all = repo.find_all().await?;
    repo.remove_all(&all[..2]).await?;
    repo.flush().await?;

    let left: Vec<String> = repo.find_all().await?.into_iter().map(|a| a.owner).collect();
    assert_eq!(left, vec!["cid".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_refresh_discards_unsaved_changes() -> anyhow::Result<()> {
    let session = seeded(&[("ann", 1), ("bob", 2)]).await;
    let repo = EntityRepository::new(session, account_type());

    let mut ann = repo.find_by(&1).await?.expect("ann exists");
    ann.balance = 1000;
    let ann = repo.save(ann).await?;
    assert_eq!(ann.balance, 1000);

    let ann = repo.refreshed(ann).await?;
    assert_eq!(ann.balance, 1);

    let mut all = repo.find_all().await?;
    for account in &mut all {
        account.owner.push('!');
    }
    let all = repo.refreshed_all(all).await?;
    let owners: Vec<&str> = all.iter().map(|a| a.owner.as_str()).collect();
    assert_eq!(owners, vec!["ann", "bob"]);
    Ok(())
}

#[tokio::test]
async fn test_refresh_of_unmanaged_entity_fails() {
    let session = seeded(&[("ann", 1)]).await;
    let repo = EntityRepository::new(session, account_type());

    let mut stranger = account("eve", 0);
    stranger.id = Some(99);
    let err = repo.refresh(&mut stranger).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Execution(_)));
}

#[tokio::test]
async fn test_detached_changes_are_not_flushed() -> anyhow::Result<()> {
    let session = seeded(&[("ann", 1), ("bob", 2)]).await;
    let repo = EntityRepository::new(session.clone(), account_type());

    let mut all = repo.find_all().await?;
    for account in &mut all {
        account.balance = 0;
        repo.save(account.clone()).await?;
    }
    let all = repo.detached_all(all).await?;
    for account in &all {
        assert!(!repo.contains(account).await?);
    }
    repo.flush().await?;

    let balances: Vec<i64> = session
        .stored_rows("Account")
        .await?
        .iter()
        .map(|row| row["balance"].as_i64().unwrap_or_default())
        .collect();
    assert_eq!(balances, vec![1, 2]);
    Ok(())
}

#[tokio::test]
async fn test_contains_rejects_unknown_entity_type() {
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct Ghost {
        id: Option<i64>,
    }

    impl surijpa::Entity for Ghost {
        type Key = i64;

        fn key(&self) -> Option<i64> {
            self.id
        }
    }

    let repo = EntityRepository::new(session().await, EntityType::<Ghost>::new("Ghost"));
    let err = repo.contains(&Ghost { id: Some(1) }).await.unwrap_err();
    assert!(matches!(err, PersistenceError::NotAnEntity(_)));
}

#[tokio::test]
async fn test_find_by_missing_key_is_none() -> anyhow::Result<()> {
    let repo = EntityRepository::new(seeded(&[("ann", 1)]).await, account_type());
    assert!(repo.find_by(&404).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_find_all_pagination_bounds() -> anyhow::Result<()> {
    let session = seeded(&[("ann", 1), ("bob", 2), ("cid", 3)]).await;
    let repo = EntityRepository::new(session.clone(), account_type());

    assert_eq!(repo.find_all_paged(0, 0).await?.len(), 3);
    assert_eq!(repo.find_all_paged(-1, -5).await?.len(), 3);
    assert_eq!(repo.find_all_paged(5, 10).await?.len(), 0);
    let page = repo.find_all_paged(1, 1).await?;
    assert_eq!(page[0].owner, "bob");

    let executed = session.executed_queries().await;
    let bounds: Vec<_> = executed
        .iter()
        .map(|q| (q.text.as_str(), q.first_result, q.max_results))
        .collect();
    assert_eq!(
        bounds,
        vec![
            ("from Account", None, None),
            ("from Account", None, None),
            ("from Account", Some(5), Some(10)),
            ("from Account", Some(1), Some(1)),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_named_queries() -> anyhow::Result<()> {
    let session = seeded(&[("ann", 1), ("bob", 2), ("cid", 2)]).await;
    session
        .register_named_query("Account.byBalance", "from Account a where a.balance = :balance")
        .await;
    let repo = EntityRepository::new(session, account_type());

    let mut params = Params::new();
    params.insert("balance".into(), Value::from(2));
    let matches = repo.find_by_named_query("Account.byBalance", &params).await?;
    assert_eq!(matches.len(), 2);

    let any = repo.find_any_by_named_query("Account.byBalance", &params).await?;
    assert_eq!(any.map(|a| a.owner).as_deref(), Some("bob"));

    let err = repo
        .find_unique_by_named_query("Account.byBalance", &params)
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::NonUniqueResult { count: 2, .. }));

    params.insert("balance".into(), Value::from(1));
    let ann = repo.find_unique_by_named_query("Account.byBalance", &params).await?;
    assert_eq!(ann.owner, "ann");

    params.insert("balance".into(), Value::from(50));
    assert!(repo.find_any_by_named_query("Account.byBalance", &params).await?.is_none());
    let err = repo
        .find_unique_by_named_query("Account.byBalance", &params)
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::NoResult { .. }));
    Ok(())
}

#[tokio::test]
async fn test_generic_repository_names_type_per_call() -> anyhow::Result<()> {
    let session = session().await;
    let repo = GenericEntityRepository::new(session);
    let ty = account_type();

    let ann = repo.save(&ty, account("ann", 3)).await?;
    repo.flush().await?;

    let found: Option<Account> = repo.find_by(&ty, &ann.id.unwrap_or_default()).await?;
    assert_eq!(found, Some(ann.clone()));

    let owners: Vec<String> = repo
        .select(["a.owner"])
        .from(["Account a"])
        .get_result_list_as()
        .await?;
    assert_eq!(owners, vec!["ann".to_string()]);

    repo.remove(&ty, &ann).await?;
    repo.flush().await?;
    assert!(repo.find_all(&ty).await?.is_empty());
    Ok(())
}
