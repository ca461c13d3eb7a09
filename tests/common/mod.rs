#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surijpa::{
    DataType, Entity, EntityType, InMemorySession, Params, PersistenceSession, QuerySpec,
    Result, ResultRow, SessionConfig, Value,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Option<i64>,
    pub owner: String,
    pub balance: i64,
    pub version: i32,
}

impl Entity for Account {
    type Key = i64;

    fn key(&self) -> Option<i64> {
        self.id
    }
}

pub fn account_type() -> EntityType<Account> {
    EntityType::<Account>::new("Account")
        .with_version("version", DataType::Integer, |a| Some(Value::from(a.version)))
        .with_key_generator(|a, seq| a.id = Some(seq))
}

pub fn account(owner: &str, balance: i64) -> Account {
    Account {
        id: None,
        owner: owner.to_string(),
        balance,
        version: 0,
    }
}

pub async fn session() -> InMemorySession {
    let session = InMemorySession::new(SessionConfig::new("tests").record_queries(true)).unwrap();
    session.register_entity(&account_type()).await;
    session
}

/// Session with `accounts` saved and flushed, in order.
pub async fn seeded(accounts: &[(&str, i64)]) -> InMemorySession {
    let session = session().await;
    let ty = account_type();
    for (owner, balance) in accounts {
        session
            .persist(&ty, &mut account(owner, *balance))
            .await
            .unwrap();
    }
    session.flush().await.unwrap();
    session
}

/// Delegates to an in-memory session and records every entity operation.
#[derive(Clone)]
pub struct RecordingSession {
    pub inner: InMemorySession,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingSession {
    pub fn new(inner: InMemorySession) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record<E: Entity>(&self, op: &str, entity: &E) {
        let key = entity
            .key()
            .map(|k| serde_json::to_string(&k).unwrap())
            .unwrap_or_else(|| "-".to_string());
        self.calls.lock().unwrap().push(format!("{op} {key}"));
    }
}

#[async_trait]
impl PersistenceSession for RecordingSession {
    async fn execute_query(&self, query: &QuerySpec) -> Result<Vec<ResultRow>> {
        self.inner.execute_query(query).await
    }

    async fn execute_named_query(&self, name: &str, params: &Params) -> Result<Vec<ResultRow>> {
        self.inner.execute_named_query(name, params).await
    }

    async fn find<E: Entity>(&self, ty: &EntityType<E>, key: &E::Key) -> Result<Option<E>> {
        self.inner.find(ty, key).await
    }

    async fn persist<E: Entity>(&self, ty: &EntityType<E>, entity: &mut E) -> Result<()> {
        self.record("persist", entity);
        self.inner.persist(ty, entity).await
    }

    async fn merge<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<E> {
        self.record("merge", entity);
        self.inner.merge(ty, entity).await
    }

    async fn remove<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<()> {
        self.record("remove", entity);
        self.inner.remove(ty, entity).await
    }

    async fn refresh<E: Entity>(&self, ty: &EntityType<E>, entity: &mut E) -> Result<()> {
        self.record("refresh", entity);
        self.inner.refresh(ty, entity).await
    }

    async fn detach<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<()> {
        self.record("detach", entity);
        self.inner.detach(ty, entity).await
    }

    async fn contains<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<bool> {
        self.record("contains", entity);
        self.inner.contains(ty, entity).await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}
