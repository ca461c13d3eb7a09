//! In-memory persistence context.
//!
//! [`InMemorySession`] keeps a backing [`Store`] of flushed rows and an
//! identity map of the entities managed by the current unit of work. Query
//! text is answered by exact-text handlers registered with
//! [`InMemorySession::on_query`] or, failing that, by a small interpreter for
//! single-entity JPQL.

mod context;
mod interpreter;
mod pattern;
mod store;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{Level, event};

use crate::core::{Params, PersistenceError, Result, ResultRow};
use crate::criteria::QuerySpec;
use crate::metamodel::{Entity, EntityType};
use crate::session::{FlushMode, PersistenceSession, SessionConfig};

use context::{EntryKey, NamedQuery, SessionState};

pub use context::{FlushStats, NamedQueryHandler, QueryHandler};
pub use store::Store;

/// Cloneable handle to an in-memory persistence context.
#[derive(Clone)]
pub struct InMemorySession {
    config: Arc<SessionConfig>,
    state: Arc<Mutex<SessionState>>,
}

impl InMemorySession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(SessionState::default())),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Makes `ty` known to the session. Operations on unregistered types fail.
    pub async fn register_entity<E: Entity>(&self, ty: &EntityType<E>) {
        let mut state = self.state.lock().await;
        state.store.register(ty.name());
    }

    /// Registers a handler answering exactly `text`. Takes precedence over the interpreter.
    pub async fn on_query<F>(&self, text: impl Into<String>, handler: F)
    where
        F: Fn(&QuerySpec, &Store) -> Result<Vec<ResultRow>> + Send + Sync + 'static,
    {
        let mut state = self.state.lock().await;
        state.queries.insert(text.into(), Arc::new(handler));
    }

    /// Registers JPQL text under `name`.
    pub async fn register_named_query(&self, name: impl Into<String>, jpql: impl Into<String>) {
        let mut state = self.state.lock().await;
        state
            .named_queries
            .insert(name.into(), NamedQuery::Jpql(jpql.into()));
    }

    pub async fn register_named_handler<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Params, &Store) -> Result<Vec<ResultRow>> + Send + Sync + 'static,
    {
        let mut state = self.state.lock().await;
        state
            .named_queries
            .insert(name.into(), NamedQuery::Handler(Arc::new(handler)));
    }

    /// Queries executed so far, in order. Empty unless `record_queries` is set.
    pub async fn executed_queries(&self) -> Vec<QuerySpec> {
        self.state.lock().await.executed.clone()
    }

    /// Flushed rows of `entity_name`.
    pub async fn stored_rows(&self, entity_name: &str) -> Result<Vec<serde_json::Value>> {
        let state = self.state.lock().await;
        Ok(state.store.rows(entity_name)?.cloned().collect())
    }

    /// Detaches every managed entity. Unflushed changes are lost.
    pub async fn clear(&self) {
        self.state.lock().await.clear();
        event!(Level::DEBUG, session = %self.config.name, "persistence context cleared");
    }

    /// Flushes and reports what was written.
    pub async fn flush_with_stats(&self) -> Result<FlushStats> {
        self.state.lock().await.flush()
    }

    fn entry_key<E: Entity>(ty: &EntityType<E>, key: &E::Key) -> Result<EntryKey> {
        Ok((ty.name().to_string(), encode_key(key)?))
    }

    fn run(&self, state: &mut SessionState, query: &QuerySpec) -> Result<Vec<ResultRow>> {
        if self.config.flush_mode == FlushMode::Auto {
            state.flush()?;
        }
        if self.config.record_queries {
            state.executed.push(query.clone());
        }

        let rows = match state.queries.get(&query.text) {
            Some(handler) => handler(query, &state.store)?,
            None => interpreter::execute(query, &state.store)?,
        };
        let rows = query.paginate(rows);

        event!(
            Level::DEBUG,
            session = %self.config.name,
            jpql = %query.text,
            rows = rows.len(),
            "query executed"
        );
        Ok(rows)
    }
}

fn encode_key<K: Serialize>(key: &K) -> Result<String> {
    Ok(serde_json::to_string(key)?)
}

fn unmanaged_key(entity_name: &str) -> PersistenceError {
    PersistenceError::Execution(format!("{} instance has no identifier", entity_name))
}

#[async_trait]
impl PersistenceSession for InMemorySession {
    async fn execute_query(&self, query: &QuerySpec) -> Result<Vec<ResultRow>> {
        let mut state = self.state.lock().await;
        self.run(&mut state, query)
    }

    async fn execute_named_query(&self, name: &str, params: &Params) -> Result<Vec<ResultRow>> {
        let mut state = self.state.lock().await;
        let named = state.named_queries.get(name).cloned().ok_or_else(|| {
            PersistenceError::Execution(format!("no named query registered as '{}'", name))
        })?;

        match named {
            NamedQuery::Jpql(text) => {
                let mut query = QuerySpec::new(text);
                query.params = params.clone();
                self.run(&mut state, &query)
            }
            NamedQuery::Handler(handler) => {
                if self.config.flush_mode == FlushMode::Auto {
                    state.flush()?;
                }
                handler(params, &state.store)
            }
        }
    }

    async fn find<E: Entity>(&self, ty: &EntityType<E>, key: &E::Key) -> Result<Option<E>> {
        let mut state = self.state.lock().await;
        state.ensure_registered(ty.name())?;
        match state.find(&Self::entry_key(ty, key)?) {
            Some(data) => Ok(Some(serde_json::from_value(data)?)),
            None => Ok(None),
        }
    }

    async fn persist<E: Entity>(&self, ty: &EntityType<E>, entity: &mut E) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ensure_registered(ty.name())?;

        if ty.key_of(entity).is_none() {
            let generator = ty.key_generator().ok_or_else(|| unmanaged_key(ty.name()))?;
            // Skip sequence values already taken by explicitly keyed entities.
            for _ in 0..=state.occupied(ty.name()) {
                let sequence = state.next_sequence(ty.name());
                generator(entity, sequence);
                let key = ty.key_of(entity).ok_or_else(|| unmanaged_key(ty.name()))?;
                if !state.is_taken(&Self::entry_key(ty, &key)?) {
                    break;
                }
            }
        }
        let key = ty.key_of(entity).ok_or_else(|| unmanaged_key(ty.name()))?;

        state.insert_new(Self::entry_key(ty, &key)?, serde_json::to_value(&*entity)?)?;
        event!(Level::DEBUG, session = %self.config.name, entity = ty.name(), key = ?key, "entity persisted");
        Ok(())
    }

    async fn merge<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<E> {
        let mut merged = entity.clone();
        if ty.key_of(&merged).is_none() {
            self.persist(ty, &mut merged).await?;
            return Ok(merged);
        }

        let mut state = self.state.lock().await;
        state.ensure_registered(ty.name())?;
        let key = ty.key_of(&merged).ok_or_else(|| unmanaged_key(ty.name()))?;
        state.merge(Self::entry_key(ty, &key)?, serde_json::to_value(&merged)?)?;
        event!(Level::DEBUG, session = %self.config.name, entity = ty.name(), key = ?key, "entity merged");
        Ok(merged)
    }

    async fn remove<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ensure_registered(ty.name())?;
        let key = ty.key_of(entity).ok_or_else(|| unmanaged_key(ty.name()))?;
        state.remove(&Self::entry_key(ty, &key)?)?;
        event!(Level::DEBUG, session = %self.config.name, entity = ty.name(), key = ?key, "entity removed");
        Ok(())
    }

    async fn refresh<E: Entity>(&self, ty: &EntityType<E>, entity: &mut E) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ensure_registered(ty.name())?;
        let key = ty.key_of(entity).ok_or_else(|| unmanaged_key(ty.name()))?;
        let stored = state.refresh(&Self::entry_key(ty, &key)?)?;
        *entity = serde_json::from_value(stored)?;
        Ok(())
    }

    async fn detach<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ensure_registered(ty.name())?;
        if let Some(key) = ty.key_of(entity) {
            state.detach(&Self::entry_key(ty, &key)?);
        }
        Ok(())
    }

    async fn contains<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<bool> {
        let state = self.state.lock().await;
        state.ensure_registered(ty.name())?;
        match ty.key_of(entity) {
            Some(key) => Ok(state.is_managed(&Self::entry_key(ty, &key)?)),
            None => Ok(false),
        }
    }

    async fn flush(&self) -> Result<()> {
        self.flush_with_stats().await.map(|_| ())
    }
}
