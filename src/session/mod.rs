//! Contract between the facade and whatever persistence context backs it.

pub mod config;
mod identity;

use async_trait::async_trait;

use crate::core::{Params, Result, ResultRow};
use crate::criteria::QuerySpec;
use crate::metamodel::{Entity, EntityType};

pub use config::{FlushMode, SessionConfig};
pub use identity::{IdentityProbe, KeyPresence};

/// A persistence context scoped to one unit of work.
///
/// Implementations own entity lifecycle (new, managed, detached, removed),
/// parameter binding, pagination and flushing. Callers drive one operation
/// at a time; implementations are not expected to coordinate concurrent use.
#[async_trait]
pub trait PersistenceSession: Send + Sync {
    /// Executes query text with its bound parameters and pagination.
    async fn execute_query(&self, query: &QuerySpec) -> Result<Vec<ResultRow>>;

    /// Executes a query registered under `name`.
    async fn execute_named_query(&self, name: &str, params: &Params) -> Result<Vec<ResultRow>>;

    /// Looks an entity up by primary key.
    async fn find<E: Entity>(&self, ty: &EntityType<E>, key: &E::Key) -> Result<Option<E>>;

    /// Makes a new entity managed. Generated keys are written back into `entity`.
    async fn persist<E: Entity>(&self, ty: &EntityType<E>, entity: &mut E) -> Result<()>;

    /// Copies the state of `entity` into the context and returns the managed copy.
    async fn merge<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<E>;

    /// Schedules a managed entity for deletion.
    async fn remove<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<()>;

    /// Overwrites `entity` with its stored state, discarding unsaved changes.
    async fn refresh<E: Entity>(&self, ty: &EntityType<E>, entity: &mut E) -> Result<()>;

    /// Stops tracking `entity`. Pending changes to it are dropped.
    async fn detach<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<()>;

    /// Whether `entity` is currently managed by this context.
    async fn contains<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<bool>;

    /// Writes pending changes through to the backing store.
    async fn flush(&self) -> Result<()>;

    /// Name under which `ty` is addressed in query text.
    fn entity_name<E: Entity>(&self, ty: &EntityType<E>) -> String {
        ty.name().to_string()
    }
}
