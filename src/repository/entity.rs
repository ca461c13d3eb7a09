use serde::de::DeserializeOwned;

use crate::core::{DataType, Params, Result, Value};
use crate::criteria::Jpql;
use crate::metamodel::{Entity, EntityType};
use crate::session::{IdentityProbe, KeyPresence, PersistenceSession};

use super::generic::GenericEntityRepository;
use super::version::check_version;

/// Repository bound to one entity type.
///
/// The descriptor is given at construction and used for every call, so
/// lookups, `find_all` and the version check need nothing but a key.
///
/// ```ignore
/// let users = EntityRepository::new(session.clone(), user_type());
/// let saved = users.save(User::new("ada")).await?;
/// let loaded = users.find_by_and_check_version(&saved.id.unwrap(), 0).await?;
/// ```
#[derive(Debug, Clone)]
pub struct EntityRepository<E: Entity, S, P = KeyPresence> {
    inner: GenericEntityRepository<S, P>,
    entity_type: EntityType<E>,
}

impl<E: Entity, S: PersistenceSession> EntityRepository<E, S> {
    pub fn new(session: S, entity_type: EntityType<E>) -> Self {
        Self::with_probe(session, entity_type, KeyPresence)
    }
}

impl<E: Entity, S: PersistenceSession, P: IdentityProbe> EntityRepository<E, S, P> {
    pub fn with_probe(session: S, entity_type: EntityType<E>, probe: P) -> Self {
        Self {
            inner: GenericEntityRepository::with_probe(session, probe),
            entity_type,
        }
    }

    pub fn session(&self) -> &S {
        self.inner.session()
    }

    pub fn entity_type(&self) -> &EntityType<E> {
        &self.entity_type
    }

    pub fn jpql(&self) -> Jpql<'_, S> {
        self.inner.jpql()
    }

    pub fn select<I, T>(&self, fragments: I) -> Jpql<'_, S>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.inner.select(fragments)
    }

    pub async fn save(&self, entity: E) -> Result<E> {
        self.inner.save(&self.entity_type, entity).await
    }

    pub async fn save_all<I: IntoIterator<Item = E>>(&self, entities: I) -> Result<Vec<E>> {
        self.inner.save_all(&self.entity_type, entities).await
    }

    pub async fn remove(&self, entity: &E) -> Result<()> {
        self.inner.remove(&self.entity_type, entity).await
    }

    pub async fn remove_all<'a, I: IntoIterator<Item = &'a E>>(&self, entities: I) -> Result<()> {
        self.inner.remove_all(&self.entity_type, entities).await
    }

    pub async fn refresh(&self, entity: &mut E) -> Result<()> {
        self.inner.refresh(&self.entity_type, entity).await
    }

    pub async fn refreshed(&self, entity: E) -> Result<E> {
        self.inner.refreshed(&self.entity_type, entity).await
    }

    pub async fn refresh_all<'a, I: IntoIterator<Item = &'a mut E>>(
        &self,
        entities: I,
    ) -> Result<()> {
        self.inner.refresh_all(&self.entity_type, entities).await
    }

    pub async fn refreshed_all(&self, entities: Vec<E>) -> Result<Vec<E>> {
        self.inner.refreshed_all(&self.entity_type, entities).await
    }

    pub async fn contains(&self, entity: &E) -> Result<bool> {
        self.inner.contains(&self.entity_type, entity).await
    }

    pub async fn detach(&self, entity: &E) -> Result<()> {
        self.inner.detach(&self.entity_type, entity).await
    }

    pub async fn detached(&self, entity: E) -> Result<E> {
        self.inner.detached(&self.entity_type, entity).await
    }

    pub async fn detach_all<'a, I: IntoIterator<Item = &'a E>>(&self, entities: I) -> Result<()> {
        self.inner.detach_all(&self.entity_type, entities).await
    }

    pub async fn detached_all(&self, entities: Vec<E>) -> Result<Vec<E>> {
        self.inner.detached_all(&self.entity_type, entities).await
    }

    pub async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }

    pub async fn find_by(&self, key: &E::Key) -> Result<Option<E>> {
        self.inner.find_by(&self.entity_type, key).await
    }

    /// Finds by key and checks an integer version stamp.
    pub async fn find_by_and_check_version(&self, key: &E::Key, version: i32) -> Result<Option<E>> {
        self.find_by_and_check_version_as(key, version, DataType::Integer)
            .await
    }

    /// Finds by key and checks the version attribute declared as `data_type`.
    ///
    /// An absent entity is returned as `Ok(None)` without a check.
    pub async fn find_by_and_check_version_as(
        &self,
        key: &E::Key,
        version: impl Into<Value>,
        data_type: DataType,
    ) -> Result<Option<E>> {
        let entity = self.find_by(key).await?;
        self.check_version(entity.as_ref(), version, data_type)?;
        Ok(entity)
    }

    pub fn check_version(
        &self,
        entity: Option<&E>,
        version: impl Into<Value>,
        data_type: DataType,
    ) -> Result<()> {
        check_version(&self.entity_type, entity, version.into(), data_type)
    }

    pub async fn find_all(&self) -> Result<Vec<E>> {
        self.inner.find_all(&self.entity_type).await
    }

    pub async fn find_all_paged(&self, start: i64, max: i64) -> Result<Vec<E>> {
        self.inner
            .find_all_paged(&self.entity_type, start, max)
            .await
    }

    pub async fn find_by_named_query(&self, name: &str, params: &Params) -> Result<Vec<E>> {
        self.inner.find_by_named_query(name, params).await
    }

    pub async fn find_any_by_named_query(&self, name: &str, params: &Params) -> Result<Option<E>> {
        self.inner.find_any_by_named_query(name, params).await
    }

    pub async fn find_unique_by_named_query(&self, name: &str, params: &Params) -> Result<E> {
        self.inner.find_unique_by_named_query(name, params).await
    }

    /// Runs a named query whose rows are not entities of this repository.
    pub async fn find_by_named_query_as<T: DeserializeOwned>(
        &self,
        name: &str,
        params: &Params,
    ) -> Result<Vec<T>> {
        self.inner.find_by_named_query(name, params).await
    }
}
