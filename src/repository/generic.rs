use serde::de::DeserializeOwned;
use tracing::{Instrument, Level, event, info_span};

use crate::core::{Params, PersistenceError, Result};
use crate::criteria::Jpql;
use crate::metamodel::{Entity, EntityType};
use crate::session::{IdentityProbe, KeyPresence, PersistenceSession};

/// Repository over any number of entity types, named per call.
///
/// Holds no entity state of its own: every operation is forwarded to the
/// session, one awaited call at a time. Batch operations loop over their
/// input in order and stop at the first failure, leaving earlier elements
/// applied.
#[derive(Debug, Clone)]
pub struct GenericEntityRepository<S, P = KeyPresence> {
    session: S,
    probe: P,
}

impl<S: PersistenceSession> GenericEntityRepository<S> {
    pub fn new(session: S) -> Self {
        Self::with_probe(session, KeyPresence)
    }
}

impl<S: PersistenceSession, P: IdentityProbe> GenericEntityRepository<S, P> {
    pub fn with_probe(session: S, probe: P) -> Self {
        Self { session, probe }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Fresh query builder bound to the session.
    pub fn jpql(&self) -> Jpql<'_, S> {
        Jpql::new(&self.session)
    }

    pub fn select<I, T>(&self, fragments: I) -> Jpql<'_, S>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.jpql().select(fragments)
    }

    /// Inserts `entity` when the probe reports it as new, merges it otherwise.
    ///
    /// Returns the inserted entity (with any generated key) or the merged copy.
    pub async fn save<E: Entity>(&self, ty: &EntityType<E>, entity: E) -> Result<E> {
        let span = info_span!("repository.save", entity = ty.name());
        self.persist_or_merge(ty, entity).instrument(span).await
    }

    async fn persist_or_merge<E: Entity>(&self, ty: &EntityType<E>, mut entity: E) -> Result<E> {
        if self.probe.is_new(ty, &entity) {
            self.session.persist(ty, &mut entity).await?;
            event!(Level::DEBUG, "new entity persisted");
            Ok(entity)
        } else {
            let merged = self.session.merge(ty, &entity).await?;
            event!(Level::DEBUG, "existing entity merged");
            Ok(merged)
        }
    }

    pub async fn save_all<E, I>(&self, ty: &EntityType<E>, entities: I) -> Result<Vec<E>>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        let mut saved = Vec::new();
        for entity in entities {
            saved.push(self.save(ty, entity).await?);
        }
        Ok(saved)
    }

    /// Removes `entity`, merging it first when the session does not track it.
    pub async fn remove<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<()> {
        let span = info_span!("repository.remove", entity = ty.name());
        self.remove_attached(ty, entity).instrument(span).await
    }

    async fn remove_attached<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<()> {
        if self.session.contains(ty, entity).await? {
            return self.session.remove(ty, entity).await;
        }

        event!(Level::DEBUG, "reattaching detached entity before removal");
        let merged = self.session.merge(ty, entity).await?;
        self.session.remove(ty, &merged).await
    }

    pub async fn remove_all<'a, E, I>(&self, ty: &EntityType<E>, entities: I) -> Result<()>
    where
        E: Entity,
        I: IntoIterator<Item = &'a E>,
    {
        for entity in entities {
            self.remove(ty, entity).await?;
        }
        Ok(())
    }

    /// Overwrites `entity` with its stored state.
    pub async fn refresh<E: Entity>(&self, ty: &EntityType<E>, entity: &mut E) -> Result<()> {
        self.session.refresh(ty, entity).await
    }

    pub async fn refreshed<E: Entity>(&self, ty: &EntityType<E>, mut entity: E) -> Result<E> {
        self.refresh(ty, &mut entity).await?;
        Ok(entity)
    }

    pub async fn refresh_all<'a, E, I>(&self, ty: &EntityType<E>, entities: I) -> Result<()>
    where
        E: Entity,
        I: IntoIterator<Item = &'a mut E>,
    {
        for entity in entities {
            self.refresh(ty, entity).await?;
        }
        Ok(())
    }

    pub async fn refreshed_all<E: Entity>(
        &self,
        ty: &EntityType<E>,
        mut entities: Vec<E>,
    ) -> Result<Vec<E>> {
        self.refresh_all(ty, entities.iter_mut()).await?;
        Ok(entities)
    }

    pub async fn contains<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<bool> {
        self.session.contains(ty, entity).await
    }

    /// Stops tracking `entity`; later changes to it are not persisted.
    pub async fn detach<E: Entity>(&self, ty: &EntityType<E>, entity: &E) -> Result<()> {
        self.session.detach(ty, entity).await
    }

    pub async fn detached<E: Entity>(&self, ty: &EntityType<E>, entity: E) -> Result<E> {
        self.detach(ty, &entity).await?;
        Ok(entity)
    }

    pub async fn detach_all<'a, E, I>(&self, ty: &EntityType<E>, entities: I) -> Result<()>
    where
        E: Entity,
        I: IntoIterator<Item = &'a E>,
    {
        for entity in entities {
            self.detach(ty, entity).await?;
        }
        Ok(())
    }

    pub async fn detached_all<E: Entity>(
        &self,
        ty: &EntityType<E>,
        entities: Vec<E>,
    ) -> Result<Vec<E>> {
        self.detach_all(ty, entities.iter()).await?;
        Ok(entities)
    }

    pub async fn flush(&self) -> Result<()> {
        self.session.flush().await
    }

    /// Looks an entity up by primary key. `Ok(None)` when it does not exist.
    pub async fn find_by<E: Entity>(&self, ty: &EntityType<E>, key: &E::Key) -> Result<Option<E>> {
        self.session.find(ty, key).await
    }

    pub async fn find_all<E: Entity>(&self, ty: &EntityType<E>) -> Result<Vec<E>> {
        self.find_all_paged(ty, 0, 0).await
    }

    /// Pages through all entities of `ty`. Non-positive `start` or `max` leave
    /// the corresponding bound unset.
    pub async fn find_all_paged<E: Entity>(
        &self,
        ty: &EntityType<E>,
        start: i64,
        max: i64,
    ) -> Result<Vec<E>> {
        self.jpql()
            .from([self.session.entity_name(ty)])
            .first_result_opt(positive(start))
            .max_results_opt(positive(max))
            .get_result_list_as()
            .await
    }

    /// Runs the query registered as `name`, deserializing every row into `T`.
    pub async fn find_by_named_query<T: DeserializeOwned>(
        &self,
        name: &str,
        params: &Params,
    ) -> Result<Vec<T>> {
        event!(Level::DEBUG, query = name, params = params.len(), "executing named query");
        self.session
            .execute_named_query(name, params)
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(PersistenceError::from))
            .collect()
    }

    /// First row of the named query, or `None` when it yields nothing.
    pub async fn find_any_by_named_query<T: DeserializeOwned>(
        &self,
        name: &str,
        params: &Params,
    ) -> Result<Option<T>> {
        Ok(self
            .find_by_named_query(name, params)
            .await?
            .into_iter()
            .next())
    }

    /// Fails unless the named query yields exactly one row.
    pub async fn find_unique_by_named_query<T: DeserializeOwned>(
        &self,
        name: &str,
        params: &Params,
    ) -> Result<T> {
        let mut rows: Vec<T> = self.find_by_named_query(name, params).await?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            0 => Err(PersistenceError::NoResult {
                query: name.to_string(),
            }),
            count => Err(PersistenceError::NonUniqueResult {
                query: name.to_string(),
                count,
            }),
        }
    }
}

fn positive(bound: i64) -> Option<usize> {
    if bound > 0 {
        usize::try_from(bound).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_bounds() {
        assert_eq!(positive(0), None);
        assert_eq!(positive(-3), None);
        assert_eq!(positive(5), Some(5));
    }
}
