use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{Level, event};

use crate::core::{Params, PersistenceError, Result, ResultRow};
use crate::criteria::QuerySpec;

use super::store::Store;

/// Answers one exact query text.
pub type QueryHandler = Arc<dyn Fn(&QuerySpec, &Store) -> Result<Vec<ResultRow>> + Send + Sync>;

/// Answers a named query from its parameters.
pub type NamedQueryHandler = Arc<dyn Fn(&Params, &Store) -> Result<Vec<ResultRow>> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum NamedQuery {
    Jpql(String),
    Handler(NamedQueryHandler),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    New,
    Managed,
    Removed,
}

#[derive(Debug, Clone)]
pub(crate) struct ContextEntry {
    pub(crate) state: EntryState,
    pub(crate) data: serde_json::Value,
    /// Attach order; flush writes in this order.
    seq: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// (entity name, serialized key)
pub(crate) type EntryKey = (String, String);

/// Backing store plus the persistence context of one unit of work.
#[derive(Default)]
pub(crate) struct SessionState {
    pub(crate) store: Store,
    context: BTreeMap<EntryKey, ContextEntry>,
    sequences: HashMap<String, i64>,
    attached: u64,
    pub(crate) queries: HashMap<String, QueryHandler>,
    pub(crate) named_queries: HashMap<String, NamedQuery>,
    pub(crate) executed: Vec<QuerySpec>,
}

impl SessionState {
    pub(crate) fn ensure_registered(&self, entity_name: &str) -> Result<()> {
        if self.store.is_registered(entity_name) {
            Ok(())
        } else {
            Err(PersistenceError::NotAnEntity(entity_name.to_string()))
        }
    }

    pub(crate) fn next_sequence(&mut self, entity_name: &str) -> i64 {
        let sequence = self.sequences.entry(entity_name.to_string()).or_insert(0);
        *sequence += 1;
        *sequence
    }

    /// Whether `key` is tracked by the context or present in the store.
    pub(crate) fn is_taken(&self, key: &EntryKey) -> bool {
        self.context.contains_key(key) || self.store.contains(&key.0, &key.1)
    }

    /// Number of keys of `entity_name` known to the context or the store.
    pub(crate) fn occupied(&self, entity_name: &str) -> usize {
        let tracked = self
            .context
            .keys()
            .filter(|(name, _)| name == entity_name)
            .count();
        tracked + self.store.len(entity_name)
    }

    pub(crate) fn is_managed(&self, key: &EntryKey) -> bool {
        self.context
            .get(key)
            .is_some_and(|entry| entry.state != EntryState::Removed)
    }

    pub(crate) fn insert_new(&mut self, key: EntryKey, data: serde_json::Value) -> Result<()> {
        match self.context.get_mut(&key) {
            Some(entry) if entry.state == EntryState::Removed => {
                entry.state = EntryState::Managed;
                entry.data = data;
                return Ok(());
            }
            Some(_) => return Err(entity_exists(&key)),
            None => {}
        }

        if self.store.contains(&key.0, &key.1) {
            return Err(entity_exists(&key));
        }

        self.attach(key, EntryState::New, data);
        Ok(())
    }

    pub(crate) fn merge(&mut self, key: EntryKey, data: serde_json::Value) -> Result<()> {
        if let Some(entry) = self.context.get_mut(&key) {
            if entry.state == EntryState::Removed {
                return Err(PersistenceError::Execution(format!(
                    "cannot merge removed entity {}#{}",
                    key.0, key.1
                )));
            }
            entry.data = data;
            return Ok(());
        }

        let state = if self.store.contains(&key.0, &key.1) {
            EntryState::Managed
        } else {
            EntryState::New
        };
        self.attach(key, state, data);
        Ok(())
    }

    pub(crate) fn remove(&mut self, key: &EntryKey) -> Result<()> {
        let Some(entry) = self.context.get_mut(key) else {
            return Err(PersistenceError::Execution(format!(
                "cannot remove detached entity {}#{}",
                key.0, key.1
            )));
        };

        let state = entry.state;
        match state {
            EntryState::New => {
                self.context.remove(key);
            }
            EntryState::Managed => entry.state = EntryState::Removed,
            EntryState::Removed => {}
        }
        Ok(())
    }

    /// Replaces the managed state with the stored one and returns it.
    pub(crate) fn refresh(&mut self, key: &EntryKey) -> Result<serde_json::Value> {
        if !self.is_managed(key) {
            return Err(PersistenceError::Execution(format!(
                "cannot refresh unmanaged entity {}#{}",
                key.0, key.1
            )));
        }

        let stored = self
            .store
            .get(&key.0, &key.1)
            .cloned()
            .ok_or_else(|| PersistenceError::EntityNotFound(format!("{}#{}", key.0, key.1)))?;

        if let Some(entry) = self.context.get_mut(key) {
            entry.state = EntryState::Managed;
            entry.data = stored.clone();
        }
        Ok(stored)
    }

    fn attach(&mut self, key: EntryKey, state: EntryState, data: serde_json::Value) {
        self.attached += 1;
        let seq = self.attached;
        self.context.insert(key, ContextEntry { state, data, seq });
    }

    pub(crate) fn detach(&mut self, key: &EntryKey) -> bool {
        self.context.remove(key).is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.context.clear();
    }

    /// Context state first, then the store; a store hit becomes managed.
    pub(crate) fn find(&mut self, key: &EntryKey) -> Option<serde_json::Value> {
        if let Some(entry) = self.context.get(key) {
            return match entry.state {
                EntryState::Removed => None,
                EntryState::New | EntryState::Managed => Some(entry.data.clone()),
            };
        }

        let stored = self.store.get(&key.0, &key.1)?.clone();
        self.attach(key.clone(), EntryState::Managed, stored.clone());
        Some(stored)
    }

    pub(crate) fn flush(&mut self) -> Result<FlushStats> {
        let mut stats = FlushStats::default();
        let mut removed = Vec::new();

        let mut entries: Vec<_> = self.context.iter_mut().collect();
        entries.sort_by_key(|(_, entry)| entry.seq);

        for (key, entry) in entries {
            match entry.state {
                EntryState::New => {
                    self.store.upsert(&key.0, &key.1, entry.data.clone())?;
                    entry.state = EntryState::Managed;
                    stats.inserted += 1;
                }
                EntryState::Managed => {
                    if self.store.get(&key.0, &key.1) != Some(&entry.data) {
                        self.store.upsert(&key.0, &key.1, entry.data.clone())?;
                        stats.updated += 1;
                    }
                }
                EntryState::Removed => {
                    if self.store.delete(&key.0, &key.1)? {
                        stats.deleted += 1;
                    }
                    removed.push(key.clone());
                }
            }
        }

        for key in removed {
            self.context.remove(&key);
        }

        event!(
            Level::DEBUG,
            inserted = stats.inserted,
            updated = stats.updated,
            deleted = stats.deleted,
            "persistence context flushed"
        );
        Ok(stats)
    }
}

fn entity_exists(key: &EntryKey) -> PersistenceError {
    PersistenceError::EntityExists(format!("{}#{}", key.0, key.1))
}
