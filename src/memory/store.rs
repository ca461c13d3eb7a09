use std::collections::HashMap;

use crate::core::{PersistenceError, Result};

/// Flushed entity state, per entity name, in insertion order.
#[derive(Debug, Default)]
pub struct Store {
    tables: HashMap<String, Vec<(String, serde_json::Value)>>,
}

impl Store {
    pub(crate) fn register(&mut self, entity_name: &str) {
        self.tables.entry(entity_name.to_string()).or_default();
    }

    pub fn is_registered(&self, entity_name: &str) -> bool {
        self.tables.contains_key(entity_name)
    }

    /// Rows of `entity_name`, in insertion order.
    pub fn rows(&self, entity_name: &str) -> Result<impl Iterator<Item = &serde_json::Value>> {
        let table = self.table(entity_name)?;
        Ok(table.iter().map(|(_, data)| data))
    }

    pub fn get(&self, entity_name: &str, key: &str) -> Option<&serde_json::Value> {
        self.tables
            .get(entity_name)?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, data)| data)
    }

    pub fn contains(&self, entity_name: &str, key: &str) -> bool {
        self.get(entity_name, key).is_some()
    }

    pub fn len(&self, entity_name: &str) -> usize {
        self.tables.get(entity_name).map_or(0, Vec::len)
    }

    pub(crate) fn upsert(&mut self, entity_name: &str, key: &str, data: serde_json::Value) -> Result<()> {
        let table = self.table_mut(entity_name)?;
        match table.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = data,
            None => table.push((key.to_string(), data)),
        }
        Ok(())
    }

    pub(crate) fn delete(&mut self, entity_name: &str, key: &str) -> Result<bool> {
        let table = self.table_mut(entity_name)?;
        let before = table.len();
        table.retain(|(k, _)| k != key);
        Ok(table.len() != before)
    }

    fn table(&self, entity_name: &str) -> Result<&Vec<(String, serde_json::Value)>> {
        self.tables
            .get(entity_name)
            .ok_or_else(|| PersistenceError::NotAnEntity(entity_name.to_string()))
    }

    fn table_mut(&mut self, entity_name: &str) -> Result<&mut Vec<(String, serde_json::Value)>> {
        self.tables
            .get_mut(entity_name)
            .ok_or_else(|| PersistenceError::NotAnEntity(entity_name.to_string()))
    }
}
