//! In-process keyed store

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{new_etag, validate_batch, BatchAction, Entity, KeyedStore, Query};
use crate::error::{Error, Result};

type Table = BTreeMap<(String, String), Entity>;

/// Keyed store held in memory. Listing order is partition key, then row key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Table>>> {
        self.tables
            .lock()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }

    /// Number of entities in a table (0 if missing)
    pub fn len(&self, table: &str) -> usize {
        self.lock()
            .map(|tables| tables.get(table).map_or(0, |t| t.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}

fn table_mut<'a>(tables: &'a mut HashMap<String, Table>, table: &str) -> Result<&'a mut Table> {
    tables
        .get_mut(table)
        .ok_or_else(|| Error::NotFound(format!("table {}", table)))
}

fn stored(mut entity: Entity) -> Entity {
    entity.etag = Some(new_etag());
    entity
}

#[async_trait]
impl KeyedStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_table(&self, table: &str) -> Result<()> {
        self.lock()?.entry(table.to_string()).or_default();
        Ok(())
    }

    async fn upsert_entity(&self, table: &str, entity: Entity) -> Result<()> {
        let mut tables = self.lock()?;
        let t = table_mut(&mut tables, table)?;
        let key = (entity.partition_key.clone(), entity.row_key.clone());
        t.insert(key, stored(entity));
        Ok(())
    }

    async fn submit_batch(&self, table: &str, actions: Vec<BatchAction>) -> Result<()> {
        validate_batch(&actions)?;
        let mut tables = self.lock()?;
        let t = table_mut(&mut tables, table)?;
        for action in actions {
            match action {
                BatchAction::Upsert(entity) => {
                    let key = (entity.partition_key.clone(), entity.row_key.clone());
                    t.insert(key, stored(entity));
                }
                BatchAction::Delete {
                    partition_key,
                    row_key,
                } => {
                    t.remove(&(partition_key, row_key));
                }
            }
        }
        Ok(())
    }

    async fn list_entities(&self, table: &str, query: &Query) -> Result<Vec<Entity>> {
        let mut tables = self.lock()?;
        let t = table_mut(&mut tables, table)?;
        Ok(t.values()
            .filter(|e| query.matches(e))
            .map(|e| query.shape(e.clone()))
            .collect())
    }

    async fn get_entity(&self, table: &str, partition_key: &str, row_key: &str) -> Result<Option<Entity>> {
        let mut tables = self.lock()?;
        let t = table_mut(&mut tables, table)?;
        Ok(t.get(&(partition_key.to_string(), row_key.to_string())).cloned())
    }

    async fn update_entity(&self, table: &str, entity: Entity, if_match: Option<&str>) -> Result<String> {
        let mut tables = self.lock()?;
        let t = table_mut(&mut tables, table)?;
        let key = (entity.partition_key.clone(), entity.row_key.clone());
        let current = t
            .get(&key)
            .ok_or_else(|| Error::NotFound(format!("{}/{}/{}", table, key.0, key.1)))?;

        if let Some(expected) = if_match {
            if current.etag.as_deref() != Some(expected) {
                return Err(Error::PreconditionFailed(format!(
                    "{}/{}/{} was modified",
                    table, key.0, key.1
                )));
            }
        }

        let entity = stored(entity);
        let etag = entity.etag.clone().unwrap_or_default();
        t.insert(key, entity);
        Ok(etag)
    }

    async fn delete_entity(&self, table: &str, partition_key: &str, row_key: &str) -> Result<()> {
        let mut tables = self.lock()?;
        let t = table_mut(&mut tables, table)?;
        t.remove(&(partition_key.to_string(), row_key.to_string()));
        Ok(())
    }
}
