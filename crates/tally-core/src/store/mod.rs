//! Keyed-entity storage
//!
//! Entities live in named tables and are addressed by partition key plus row
//! key. Each carries a JSON property bag and an etag that changes on every
//! write, which is what card balance updates use for optimistic concurrency.
//!
//! Backends:
//! - `MemoryStore` - in-process, for tests and local runs
//! - `SqliteStore` - durable, pooled, optionally SQLCipher-encrypted

use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, DB_KEY_ENV};

/// Largest number of actions one batch may carry
pub const MAX_BATCH_SIZE: usize = 100;

pub type Properties = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub partition_key: String,
    pub row_key: String,
    /// Set by the store on read; ignored on write
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl Entity {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            etag: None,
            properties: Properties::new(),
        }
    }

    /// Builder-style property setter
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.properties.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Integer property, accepting numbers or numeric strings
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.properties.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Money property. Stored as an exact decimal string; older rows written
    /// as JSON floats are read through their shortest decimal form.
    pub fn get_decimal(&self, key: &str) -> Option<Decimal> {
        match self.properties.get(key)? {
            Value::String(s) => Decimal::from_str(s.trim()).ok(),
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .ok(),
            _ => None,
        }
    }

    /// Copy keeping only the listed properties
    pub fn project(&self, fields: &[String]) -> Entity {
        let properties = self
            .properties
            .iter()
            .filter(|(k, _)| fields.iter().any(|f| f == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Entity {
            partition_key: self.partition_key.clone(),
            row_key: self.row_key.clone(),
            etag: self.etag.clone(),
            properties,
        }
    }
}

/// One action in a single-partition batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchAction {
    /// Insert or replace
    Upsert(Entity),
    Delete { partition_key: String, row_key: String },
}

impl BatchAction {
    pub fn partition_key(&self) -> &str {
        match self {
            BatchAction::Upsert(e) => &e.partition_key,
            BatchAction::Delete { partition_key, .. } => partition_key,
        }
    }
}

/// Listing filter: equality on partition key and optionally one property,
/// with optional projection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub partition_key: Option<String>,
    pub property_eq: Option<(String, Value)>,
    pub select: Option<Vec<String>>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn partition(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: Some(partition_key.into()),
            ..Self::default()
        }
    }

    pub fn where_eq(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.property_eq = Some((property.to_string(), value.into()));
        self
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if let Some(pk) = &self.partition_key {
            if &entity.partition_key != pk {
                return false;
            }
        }
        if let Some((property, value)) = &self.property_eq {
            if entity.get(property) != Some(value) {
                return false;
            }
        }
        true
    }

    /// Apply the projection, if any
    pub fn shape(&self, entity: Entity) -> Entity {
        match &self.select {
            Some(fields) => entity.project(fields),
            None => entity,
        }
    }
}

/// Partition/row keyed entity store
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Create a table. An existing table is left alone.
    async fn create_table(&self, table: &str) -> Result<()>;

    /// Insert or replace one entity
    async fn upsert_entity(&self, table: &str, entity: Entity) -> Result<()>;

    /// Apply a single-partition batch atomically
    async fn submit_batch(&self, table: &str, actions: Vec<BatchAction>) -> Result<()>;

    async fn list_entities(&self, table: &str, query: &Query) -> Result<Vec<Entity>>;

    /// `Ok(None)` when the entity does not exist
    async fn get_entity(&self, table: &str, partition_key: &str, row_key: &str) -> Result<Option<Entity>>;

    /// Replace an existing entity, returning its new etag.
    ///
    /// With `if_match`, fails with `PreconditionFailed` when the stored etag
    /// differs. Fails with `NotFound` when the entity is absent.
    async fn update_entity(&self, table: &str, entity: Entity, if_match: Option<&str>) -> Result<String>;

    /// Delete one entity. Absent entities are not an error.
    async fn delete_entity(&self, table: &str, partition_key: &str, row_key: &str) -> Result<()>;
}

/// Reject batches that mix partitions or exceed the size limit
pub fn validate_batch(actions: &[BatchAction]) -> Result<()> {
    if actions.len() > MAX_BATCH_SIZE {
        return Err(Error::Storage(format!(
            "Batch of {} actions exceeds limit of {}",
            actions.len(),
            MAX_BATCH_SIZE
        )));
    }
    if let Some(first) = actions.first() {
        let pk = first.partition_key();
        if actions.iter().any(|a| a.partition_key() != pk) {
            return Err(Error::Storage(
                "Batch actions must share one partition key".to_string(),
            ));
        }
    }
    Ok(())
}

pub(crate) fn new_etag() -> String {
    uuid::Uuid::new_v4().to_string()
}
