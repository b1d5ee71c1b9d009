//! In-memory resource store for indexed routes.
//!
//! # Responsibilities
//! - Key an ordered backing collection by the route's parameter fields
//! - CRUD operations: get, list, create, merge, replace, delete
//! - Keep key → offset entries consistent under mutation
//!
//! # Design Decisions
//! - One index per indexed route, owned by that route for one instance's
//!   lifetime; never shared, never persisted
//! - Build-time duplicate keys are last-write-wins, not rejected
//! - Keys are derived from the route parameters for all lookups and updates,
//!   never re-derived from a request body, so a body that changes a
//!   key-bearing field cannot diverge the index
//! - `delete` renumbers every surviving offset past the removed element, so
//!   offset-based updates stay correct afterwards

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Per-request store failure, mapped to 404/409 at the HTTP layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("no item under key {0:?}")]
    NotFound(IndexKey),
    #[error("an item already exists under key {0:?}")]
    Conflict(IndexKey),
}

/// Ordered tuple of key-field values, normalized to strings so path
/// parameters compare equal to numeric item fields.
pub type IndexKey = Vec<String>;

/// Keyed view over an ordered collection of structured items.
#[derive(Debug)]
pub struct ResourceIndex {
    key_fields: Vec<String>,
    items: Vec<Value>,
    entries: HashMap<IndexKey, usize>,
}

impl ResourceIndex {
    /// Build the index in one pass over `items`.
    pub fn build(items: Vec<Value>, key_fields: Vec<String>) -> Self {
        let mut index = Self {
            key_fields,
            items,
            entries: HashMap::new(),
        };
        for offset in 0..index.items.len() {
            let key = index.key_of(&index.items[offset]);
            index.entries.insert(key, offset);
        }
        index
    }

    /// The whole collection, in original order.
    pub fn list(&self) -> &[Value] {
        &self.items
    }

    /// Look up one item by key.
    pub fn get(&self, key: &IndexKey) -> Result<&Value, IndexError> {
        let offset = self.offset_of(key)?;
        Ok(&self.items[offset])
    }

    /// Append a new item. Fails if its derived key is already present.
    pub fn create(&mut self, item: Value) -> Result<(), IndexError> {
        let key = self.key_of(&item);
        if self.entries.contains_key(&key) {
            return Err(IndexError::Conflict(key));
        }
        self.items.push(item);
        self.entries.insert(key, self.items.len() - 1);
        Ok(())
    }

    /// Shallow-merge `partial`'s fields onto the stored item, leaving
    /// untouched fields intact.
    pub fn merge(&mut self, key: &IndexKey, partial: Value) -> Result<(), IndexError> {
        let offset = self.offset_of(key)?;
        let stored = &mut self.items[offset];
        match (stored.as_object_mut(), partial) {
            (Some(target), Value::Object(fields)) => {
                for (field, value) in fields {
                    target.insert(field, value);
                }
            }
            // Non-object on either side degenerates to replacement.
            (_, other) => *stored = other,
        }
        Ok(())
    }

    /// Replace the stored item wholesale. The entry keeps its key: callers
    /// address items by route parameter, so a body that renames a key field
    /// does not move the entry.
    pub fn replace(&mut self, key: &IndexKey, item: Value) -> Result<(), IndexError> {
        let offset = self.offset_of(key)?;
        self.items[offset] = item;
        Ok(())
    }

    /// Remove the entry and its backing element, renumbering every entry
    /// whose offset was greater.
    pub fn delete(&mut self, key: &IndexKey) -> Result<(), IndexError> {
        let offset = self.offset_of(key)?;
        self.entries.remove(key);
        self.items.remove(offset);
        for entry in self.entries.values_mut() {
            if *entry > offset {
                *entry -= 1;
            }
        }
        Ok(())
    }

    /// Derive an item's key: the ordered tuple of its key-field values.
    pub fn key_of(&self, item: &Value) -> IndexKey {
        self.key_fields
            .iter()
            .map(|field| key_component(item.get(field)))
            .collect()
    }

    fn offset_of(&self, key: &IndexKey) -> Result<usize, IndexError> {
        self.entries
            .get(key)
            .copied()
            .ok_or_else(|| IndexError::NotFound(key.clone()))
    }
}

fn key_component(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(Value::Null) | None => "null".to_string(),
        Some(other) => other.to_string(),
    }
}
