//! Unit of work and loaded entity graphs.
//!
//! A [`Session`] holds the identity map for one unit of work: every entity
//! instance loaded through it is interned once and shared by reference
//! counting with every result that reaches it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use graphfetch_proto::{EntityId, Value};

use crate::storage::EntityRow;

/// One loaded entity instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    /// Entity name.
    pub entity: String,
    /// Identity value.
    pub id: EntityId,
    /// Column values in catalog order.
    pub fields: Vec<(String, Value)>,
}

impl EntityRecord {
    /// Get a field value by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == field).map(|(_, v)| v)
    }
}

/// Identity map for one unit of work.
#[derive(Debug, Default)]
pub struct Session {
    identity_map: HashMap<(String, EntityId), Arc<EntityRecord>>,
}

impl Session {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a fetched row, returning the shared record for its identity.
    ///
    /// The first load of an identity wins; later rows for it are discarded.
    pub fn intern(&mut self, entity: &str, row: EntityRow) -> Arc<EntityRecord> {
        self.identity_map
            .entry((entity.to_string(), row.id))
            .or_insert_with(|| {
                Arc::new(EntityRecord {
                    entity: entity.to_string(),
                    id: row.id,
                    fields: row.fields,
                })
            })
            .clone()
    }

    /// Look up an already loaded record.
    pub fn get(&self, entity: &str, id: EntityId) -> Option<Arc<EntityRecord>> {
        self.identity_map.get(&(entity.to_string(), id)).cloned()
    }

    /// Check whether an identity is loaded.
    pub fn contains(&self, entity: &str, id: EntityId) -> bool {
        self.identity_map.contains_key(&(entity.to_string(), id))
    }

    /// Number of interned records.
    pub fn len(&self) -> usize {
        self.identity_map.len()
    }

    /// Check whether nothing has been loaded.
    pub fn is_empty(&self) -> bool {
        self.identity_map.is_empty()
    }

    /// Drop every interned record.
    pub fn clear(&mut self) {
        self.identity_map.clear();
    }
}

/// A materialized association of an [`EntityNode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Association {
    /// To-one association; `None` when no associate exists.
    One(Option<Box<EntityNode>>),
    /// To-many association ordered by member identity.
    Many(Vec<EntityNode>),
}

/// A loaded entity together with the associations its fetch plan asked for.
///
/// Associations missing from the map were not loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityNode {
    /// The shared record.
    pub record: Arc<EntityRecord>,
    /// Loaded associations by name.
    pub associations: BTreeMap<String, Association>,
}

impl EntityNode {
    /// Wrap a record with no loaded associations.
    pub fn new(record: Arc<EntityRecord>) -> Self {
        Self {
            record,
            associations: BTreeMap::new(),
        }
    }

    /// Identity value.
    pub fn id(&self) -> EntityId {
        self.record.id
    }

    /// Entity name.
    pub fn entity(&self) -> &str {
        &self.record.entity
    }

    /// Get a field value by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.record.get(field)
    }

    /// Check whether an association was loaded.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.associations.contains_key(name)
    }

    /// Loaded to-one associate, if present.
    pub fn one(&self, name: &str) -> Option<&EntityNode> {
        match self.associations.get(name) {
            Some(Association::One(node)) => node.as_deref(),
            _ => None,
        }
    }

    /// Loaded to-many members, if the association was loaded.
    pub fn many(&self, name: &str) -> Option<&[EntityNode]> {
        match self.associations.get(name) {
            Some(Association::Many(nodes)) => Some(nodes),
            _ => None,
        }
    }
}
