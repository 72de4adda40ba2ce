//! Validated, in-memory catalog.

use std::collections::HashSet;

use super::{EntityDef, FieldDef, RelationDef, SchemaBundle};
use crate::error::Error;

/// Read-only catalog over one validated schema bundle.
///
/// Construction checks that identities are integer scalars, that field names
/// are unique, and that every relation names existing entities and fields.
#[derive(Debug, Clone)]
pub struct Catalog {
    schema: SchemaBundle,
}

impl Catalog {
    /// Validate a schema bundle and wrap it.
    pub fn new(schema: SchemaBundle) -> Result<Self, Error> {
        for (name, entity) in &schema.entities {
            if name != &entity.name {
                return Err(Error::InvalidSchema(format!(
                    "entity registered as '{}' is named '{}'",
                    name, entity.name
                )));
            }

            let mut seen = HashSet::new();
            for field in &entity.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(Error::InvalidSchema(format!(
                        "duplicate field '{}' on entity '{}'",
                        field.name, entity.name
                    )));
                }
            }

            let identity = entity.get_identity_field().ok_or_else(|| {
                Error::InvalidSchema(format!(
                    "identity field '{}' is not declared on entity '{}'",
                    entity.identity_field, entity.name
                ))
            })?;
            if identity.is_nullable() || !identity.storage_type().is_integer() {
                return Err(Error::InvalidSchema(format!(
                    "identity field '{}' on entity '{}' must be a required integer",
                    identity.name, entity.name
                )));
            }
        }

        let mut seen = HashSet::new();
        for relation in &schema.relations {
            let from = schema.get_entity(&relation.from_entity).ok_or_else(|| {
                Error::InvalidSchema(format!(
                    "relation '{}' starts at unknown entity '{}'",
                    relation.name, relation.from_entity
                ))
            })?;
            let to = schema.get_entity(&relation.to_entity).ok_or_else(|| {
                Error::InvalidSchema(format!(
                    "relation '{}' points to unknown entity '{}'",
                    relation.name, relation.to_entity
                ))
            })?;
            if from.get_field(&relation.from_field).is_none() {
                return Err(Error::InvalidSchema(format!(
                    "relation '{}' uses unknown field '{}.{}'",
                    relation.name, from.name, relation.from_field
                )));
            }
            if to.get_field(&relation.to_field).is_none() {
                return Err(Error::InvalidSchema(format!(
                    "relation '{}' uses unknown field '{}.{}'",
                    relation.name, to.name, relation.to_field
                )));
            }
            if from.get_field(&relation.name).is_some() {
                return Err(Error::InvalidSchema(format!(
                    "association '{}' on entity '{}' shadows a field",
                    relation.name, from.name
                )));
            }
            if !seen.insert((relation.from_entity.as_str(), relation.name.as_str())) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate association '{}' on entity '{}'",
                    relation.name, from.name
                )));
            }
        }

        Ok(Self { schema })
    }

    /// The underlying schema bundle.
    pub fn schema(&self) -> &SchemaBundle {
        &self.schema
    }

    /// Get an entity definition by name.
    pub fn entity(&self, name: &str) -> Result<&EntityDef, Error> {
        self.schema
            .get_entity(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Get a field definition of an entity.
    pub fn field(&self, entity: &str, field: &str) -> Result<&FieldDef, Error> {
        self.entity(entity)?
            .get_field(field)
            .ok_or_else(|| Error::UnknownField {
                entity: entity.to_string(),
                field: field.to_string(),
            })
    }

    /// Get an association of an entity.
    pub fn relation(&self, entity: &str, name: &str) -> Result<&RelationDef, Error> {
        self.schema
            .get_relation(entity, name)
            .ok_or_else(|| Error::UnknownAssociation {
                entity: entity.to_string(),
                name: name.to_string(),
            })
    }

    /// Resolve a dot path made only of associations, e.g. `"orderItems.item"`.
    pub fn resolve_relation_path(&self, root: &str, path: &str) -> Result<Vec<&RelationDef>, Error> {
        self.entity(root)?;
        let mut current = root;
        let mut hops = Vec::new();
        for segment in path.split('.') {
            let relation = self.relation(current, segment)?;
            current = &relation.to_entity;
            hops.push(relation);
        }
        Ok(hops)
    }

    /// Resolve a dot path ending in a field, e.g. `"member.name"`.
    ///
    /// Returns the traversed associations and the final field.
    pub fn resolve_field_path(
        &self,
        root: &str,
        path: &str,
    ) -> Result<(Vec<&RelationDef>, &FieldDef), Error> {
        let (hops, field) = match path.rsplit_once('.') {
            Some((relations, field)) => (self.resolve_relation_path(root, relations)?, field),
            None => (Vec::new(), path),
        };
        let owner = hops.last().map(|r| r.to_entity.as_str()).unwrap_or(root);
        let field = self.field(owner, field)?;
        Ok((hops, field))
    }
}
