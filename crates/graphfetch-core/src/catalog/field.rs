//! Field definitions for entities.

use super::types::{FieldType, ScalarType};
use serde::{Deserialize, Serialize};

/// A field definition within an entity. The field name doubles as the column name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field data type.
    pub field_type: FieldType,
    /// Whether the field is required (non-nullable at the application level).
    pub required: bool,
}

impl FieldDef {
    /// Create a new required field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
        }
    }

    /// Create an optional field (required = false).
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
        }
    }

    /// Create an optional scalar field.
    pub fn optional_scalar(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::optional(name, FieldType::OptionalScalar(scalar))
    }

    /// Check whether the column may hold null.
    pub fn is_nullable(&self) -> bool {
        !self.required || self.field_type.is_nullable()
    }

    /// Storage type of the column.
    pub fn storage_type(&self) -> ScalarType {
        self.field_type.storage_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_field() {
        let field = FieldDef::new("name", FieldType::scalar(ScalarType::String));
        assert!(field.required);
        assert!(!field.is_nullable());
    }

    #[test]
    fn test_optional_field() {
        let field = FieldDef::optional_scalar("city", ScalarType::String);
        assert!(!field.required);
        assert!(field.is_nullable());
        assert_eq!(field.storage_type(), ScalarType::String);
    }
}
