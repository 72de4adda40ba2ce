//! Core type definitions for the catalog.

use graphfetch_proto::Value;
use serde::{Deserialize, Serialize};

/// Scalar data types a column can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
}

/// Field types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// A scalar value.
    Scalar(ScalarType),
    /// An optional scalar value (nullable).
    OptionalScalar(ScalarType),
    /// An enumeration stored as its variant name.
    Enum {
        /// Name of the enum type.
        name: String,
        /// Allowed variant values.
        variants: Vec<String>,
    },
    /// An optional enumeration.
    OptionalEnum {
        /// Name of the enum type.
        name: String,
        /// Allowed variant values.
        variants: Vec<String>,
    },
}

impl ScalarType {
    /// Check if this type is an integer type usable as an identity.
    pub fn is_integer(&self) -> bool {
        matches!(self, ScalarType::Int32 | ScalarType::Int64)
    }

    /// Check whether a value can be stored in a column of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ScalarType::Bool, Value::Bool(_))
                | (ScalarType::Int32, Value::Int32(_))
                | (ScalarType::Int64, Value::Int64(_) | Value::Int32(_))
                | (ScalarType::Float64, Value::Float64(_))
                | (ScalarType::String, Value::String(_))
                | (ScalarType::Timestamp, Value::Timestamp(_))
        )
    }
}

impl FieldType {
    /// Create a scalar field type.
    pub fn scalar(scalar: ScalarType) -> Self {
        FieldType::Scalar(scalar)
    }

    /// Create an optional scalar field type.
    pub fn optional_scalar(scalar: ScalarType) -> Self {
        FieldType::OptionalScalar(scalar)
    }

    /// Create an enum field type.
    pub fn enum_type(name: impl Into<String>, variants: &[&str]) -> Self {
        FieldType::Enum {
            name: name.into(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Create an optional enum field type.
    pub fn optional_enum(name: impl Into<String>, variants: &[&str]) -> Self {
        FieldType::OptionalEnum {
            name: name.into(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Check if this type allows null values.
    pub fn is_nullable(&self) -> bool {
        matches!(
            self,
            FieldType::OptionalScalar(_) | FieldType::OptionalEnum { .. }
        )
    }

    /// Storage type of the column; enums are stored as strings.
    pub fn storage_type(&self) -> ScalarType {
        match self {
            FieldType::Scalar(s) | FieldType::OptionalScalar(s) => *s,
            FieldType::Enum { .. } | FieldType::OptionalEnum { .. } => ScalarType::String,
        }
    }

    /// Declared variants for enum types.
    pub fn variants(&self) -> Option<&[String]> {
        match self {
            FieldType::Enum { variants, .. } | FieldType::OptionalEnum { variants, .. } => {
                Some(variants)
            }
            _ => None,
        }
    }

    /// Check whether the field holds free text (string scalar, not enum).
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            FieldType::Scalar(ScalarType::String) | FieldType::OptionalScalar(ScalarType::String)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullable() {
        assert!(!FieldType::scalar(ScalarType::Int32).is_nullable());
        assert!(FieldType::optional_scalar(ScalarType::Int32).is_nullable());
        assert!(FieldType::optional_enum("Status", &["A"]).is_nullable());
    }

    #[test]
    fn test_enum_storage() {
        let status = FieldType::enum_type("OrderStatus", &["ORDER", "CANCEL"]);
        assert_eq!(status.storage_type(), ScalarType::String);
        assert_eq!(status.variants().map(|v| v.len()), Some(2));
        assert!(!status.is_text());
        assert!(FieldType::scalar(ScalarType::String).is_text());
    }

    #[test]
    fn test_accepts() {
        assert!(ScalarType::Int64.accepts(&Value::Int32(1)));
        assert!(!ScalarType::Int32.accepts(&Value::Int64(1)));
        assert!(ScalarType::Timestamp.accepts(&Value::Timestamp(0)));
        assert!(!ScalarType::String.accepts(&Value::Null));
    }
}
