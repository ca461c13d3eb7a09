use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::{PersistenceError, Value};

/// Named parameter bindings. Keys are unique; rebinding a name replaces the value.
pub type Params = BTreeMap<String, Value>;

/// One row of a query result. Entity rows are the serde form of the entity;
/// projections are scalars or arrays.
pub type ResultRow = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
    Uuid,
}

impl DataType {
    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Float, Value::Integer(_)) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            (Self::Timestamp, Value::Timestamp(_)) => true,
            (Self::Uuid, Value::Uuid(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
            Self::Uuid => write!(f, "UUID"),
        }
    }
}

impl FromStr for DataType {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" | "LONG" => Ok(Self::Integer),
            "FLOAT" | "DOUBLE" => Ok(Self::Float),
            "TEXT" | "STRING" => Ok(Self::Text),
            "BOOLEAN" | "BOOL" => Ok(Self::Boolean),
            "TIMESTAMP" => Ok(Self::Timestamp),
            "UUID" => Ok(Self::Uuid),
            other => Err(PersistenceError::Metadata(format!(
                "unknown data type '{}'",
                other
            ))),
        }
    }
}
