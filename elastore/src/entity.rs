//! Entities stored in the engine
//!
//! An entity declares its index-name template and, optionally, a static
//! field-type descriptor used to build its index template.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Index-name template, e.g. `hero-{accountId}-{year}.{month}`
    fn table() -> String;

    /// Document id
    fn id(&self) -> String;

    /// Shard (account) key substituted for `{accountId}`
    fn key(&self) -> String {
        String::new()
    }

    /// Field mappings for [`ElasticStore::create_entity_index`](crate::ElasticStore::create_entity_index)
    fn mappings() -> Vec<FieldMapping> {
        Vec::new()
    }
}

/// Epoch milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn millis(self) -> i64 {
        self.0
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

impl From<i64> for Timestamp {
    fn from(ms: i64) -> Self {
        Self(ms)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        Value::from(ts.0)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One field of an entity's index mapping
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    pub name: String,
    pub field_type: FieldType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Keyword,
    Text,
    Long,
    Integer,
    Short,
    Double,
    Boolean,
    /// Dates stored as epoch milliseconds
    Date,
    Nested(Vec<FieldMapping>),
    Object(Vec<FieldMapping>),
}

impl FieldMapping {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    pub fn keyword(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Keyword)
    }

    pub fn long(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Long)
    }

    pub fn double(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Double)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Date)
    }
}

impl FieldType {
    fn to_json(&self) -> Value {
        match self {
            FieldType::Keyword => json!({"type": "keyword"}),
            FieldType::Text => json!({"type": "text"}),
            FieldType::Long => json!({"type": "long"}),
            FieldType::Integer => json!({"type": "integer"}),
            FieldType::Short => json!({"type": "short"}),
            FieldType::Double => json!({"type": "double"}),
            FieldType::Boolean => json!({"type": "boolean"}),
            FieldType::Date => json!({"type": "date", "format": "epoch_millis"}),
            FieldType::Nested(fields) => {
                json!({"type": "nested", "properties": properties(fields)})
            }
            FieldType::Object(fields) => json!({"properties": properties(fields)}),
        }
    }
}

/// `{"properties": {...}}` mapping body for a field list
pub fn mapping_body(fields: &[FieldMapping]) -> Value {
    json!({"properties": properties(fields)})
}

fn properties(fields: &[FieldMapping]) -> Value {
    let map: Map<String, Value> = fields
        .iter()
        .map(|f| (f.name.clone(), f.field_type.to_json()))
        .collect();
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_body() {
        let fields = vec![
            FieldMapping::keyword("color"),
            FieldMapping::date("createdOn"),
            FieldMapping::new(
                "tags",
                FieldType::Nested(vec![FieldMapping::keyword("name"), FieldMapping::long("weight")]),
            ),
        ];
        assert_eq!(
            mapping_body(&fields),
            json!({
                "properties": {
                    "color": {"type": "keyword"},
                    "createdOn": {"type": "date", "format": "epoch_millis"},
                    "tags": {
                        "type": "nested",
                        "properties": {
                            "name": {"type": "keyword"},
                            "weight": {"type": "long"}
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_timestamp_serializes_as_number() {
        assert_eq!(serde_json::to_value(Timestamp(1_700_000_000_000)).unwrap(), json!(1_700_000_000_000i64));
        let dt = Timestamp(0).to_datetime().unwrap();
        assert_eq!(dt.timestamp(), 0);
    }
}
