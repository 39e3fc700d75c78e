//! JSON wire shape for values and patches.
//!
//! Sequences and mappings map to arrays and objects. Sets serialize as arrays of their
//! members and records as objects of their structural members; both read back as plain
//! sequences and mappings, since the wire carries no type tags.

use serde::de::Error as _;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::patch::Patch;
use crate::value::{Leaf, Value};

impl Serialize for Leaf {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Leaf::Null => serializer.serialize_unit(),
            Leaf::Bool(b) => serializer.serialize_bool(*b),
            Leaf::Int(n) => serializer.serialize_i64(*n),
            Leaf::Float(x) => serializer.serialize_f64(*x),
            Leaf::Str(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for Leaf {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Value::from_json_value(serde_json::Value::deserialize(deserializer)?) {
            Value::Leaf(leaf) => Ok(leaf),
            other => Err(D::Error::custom(format!(
                "expected a scalar, found a {}",
                other.kind()
            ))),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Leaf(leaf) => leaf.serialize(serializer),
            Value::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Set(members) => {
                let mut seq = serializer.serialize_seq(Some(members.len()))?;
                for member in members.iter() {
                    seq.serialize_element(member)?;
                }
                seq.end()
            }
            Value::Record(record) => {
                let fields = record.fields();
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for field in fields {
                    map.serialize_entry(field, &record.get(field).unwrap_or_else(Value::null))?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_json_value)
    }
}

impl Value {
    /// Unsealed value built from parsed JSON.
    pub fn from_json_value(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::null(),
            serde_json::Value::Bool(b) => Value::from(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::from(i),
                None => Value::from(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::seq(items.into_iter().map(Value::from_json_value))
            }
            serde_json::Value::Object(entries) => Value::map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json_value(v))),
            ),
        }
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Patch {
    pub fn from_json(json: &str) -> Result<Patch> {
        serde_json::from_str(json).map_err(|e| Error::MalformedPatch(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::MalformedPatch(e.to_string()))
    }

    /// Parses a JSON array of patches.
    pub fn list_from_json(json: &str) -> Result<Vec<Patch>> {
        serde_json::from_str(json).map_err(|e| Error::MalformedPatch(e.to_string()))
    }

    pub fn list_to_json(patches: &[Patch]) -> Result<String> {
        serde_json::to_string(patches).map_err(|e| Error::MalformedPatch(e.to_string()))
    }
}
