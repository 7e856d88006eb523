//! Typed value model for the schema-binary format.
//!
//! Bincode needs the shape of the data to be known when decoding, so free-form
//! structured values are first lowered into [`SchemaValue`], whose variants
//! act as the schema. JSON and MessagePack carry `serde_json::Value` directly.

use serde::de::{self, DeserializeSeed, EnumAccess, SeqAccess, Unexpected, VariantAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Schema revision written in front of every schema-binary payload.
pub const SCHEMA_REVISION: u8 = 1;

/// Deepest nesting a schema value may have, same as serde_json's recursion limit.
pub const MAX_DEPTH: usize = 128;

/// Variant order is the wire tag; never reorder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SchemaValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<SchemaValue>),
    Map(Vec<(String, SchemaValue)>),
}

const VARIANTS: &[&str] = &["Null", "Bool", "Int", "UInt", "Float", "Text", "List", "Map"];

/// True when `value` nests deeper than [`MAX_DEPTH`] and could not be decoded again.
pub fn exceeds_max_depth(value: &Value) -> bool {
    fn walk(value: &Value, depth: usize) -> bool {
        if depth > MAX_DEPTH {
            return true;
        }
        match value {
            Value::Array(items) => items.iter().any(|v| walk(v, depth + 1)),
            Value::Object(map) => map.values().any(|v| walk(v, depth + 1)),
            _ => false,
        }
    }
    walk(value, 0)
}

impl<'de> Deserialize<'de> for SchemaValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Depth(0).deserialize(deserializer)
    }
}

/// Decodes one value at a known nesting depth. The tag is read as the
/// variant index, which is how bincode writes enums.
#[derive(Clone, Copy)]
struct Depth(usize);

impl Depth {
    fn nested(self) -> Self {
        Depth(self.0 + 1)
    }
}

impl<'de> DeserializeSeed<'de> for Depth {
    type Value = SchemaValue;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<SchemaValue, D::Error> {
        if self.0 > MAX_DEPTH {
            return Err(de::Error::custom(format!(
                "schema value nested deeper than {MAX_DEPTH} levels"
            )));
        }
        deserializer.deserialize_enum("SchemaValue", VARIANTS, self)
    }
}

impl<'de> Visitor<'de> for Depth {
    type Value = SchemaValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a schema value")
    }

    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<SchemaValue, A::Error> {
        let (tag, variant): (u32, _) = data.variant()?;
        match tag {
            0 => variant.unit_variant().map(|()| SchemaValue::Null),
            1 => variant.newtype_variant().map(SchemaValue::Bool),
            2 => variant.newtype_variant().map(SchemaValue::Int),
            3 => variant.newtype_variant().map(SchemaValue::UInt),
            4 => variant.newtype_variant().map(SchemaValue::Float),
            5 => variant.newtype_variant().map(SchemaValue::Text),
            6 => variant
                .newtype_variant_seed(Items(self.nested()))
                .map(SchemaValue::List),
            7 => variant
                .newtype_variant_seed(Entries(self.nested()))
                .map(SchemaValue::Map),
            other => Err(de::Error::invalid_value(
                Unexpected::Unsigned(other.into()),
                &"variant index 0 <= i < 8",
            )),
        }
    }
}

// Claimed lengths come from the peer; cap the preallocation.
const MAX_PREALLOC: usize = 4096;

struct Items(Depth);

impl<'de> DeserializeSeed<'de> for Items {
    type Value = Vec<SchemaValue>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for Items {
    type Value = Vec<SchemaValue>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of schema values")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(MAX_PREALLOC));
        while let Some(item) = seq.next_element_seed(self.0)? {
            items.push(item);
        }
        Ok(items)
    }
}

struct Entries(Depth);

impl<'de> DeserializeSeed<'de> for Entries {
    type Value = Vec<(String, SchemaValue)>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for Entries {
    type Value = Vec<(String, SchemaValue)>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of map entries")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(MAX_PREALLOC));
        while let Some(entry) = seq.next_element_seed(Entry(self.0))? {
            entries.push(entry);
        }
        Ok(entries)
    }
}

struct Entry(Depth);

impl<'de> DeserializeSeed<'de> for Entry {
    type Value = (String, SchemaValue);

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_tuple(2, self)
    }
}

impl<'de> Visitor<'de> for Entry {
    type Value = (String, SchemaValue);

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a key and a schema value")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let key: String = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let value = seq
            .next_element_seed(self.0)?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        Ok((key, value))
    }
}

impl From<&Value> for SchemaValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SchemaValue::Null,
            Value::Bool(b) => SchemaValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SchemaValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    SchemaValue::UInt(u)
                } else {
                    SchemaValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => SchemaValue::Text(s.clone()),
            Value::Array(items) => SchemaValue::List(items.iter().map(Into::into).collect()),
            Value::Object(map) => SchemaValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), SchemaValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<SchemaValue> for Value {
    fn from(value: SchemaValue) -> Self {
        match value {
            SchemaValue::Null => Value::Null,
            SchemaValue::Bool(b) => Value::Bool(b),
            SchemaValue::Int(i) => Value::Number(i.into()),
            SchemaValue::UInt(u) => Value::Number(u.into()),
            // Non-finite floats have no JSON form
            SchemaValue::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            SchemaValue::Text(s) => Value::String(s),
            SchemaValue::List(items) => Value::Array(items.into_iter().map(Into::into).collect()),
            SchemaValue::Map(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    map.insert(k, v.into());
                }
                Value::Object(map)
            }
        }
    }
}
