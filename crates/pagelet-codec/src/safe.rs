//! Fault-tolerant serialization into a JSON value.
//!
//! Used when the standard serializer rejects a state object. Instead of
//! failing the whole fragment, each leaf that cannot be represented becomes
//! [`UNSERIALIZABLE`], and nesting deeper than [`MAX_DEPTH`] (the shape a
//! self-referencing structure produces) becomes [`CIRCULAR`].

use std::fmt;

use serde::ser::{self, Serialize};
use serde_json::{Map, Value};

/// Placeholder for a value whose `Serialize` impl failed.
pub const UNSERIALIZABLE: &str = "[Unserializable]";

/// Placeholder for a value nested deeper than [`MAX_DEPTH`].
pub const CIRCULAR: &str = "[Circular]";

/// Nesting limit of the safe serializer.
pub const MAX_DEPTH: usize = 64;

/// Serialize any value without failing.
pub fn to_safe_value<T: Serialize + ?Sized>(value: &T) -> Value {
    nested(value, 0)
}

fn nested<T: Serialize + ?Sized>(value: &T, depth: usize) -> Value {
    if depth >= MAX_DEPTH {
        return Value::String(CIRCULAR.to_string());
    }
    value
        .serialize(SafeSerializer { depth })
        .unwrap_or_else(|_| Value::String(UNSERIALIZABLE.to_string()))
}

/// Error raised inside the safe serializer; always absorbed into a placeholder.
#[derive(Debug)]
pub struct SafeError(String);

impl fmt::Display for SafeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SafeError {}

impl ser::Error for SafeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

struct SafeSerializer {
    depth: usize,
}

impl ser::Serializer for SafeSerializer {
    type Ok = Value;
    type Error = SafeError;
    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantMapBuilder;

    fn serialize_bool(self, v: bool) -> Result<Value, SafeError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, SafeError> {
        Ok(Value::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, SafeError> {
        Ok(Value::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, SafeError> {
        Ok(Value::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, SafeError> {
        Ok(Value::from(v))
    }

    fn serialize_i128(self, v: i128) -> Result<Value, SafeError> {
        Ok(i64::try_from(v).map_or_else(|_| Value::String(v.to_string()), Value::from))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, SafeError> {
        Ok(Value::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, SafeError> {
        Ok(Value::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, SafeError> {
        Ok(Value::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, SafeError> {
        Ok(Value::from(v))
    }

    fn serialize_u128(self, v: u128) -> Result<Value, SafeError> {
        Ok(u64::try_from(v).map_or_else(|_| Value::String(v.to_string()), Value::from))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, SafeError> {
        Ok(Value::from(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, SafeError> {
        Ok(Value::from(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, SafeError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, SafeError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, SafeError> {
        Ok(Value::Array(v.iter().map(|b| Value::from(*b)).collect()))
    }

    fn serialize_none(self) -> Result<Value, SafeError> {
        Ok(Value::Null)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Value, SafeError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, SafeError> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, SafeError> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value, SafeError> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, SafeError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, SafeError> {
        let mut map = Map::new();
        map.insert(variant.to_string(), nested(value, self.depth + 1));
        Ok(Value::Object(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder, SafeError> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
            depth: self.depth,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, SafeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, SafeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqBuilder, SafeError> {
        Ok(VariantSeqBuilder {
            variant,
            inner: SeqBuilder {
                items: Vec::with_capacity(len),
                depth: self.depth + 1,
            },
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder, SafeError> {
        Ok(MapBuilder {
            map: Map::new(),
            key: None,
            depth: self.depth,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<MapBuilder, SafeError> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantMapBuilder, SafeError> {
        Ok(VariantMapBuilder {
            variant,
            inner: MapBuilder {
                map: Map::new(),
                key: None,
                depth: self.depth + 1,
            },
        })
    }
}

struct SeqBuilder {
    items: Vec<Value>,
    depth: usize,
}

impl SeqBuilder {
    fn push<T: ?Sized + Serialize>(&mut self, value: &T) {
        self.items.push(nested(value, self.depth + 1));
    }
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = SafeError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), SafeError> {
        self.push(value);
        Ok(())
    }

    fn end(self) -> Result<Value, SafeError> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = SafeError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), SafeError> {
        self.push(value);
        Ok(())
    }

    fn end(self) -> Result<Value, SafeError> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = SafeError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), SafeError> {
        self.push(value);
        Ok(())
    }

    fn end(self) -> Result<Value, SafeError> {
        Ok(Value::Array(self.items))
    }
}

struct VariantSeqBuilder {
    variant: &'static str,
    inner: SeqBuilder,
}

impl ser::SerializeTupleVariant for VariantSeqBuilder {
    type Ok = Value;
    type Error = SafeError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), SafeError> {
        self.inner.push(value);
        Ok(())
    }

    fn end(self) -> Result<Value, SafeError> {
        let mut map = Map::new();
        map.insert(self.variant.to_string(), Value::Array(self.inner.items));
        Ok(Value::Object(map))
    }
}

struct MapBuilder {
    map: Map<String, Value>,
    key: Option<String>,
    depth: usize,
}

impl MapBuilder {
    fn insert<T: ?Sized + Serialize>(&mut self, key: String, value: &T) {
        let value = nested(value, self.depth + 1);
        self.map.insert(key, value);
    }
}

/// Render a map key as a string, whatever its type.
fn key_string<T: ?Sized + Serialize>(key: &T) -> String {
    match to_safe_value(key) {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = SafeError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), SafeError> {
        self.key = Some(key_string(key));
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), SafeError> {
        let key = self.key.take().unwrap_or_default();
        self.insert(key, value);
        Ok(())
    }

    fn end(self) -> Result<Value, SafeError> {
        Ok(Value::Object(self.map))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Value;
    type Error = SafeError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), SafeError> {
        self.insert(key.to_string(), value);
        Ok(())
    }

    fn end(self) -> Result<Value, SafeError> {
        Ok(Value::Object(self.map))
    }
}

struct VariantMapBuilder {
    variant: &'static str,
    inner: MapBuilder,
}

impl ser::SerializeStructVariant for VariantMapBuilder {
    type Ok = Value;
    type Error = SafeError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), SafeError> {
        self.inner.insert(key.to_string(), value);
        Ok(())
    }

    fn end(self) -> Result<Value, SafeError> {
        let mut map = Map::new();
        map.insert(self.variant.to_string(), Value::Object(self.inner.map));
        Ok(Value::Object(map))
    }
}
