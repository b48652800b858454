use crate::path::FieldPath;
use core::fmt;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use time::Duration;

/// A raw configuration tree as produced by the loader.
pub type RawNode = serde_yaml::Value;

/// Identifier plus the capability the referenced object must provide.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub struct ReferenceHandle {
    pub identifier: String,
    pub capability: String,
}

/// A normalized configuration value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    #[serde(serialize_with = "serialize_duration")]
    Duration(Duration),
    Reference(ReferenceHandle),
    Node(ValidatedNode),
    List(Vec<ValidatedNode>),
    /// Pass-through content of an open schema.
    Raw(RawNode),
}

impl Value {
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            Value::Reference(_) | Value::Node(_) | Value::List(_) | Value::Raw(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Render back into raw form. Validating the result against the same
    /// schema reproduces this value.
    pub fn to_raw(&self) -> RawNode {
        match self {
            Value::Bool(b) => RawNode::Bool(*b),
            Value::Int(v) => RawNode::Number((*v).into()),
            Value::UInt(v) => RawNode::Number((*v).into()),
            Value::Float(v) => RawNode::Number((*v).into()),
            Value::Text(s) => RawNode::String(s.clone()),
            Value::Duration(d) => RawNode::String(format!("{}ms", d.whole_milliseconds())),
            Value::Reference(r) => RawNode::String(r.identifier.clone()),
            Value::Node(n) => n.to_raw(),
            Value::List(items) => RawNode::Sequence(items.iter().map(|n| n.to_raw()).collect()),
            Value::Raw(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "0x{v:X}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Duration(d) => write!(f, "{}ms", d.whole_milliseconds()),
            Value::Reference(r) => write!(f, "{}", r.identifier),
            Value::Node(n) => write!(f, "<{}>", n.schema()),
            Value::List(items) => write!(f, "[{} items]", items.len()),
            Value::Raw(raw) => match serde_yaml::to_string(raw) {
                Ok(s) => f.write_str(s.trim_end()),
                Err(_) => f.write_str("<raw>"),
            },
        }
    }
}

fn serialize_duration<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format_args!("{}ms", d.whole_milliseconds()))
}

/// Output of the validator. Fields appear in schema declaration order, with
/// pass-through fields of open schemas after them in configuration order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidatedNode {
    schema: String,
    #[serde(skip)]
    path: FieldPath,
    #[serde(serialize_with = "serialize_fields")]
    fields: Vec<(String, Value)>,
}

impl ValidatedNode {
    pub(crate) fn new(schema: &str, path: FieldPath, fields: Vec<(String, Value)>) -> Self {
        Self {
            schema: schema.to_string(),
            path,
            fields,
        }
    }

    /// Name of the schema this node was validated against.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Explicit id, when the configuration carries one.
    pub fn id(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_raw(&self) -> RawNode {
        let mut map = serde_yaml::Mapping::new();
        for (k, v) in &self.fields {
            map.insert(RawNode::String(k.clone()), v.to_raw());
        }
        RawNode::Mapping(map)
    }
}

fn serialize_fields<S: Serializer>(
    fields: &[(String, Value)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for (k, v) in fields {
        map.serialize_entry(k, v)?;
    }
    map.end()
}
