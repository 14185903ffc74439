//! Tree node, chunk input and metadata values.

use core::fmt;
use std::collections::BTreeMap;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Metadata attached to a chunk or node.
///
/// Ordered so serialized output is stable.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A scalar metadata value.
///
/// In JSON these are plain scalars (`"Energy"`, `2023`, `0.5`). Binary
/// formats that cannot self-describe get an externally tagged enum instead.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    /// String value.
    Text(String),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
}

impl MetadataValue {
    /// The value as a string slice, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Text(s) => f.write_str(s),
            MetadataValue::Int(i) => write!(f, "{i}"),
            MetadataValue::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Text(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Int(i)
    }
}

impl From<i32> for MetadataValue {
    fn from(i: i32) -> Self {
        MetadataValue::Int(i as i64)
    }
}

impl From<usize> for MetadataValue {
    fn from(i: usize) -> Self {
        MetadataValue::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(x: f64) -> Self {
        MetadataValue::Float(x)
    }
}

#[derive(Serialize, Deserialize)]
enum TaggedValue {
    Text(String),
    Int(i64),
    Float(f64),
}

impl Serialize for MetadataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            match self {
                MetadataValue::Text(s) => serializer.serialize_str(s),
                MetadataValue::Int(i) => serializer.serialize_i64(*i),
                MetadataValue::Float(x) => serializer.serialize_f64(*x),
            }
        } else {
            let tagged = match self {
                MetadataValue::Text(s) => TaggedValue::Text(s.clone()),
                MetadataValue::Int(i) => TaggedValue::Int(*i),
                MetadataValue::Float(x) => TaggedValue::Float(*x),
            };
            tagged.serialize(serializer)
        }
    }
}

struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = MetadataValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number, boolean or null")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(MetadataValue::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(MetadataValue::Text(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(MetadataValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(match i64::try_from(v) {
            Ok(i) => MetadataValue::Int(i),
            Err(_) => MetadataValue::Float(v as f64),
        })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(MetadataValue::Float(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(MetadataValue::Text(v.to_string()))
    }

    // null reads back as empty text, which normalizes to "unknown".
    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(MetadataValue::Text(String::new()))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        self.visit_unit()
    }
}

impl<'de> Deserialize<'de> for MetadataValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(ScalarVisitor)
        } else {
            Ok(match TaggedValue::deserialize(deserializer)? {
                TaggedValue::Text(s) => MetadataValue::Text(s),
                TaggedValue::Int(i) => MetadataValue::Int(i),
                TaggedValue::Float(x) => MetadataValue::Float(x),
            })
        }
    }
}

/// A passage handed to the tree builder: text plus free-form metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Passage text.
    pub text: String,
    /// Source metadata (sector, company, year, chunk offsets, ...).
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    /// Chunk with no metadata.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A node in the hierarchy.
///
/// Leaves hold original passages; internal nodes hold summaries of their
/// children. Children are referenced by id, never owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier (`leaf_<n>` or `level_<L>_cluster_<c>`).
    #[serde(rename = "node_id")]
    pub id: String,
    /// Passage text (leaf) or summary (internal).
    pub text: String,
    /// Embedding of `text`.
    pub embedding: Vec<f32>,
    /// Child node ids, in cluster order.
    #[serde(rename = "children_ids")]
    pub children: Vec<String>,
    /// Depth in tree (0 = leaves).
    pub level: usize,
    /// Chunk metadata for leaves; `num_children`, `cluster_idx` and inherited keys for parents.
    #[serde(default)]
    pub metadata: Metadata,
}

/// Id of the leaf built from chunk `index`.
pub fn leaf_id(index: usize) -> String {
    format!("leaf_{index}")
}

/// Id of the `cluster_idx`-th parent created on `level`.
pub fn cluster_id(level: usize, cluster_idx: usize) -> String {
    format!("level_{level}_cluster_{cluster_idx}")
}

impl Node {
    /// Create a leaf node for chunk `index`.
    pub fn leaf(index: usize, text: impl Into<String>, embedding: Vec<f32>, metadata: Metadata) -> Self {
        Self {
            id: leaf_id(index),
            text: text.into(),
            embedding,
            children: Vec::new(),
            level: 0,
            metadata,
        }
    }

    /// Create a summary node for cluster `cluster_idx` on `level`.
    pub fn internal(
        level: usize,
        cluster_idx: usize,
        summary: impl Into<String>,
        embedding: Vec<f32>,
        children: Vec<String>,
    ) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("num_children".into(), children.len().into());
        metadata.insert("cluster_idx".into(), cluster_idx.into());
        Self {
            id: cluster_id(level, cluster_idx),
            text: summary.into(),
            embedding,
            children,
            level,
            metadata,
        }
    }

    /// Check if this is a leaf node.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Embedding dimensionality.
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_leaf() {
            write!(f, "Leaf[{}]: {}", self.id, self.text)
        } else {
            write!(f, "Node[{}] L{}: {}", self.id, self.level, self.text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids() {
        assert_eq!(leaf_id(3), "leaf_3");
        assert_eq!(cluster_id(2, 0), "level_2_cluster_0");
    }

    #[test]
    fn test_internal_metadata() {
        let node = Node::internal(1, 4, "s", vec![0.0], vec!["leaf_0".into(), "leaf_1".into()]);
        assert_eq!(node.metadata["num_children"], MetadataValue::Int(2));
        assert_eq!(node.metadata["cluster_idx"], MetadataValue::Int(4));
        assert!(!node.is_leaf());
    }

    #[test]
    fn test_metadata_json_is_plain_scalars() {
        let chunk = Chunk::new("t")
            .with_metadata("company", "Acme")
            .with_metadata("year", 2023i64)
            .with_metadata("weight", 0.5);
        let json = serde_json::to_string(&chunk.metadata).unwrap();
        assert_eq!(json, r#"{"company":"Acme","weight":0.5,"year":2023}"#);

        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chunk.metadata);
    }

    #[test]
    fn test_metadata_json_null_and_bool() {
        let back: Metadata = serde_json::from_str(r#"{"a":null,"b":true}"#).unwrap();
        assert_eq!(back["a"], MetadataValue::Text(String::new()));
        assert_eq!(back["b"], MetadataValue::Text("true".into()));
    }

    #[test]
    fn test_metadata_binary_form() {
        let chunk = Chunk::new("t")
            .with_metadata("sector", "Energy")
            .with_metadata("year", 2021i64)
            .with_metadata("score", 1.25);
        let bytes = bincode::serialize(&chunk).unwrap();
        let back: Chunk = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, chunk);
    }

    #[test]
    fn test_node_json_field_names() {
        let node = Node::leaf(0, "hello", vec![1.0, 2.0], Metadata::new());
        let v: serde_json::Value = serde_json::to_value(&node).unwrap();
        assert_eq!(v["node_id"], "leaf_0");
        assert!(v["children_ids"].as_array().unwrap().is_empty());
        assert_eq!(v["level"], 0);
    }
}
