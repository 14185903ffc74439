//! Saving and loading trees.
//!
//! A saved tree is a directory with two files holding the same record:
//!
//! | File | Format | Role |
//! |------|--------|------|
//! | `tree.json` | JSON | Interop form, readable by other tools |
//! | `tree.bin` | bincode | Fast path, preferred on load |
//!
//! The record has `config`, `root_node_ids`, `leaf_node_ids` and
//! `all_nodes`, an object from node id to node written in arena order.
//! Loading re-validates every reference and the level rules, so a decoded
//! tree is acyclic and every node is reachable from a root. Non-finite
//! floats have no JSON form and are refused on save.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use super::builder::TreeConfig;
use super::node::{MetadataValue, Node};
use super::tree::HierarchyTree;
use super::validate::{HealthCheck, Severity};
use crate::error::{Error, Result};

/// Interop file name.
pub const JSON_FILE: &str = "tree.json";
/// Binary file name.
pub const BIN_FILE: &str = "tree.bin";

#[derive(Serialize)]
struct TreeRecordRef<'a> {
    config: &'a TreeConfig,
    root_node_ids: &'a [String],
    leaf_node_ids: &'a [String],
    #[serde(serialize_with = "nodes_as_map")]
    all_nodes: &'a [Node],
}

#[derive(Deserialize)]
struct TreeRecord {
    config: TreeConfig,
    root_node_ids: Vec<String>,
    leaf_node_ids: Vec<String>,
    #[serde(deserialize_with = "nodes_from_map")]
    all_nodes: Vec<Node>,
}

fn nodes_as_map<S: Serializer>(nodes: &&[Node], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(nodes.iter().map(|n| (&n.id, n)))
}

struct NodesVisitor;

impl<'de> Visitor<'de> for NodesVisitor {
    type Value = Vec<Node>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map from node id to node")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Vec<Node>, A::Error> {
        let mut nodes = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, node)) = map.next_entry::<String, Node>()? {
            if key != node.id {
                return Err(de::Error::custom(format!(
                    "node stored under {key} has id {}",
                    node.id
                )));
            }
            nodes.push(node);
        }
        Ok(nodes)
    }
}

fn nodes_from_map<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<Node>, D::Error> {
    deserializer.deserialize_map(NodesVisitor)
}

impl HierarchyTree {
    fn record(&self) -> TreeRecordRef<'_> {
        TreeRecordRef {
            config: self.config(),
            root_node_ids: self.root_ids(),
            leaf_node_ids: self.leaf_ids(),
            all_nodes: self.all_nodes(),
        }
    }

    fn from_record(record: TreeRecord) -> Result<Self> {
        let tree = Self::from_parts(
            record.all_nodes,
            record.root_node_ids,
            record.leaf_node_ids,
            record.config,
        )?;
        tree.check_structure()?;
        Ok(tree)
    }

    /// Reject decoded trees that break the level or reachability rules.
    fn check_structure(&self) -> Result<()> {
        for id in self.leaf_ids() {
            if self.get_node(id).is_some_and(|n| n.level != 0 || !n.children.is_empty()) {
                return Err(Error::invalid("leaf_node_ids", format!("{id} is not a level 0 leaf")));
            }
        }
        let report = self.health_check();
        match report.validation.issues.iter().find(|i| i.severity >= Severity::Error) {
            Some(issue) => Err(Error::invalid("tree_structure", issue.to_string())),
            None => Ok(()),
        }
    }

    fn ensure_finite(&self) -> Result<()> {
        for node in self.all_nodes() {
            if node.embedding.iter().any(|x| !x.is_finite()) {
                return Err(Error::Serialization(format!("{} has a non-finite embedding value", node.id)));
            }
            for (key, value) in &node.metadata {
                if matches!(value, MetadataValue::Float(x) if !x.is_finite()) {
                    return Err(Error::Serialization(format!(
                        "{} metadata {key} is not a finite number",
                        node.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Write `tree.json` and `tree.bin` into `dir`, creating it if needed.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        self.ensure_finite()?;
        fs::create_dir_all(dir)?;
        let record = self.record();

        let mut json = BufWriter::new(File::create(dir.join(JSON_FILE))?);
        serde_json::to_writer_pretty(&mut json, &record)?;
        json.flush()?;

        let mut bin = BufWriter::new(File::create(dir.join(BIN_FILE))?);
        bincode::serialize_into(&mut bin, &record)?;
        bin.flush()?;

        info!(dir = %dir.display(), nodes = self.len(), "saved tree");
        Ok(())
    }

    /// Load a tree saved by [`HierarchyTree::save`].
    ///
    /// Reads `tree.bin` when present and readable, `tree.json` otherwise.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let record = match read_bin(&dir.join(BIN_FILE)) {
            Ok(record) => record,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "binary tree unavailable; reading JSON");
                let file = BufReader::new(File::open(dir.join(JSON_FILE))?);
                serde_json::from_reader(file)?
            }
        };
        let tree = Self::from_record(record)?;
        info!(dir = %dir.display(), nodes = tree.len(), "loaded tree");
        Ok(tree)
    }

    /// The interop form as a JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        self.ensure_finite()?;
        Ok(serde_json::to_string_pretty(&self.record())?)
    }

    /// Parse and validate the interop form.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_record(serde_json::from_str(json)?)
    }
}

fn read_bin(path: &Path) -> Result<TreeRecord> {
    let file = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(file)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, unused_results)]
mod tests {
    use super::*;
    use crate::hierarchy::{Metadata, MetadataValue};

    fn sample() -> HierarchyTree {
        let mut nodes: Vec<Node> = (0..3)
            .map(|i| {
                let mut meta = Metadata::new();
                meta.insert("company".into(), MetadataValue::from("Acme"));
                meta.insert("year".into(), MetadataValue::from(2020 + i as i64));
                Node::leaf(i, format!("passage {i}"), vec![0.1 * i as f32, 1.0 / 3.0, -2.5e-7], meta)
            })
            .collect();
        nodes.push(Node::internal(
            1,
            0,
            "summary",
            vec![0.7, 0.123_456_79, 1e-3],
            vec!["leaf_0".into(), "leaf_1".into(), "leaf_2".into()],
        ));
        HierarchyTree::from_parts(
            nodes,
            vec!["level_1_cluster_0".into()],
            vec!["leaf_0".into(), "leaf_1".into(), "leaf_2".into()],
            TreeConfig::default().with_max_depth(2),
        )
        .unwrap()
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tree = sample();
        tree.save(dir.path()).unwrap();
        assert!(dir.path().join(JSON_FILE).exists());
        assert!(dir.path().join(BIN_FILE).exists());

        let loaded = HierarchyTree::load(dir.path()).unwrap();
        assert_eq!(loaded, tree);
    }

    #[test]
    fn test_load_falls_back_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let tree = sample();
        tree.save(dir.path()).unwrap();

        fs::remove_file(dir.path().join(BIN_FILE)).unwrap();
        assert_eq!(HierarchyTree::load(dir.path()).unwrap(), tree);

        fs::write(dir.path().join(BIN_FILE), b"not bincode").unwrap();
        assert_eq!(HierarchyTree::load(dir.path()).unwrap(), tree);
    }

    #[test]
    fn test_load_missing_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = HierarchyTree::load(dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_json_layout() {
        let json = sample().to_json_string().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["root_node_ids"][0], "level_1_cluster_0");
        assert_eq!(value["leaf_node_ids"].as_array().unwrap().len(), 3);
        assert_eq!(value["config"]["max_depth"], 2);

        let leaf = &value["all_nodes"]["leaf_1"];
        assert_eq!(leaf["node_id"], "leaf_1");
        assert_eq!(leaf["level"], 0);
        assert_eq!(leaf["metadata"]["company"], "Acme");
        assert_eq!(leaf["metadata"]["year"], 2021);
        assert!(leaf["children_ids"].as_array().unwrap().is_empty());

        // Arena order: leaves before their parent.
        assert!(json.find("\"leaf_2\": {").unwrap() < json.find("\"level_1_cluster_0\": {").unwrap());
    }

    #[test]
    fn test_embeddings_round_trip_exactly_through_json() {
        let tree = sample();
        let back = HierarchyTree::from_json_str(&tree.to_json_string().unwrap()).unwrap();
        for (a, b) in tree.all_nodes().iter().zip(back.all_nodes()) {
            assert_eq!(a.embedding, b.embedding);
        }
    }

    #[test]
    fn test_dangling_child_rejected_on_load() {
        let json = r#"{
            "config": {},
            "root_node_ids": ["level_1_cluster_0"],
            "leaf_node_ids": ["leaf_0"],
            "all_nodes": {
                "leaf_0": {"node_id": "leaf_0", "text": "a", "embedding": [1.0], "children_ids": [], "level": 0},
                "level_1_cluster_0": {"node_id": "level_1_cluster_0", "text": "s", "embedding": [1.0],
                                      "children_ids": ["leaf_0", "leaf_7"], "level": 1}
            }
        }"#;
        let err = HierarchyTree::from_json_str(json).unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(id) if id == "leaf_7"));
    }

    fn single_node_json(children: &str, level: usize) -> String {
        format!(
            r#"{{
                "config": {{}},
                "root_node_ids": ["a"],
                "leaf_node_ids": [],
                "all_nodes": {{
                    "a": {{"node_id": "a", "text": "t", "embedding": [1.0], "children_ids": {children}, "level": {level}}}
                }}
            }}"#
        )
    }

    #[test]
    fn test_self_cycle_rejected_on_load() {
        let err = HierarchyTree::from_json_str(&single_node_json(r#"["a"]"#, 0)).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "tree_structure", .. }));
        let err = HierarchyTree::from_json_str(&single_node_json(r#"["a"]"#, 1)).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "tree_structure", .. }));
    }

    #[test]
    fn test_inverted_levels_rejected_on_load() {
        let json = r#"{
            "config": {},
            "root_node_ids": ["p"],
            "leaf_node_ids": ["leaf_0"],
            "all_nodes": {
                "leaf_0": {"node_id": "leaf_0", "text": "a", "embedding": [1.0], "children_ids": [], "level": 0},
                "q": {"node_id": "q", "text": "q", "embedding": [1.0], "children_ids": ["p"], "level": 1},
                "p": {"node_id": "p", "text": "p", "embedding": [1.0], "children_ids": ["leaf_0", "q"], "level": 2}
            }
        }"#;
        assert!(matches!(
            HierarchyTree::from_json_str(json),
            Err(Error::InvalidParameter { name: "tree_structure", .. })
        ));
    }

    #[test]
    fn test_unreachable_node_rejected_on_load() {
        let json = r#"{
            "config": {},
            "root_node_ids": ["leaf_0"],
            "leaf_node_ids": ["leaf_0", "leaf_1"],
            "all_nodes": {
                "leaf_0": {"node_id": "leaf_0", "text": "a", "embedding": [1.0], "children_ids": [], "level": 0},
                "leaf_1": {"node_id": "leaf_1", "text": "b", "embedding": [1.0], "children_ids": [], "level": 0}
            }
        }"#;
        assert!(HierarchyTree::from_json_str(json).is_err());
    }

    #[test]
    fn test_cyclic_binary_record_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = vec![Node::internal(1, 0, "s", vec![1.0], vec!["level_1_cluster_0".into()])];
        let roots = vec!["level_1_cluster_0".to_string()];
        let config = TreeConfig::default();
        let bytes = bincode::serialize(&TreeRecordRef {
            config: &config,
            root_node_ids: &roots,
            leaf_node_ids: &[],
            all_nodes: &nodes,
        })
        .unwrap();
        fs::write(dir.path().join(BIN_FILE), bytes).unwrap();
        assert!(matches!(
            HierarchyTree::load(dir.path()),
            Err(Error::InvalidParameter { name: "tree_structure", .. })
        ));
    }

    #[test]
    fn test_non_finite_metadata_refused_on_save() {
        let mut tree = sample();
        let mut meta = Metadata::new();
        meta.insert("score".into(), MetadataValue::Float(f64::NAN));
        tree.set_metadata("leaf_0", meta).unwrap();

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(tree.save(dir.path()), Err(Error::Serialization(_))));
        assert!(!dir.path().join(JSON_FILE).exists());
        assert!(matches!(tree.to_json_string(), Err(Error::Serialization(_))));

        let mut meta = Metadata::new();
        meta.insert("score".into(), MetadataValue::Float(0.25));
        tree.set_metadata("leaf_0", meta).unwrap();
        let back = HierarchyTree::from_json_str(&tree.to_json_string().unwrap()).unwrap();
        assert_eq!(back.get_node("leaf_0").unwrap().metadata["score"], MetadataValue::Float(0.25));
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let json = r#"{
            "config": {},
            "root_node_ids": ["leaf_0"],
            "leaf_node_ids": ["leaf_0"],
            "all_nodes": {
                "leaf_9": {"node_id": "leaf_0", "text": "a", "embedding": [1.0], "children_ids": [], "level": 0}
            }
        }"#;
        assert!(matches!(HierarchyTree::from_json_str(json), Err(Error::Serialization(_))));
    }
}
