//! Metadata-aware grouping.
//!
//! Before clustering by embedding similarity, nodes can be grouped by the
//! values of configured metadata keys (e.g. `sector`, `company`, `year`).
//! Groups preserve domain structure that embeddings alone would blur:
//! two filings from different companies can read alike, but should not be
//! summarized together.
//!
//! # Normalization
//!
//! | Raw value | Group key |
//! |-----------|-----------|
//! | `" Energy "` | `"energy"` |
//! | `2023` | `"2023"` |
//! | missing / `""` | `"unknown"` |
//!
//! # Key Policy Above Level 1
//!
//! Summaries inherit a key only when every child agrees on it (see
//! [`shared_metadata`]). [`MetadataKeyPolicy`] decides which keys are
//! active when grouping a level.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::hierarchy::{Metadata, MetadataValue, Node};

/// Placeholder group value for missing or blank metadata.
pub const UNKNOWN: &str = "unknown";

/// Which configured keys are active when grouping a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKeyPolicy {
    /// Use the full key set at every level.
    #[default]
    Fixed,
    /// Drop one trailing key per level above 1.
    ///
    /// With `(sector, company, year)`: level 1 groups by all three, level 2 by
    /// `(sector, company)`, level 3 by `(sector)`, and higher levels fall
    /// back to embedding-only clustering.
    Progressive,
}

impl MetadataKeyPolicy {
    /// Keys active when building `target_level`.
    pub fn active_keys<'a>(&self, keys: &'a [String], target_level: usize) -> &'a [String] {
        match self {
            MetadataKeyPolicy::Fixed => keys,
            MetadataKeyPolicy::Progressive => {
                let dropped = target_level.saturating_sub(1);
                &keys[..keys.len().saturating_sub(dropped)]
            }
        }
    }
}

/// Trimmed, lower-cased group value; `"unknown"` when missing or blank.
pub fn normalize_metadata_value(value: Option<&MetadataValue>) -> String {
    let normalized = value
        .map(|v| v.to_string().trim().to_lowercase())
        .unwrap_or_default();
    if normalized.is_empty() {
        UNKNOWN.to_string()
    } else {
        normalized
    }
}

/// Normalized group key of one node.
pub fn group_key(metadata: &Metadata, keys: &[String]) -> Vec<String> {
    keys.iter()
        .map(|k| normalize_metadata_value(metadata.get(k)))
        .collect()
}

/// Group node positions by normalized key tuple.
///
/// Groups are returned in the order their key first appears; positions
/// within a group keep input order.
pub fn group_by_metadata(nodes: &[&Node], keys: &[String]) -> Vec<(Vec<String>, Vec<usize>)> {
    let mut slot: HashMap<Vec<String>, usize> = HashMap::new();
    let mut groups: Vec<(Vec<String>, Vec<usize>)> = Vec::new();

    for (i, node) in nodes.iter().enumerate() {
        let key = group_key(&node.metadata, keys);
        match slot.get(&key) {
            Some(&g) => groups[g].1.push(i),
            None => {
                slot.insert(key.clone(), groups.len());
                groups.push((key, vec![i]));
            }
        }
    }

    groups
}

/// Whether any node carries at least one of `keys`.
pub fn any_node_has_keys(nodes: &[&Node], keys: &[String]) -> bool {
    nodes
        .iter()
        .any(|n| keys.iter().any(|k| n.metadata.contains_key(k)))
}

/// Keys whose normalized value is identical (and known) across all `children`.
///
/// The first child's raw value is kept.
pub fn shared_metadata(children: &[&Node], keys: &[String]) -> Metadata {
    let mut out = Metadata::new();
    let Some(first) = children.first() else {
        return out;
    };

    for key in keys {
        let Some(value) = first.metadata.get(key) else {
            continue;
        };
        let norm = normalize_metadata_value(Some(value));
        if norm == UNKNOWN {
            continue;
        }
        let agreed = children[1..]
            .iter()
            .all(|c| normalize_metadata_value(c.metadata.get(key)) == norm);
        if agreed {
            out.insert(key.clone(), value.clone());
        }
    }

    out
}
