//! Tree validation and health checking utilities.
//!
//! Provides tools to verify tree structure integrity and detect common issues:
//! - Unreachable nodes (no path from any root)
//! - Cycles in the child relation
//! - Missing children references
//! - Level violations (a parent sits exactly one level above its highest child)
//! - Embedding dimension drift
//!
//! Soft clustering lets a child appear under several parents, so shared
//! children are informational rather than errors.
//!
//! # Example
//!
//! ```rust,ignore
//! use canopy::hierarchy::HealthCheck;
//!
//! let report = tree.health_check();
//! if !report.is_healthy() {
//!     for issue in report.validation.issues {
//!         eprintln!("{}: {}", issue.severity, issue.message);
//!     }
//! }
//! ```

use std::collections::{HashMap, HashSet};

use super::tree::HierarchyTree;

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational, not a problem.
    Info,
    /// Something unusual but not necessarily wrong.
    Warning,
    /// A problem that should be fixed.
    Error,
    /// A critical issue that may cause failures.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A single validation issue found during health check.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity of the issue.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// Node involved, if any.
    pub node_id: Option<String>,
    /// Optional additional context.
    pub context: Option<String>,
}

impl ValidationIssue {
    /// Create a new validation issue.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            node_id: None,
            context: None,
        }
    }

    /// Attach the node this issue is about.
    pub fn with_node(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    /// Add context to this issue.
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)?;
        if let Some(id) = &self.node_id {
            write!(f, " (node {})", id)?;
        }
        if let Some(ctx) = &self.context {
            write!(f, " - {}", ctx)?;
        }
        Ok(())
    }
}

/// Report from a validation/health check.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// All issues found.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Add an issue to the report.
    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// Add an info-level issue.
    pub fn info(&mut self, message: impl Into<String>) {
        self.add(ValidationIssue::new(Severity::Info, message));
    }

    /// Add a warning-level issue.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.add(ValidationIssue::new(Severity::Warning, message));
    }

    /// Add an error-level issue.
    pub fn error(&mut self, message: impl Into<String>) {
        self.add(ValidationIssue::new(Severity::Error, message));
    }

    /// Add a critical-level issue.
    pub fn critical(&mut self, message: impl Into<String>) {
        self.add(ValidationIssue::new(Severity::Critical, message));
    }

    /// Check if the report contains no errors or critical issues.
    pub fn is_healthy(&self) -> bool {
        !self.issues.iter().any(|i| i.severity >= Severity::Error)
    }

    /// Check if there are any issues at all.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Get issues of a specific severity or higher.
    pub fn issues_at_level(&self, min_severity: Severity) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity >= min_severity)
            .collect()
    }

    /// Count issues by severity.
    pub fn counts(&self) -> HashMap<Severity, usize> {
        let mut counts = HashMap::new();
        for issue in &self.issues {
            *counts.entry(issue.severity).or_default() += 1;
        }
        counts
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_clean() {
            return write!(f, "Validation passed: no issues found");
        }

        let counts = self.counts();
        write!(f, "Validation report: ")?;

        let parts: Vec<String> = [
            (Severity::Critical, "critical"),
            (Severity::Error, "errors"),
            (Severity::Warning, "warnings"),
            (Severity::Info, "info"),
        ]
        .iter()
        .filter_map(|(sev, name)| counts.get(sev).map(|c| format!("{} {}", c, name)))
        .collect();

        writeln!(f, "{}", parts.join(", "))?;

        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }

        Ok(())
    }
}

/// Health report with additional statistics.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Validation issues.
    pub validation: ValidationReport,
    /// Total number of nodes.
    pub node_count: usize,
    /// Number of leaf nodes.
    pub leaf_count: usize,
    /// Highest level present.
    pub max_depth: usize,
    /// Average number of children per internal node.
    pub avg_branching_factor: f64,
}

impl HealthReport {
    /// Check if the tree is healthy (no errors or critical issues).
    pub fn is_healthy(&self) -> bool {
        self.validation.is_healthy()
    }
}

impl std::fmt::Display for HealthReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Tree Health Report")?;
        writeln!(f, "==================")?;
        writeln!(f, "Nodes: {} ({} leaves)", self.node_count, self.leaf_count)?;
        writeln!(f, "Max depth: {}", self.max_depth)?;
        writeln!(f, "Avg branching factor: {:.2}", self.avg_branching_factor)?;
        writeln!(f)?;
        write!(f, "{}", self.validation)
    }
}

/// Trait for types that can be health-checked.
pub trait HealthCheck {
    /// Perform a health check and return a report.
    fn health_check(&self) -> HealthReport;

    /// Quick check: returns true if healthy.
    fn is_healthy(&self) -> bool {
        self.health_check().is_healthy()
    }
}

impl HealthCheck for HierarchyTree {
    fn health_check(&self) -> HealthReport {
        let children: HashMap<&str, Vec<&str>> = self
            .all_nodes()
            .iter()
            .filter(|n| !n.is_leaf())
            .map(|n| (n.id.as_str(), n.children.iter().map(String::as_str).collect()))
            .collect();
        let roots: Vec<&str> = self.root_ids().iter().map(String::as_str).collect();
        let all: Vec<&str> = self.all_nodes().iter().map(|n| n.id.as_str()).collect();

        let mut validation = validate_tree_structure(&all, &roots, &children);

        let dim = self.dimension().unwrap_or(0);
        for node in self.all_nodes() {
            if node.dimension() != dim {
                validation.add(
                    ValidationIssue::new(Severity::Error, "embedding dimension differs from tree")
                        .with_node(&node.id)
                        .with_context(format!("expected {dim}, found {}", node.dimension())),
                );
            }

            if node.level == 0 {
                if !node.children.is_empty() {
                    validation.add(
                        ValidationIssue::new(Severity::Error, "level 0 node has children")
                            .with_node(&node.id),
                    );
                }
                continue;
            }

            if node.children.is_empty() {
                validation.add(
                    ValidationIssue::new(Severity::Error, "internal node has no children")
                        .with_node(&node.id),
                );
            }
            let mut max_child_level = None;
            for child_id in &node.children {
                match self.get_node(child_id) {
                    Some(child) if child.level >= node.level => validation.add(
                        ValidationIssue::new(
                            Severity::Error,
                            "child level violation (child.level >= parent.level)",
                        )
                        .with_node(&node.id)
                        .with_context(format!(
                            "parent level {}, child {} level {}",
                            node.level, child_id, child.level
                        )),
                    ),
                    Some(child) => {
                        max_child_level = max_child_level.max(Some(child.level));
                    }
                    None => validation.add(
                        ValidationIssue::new(Severity::Error, "child id does not exist")
                            .with_node(&node.id)
                            .with_context(format!("missing child id {child_id}")),
                    ),
                }
            }
            if let Some(max) = max_child_level {
                if node.level != max + 1 {
                    validation.add(
                        ValidationIssue::new(Severity::Error, "level is not one above highest child")
                            .with_node(&node.id)
                            .with_context(format!("level {}, highest child level {max}", node.level)),
                    );
                }
            }
        }

        // Each level should be smaller than the one below it.
        for level in 1..self.depth() {
            let prev = self.nodes_at_level(level - 1).len();
            let curr = self.nodes_at_level(level).len();
            if curr > prev {
                validation.warn(format!(
                    "level {level} has more nodes than prior level ({curr} > {prev})"
                ));
            }
        }

        let node_count = self.len();
        let internal = self.all_nodes().iter().filter(|n| !n.is_leaf()).count();
        let avg_branching_factor = if internal == 0 {
            0.0
        } else {
            let total_children: usize = self.all_nodes().iter().map(|n| n.children.len()).sum();
            total_children as f64 / internal as f64
        };

        HealthReport {
            validation,
            node_count,
            leaf_count: self.leaf_ids().len(),
            max_depth: self.depth().saturating_sub(1),
            avg_branching_factor,
        }
    }
}

/// Validate the child relation of a hierarchy.
///
/// # Arguments
/// * `nodes` - Every node id
/// * `roots` - Declared root ids
/// * `children` - Map from node id to child ids
///
/// # Returns
/// A validation report with any issues found.
pub fn validate_tree_structure(
    nodes: &[&str],
    roots: &[&str],
    children: &HashMap<&str, Vec<&str>>,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    let known: HashSet<&str> = nodes.iter().copied().collect();

    if roots.is_empty() && !nodes.is_empty() {
        report.critical("No root node declared");
    }
    for root in roots {
        if !known.contains(root) {
            report.add(ValidationIssue::new(Severity::Error, "root id does not exist").with_node(*root));
        }
    }

    let mut parent_count: HashMap<&str, usize> = HashMap::new();
    for kids in children.values() {
        for kid in kids {
            *parent_count.entry(kid).or_default() += 1;
        }
    }
    for root in roots {
        if parent_count.contains_key(root) {
            report.add(ValidationIssue::new(Severity::Error, "root has a parent").with_node(*root));
        }
    }
    let shared = parent_count.values().filter(|&&c| c > 1).count();
    if shared > 0 {
        report.info(format!("{shared} nodes are shared by several parents"));
    }

    // Unreachable nodes (not reachable from any root)
    let mut reachable = HashSet::new();
    let mut stack: Vec<&str> = roots.to_vec();
    while let Some(node) = stack.pop() {
        if reachable.insert(node) {
            if let Some(kids) = children.get(node) {
                stack.extend(kids);
            }
        }
    }
    let mut orphans: Vec<&str> = nodes.iter().copied().filter(|n| !reachable.contains(n)).collect();
    orphans.sort_unstable();
    if !orphans.is_empty() {
        report.add(
            ValidationIssue::new(
                Severity::Error,
                format!("{} nodes not reachable from any root", orphans.len()),
            )
            .with_context(format!("first few: {:?}", &orphans[..orphans.len().min(5)])),
        );
    }

    // Cycle detection using DFS with coloring
    fn detect_cycle<'a>(
        node: &'a str,
        children: &HashMap<&'a str, Vec<&'a str>>,
        visited: &mut HashSet<&'a str>,
        in_stack: &mut HashSet<&'a str>,
    ) -> bool {
        if in_stack.contains(node) {
            return true;
        }
        if !visited.insert(node) {
            return false;
        }
        let _ = in_stack.insert(node);
        if let Some(kids) = children.get(node) {
            for &kid in kids {
                if detect_cycle(kid, children, visited, in_stack) {
                    return true;
                }
            }
        }
        let _ = in_stack.remove(node);
        false
    }

    let mut visited = HashSet::new();
    let mut in_stack = HashSet::new();
    for &start in nodes {
        if detect_cycle(start, children, &mut visited, &mut in_stack) {
            report.critical("Cycle detected in tree structure");
            break;
        }
    }

    report
}

#[cfg(test)]
#[allow(clippy::unwrap_used, unused_results)]
mod tests {
    use super::*;
    use crate::capability::{ConcatSummarizer, FnEmbedder};
    use crate::cluster::ClusterStrategy;
    use crate::error::Result;
    use crate::hierarchy::{Chunk, Node, TreeBuilder, TreeConfig};
    use proptest::prelude::*;

    struct Fanout(usize);

    impl ClusterStrategy for Fanout {
        fn cluster_level(&self, nodes: &[&Node], _e: &[Vec<f32>], _l: usize) -> Result<Vec<Vec<usize>>> {
            Ok((0..nodes.len())
                .collect::<Vec<_>>()
                .chunks(self.0)
                .map(|c| c.to_vec())
                .collect())
        }
    }

    fn build(items: &[String], fanout: usize, max_depth: usize) -> HierarchyTree {
        let e = FnEmbedder::new(|t: &str| Ok(vec![t.len() as f32, 1.0]));
        let s = ConcatSummarizer::new().with_separator(" ");
        let config = TreeConfig::default()
            .with_max_depth(max_depth)
            .with_min_cluster_size(1);
        let chunks: Vec<Chunk> = items.iter().map(|t| Chunk::new(t.as_str())).collect();
        let emb: Vec<Vec<f32>> = items.iter().map(|t| vec![t.len() as f32, 1.0]).collect();
        let tree = TreeBuilder::new(config, &e, &s)
            .with_strategy(Fanout(fanout))
            .build(&chunks, &emb)
            .unwrap();
        tree
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn test_validation_report_healthy() {
        let mut report = ValidationReport::new();
        report.info("Just some info");
        report.warn("A warning");

        assert!(report.is_healthy()); // No errors or critical

        report.error("An error");
        assert!(!report.is_healthy());
        assert_eq!(report.issues_at_level(Severity::Warning).len(), 2);
    }

    #[test]
    fn test_validation_issue_display() {
        let issue = ValidationIssue::new(Severity::Error, "Something wrong")
            .with_node("leaf_42")
            .with_context("additional info");

        let s = format!("{}", issue);
        assert!(s.contains("ERROR"));
        assert!(s.contains("Something wrong"));
        assert!(s.contains("leaf_42"));
        assert!(s.contains("additional info"));
    }

    #[test]
    fn test_validate_valid_tree() {
        let children: HashMap<&str, Vec<&str>> = [("r", vec!["a", "b"])].into_iter().collect();
        let report = validate_tree_structure(&["a", "b", "r"], &["r"], &children);
        assert!(report.is_clean(), "{}", report);
    }

    #[test]
    fn test_validate_unreachable_nodes() {
        // a <-> b form a cycle no root reaches.
        let children: HashMap<&str, Vec<&str>> =
            [("a", vec!["b"]), ("b", vec!["a"])].into_iter().collect();
        let report = validate_tree_structure(&["r", "a", "b"], &["r"], &children);
        assert!(!report.is_healthy());
        assert!(report.issues.iter().any(|i| i.message.contains("not reachable")));
        assert!(report.issues.iter().any(|i| i.message.contains("Cycle")));
    }

    #[test]
    fn test_validate_shared_children_is_info() {
        let children: HashMap<&str, Vec<&str>> =
            [("p", vec!["a", "b"]), ("q", vec!["b"])].into_iter().collect();
        let report = validate_tree_structure(&["a", "b", "p", "q"], &["p", "q"], &children);
        assert!(report.is_healthy());
        assert_eq!(report.counts().get(&Severity::Info), Some(&1));
    }

    #[test]
    fn test_health_check_on_built_tree() {
        let items: Vec<String> = (0..10).map(|i| format!("item {i}")).collect();
        let report = build(&items, 3, 3).health_check();
        assert!(report.is_healthy(), "{}", report);
        assert_eq!(report.leaf_count, 10);
        assert_eq!(report.max_depth, 3);
        assert!(report.avg_branching_factor > 1.0);
    }

    #[test]
    fn test_health_check_flags_level_gap() {
        use crate::hierarchy::Metadata;

        let leaves: Vec<Node> = (0..2)
            .map(|i| Node::leaf(i, "t", vec![1.0], Metadata::new()))
            .collect();
        let mut nodes = leaves;
        nodes.push(Node::internal(3, 0, "s", vec![1.0], vec!["leaf_0".into(), "leaf_1".into()]));
        let tree = HierarchyTree::from_parts(
            nodes,
            vec!["level_3_cluster_0".into()],
            vec!["leaf_0".into(), "leaf_1".into()],
            TreeConfig::default(),
        )
        .unwrap();
        let report = tree.health_check();
        assert!(!report.is_healthy());
        assert!(report
            .validation
            .issues
            .iter()
            .any(|i| i.message.contains("one above highest child")));
    }

    proptest! {
        #[test]
        fn health_check_is_healthy_for_fanout_builds(
            items in proptest::collection::vec("[a-z]{1,20}", 1..60),
            fanout in 2usize..8,
            max_depth in 1usize..5,
        ) {
            let tree = build(&items, fanout, max_depth);
            let report = tree.health_check();
            prop_assert!(report.is_healthy(), "{}", report);
            prop_assert!(tree.depth() <= max_depth + 1);
        }
    }
}
