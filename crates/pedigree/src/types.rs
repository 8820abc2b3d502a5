//! Tree result types
//!
//! Everything here serializes with serde so request handlers can hand a
//! [`TreeResult`] straight to their response envelope.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Direction of a traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeKind {
    Ancestors,
    Descendants,
}

impl TreeKind {
    pub const ALL: [TreeKind; 2] = [TreeKind::Ancestors, TreeKind::Descendants];

    pub fn as_str(&self) -> &'static str {
        match self {
            TreeKind::Ancestors => "ancestors",
            TreeKind::Descendants => "descendants",
        }
    }
}

impl fmt::Display for TreeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which parent link an edge follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Father,
    Mother,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Father => "father",
            Relation::Mother => "mother",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sex classification of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SexBucket {
    Male,
    Female,
    Unknown,
}

impl SexBucket {
    pub const ALL: [SexBucket; 3] = [SexBucket::Male, SexBucket::Female, SexBucket::Unknown];

    pub fn as_str(&self) -> &'static str {
        match self {
            SexBucket::Male => "male",
            SexBucket::Female => "female",
            SexBucket::Unknown => "unknown",
        }
    }
}

/// Species bucket for nodes without a resolvable breed
pub const UNKNOWN_SPECIES: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: i64,
    pub fields: BTreeMap<String, JsonValue>,
}

/// Parent link between two materialized nodes; `from` is the parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeEdge {
    pub from: i64,
    pub to: i64,
    pub relation: Relation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeCounts {
    pub nodes: usize,
    pub edges: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeSummary {
    /// Always holds the `male`, `female` and `unknown` buckets
    pub sex_counts: BTreeMap<String, usize>,
    pub species_counts: BTreeMap<String, usize>,
    pub relation_counts: BTreeMap<String, usize>,
    pub text: String,
}

/// Preview edges grouped by the parent's sex and species
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeExamples {
    pub by_sex: BTreeMap<String, Vec<TreeEdge>>,
    pub by_species: BTreeMap<String, Vec<TreeEdge>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeResult {
    pub root_id: i64,
    pub kind: TreeKind,
    /// Requested depth
    pub max_depth: u32,
    pub nodes: BTreeMap<i64, TreeNode>,
    pub edges: Vec<TreeEdge>,
    /// Levels that actually added nodes
    pub depth_reached: u32,
    pub counts: TreeCounts,
    pub summary: TreeSummary,
    pub edge_examples: EdgeExamples,
    pub generated_at: DateTime<Utc>,
}

impl TreeResult {
    /// Result for a root that does not exist
    pub fn empty(root_id: i64, kind: TreeKind, max_depth: u32) -> Self {
        let sex_counts = SexBucket::ALL
            .iter()
            .map(|bucket| (bucket.as_str().to_string(), 0))
            .collect();
        Self {
            root_id,
            kind,
            max_depth,
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            depth_reached: 0,
            counts: TreeCounts::default(),
            summary: TreeSummary {
                sex_counts,
                species_counts: BTreeMap::new(),
                relation_counts: BTreeMap::new(),
                text: format!("No record found for root {}", root_id),
            },
            edge_examples: EdgeExamples::default(),
            generated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.nodes.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_relation_serializes_lowercase() {
        let edge = TreeEdge {
            from: 1,
            to: 2,
            relation: Relation::Mother,
        };
        assert_eq!(
            serde_json::to_value(edge).unwrap(),
            json!({"from": 1, "to": 2, "relation": "mother"})
        );
    }

    #[test]
    fn test_empty_result() {
        let result = TreeResult::empty(9, TreeKind::Descendants, 3);
        assert!(result.is_empty());
        assert_eq!(result.depth_reached, 0);
        assert_eq!(result.summary.sex_counts.len(), 3);
        assert_eq!(result.kind.to_string(), "descendants");
    }
}
