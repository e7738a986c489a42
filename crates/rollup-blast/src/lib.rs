// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blast-Radius Engine: bounded, deterministic BFS reachability queries over
//! a [`MergedGraph`], answering "what depends on this node, transitively,
//! within a bounded horizon".

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use rollup_core::model::Edge;
use rollup_core::rollup::MergedGraph;
use rollup_error::{ErrorCode, RollupError, RollupResult};
use serde::{Deserialize, Serialize};

/// One query against a merged graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlastRadiusQuery {
    /// Canonical node ids to start the traversal from.
    pub seeds: Vec<String>,
    pub max_depth: u32,
    pub max_nodes: usize,
    /// When `false`, only seeds and their direct (distance-1) dependents are
    /// reported.
    pub include_indirect: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// `(min_cardinality, min_weighted_reach)` pairs a bucket must clear, in
/// order from `low` upward. `low` has no threshold: it is the default when
/// nothing else clears.
#[derive(Debug, Clone, Copy)]
pub struct RiskThresholds {
    pub medium: (usize, u64),
    pub high: (usize, u64),
    pub critical: (usize, u64),
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self { medium: (5, 20), high: (15, 75), critical: (40, 200) }
    }
}

/// Edge-type weight table plus risk-level bucketing thresholds, externalized
/// per the Design Notes rather than hardcoded into the traversal.
#[derive(Debug, Clone)]
pub struct BlastRadiusConfig {
    pub edge_weights: BTreeMap<String, u32>,
    pub default_edge_weight: u32,
    pub risk_thresholds: RiskThresholds,
}

impl Default for BlastRadiusConfig {
    fn default() -> Self {
        let mut edge_weights = BTreeMap::new();
        edge_weights.insert("depends_on".to_string(), 10);
        edge_weights.insert("references".to_string(), 5);
        edge_weights.insert("cross_repo_identity".to_string(), 20);
        Self { edge_weights, default_edge_weight: 1, risk_thresholds: RiskThresholds::default() }
    }
}

impl BlastRadiusConfig {
    fn weight_of(&self, edge_type: &str) -> u32 {
        self.edge_weights.get(edge_type).copied().unwrap_or(self.default_edge_weight)
    }

    fn bucket(&self, cardinality: usize, weighted_reach: u64) -> RiskLevel {
        let t = &self.risk_thresholds;
        if cardinality >= t.critical.0 && weighted_reach >= t.critical.1 {
            RiskLevel::Critical
        } else if cardinality >= t.high.0 && weighted_reach >= t.high.1 {
            RiskLevel::High
        } else if cardinality >= t.medium.0 && weighted_reach >= t.medium.1 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactedNode {
    pub node_id: String,
    pub distance: u32,
    /// Edge types encountered along the discovered path from the nearest
    /// seed, in traversal order; seeds carry an empty list.
    pub via_edge_types: Vec<String>,
    /// Max edge weight along the discovered path; zero for seeds.
    pub risk_weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlastRadiusResult {
    pub impacted: Vec<ImpactedNode>,
    pub risk_level: RiskLevel,
    pub truncated: bool,
}

struct Visit {
    distance: u32,
    via_edge_types: Vec<String>,
    risk_weight: u32,
}

/// Groups a merged graph's edges by source id. `MergedGraph::edges` is
/// already sorted by `(source_id, target_id, type)` by the Merge Engine, so
/// each group comes out sorted by target id, which is what makes the
/// traversal below deterministic.
fn adjacency(edges: &[Edge]) -> HashMap<&str, Vec<&Edge>> {
    let mut map: HashMap<&str, Vec<&Edge>> = HashMap::new();
    for edge in edges {
        map.entry(edge.source_id.as_str()).or_default().push(edge);
    }
    map
}

/// Runs a bounded BFS from `query.seeds` over `graph`'s out-edges.
///
/// # Errors
///
/// Returns `BLAST_INVALID_SEED` if none of the query's seeds resolve to a
/// node in `graph`.
pub fn compute(graph: &MergedGraph, query: &BlastRadiusQuery, config: &BlastRadiusConfig) -> RollupResult<BlastRadiusResult> {
    let known_ids: HashSet<&str> = graph.nodes.iter().map(|n| n.canonical_id.as_str()).collect();
    let live_seeds: Vec<&str> = query.seeds.iter().map(String::as_str).filter(|id| known_ids.contains(id)).collect();
    if live_seeds.is_empty() {
        return Err(RollupError::new(ErrorCode::BlastInvalidSeed, "none of the requested seed nodes exist in this merged graph"));
    }

    let adj = adjacency(&graph.edges);
    let mut visited: HashMap<&str, Visit> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    let mut truncated = false;

    for &seed in &live_seeds {
        if visited.contains_key(seed) {
            continue;
        }
        visited.insert(seed, Visit { distance: 0, via_edge_types: Vec::new(), risk_weight: 0 });
        order.push(seed);
        queue.push_back(seed);
    }

    while let Some(current) = queue.pop_front() {
        let current_distance = visited[current].distance;
        let current_via = visited[current].via_edge_types.clone();
        let current_risk = visited[current].risk_weight;
        let Some(out_edges) = adj.get(current) else { continue };
        for edge in out_edges {
            let next_id = edge.target_id.as_str();
            if visited.contains_key(next_id) {
                continue;
            }
            let next_distance = current_distance + 1;
            if next_distance > query.max_depth {
                truncated = true;
                continue;
            }
            if visited.len() >= query.max_nodes {
                truncated = true;
                continue;
            }
            let mut via_edge_types = current_via.clone();
            via_edge_types.push(edge.r#type.clone());
            let risk_weight = current_risk.max(config.weight_of(&edge.r#type));
            visited.insert(next_id, Visit { distance: next_distance, via_edge_types, risk_weight });
            order.push(next_id);
            queue.push_back(next_id);
        }
    }

    let impacted: Vec<ImpactedNode> = order
        .into_iter()
        .filter(|id| query.include_indirect || visited[id].distance <= 1)
        .map(|id| {
            let v = &visited[id];
            ImpactedNode { node_id: id.to_string(), distance: v.distance, via_edge_types: v.via_edge_types.clone(), risk_weight: v.risk_weight }
        })
        .collect();

    let weighted_reach: u64 = impacted.iter().map(|n| u64::from(n.risk_weight)).sum();
    let risk_level = config.bucket(impacted.len(), weighted_reach);

    if truncated {
        tracing::warn!(max_depth = query.max_depth, max_nodes = query.max_nodes, visited = visited.len(), "blast radius query truncated");
    }

    Ok(BlastRadiusResult { impacted, risk_level, truncated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollup_core::model::MetadataValue;
    use rollup_core::rollup::MergedNode;
    use std::collections::BTreeMap as Map;
    use uuid::Uuid;

    fn node(id: &str) -> MergedNode {
        MergedNode {
            canonical_id: id.to_string(),
            representatives: vec![(Uuid::new_v4(), id.to_string(), 100)],
            r#type: "aws_s3_bucket".to_string(),
            name: id.to_string(),
            merged_metadata: Map::<String, MetadataValue>::new(),
            source_count: 1,
        }
    }

    fn edge(source: &str, target: &str) -> Edge {
        Edge { source_id: source.to_string(), target_id: target.to_string(), r#type: "depends_on".to_string(), confidence: 100, metadata: Map::new() }
    }

    fn chain_graph(len: usize) -> MergedGraph {
        let nodes = (0..len).map(|i| node(&format!("n{i}"))).collect();
        let edges = (0..len.saturating_sub(1)).map(|i| edge(&format!("n{i}"), &format!("n{}", i + 1))).collect();
        MergedGraph { execution_id: Uuid::new_v4(), nodes, edges }
    }

    #[test]
    fn unknown_seed_is_rejected() {
        let graph = chain_graph(3);
        let query = BlastRadiusQuery { seeds: vec!["missing".into()], max_depth: 10, max_nodes: 10, include_indirect: true };
        let err = compute(&graph, &query, &BlastRadiusConfig::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::BlastInvalidSeed);
    }

    #[test]
    fn max_nodes_truncates_a_long_chain() {
        let graph = chain_graph(100);
        let query = BlastRadiusQuery { seeds: vec!["n0".into()], max_depth: 30, max_nodes: 20, include_indirect: true };
        let result = compute(&graph, &query, &BlastRadiusConfig::default()).unwrap();
        assert_eq!(result.impacted.len(), 20);
        assert!(result.truncated);
        let distances: Vec<u32> = result.impacted.iter().map(|n| n.distance).collect();
        assert_eq!(distances, (0..20).collect::<Vec<u32>>());
    }

    #[test]
    fn max_depth_truncates_before_max_nodes() {
        let graph = chain_graph(100);
        let query = BlastRadiusQuery { seeds: vec!["n0".into()], max_depth: 5, max_nodes: 1_000, include_indirect: true };
        let result = compute(&graph, &query, &BlastRadiusConfig::default()).unwrap();
        assert_eq!(result.impacted.len(), 6);
        assert!(result.truncated);
    }

    #[test]
    fn exclude_indirect_keeps_only_seed_and_direct_dependents() {
        let graph = chain_graph(10);
        let query = BlastRadiusQuery { seeds: vec!["n0".into()], max_depth: 10, max_nodes: 10, include_indirect: false };
        let result = compute(&graph, &query, &BlastRadiusConfig::default()).unwrap();
        assert_eq!(result.impacted.len(), 2);
        assert!(!result.truncated);
    }

    #[test]
    fn increasing_max_depth_never_shrinks_impacted_set() {
        let graph = chain_graph(50);
        let config = BlastRadiusConfig::default();
        let narrow = BlastRadiusQuery { seeds: vec!["n0".into()], max_depth: 5, max_nodes: 1_000, include_indirect: true };
        let wide = BlastRadiusQuery { seeds: vec!["n0".into()], max_depth: 15, max_nodes: 1_000, include_indirect: true };
        let narrow_result = compute(&graph, &narrow, &config).unwrap();
        let wide_result = compute(&graph, &wide, &config).unwrap();
        assert!(wide_result.impacted.len() >= narrow_result.impacted.len());
    }

    #[test]
    fn risk_weight_is_max_edge_weight_along_path() {
        let mut graph = chain_graph(3);
        graph.edges[1].r#type = "cross_repo_identity".to_string();
        let query = BlastRadiusQuery { seeds: vec!["n0".into()], max_depth: 10, max_nodes: 10, include_indirect: true };
        let result = compute(&graph, &query, &BlastRadiusConfig::default()).unwrap();
        let n2 = result.impacted.iter().find(|n| n.node_id == "n2").unwrap();
        assert_eq!(n2.risk_weight, 20);
    }
}
