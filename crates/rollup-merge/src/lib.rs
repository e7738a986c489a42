// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! Turns the Match Engine's equivalence classes plus source edges into an
//! immutable [`MergedGraph`] (§4.5). The engine never mutates its inputs.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use rollup_core::hash::collection_hash;
use rollup_core::model::{Edge, RepositoryId, ScanId};
use rollup_core::rollup::{ConflictResolution, MergeOptions, MergedGraph, MergedNode};
use rollup_error::{ErrorCode, RollupError, RollupResult};
use rollup_match::{EquivalenceClass, NodeKey, ScopedNode};
use uuid::Uuid;

/// One source edge, tagged with the scan it came from (edge endpoints are
/// only unique within a single scan).
#[derive(Clone, Copy)]
pub struct ScopedEdge<'a> {
    pub scan_id: ScanId,
    pub edge: &'a Edge,
}

/// Everything the Merge Engine needs: the Match Engine's output, the nodes
/// it ran over, the source edges, and the repository order a rollup config
/// declares (used by `prefer_first_repo`).
pub struct MergeInput<'a> {
    pub classes: &'a [EquivalenceClass],
    pub nodes: &'a [ScopedNode<'a>],
    pub edges: &'a [ScopedEdge<'a>],
    pub repository_order: &'a [RepositoryId],
}

const CROSS_REPO_IDENTITY: &str = "cross_repo_identity";
const CONFLICT_MARKER_KEY: &str = "__merge_conflicts";

fn node_key_string(key: &NodeKey) -> String {
    format!("{}:{}", key.0, key.1)
}

fn canonical_id_of(members: &[NodeKey]) -> String {
    collection_hash(members.iter().map(node_key_string))
}

/// Run the merge algorithm described in §4.5, producing the immutable
/// output of one execution's Merge phase.
///
/// # Errors
///
/// `MERGE_CONFLICT` if `options.conflict_resolution` is `Error` and two
/// representatives disagree on a scalar attribute; `MERGE_INVALID_EDGE` if
/// an edge endpoint cannot be resolved to a node that was actually matched;
/// `MERGE_CYCLIC_DEPENDENCY` if a cycle is found that runs through at least
/// one synthesized cross-repo edge.
pub fn merge(execution_id: Uuid, input: &MergeInput, options: &MergeOptions) -> RollupResult<MergedGraph> {
    let by_key: HashMap<NodeKey, &ScopedNode> = input.nodes.iter().map(|n| (n.key(), n)).collect();

    let mut node_to_canonical: HashMap<NodeKey, String> = HashMap::new();
    for class in input.classes {
        let canonical_id = canonical_id_of(&class.members);
        for member in &class.members {
            node_to_canonical.insert(member.clone(), canonical_id.clone());
        }
    }

    let mut merged_nodes = Vec::with_capacity(input.classes.len());
    let mut canonical_ids: HashSet<String> = HashSet::new();
    let mut cross_repo_tainted: HashSet<String> = HashSet::new();
    for class in input.classes {
        let Some(merged) = build_merged_node(class, &by_key, options, input.repository_order)? else {
            continue;
        };
        canonical_ids.insert(merged.canonical_id.clone());
        if spans_multiple_repositories(class, &by_key) {
            cross_repo_tainted.insert(merged.canonical_id.clone());
        }
        merged_nodes.push(merged);
    }
    merged_nodes.sort_by(|a, b| a.canonical_id.cmp(&b.canonical_id));

    let rewritten_edges = rewrite_edges(input, &node_to_canonical)?;

    // Cycle detection runs over the pre-merge dependency graph alone: a
    // cycle that only exists because matching folded nodes from different
    // repositories into the same canonical id is fatal even though no
    // single edge in it is a synthesized one (§8 scenario 3).
    detect_cyclic_cross_repo_dependency(&rewritten_edges, &cross_repo_tainted, options.max_nodes)?;

    let mut edges = rewritten_edges;

    let mut projection_ids: HashSet<String> = HashSet::new();
    if options.create_cross_repo_edges {
        let cross_edges = synthesize_cross_repo_edges(input.classes, &by_key, &mut projection_ids);
        edges.extend(cross_edges);
    }

    validate_edges(&edges, &canonical_ids, &projection_ids)?;

    edges.sort_by(|a, b| (&a.source_id, &a.target_id, &a.r#type).cmp(&(&b.source_id, &b.target_id, &b.r#type)));

    Ok(MergedGraph { execution_id, nodes: merged_nodes, edges })
}

fn build_merged_node(
    class: &EquivalenceClass,
    by_key: &HashMap<NodeKey, &ScopedNode>,
    options: &MergeOptions,
    repository_order: &[RepositoryId],
) -> RollupResult<Option<MergedNode>> {
    let representatives: Vec<&ScopedNode> = class.members.iter().filter_map(|k| by_key.get(k).copied()).collect();
    if representatives.is_empty() {
        return Ok(None);
    }

    let chosen = pick_representative(&representatives, options.conflict_resolution, repository_order);
    let merged_metadata = merge_attributes(&representatives, chosen, options, repository_order)?;

    let canonical_id = canonical_id_of(&class.members);
    let mut representative_tuples: Vec<(ScanId, String, u8)> =
        class.members.iter().map(|k| (k.0, k.1.clone(), class.confidence)).collect();
    representative_tuples.sort();

    Ok(Some(MergedNode {
        canonical_id,
        representatives: representative_tuples,
        r#type: chosen.node.r#type.clone(),
        name: chosen.node.name.clone(),
        merged_metadata,
        source_count: representatives.len(),
    }))
}

/// Picks the representative used as the merge's tie-break baseline:
/// highest confidence first (all representatives of one class currently
/// share the same confidence, so this mostly falls through to the
/// lexicographic `scanId` tie-break), or first-declared-repository order.
fn pick_representative<'a>(
    representatives: &[&'a ScopedNode<'a>],
    conflict_resolution: ConflictResolution,
    repository_order: &[RepositoryId],
) -> &'a ScopedNode<'a> {
    match conflict_resolution {
        ConflictResolution::PreferFirstRepo => representatives
            .iter()
            .min_by_key(|n| (repo_rank(n.repository_id, repository_order), n.scan_id, n.node.id.clone()))
            .copied()
            .expect("non-empty representative list"),
        _ => representatives
            .iter()
            .min_by_key(|n| (n.scan_id, n.node.id.clone()))
            .copied()
            .expect("non-empty representative list"),
    }
}

fn repo_rank(repository_id: RepositoryId, order: &[RepositoryId]) -> usize {
    order.iter().position(|id| *id == repository_id).unwrap_or(usize::MAX)
}

fn merge_attributes(
    representatives: &[&ScopedNode],
    chosen: &ScopedNode,
    options: &MergeOptions,
    repository_order: &[RepositoryId],
) -> RollupResult<BTreeMap<String, rollup_core::model::MetadataValue>> {
    use rollup_core::model::MetadataValue;

    let mut all_keys: BTreeSet<&String> = BTreeSet::new();
    for rep in representatives {
        all_keys.extend(rep.node.metadata.keys());
    }

    let mut merged = BTreeMap::new();
    let mut conflicted_keys = Vec::new();

    for key in all_keys {
        let values: Vec<(&ScopedNode, &MetadataValue)> =
            representatives.iter().filter_map(|rep| rep.node.metadata.get(key).map(|v| (*rep, v))).collect();
        let Some((_, first_value)) = values.first() else { continue };
        if values.iter().all(|(_, v)| *v == first_value) {
            merged.insert(key.clone(), (*first_value).clone());
            continue;
        }

        match options.conflict_resolution {
            ConflictResolution::Error => {
                return Err(RollupError::new(
                    ErrorCode::MergeConflict,
                    format!("attribute '{key}' disagrees across representatives"),
                ));
            }
            ConflictResolution::PreferFirstRepo => {
                let pick = values
                    .iter()
                    .min_by_key(|(rep, _)| (repo_rank(rep.repository_id, repository_order), rep.scan_id))
                    .expect("non-empty values");
                merged.insert(key.clone(), pick.1.clone());
            }
            ConflictResolution::PreferHighestConfidence => {
                merged.insert(key.clone(), pick_by_chosen_or_lowest_scan(&values, chosen).clone());
            }
            ConflictResolution::Union => {
                if values.iter().all(|(_, v)| matches!(v, MetadataValue::List(_))) {
                    let mut items: Vec<MetadataValue> = Vec::new();
                    let mut seen: BTreeSet<String> = BTreeSet::new();
                    for (_, v) in &values {
                        let MetadataValue::List(list) = v else { continue };
                        for item in list {
                            let marker = rollup_core::hash::canonical_json(item)
                                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                                .unwrap_or_default();
                            if seen.insert(marker) {
                                items.push(item.clone());
                            }
                        }
                    }
                    merged.insert(key.clone(), MetadataValue::List(items));
                } else {
                    tracing::warn!(attribute = %key, "union resolution falling back to highest-confidence for scalar conflict");
                    merged.insert(key.clone(), pick_by_chosen_or_lowest_scan(&values, chosen).clone());
                    conflicted_keys.push(key.clone());
                }
            }
        }
    }

    if !conflicted_keys.is_empty() {
        merged.insert(
            CONFLICT_MARKER_KEY.to_string(),
            MetadataValue::List(conflicted_keys.into_iter().map(MetadataValue::String).collect()),
        );
    }

    Ok(merged)
}

fn pick_by_chosen_or_lowest_scan<'a>(
    values: &'a [(&ScopedNode, &'a rollup_core::model::MetadataValue)],
    chosen: &ScopedNode,
) -> &'a rollup_core::model::MetadataValue {
    if let Some((_, v)) = values.iter().find(|(rep, _)| rep.key() == chosen.key()) {
        return v;
    }
    values.iter().min_by_key(|(rep, _)| (rep.scan_id, rep.node.id.clone())).map(|(_, v)| *v).expect("non-empty values")
}

fn rewrite_edges(input: &MergeInput, node_to_canonical: &HashMap<NodeKey, String>) -> RollupResult<Vec<Edge>> {
    let mut by_tuple: HashMap<(String, String, String), Edge> = HashMap::new();

    for scoped in input.edges {
        let src_key: NodeKey = (scoped.scan_id, scoped.edge.source_id.clone());
        let tgt_key: NodeKey = (scoped.scan_id, scoped.edge.target_id.clone());
        let src_canon = node_to_canonical.get(&src_key).ok_or_else(|| {
            RollupError::new(
                ErrorCode::MergeInvalidEdge,
                format!("edge source '{}' in scan {} was never matched", scoped.edge.source_id, scoped.scan_id),
            )
        })?;
        let tgt_canon = node_to_canonical.get(&tgt_key).ok_or_else(|| {
            RollupError::new(
                ErrorCode::MergeInvalidEdge,
                format!("edge target '{}' in scan {} was never matched", scoped.edge.target_id, scoped.scan_id),
            )
        })?;

        let tuple_key = (src_canon.clone(), tgt_canon.clone(), scoped.edge.r#type.clone());
        by_tuple
            .entry(tuple_key)
            .and_modify(|existing| {
                if scoped.edge.confidence > existing.confidence {
                    existing.confidence = scoped.edge.confidence;
                    existing.metadata = scoped.edge.metadata.clone();
                }
            })
            .or_insert_with(|| Edge {
                source_id: src_canon.clone(),
                target_id: tgt_canon.clone(),
                r#type: scoped.edge.r#type.clone(),
                confidence: scoped.edge.confidence,
                metadata: scoped.edge.metadata.clone(),
            });
    }

    Ok(by_tuple.into_values().collect())
}

fn repos_of(class: &EquivalenceClass, by_key: &HashMap<NodeKey, &ScopedNode>) -> BTreeSet<RepositoryId> {
    class.members.iter().filter_map(|k| by_key.get(k)).map(|n| n.repository_id).collect()
}

fn spans_multiple_repositories(class: &EquivalenceClass, by_key: &HashMap<NodeKey, &ScopedNode>) -> bool {
    repos_of(class, by_key).len() >= 2
}

/// Synthesizes `cross_repo_identity` edges for classes whose representatives
/// span two or more repositories. Endpoints are per-repository "projection"
/// ids — a collection hash over just that repository's members of the
/// class — rather than the class's own canonical id, so the edge never
/// self-loops on the merged node it came from.
fn synthesize_cross_repo_edges(
    classes: &[EquivalenceClass],
    by_key: &HashMap<NodeKey, &ScopedNode>,
    projection_ids: &mut HashSet<String>,
) -> Vec<Edge> {
    let mut edges = Vec::new();

    for class in classes {
        let canonical_id = canonical_id_of(&class.members);
        let mut by_repo: BTreeMap<RepositoryId, Vec<NodeKey>> = BTreeMap::new();
        for member in &class.members {
            if let Some(node) = by_key.get(member) {
                by_repo.entry(node.repository_id).or_default().push(member.clone());
            }
        }
        if by_repo.len() < 2 {
            continue;
        }

        let projections: Vec<(RepositoryId, String)> =
            by_repo.into_iter().map(|(repo, members)| (repo, canonical_id_of(&members))).collect();
        for id in projections.iter().map(|(_, id)| id.clone()) {
            projection_ids.insert(id);
        }

        for i in 0..projections.len() {
            for j in (i + 1)..projections.len() {
                let (_, a) = &projections[i];
                let (_, b) = &projections[j];
                let (source_id, target_id) = if a < b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) };
                let mut metadata = BTreeMap::new();
                metadata.insert(
                    "canonical_id".to_string(),
                    rollup_core::model::MetadataValue::String(canonical_id.clone()),
                );
                edges.push(Edge { source_id, target_id, r#type: CROSS_REPO_IDENTITY.to_string(), confidence: class.confidence, metadata });
            }
        }
    }

    edges
}

fn validate_edges(edges: &[Edge], canonical_ids: &HashSet<String>, projection_ids: &HashSet<String>) -> RollupResult<()> {
    for edge in edges {
        let valid_set = if edge.r#type == CROSS_REPO_IDENTITY { projection_ids } else { canonical_ids };
        if !valid_set.contains(&edge.source_id) || !valid_set.contains(&edge.target_id) {
            return Err(RollupError::new(
                ErrorCode::MergeInvalidEdge,
                format!("edge {} -> {} ({}) does not resolve to a known node", edge.source_id, edge.target_id, edge.r#type),
            ));
        }
    }
    Ok(())
}

/// Bounded DFS cycle check over the rewritten (pre cross-repo-edge) graph: a
/// cycle is fatal only when it passes through at least one canonical node
/// whose representatives span ≥2 repositories — i.e. a node that only
/// exists because matching folded nodes from different repositories
/// together. A cycle entirely among single-repository nodes is a
/// pre-existing intra-repo cycle and is left alone.
fn detect_cyclic_cross_repo_dependency(
    edges: &[Edge],
    cross_repo_tainted: &HashSet<String>,
    max_nodes: usize,
) -> RollupResult<()> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        adjacency.entry(edge.source_id.as_str()).or_default().push(edge.target_id.as_str());
    }
    for neighbors in adjacency.values_mut() {
        neighbors.sort_unstable();
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut budget = max_nodes;

    let mut starts: Vec<&str> = adjacency.keys().copied().collect();
    starts.sort_unstable();
    for start in starts {
        if visited.contains(start) || budget == 0 {
            continue;
        }
        let mut stack: Vec<&str> = vec![start];
        let mut on_stack_index: HashMap<&str, usize> = HashMap::new();
        dfs_visit(start, &adjacency, cross_repo_tainted, &mut visited, &mut on_stack_index, &mut stack, &mut budget)?;
    }

    Ok(())
}

fn dfs_visit<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    cross_repo_tainted: &HashSet<String>,
    visited: &mut HashSet<&'a str>,
    on_stack_index: &mut HashMap<&'a str, usize>,
    stack: &mut Vec<&'a str>,
    budget: &mut usize,
) -> RollupResult<()> {
    if *budget == 0 {
        return Ok(());
    }
    *budget -= 1;
    visited.insert(node);
    on_stack_index.insert(node, stack.len() - 1);

    if let Some(neighbors) = adjacency.get(node) {
        for &next in neighbors {
            if let Some(&cycle_start) = on_stack_index.get(next) {
                let cycle_is_tainted =
                    stack[cycle_start..].iter().any(|n| cross_repo_tainted.contains(*n)) || cross_repo_tainted.contains(next);
                if cycle_is_tainted {
                    return Err(RollupError::new(
                        ErrorCode::MergeCyclicDependency,
                        format!("cycle through '{next}' passes through a cross-repository merged node"),
                    ));
                }
                continue;
            }
            if visited.contains(next) {
                continue;
            }
            stack.push(next);
            dfs_visit(next, adjacency, cross_repo_tainted, visited, on_stack_index, stack, budget)?;
            stack.pop();
        }
    }

    on_stack_index.remove(node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollup_core::model::{MetadataValue, Node};
    use rollup_core::rollup::EdgeTypePreservation;
    use uuid::Uuid;

    fn node(id: &str, name: &str) -> Node {
        Node { id: id.into(), r#type: "aws_s3_bucket".into(), name: name.into(), metadata: BTreeMap::new(), location: None }
    }

    fn options(conflict_resolution: ConflictResolution) -> MergeOptions {
        MergeOptions {
            conflict_resolution,
            preserve_source_info: true,
            create_cross_repo_edges: true,
            max_nodes: 10_000,
            edge_type_preservation: EdgeTypePreservation::All,
        }
    }

    #[test]
    fn single_class_produces_one_merged_node_with_union_metadata() {
        let scan_a = Uuid::new_v4();
        let scan_b = Uuid::new_v4();
        let repo_a = Uuid::new_v4();
        let repo_b = Uuid::new_v4();
        let mut n1 = node("n1", "shared-bucket");
        n1.metadata.insert("region".into(), MetadataValue::String("us-east-1".into()));
        let n2 = node("n2", "shared-bucket");

        let nodes = vec![
            ScopedNode { scan_id: scan_a, repository_id: repo_a, node: &n1 },
            ScopedNode { scan_id: scan_b, repository_id: repo_b, node: &n2 },
        ];
        let class = EquivalenceClass {
            members: vec![(scan_a, "n1".to_string()), (scan_b, "n2".to_string())],
            confidence: 95,
            reasons: BTreeSet::from(["arn_identity"]),
        };
        let input = MergeInput { classes: std::slice::from_ref(&class), nodes: &nodes, edges: &[], repository_order: &[] };
        let graph = merge(Uuid::new_v4(), &input, &options(ConflictResolution::PreferHighestConfidence)).unwrap();

        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].source_count, 2);
        assert_eq!(graph.nodes[0].merged_metadata.get("region"), Some(&MetadataValue::String("us-east-1".into())));
    }

    #[test]
    fn cross_repo_edge_is_created_for_multi_repo_class() {
        let scan_a = Uuid::new_v4();
        let scan_b = Uuid::new_v4();
        let repo_a = Uuid::new_v4();
        let repo_b = Uuid::new_v4();
        let n1 = node("n1", "shared-bucket");
        let n2 = node("n2", "shared-bucket");
        let nodes = vec![
            ScopedNode { scan_id: scan_a, repository_id: repo_a, node: &n1 },
            ScopedNode { scan_id: scan_b, repository_id: repo_b, node: &n2 },
        ];
        let class = EquivalenceClass {
            members: vec![(scan_a, "n1".to_string()), (scan_b, "n2".to_string())],
            confidence: 100,
            reasons: BTreeSet::from(["arn_identity"]),
        };
        let input = MergeInput { classes: std::slice::from_ref(&class), nodes: &nodes, edges: &[], repository_order: &[] };
        let graph = merge(Uuid::new_v4(), &input, &options(ConflictResolution::PreferHighestConfidence)).unwrap();

        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].r#type, CROSS_REPO_IDENTITY);
    }

    #[test]
    fn error_resolution_rejects_disagreeing_scalar_attribute() {
        let scan_a = Uuid::new_v4();
        let scan_b = Uuid::new_v4();
        let repo_a = Uuid::new_v4();
        let mut n1 = node("n1", "shared-bucket");
        n1.metadata.insert("region".into(), MetadataValue::String("us-east-1".into()));
        let mut n2 = node("n2", "shared-bucket");
        n2.metadata.insert("region".into(), MetadataValue::String("us-west-2".into()));
        let nodes = vec![
            ScopedNode { scan_id: scan_a, repository_id: repo_a, node: &n1 },
            ScopedNode { scan_id: scan_b, repository_id: repo_a, node: &n2 },
        ];
        let class = EquivalenceClass {
            members: vec![(scan_a, "n1".to_string()), (scan_b, "n2".to_string())],
            confidence: 95,
            reasons: BTreeSet::from(["arn_identity"]),
        };
        let input = MergeInput { classes: std::slice::from_ref(&class), nodes: &nodes, edges: &[], repository_order: &[] };
        let err = merge(Uuid::new_v4(), &input, &options(ConflictResolution::Error)).unwrap_err();
        assert_eq!(err.code, ErrorCode::MergeConflict);
    }

    #[test]
    fn edge_with_unmatched_endpoint_is_rejected() {
        let scan_a = Uuid::new_v4();
        let repo_a = Uuid::new_v4();
        let n1 = node("n1", "a");
        let nodes = vec![ScopedNode { scan_id: scan_a, repository_id: repo_a, node: &n1 }];
        let class =
            EquivalenceClass { members: vec![(scan_a, "n1".to_string())], confidence: 100, reasons: BTreeSet::new() };
        let dangling = Edge {
            source_id: "n1".to_string(),
            target_id: "does-not-exist".to_string(),
            r#type: "depends_on".to_string(),
            confidence: 90,
            metadata: BTreeMap::new(),
        };
        let edges = vec![ScopedEdge { scan_id: scan_a, edge: &dangling }];
        let input = MergeInput { classes: std::slice::from_ref(&class), nodes: &nodes, edges: &edges, repository_order: &[] };
        let err = merge(Uuid::new_v4(), &input, &options(ConflictResolution::PreferHighestConfidence)).unwrap_err();
        assert_eq!(err.code, ErrorCode::MergeInvalidEdge);
    }

    /// §8 scenario 3: R1 has `n1 -> n2`, R2 has `m1 -> m2`; matching pairs
    /// `(n1, m2)` and `(m1, n2)`. The resulting two merged nodes both span
    /// repositories, and the remapped edges close a 2-cycle between them.
    #[test]
    fn cross_repo_match_induced_cycle_is_rejected() {
        let scan_a = Uuid::new_v4();
        let scan_b = Uuid::new_v4();
        let repo_1 = Uuid::new_v4();
        let repo_2 = Uuid::new_v4();
        let n1 = node("n1", "n1");
        let n2 = node("n2", "n2");
        let m1 = node("m1", "m1");
        let m2 = node("m2", "m2");
        let nodes = vec![
            ScopedNode { scan_id: scan_a, repository_id: repo_1, node: &n1 },
            ScopedNode { scan_id: scan_a, repository_id: repo_1, node: &n2 },
            ScopedNode { scan_id: scan_b, repository_id: repo_2, node: &m1 },
            ScopedNode { scan_id: scan_b, repository_id: repo_2, node: &m2 },
        ];
        let class_x = EquivalenceClass {
            members: vec![(scan_a, "n1".to_string()), (scan_b, "m2".to_string())],
            confidence: 90,
            reasons: BTreeSet::from(["name"]),
        };
        let class_y = EquivalenceClass {
            members: vec![(scan_b, "m1".to_string()), (scan_a, "n2".to_string())],
            confidence: 90,
            reasons: BTreeSet::from(["name"]),
        };
        let edge_r1 =
            Edge { source_id: "n1".into(), target_id: "n2".into(), r#type: "depends_on".into(), confidence: 90, metadata: BTreeMap::new() };
        let edge_r2 =
            Edge { source_id: "m1".into(), target_id: "m2".into(), r#type: "depends_on".into(), confidence: 90, metadata: BTreeMap::new() };
        let edges = vec![ScopedEdge { scan_id: scan_a, edge: &edge_r1 }, ScopedEdge { scan_id: scan_b, edge: &edge_r2 }];
        let classes = vec![class_x, class_y];
        let input = MergeInput { classes: &classes, nodes: &nodes, edges: &edges, repository_order: &[] };
        let err = merge(Uuid::new_v4(), &input, &options(ConflictResolution::PreferHighestConfidence)).unwrap_err();
        assert_eq!(err.code, ErrorCode::MergeCyclicDependency);
    }
}
