// SPDX-License-Identifier: MIT OR Apache-2.0
//! The eight built-in matcher strategies, one per [`MatcherType`].

use rollup_core::rollup::MatcherType;

use crate::{MatchContext, MatchOutcome, Matcher, ScopedNode};

/// Compares ARN-typed external references the Index has already extracted
/// for each node. Two nodes match when they share a normalized ARN.
pub struct ArnMatcher;

impl Matcher for ArnMatcher {
    fn matcher_type(&self) -> MatcherType {
        MatcherType::Arn
    }

    fn matches(&self, left: &ScopedNode, right: &ScopedNode, context: &MatchContext) -> MatchOutcome {
        let left_refs = context.references_for(left);
        let right_refs = context.references_for(right);
        let shared = left_refs.iter().any(|l| {
            l.reference_type == rollup_core::model::ReferenceType::Arn
                && right_refs.iter().any(|r| r.hash == l.hash)
        });
        if shared {
            MatchOutcome::positive(100, "arn_identity")
        } else {
            MatchOutcome::negative()
        }
    }
}

/// Compares generic resource-id references.
pub struct ResourceIdMatcher;

impl Matcher for ResourceIdMatcher {
    fn matcher_type(&self) -> MatcherType {
        MatcherType::ResourceId
    }

    fn matches(&self, left: &ScopedNode, right: &ScopedNode, context: &MatchContext) -> MatchOutcome {
        let left_refs = context.references_for(left);
        let right_refs = context.references_for(right);
        let shared = left_refs.iter().any(|l| {
            l.reference_type == rollup_core::model::ReferenceType::GenericResourceId
                && right_refs.iter().any(|r| r.hash == l.hash)
        });
        if shared {
            MatchOutcome::positive(90, "resource_name_exact")
        } else {
            MatchOutcome::negative()
        }
    }
}

/// Exact, case-insensitive node-name comparison.
pub struct NameMatcher;

impl Matcher for NameMatcher {
    fn matcher_type(&self) -> MatcherType {
        MatcherType::Name
    }

    fn matches(&self, left: &ScopedNode, right: &ScopedNode, _context: &MatchContext) -> MatchOutcome {
        if left.node.name.eq_ignore_ascii_case(&right.node.name) && !left.node.name.is_empty() {
            MatchOutcome::positive(85, "resource_name_exact")
        } else {
            MatchOutcome::negative()
        }
    }
}

/// Overlap of `tags`-shaped metadata, scored by intersection-over-union.
pub struct TagMatcher;

impl TagMatcher {
    fn tags(node: &rollup_core::model::Node) -> std::collections::BTreeSet<String> {
        node.metadata
            .get("tags")
            .map(|v| v.flatten_strings().into_iter().map(str::to_lowercase).collect())
            .unwrap_or_default()
    }
}

impl Matcher for TagMatcher {
    fn matcher_type(&self) -> MatcherType {
        MatcherType::Tag
    }

    fn matches(&self, left: &ScopedNode, right: &ScopedNode, _context: &MatchContext) -> MatchOutcome {
        let left_tags = Self::tags(left.node);
        let right_tags = Self::tags(right.node);
        if left_tags.is_empty() || right_tags.is_empty() {
            return MatchOutcome::negative();
        }
        let intersection = left_tags.intersection(&right_tags).count();
        let union = left_tags.union(&right_tags).count();
        let score = ((intersection as f64 / union as f64) * 100.0).round() as u8;
        if intersection > 0 {
            MatchOutcome::positive(score, "tag_intersection")
        } else {
            MatchOutcome::negative()
        }
    }
}

/// Shared source-path prefix between two nodes' reported [`Location`]s.
pub struct PathMatcher;

impl Matcher for PathMatcher {
    fn matcher_type(&self) -> MatcherType {
        MatcherType::Path
    }

    fn matches(&self, left: &ScopedNode, right: &ScopedNode, _context: &MatchContext) -> MatchOutcome {
        let (Some(l), Some(r)) = (&left.node.location, &right.node.location) else {
            return MatchOutcome::negative();
        };
        let left_dir = l.file.rsplit_once('/').map_or("", |(dir, _)| dir);
        let right_dir = r.file.rsplit_once('/').map_or("", |(dir, _)| dir);
        if !left_dir.is_empty() && left_dir == right_dir {
            MatchOutcome::positive(70, "path_prefix")
        } else {
            MatchOutcome::negative()
        }
    }
}

/// Compares a `working_dir` metadata attribute some IaC scanners attach
/// (e.g. the directory a Terraform module was invoked from).
pub struct ContentMatcher;

impl Matcher for ContentMatcher {
    fn matcher_type(&self) -> MatcherType {
        MatcherType::Content
    }

    fn matches(&self, left: &ScopedNode, right: &ScopedNode, _context: &MatchContext) -> MatchOutcome {
        let left_dir = left.node.metadata.get("working_dir").and_then(|v| v.as_str());
        let right_dir = right.node.metadata.get("working_dir").and_then(|v| v.as_str());
        match (left_dir, right_dir) {
            (Some(l), Some(r)) if !l.is_empty() && l == r => MatchOutcome::positive(75, "working_dir_match"),
            _ => MatchOutcome::negative(),
        }
    }
}

/// Compares the declared node `type` plus name token overlap, standing in
/// for a structural (AST-shape) comparison.
pub struct AstMatcher;

impl Matcher for AstMatcher {
    fn matcher_type(&self) -> MatcherType {
        MatcherType::Ast
    }

    fn matches(&self, left: &ScopedNode, right: &ScopedNode, _context: &MatchContext) -> MatchOutcome {
        if left.node.r#type != right.node.r#type {
            return MatchOutcome::negative();
        }
        let left_tokens: std::collections::BTreeSet<&str> = left.node.name.split(['-', '_', '.']).collect();
        let right_tokens: std::collections::BTreeSet<&str> = right.node.name.split(['-', '_', '.']).collect();
        let shared = left_tokens.intersection(&right_tokens).count();
        if shared >= 2 {
            MatchOutcome::positive(65, "ast_structural_match")
        } else {
            MatchOutcome::negative()
        }
    }
}

/// Token-overlap similarity between node names, thresholded against the
/// matcher config's `min_confidence`. Stands in for an embedding-based
/// semantic comparison without pulling in an ML dependency.
pub struct SemanticMatcher;

impl Matcher for SemanticMatcher {
    fn matcher_type(&self) -> MatcherType {
        MatcherType::Semantic
    }

    fn matches(&self, left: &ScopedNode, right: &ScopedNode, _context: &MatchContext) -> MatchOutcome {
        let left_tokens: std::collections::BTreeSet<String> =
            left.node.name.to_lowercase().split(['-', '_', ' ']).map(str::to_string).collect();
        let right_tokens: std::collections::BTreeSet<String> =
            right.node.name.to_lowercase().split(['-', '_', ' ']).map(str::to_string).collect();
        if left_tokens.is_empty() || right_tokens.is_empty() {
            return MatchOutcome::negative();
        }
        let intersection = left_tokens.intersection(&right_tokens).count();
        let union = left_tokens.union(&right_tokens).count();
        let score = ((intersection as f64 / union as f64) * 100.0).round() as u8;
        if score > 0 {
            MatchOutcome::positive(score, "semantic_threshold")
        } else {
            MatchOutcome::negative()
        }
    }
}

/// Build the standard set of matchers keyed by [`MatcherType`].
#[must_use]
pub fn standard_matchers() -> Vec<Box<dyn Matcher>> {
    vec![
        Box::new(ArnMatcher),
        Box::new(ResourceIdMatcher),
        Box::new(NameMatcher),
        Box::new(TagMatcher),
        Box::new(PathMatcher),
        Box::new(ContentMatcher),
        Box::new(AstMatcher),
        Box::new(SemanticMatcher),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NullReferenceLookup, ScopedNode};
    use rollup_core::model::{Location, MetadataValue, Node};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn node(name: &str, r#type: &str) -> Node {
        Node { id: name.into(), r#type: r#type.into(), name: name.into(), metadata: BTreeMap::new(), location: None }
    }

    fn scoped(node: &Node) -> ScopedNode<'_> {
        ScopedNode { scan_id: Uuid::new_v4(), repository_id: Uuid::new_v4(), node }
    }

    #[test]
    fn name_matcher_is_case_insensitive() {
        let a = node("Shared-Bucket", "aws_s3_bucket");
        let b = node("shared-bucket", "aws_s3_bucket");
        let ctx = MatchContext::new(Uuid::new_v4(), &NullReferenceLookup);
        let outcome = NameMatcher.matches(&scoped(&a), &scoped(&b), &ctx);
        assert!(outcome.matched);
    }

    #[test]
    fn tag_matcher_scores_by_jaccard_overlap() {
        let mut a = node("a", "t");
        a.metadata.insert(
            "tags".into(),
            MetadataValue::List(vec![MetadataValue::String("prod".into()), MetadataValue::String("web".into())]),
        );
        let mut b = node("b", "t");
        b.metadata.insert("tags".into(), MetadataValue::List(vec![MetadataValue::String("prod".into())]));
        let ctx = MatchContext::new(Uuid::new_v4(), &NullReferenceLookup);
        let outcome = TagMatcher.matches(&scoped(&a), &scoped(&b), &ctx);
        assert!(outcome.matched);
        assert_eq!(outcome.confidence, 50);
    }

    #[test]
    fn path_matcher_requires_same_directory() {
        let mut a = node("a", "t");
        a.location = Some(Location { file: "modules/net/main.tf".into(), line_start: 1, line_end: 2 });
        let mut b = node("b", "t");
        b.location = Some(Location { file: "modules/net/vpc.tf".into(), line_start: 1, line_end: 2 });
        let ctx = MatchContext::new(Uuid::new_v4(), &NullReferenceLookup);
        let outcome = PathMatcher.matches(&scoped(&a), &scoped(&b), &ctx);
        assert!(outcome.matched);
    }
}
