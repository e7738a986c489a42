// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fallback extractor for opaque resource identifiers that don't fit any of
//! the other typed shapes.
//!
//! Confidence is deliberately below 1.0: a bare `resource_id` string carries
//! no structural guarantee that two equal strings denote the same
//! real-world object the way a parsed ARN or git URL does.

use rollup_core::model::{ExternalReference, Node, ReferenceType};

use crate::{metadata_strings, Components, ReferenceExtractor};

pub struct GenericResourceIdExtractor;

const ID_KEYS: &[&str] = &["resource_id", "external_id", "id"];
const CONFIDENCE: f64 = 0.6;

impl ReferenceExtractor for GenericResourceIdExtractor {
    fn reference_type(&self) -> ReferenceType {
        ReferenceType::GenericResourceId
    }

    fn extract(&self, node: &Node) -> Vec<ExternalReference> {
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for key in ID_KEYS {
            for value in metadata_strings(node, key) {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let normalized = self.normalize(trimmed);
                if seen.insert(normalized.clone()) {
                    let reference = ExternalReference::new(
                        ReferenceType::GenericResourceId,
                        trimmed,
                        normalized,
                        CONFIDENCE,
                    )
                    .with_attribute("source_key", *key);
                    out.push(reference);
                }
            }
        }
        out
    }

    fn normalize(&self, identifier: &str) -> String {
        identifier.trim().to_lowercase()
    }

    fn parse_components(&self, identifier: &str) -> Option<Components> {
        let trimmed = identifier.trim();
        if trimmed.is_empty() {
            return None;
        }
        let mut components = Components::new();
        components.insert("id".into(), trimmed.to_lowercase());
        Some(components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn node(value: &str) -> Node {
        let mut map = BTreeMap::new();
        map.insert("resource_id".to_string(), rollup_core::model::MetadataValue::String(value.to_string()));
        Node { id: "n1".into(), r#type: "generic_resource".into(), name: "r".into(), metadata: map, location: None }
    }

    #[test]
    fn extracts_with_below_full_confidence() {
        let refs = GenericResourceIdExtractor.extract(&node("widget-42"));
        assert_eq!(refs.len(), 1);
        assert!(refs[0].confidence < 1.0);
    }

    #[test]
    fn blank_values_are_skipped() {
        let refs = GenericResourceIdExtractor.extract(&node("   "));
        assert!(refs.is_empty());
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = GenericResourceIdExtractor.normalize("Widget-42");
        let twice = GenericResourceIdExtractor.normalize(&once);
        assert_eq!(once, twice);
    }
}
