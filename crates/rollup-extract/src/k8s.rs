// SPDX-License-Identifier: MIT OR Apache-2.0
//! Kubernetes object reference extractor.
//!
//! Canonical form is `<namespace>/<Kind>/<name>`. A reference missing a
//! namespace is assumed to live in `default`, matching how most IaC parsers
//! resolve an unset `metadata.namespace`; a reference missing a kind falls
//! back to `Unknown` rather than being dropped.

use rollup_core::model::{ExternalReference, Node, ReferenceType};

use crate::{metadata_strings, Components, ReferenceExtractor};

pub struct K8sRefExtractor;

const NAMESPACE_KEYS: &[&str] = &["namespace", "k8s_namespace"];
const KIND_KEYS: &[&str] = &["kind", "k8s_kind"];
const NAME_KEYS: &[&str] = &["k8s_name", "name"];

impl K8sRefExtractor {
    fn first_present<'a>(node: &'a Node, keys: &[&str]) -> Option<&'a str> {
        keys.iter()
            .find_map(|k| metadata_strings(node, k).into_iter().next())
    }

    fn split(identifier: &str) -> Option<(String, String, String)> {
        let parts: Vec<&str> = identifier.split('/').collect();
        match parts.as_slice() {
            [namespace, kind, name] if !name.is_empty() => Some((
                if namespace.is_empty() { "default".to_string() } else { (*namespace).to_string() },
                if kind.is_empty() { "Unknown".to_string() } else { (*kind).to_string() },
                (*name).to_string(),
            )),
            [kind, name] if !name.is_empty() => Some((
                "default".to_string(),
                if kind.is_empty() { "Unknown".to_string() } else { (*kind).to_string() },
                (*name).to_string(),
            )),
            [name] if !name.is_empty() => Some(("default".to_string(), "Unknown".to_string(), (*name).to_string())),
            _ => None,
        }
    }
}

impl ReferenceExtractor for K8sRefExtractor {
    fn reference_type(&self) -> ReferenceType {
        ReferenceType::K8sRef
    }

    fn extract(&self, node: &Node) -> Vec<ExternalReference> {
        // Structured form: separate namespace/kind/name metadata keys. A
        // kind key is optional; its absence falls back to `Unknown` rather
        // than suppressing the reference entirely.
        if let Some(name) = Self::first_present(node, NAME_KEYS) {
            let kind = Self::first_present(node, KIND_KEYS).unwrap_or("Unknown");
            let namespace = Self::first_present(node, NAMESPACE_KEYS).unwrap_or("default");
            let raw = format!("{namespace}/{kind}/{name}");
            let normalized = self.normalize(&raw);
            let reference = ExternalReference::new(ReferenceType::K8sRef, &raw, normalized, 1.0)
                .with_provider("kubernetes")
                .with_attribute("namespace", namespace)
                .with_attribute("kind", kind)
                .with_attribute("name", name);
            return vec![reference];
        }

        // Pre-composed `namespace/Kind/name` or `Kind/name` strings.
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for key in &["k8s_ref", "ref"] {
            for value in metadata_strings(node, key) {
                if let Some((namespace, kind, name)) = Self::split(value) {
                    let normalized = self.normalize(value);
                    if seen.insert(normalized.clone()) {
                        let reference =
                            ExternalReference::new(ReferenceType::K8sRef, value, normalized, 1.0)
                                .with_provider("kubernetes")
                                .with_attribute("namespace", namespace)
                                .with_attribute("kind", kind)
                                .with_attribute("name", name);
                        out.push(reference);
                    }
                }
            }
        }
        out
    }

    fn normalize(&self, identifier: &str) -> String {
        match Self::split(identifier) {
            Some((namespace, kind, name)) => {
                format!("{}/{}/{}", namespace.to_lowercase(), kind.to_lowercase(), name.to_lowercase())
            }
            None => identifier.trim().to_lowercase(),
        }
    }

    fn parse_components(&self, identifier: &str) -> Option<Components> {
        let (namespace, kind, name) = Self::split(identifier)?;
        let mut components = Components::new();
        components.insert("namespace".into(), namespace);
        components.insert("kind".into(), kind);
        components.insert("name".into(), name);
        Some(components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn node(metadata: &[(&str, &str)]) -> Node {
        let mut map = BTreeMap::new();
        for (k, v) in metadata {
            map.insert((*k).to_string(), rollup_core::model::MetadataValue::String((*v).to_string()));
        }
        Node { id: "n1".into(), r#type: "k8s_deployment".into(), name: "d".into(), metadata: map, location: None }
    }

    #[test]
    fn structured_fields_build_canonical_form() {
        let n = node(&[("kind", "Deployment"), ("k8s_name", "api"), ("namespace", "prod")]);
        let refs = K8sRefExtractor.extract(&n);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].normalized_identifier, "prod/deployment/api");
    }

    #[test]
    fn missing_namespace_defaults_to_default() {
        let n = node(&[("kind", "Service"), ("k8s_name", "web")]);
        let refs = K8sRefExtractor.extract(&n);
        assert_eq!(refs[0].normalized_identifier, "default/service/web");
    }

    #[test]
    fn pre_composed_ref_without_namespace_defaults() {
        let n = node(&[("k8s_ref", "Service/web")]);
        let refs = K8sRefExtractor.extract(&n);
        assert_eq!(refs[0].normalized_identifier, "default/service/web");
    }

    #[test]
    fn missing_kind_falls_back_to_unknown() {
        let n = node(&[("k8s_name", "web")]);
        let refs = K8sRefExtractor.extract(&n);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].normalized_identifier, "default/unknown/web");
        assert_eq!(refs[0].attributes.get("kind").map(String::as_str), Some("Unknown"));
    }

    #[test]
    fn bare_name_pre_composed_ref_gets_default_namespace_and_unknown_kind() {
        let n = node(&[("k8s_ref", "web")]);
        let refs = K8sRefExtractor.extract(&n);
        assert_eq!(refs[0].normalized_identifier, "default/unknown/web");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = K8sRefExtractor.normalize("Prod/Deployment/API");
        let twice = K8sRefExtractor.normalize(&once);
        assert_eq!(once, twice);
    }
}
