// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! Reference extractors: pure functions from a [`Node`] to the typed
//! external references it mentions.
//!
//! Each extractor is a plain value implementing [`ReferenceExtractor`],
//! held in an [`ExtractorRegistry`] keyed by [`ReferenceType`]. Extractors
//! never panic or propagate errors on malformed input — they skip and keep
//! going, and they deduplicate: the same reference surfaced from multiple
//! metadata keys collapses into one entry.

mod arn;
mod generic;
mod git;
mod image;
mod k8s;
mod storage;

pub use arn::ArnExtractor;
pub use generic::GenericResourceIdExtractor;
pub use git::GitUrlExtractor;
pub use image::ContainerImageExtractor;
pub use k8s::K8sRefExtractor;
pub use storage::StoragePathExtractor;

use std::collections::BTreeMap;

use rollup_core::model::{ExternalReference, Node, ReferenceType};

/// Structured decomposition of an identifier, used by matchers that need
/// field-level comparison (e.g. ARN service/resource, git owner/repo)
/// rather than whole-string equality.
pub type Components = BTreeMap<String, String>;

/// Contract implemented by one reference-type's extraction strategy.
pub trait ReferenceExtractor: Send + Sync {
    /// The reference type this extractor produces.
    fn reference_type(&self) -> ReferenceType;

    /// Scan `node`'s metadata and emit every reference of this type found,
    /// deduplicated by hash.
    fn extract(&self, node: &Node) -> Vec<ExternalReference>;

    /// Idempotent, total normalization: `normalize(normalize(x)) ==
    /// normalize(x)` for every input, including malformed ones.
    fn normalize(&self, identifier: &str) -> String;

    /// Structured decomposition of `identifier`, or `None` if it doesn't
    /// parse as this reference type.
    fn parse_components(&self, identifier: &str) -> Option<Components>;
}

/// Registry of extractors, keyed by [`ReferenceType`], that runs every
/// applicable extractor over a node and merges/deduplicates the results.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn ReferenceExtractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ExtractorRegistry {
    /// Empty registry with no extractors.
    #[must_use]
    pub fn new() -> Self {
        Self { extractors: Vec::new() }
    }

    /// The six built-in extractors from spec §4.1.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ArnExtractor));
        registry.register(Box::new(K8sRefExtractor));
        registry.register(Box::new(ContainerImageExtractor));
        registry.register(Box::new(StoragePathExtractor));
        registry.register(Box::new(GitUrlExtractor));
        registry.register(Box::new(GenericResourceIdExtractor));
        registry
    }

    pub fn register(&mut self, extractor: Box<dyn ReferenceExtractor>) {
        self.extractors.push(extractor);
    }

    /// Iterate over every registered extractor, in registration order.
    pub fn extractors(&self) -> impl Iterator<Item = &dyn ReferenceExtractor> {
        self.extractors.iter().map(std::convert::AsRef::as_ref)
    }

    /// Number of registered extractors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Look up the extractor for a given reference type, if registered.
    #[must_use]
    pub fn get(&self, reference_type: ReferenceType) -> Option<&dyn ReferenceExtractor> {
        self.extractors
            .iter()
            .find(|e| e.reference_type() == reference_type)
            .map(std::convert::AsRef::as_ref)
    }

    /// Run every registered extractor over `node`, deduplicating the
    /// combined output by hash.
    #[must_use]
    pub fn extract_all(&self, node: &Node) -> Vec<ExternalReference> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for extractor in &self.extractors {
            for reference in extractor.extract(node) {
                if seen.insert(reference.hash.clone()) {
                    out.push(reference);
                }
            }
        }
        out
    }
}

/// Shared helper: collect every string value reachable from `node`'s
/// metadata under `key`, including elements of array-valued metadata.
pub(crate) fn metadata_strings<'a>(node: &'a Node, key: &str) -> Vec<&'a str> {
    node.metadata
        .get(key)
        .map(rollup_core::model::MetadataValue::flatten_strings)
        .unwrap_or_default()
}

/// Shared helper: collect strings from every metadata value regardless of
/// key, for extractors that scan-and-extract embedded identifiers (e.g. ARNs
/// embedded inside policy document strings).
pub(crate) fn all_metadata_strings(node: &Node) -> Vec<&str> {
    node.metadata
        .values()
        .flat_map(rollup_core::model::MetadataValue::flatten_strings)
        .collect()
}
