// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tenant-scoped entities: repositories, scans, nodes, edges, external
//! references, and index entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::reference_hash;

/// Opaque tenant identifier. Every entity in the system is scoped by one.
pub type TenantId = Uuid;

/// Opaque repository identifier.
pub type RepositoryId = Uuid;

/// Opaque scan identifier: one parse of one repository at a point in time.
pub type ScanId = Uuid;

/// Source-control provider a [`RepositoryId`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryProvider {
    Github,
    Gitlab,
    Bitbucket,
}

/// One parse of one repository, carrying the scope the Index and Merge
/// Engine key everything off of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: ScanId,
    pub tenant_id: TenantId,
    pub repository_id: RepositoryId,
    pub completed_at: chrono::DateTime<chrono::Utc>,
    pub producer_version: String,
}

/// A tagged-union metadata value. Stands in for the dynamically-typed
/// `Any` metadata the upstream parsers attach to a node; extractors read
/// through the typed accessors below and skip a key whose shape doesn't
/// match what they expect rather than erroring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Number(f64),
    Bool(bool),
    List(Vec<MetadataValue>),
    Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    /// Borrow this value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow this value as a list, if it is one.
    #[must_use]
    pub fn as_list(&self) -> Option<&[MetadataValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Collect every string reachable from this value: itself if a string,
    /// or recursively every string in a list/map. Used by extractors that
    /// scan array-valued or nested metadata for embedded identifiers.
    #[must_use]
    pub fn flatten_strings(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.flatten_strings_into(&mut out);
        out
    }

    fn flatten_strings_into<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::String(s) => out.push(s),
            Self::List(items) => {
                for item in items {
                    item.flatten_strings_into(out);
                }
            }
            Self::Map(map) => {
                for v in map.values() {
                    v.flatten_strings_into(out);
                }
            }
            Self::Number(_) | Self::Bool(_) => {}
        }
    }
}

/// Source location of a node within its repository, as reported by the
/// upstream parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
}

/// One IaC-graph node as produced by an upstream scan.
///
/// `id` is unique within its scan, not globally; nodes are always addressed
/// as `(scan_id, node_id)` pairs once they leave a single repo's graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Opaque, scanner-defined type vocabulary (e.g. `aws_s3_bucket`). The
    /// core never interprets this beyond using it to gate which extractors
    /// apply.
    pub r#type: String,
    pub name: String,
    pub metadata: BTreeMap<String, MetadataValue>,
    pub location: Option<Location>,
}

/// A directed relation between two nodes within one scan's graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    /// Opaque relation classifier (e.g. `contains`, `depends_on`,
    /// `operates_on`); preserved verbatim through merge.
    pub r#type: String,
    pub confidence: u8,
    pub metadata: BTreeMap<String, MetadataValue>,
}

/// The closed vocabulary of external reference kinds the core understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Arn,
    K8sRef,
    ContainerImage,
    StoragePath,
    GitUrl,
    GenericResourceId,
}

impl ReferenceType {
    /// The lowercase wire name used in `hash` inputs and cache keys.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arn => "arn",
            Self::K8sRef => "k8s_ref",
            Self::ContainerImage => "container_image",
            Self::StoragePath => "storage_path",
            Self::GitUrl => "git_url",
            Self::GenericResourceId => "generic_resource_id",
        }
    }
}

/// A typed, normalized identifier of a real-world external object extracted
/// from a node's metadata.
///
/// Equality is defined by `(reference_type, normalized_identifier)` — never
/// by the raw `identifier` a scanner happened to report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalReference {
    pub reference_type: ReferenceType,
    pub identifier: String,
    pub normalized_identifier: String,
    pub provider: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub confidence: f64,
    pub hash: String,
}

impl ExternalReference {
    /// Build a reference, computing `hash` from `reference_type` and
    /// `normalized_identifier`.
    #[must_use]
    pub fn new(
        reference_type: ReferenceType,
        identifier: impl Into<String>,
        normalized_identifier: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let normalized_identifier = normalized_identifier.into();
        let hash = reference_hash(reference_type.as_str(), &normalized_identifier);
        Self {
            reference_type,
            identifier: identifier.into(),
            normalized_identifier,
            provider: None,
            attributes: BTreeMap::new(),
            confidence: confidence.clamp(0.0, 1.0),
            hash,
        }
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Links one node to the external references extracted from it.
///
/// Invariants (enforced by [`IndexEntry::new`]): `references` is non-empty
/// and contains no duplicate `hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub scan_id: ScanId,
    pub repository_id: RepositoryId,
    pub node_id: String,
    pub references: Vec<ExternalReference>,
}

/// Error returned when constructing an [`IndexEntry`] from invalid inputs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexEntryError {
    #[error("index entry must carry at least one reference")]
    EmptyReferences,
    #[error("duplicate reference hash {0} within one index entry")]
    DuplicateReferenceHash(String),
}

impl IndexEntry {
    /// Construct an index entry, validating the non-empty and
    /// no-duplicate-hash invariants from spec §3.
    ///
    /// # Errors
    ///
    /// Returns [`IndexEntryError`] if `references` is empty or contains two
    /// references with the same `hash`.
    pub fn new(
        tenant_id: TenantId,
        scan_id: ScanId,
        repository_id: RepositoryId,
        node_id: impl Into<String>,
        references: Vec<ExternalReference>,
    ) -> Result<Self, IndexEntryError> {
        if references.is_empty() {
            return Err(IndexEntryError::EmptyReferences);
        }
        let mut seen = std::collections::HashSet::new();
        for r in &references {
            if !seen.insert(r.hash.clone()) {
                return Err(IndexEntryError::DuplicateReferenceHash(r.hash.clone()));
            }
        }
        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id,
            scan_id,
            repository_id,
            node_id: node_id.into(),
            references,
        })
    }

    /// Ordered SHA-256 over this entry's sorted reference hashes, used to
    /// short-circuit index rebuilds when a scan hasn't changed.
    #[must_use]
    pub fn collection_hash(&self) -> String {
        crate::hash::collection_hash(self.references.iter().map(|r| r.hash.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        Uuid::new_v4()
    }

    #[test]
    fn index_entry_rejects_empty_references() {
        let err = IndexEntry::new(tenant(), Uuid::new_v4(), Uuid::new_v4(), "n1", vec![])
            .unwrap_err();
        assert_eq!(err, IndexEntryError::EmptyReferences);
    }

    #[test]
    fn index_entry_rejects_duplicate_hashes() {
        let r = ExternalReference::new(ReferenceType::Arn, "x", "x", 1.0);
        let err = IndexEntry::new(
            tenant(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "n1",
            vec![r.clone(), r],
        )
        .unwrap_err();
        assert!(matches!(err, IndexEntryError::DuplicateReferenceHash(_)));
    }

    #[test]
    fn reference_equality_is_by_type_and_normalized_identifier() {
        let a = ExternalReference::new(ReferenceType::Arn, "arn:aws:s3:::Bucket", "arn:aws:s3:::bucket", 1.0);
        let b = ExternalReference::new(ReferenceType::Arn, "ARN:AWS:S3:::BUCKET", "arn:aws:s3:::bucket", 1.0);
        assert_eq!(a.hash, b.hash);
    }
}
