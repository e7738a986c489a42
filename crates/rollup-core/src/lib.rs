// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! Core data model shared by every component of the rollup execution core:
//! the tenant-scoped entities (repositories, scans, nodes, edges, external
//! references), the rollup configuration aggregate, the execution state
//! machine, and the merged-graph output type, plus the canonical hashing
//! helpers the rest of the pipeline relies on for determinism.

pub mod hash;
pub mod model;
pub mod rollup;

pub use hash::{canonical_json, collection_hash, reference_hash, sha256_hex};
pub use model::{
    Edge, ExternalReference, IndexEntry, Location, MetadataValue, Node, ReferenceType,
    RepositoryId, RepositoryProvider, ScanId, TenantId,
};
pub use rollup::{
    ExecutionPhase, MatcherConfig, MatcherType, MergeOptions, MergedGraph, MergedNode,
    RollupConfig, RollupConfigBuilder, RollupExecution, RollupStatus,
};

/// Schema version of the data model carried by serialized aggregates.
///
/// Bump whenever a breaking change is made to [`RollupConfig`],
/// [`RollupExecution`], or [`MergedGraph`]'s wire shape.
pub const CONTRACT_VERSION: &str = "1.0.0";
