// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rollup configuration, the execution state machine, and the merged-graph
//! output type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{MetadataValue, RepositoryId, ScanId, TenantId};

/// Strategy a [`MatcherConfig`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherType {
    Arn,
    ResourceId,
    Name,
    Tag,
    Path,
    Content,
    Ast,
    Semantic,
}

/// Configuration for one matcher strategy within a [`RollupConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    pub r#type: MatcherType,
    /// Higher priority wins ties among otherwise-positive matchers. `1..=100`.
    pub priority: u8,
    pub pattern: Option<String>,
    pub attributes: BTreeMap<String, String>,
    /// Minimum confidence, in `[0.0, 1.0]`, for a positive match to count.
    pub min_confidence: f64,
}

/// Strategy for resolving disagreeing scalar attributes across the
/// representatives of one merged node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    PreferHighestConfidence,
    PreferFirstRepo,
    Union,
    Error,
}

/// How much of an edge's declared type vocabulary survives merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeTypePreservation {
    All,
    NamedSet,
}

/// Options controlling how equivalence classes are turned into a
/// [`MergedGraph`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOptions {
    pub conflict_resolution: ConflictResolution,
    pub preserve_source_info: bool,
    pub create_cross_repo_edges: bool,
    /// Hard cap on merged-node count; also bounds cycle-detection DFS depth.
    pub max_nodes: usize,
    pub edge_type_preservation: EdgeTypePreservation,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            conflict_resolution: ConflictResolution::PreferHighestConfidence,
            preserve_source_info: true,
            create_cross_repo_edges: true,
            max_nodes: 50_000,
            edge_type_preservation: EdgeTypePreservation::All,
        }
    }
}

/// Status of a [`RollupConfig`] (distinct from a single execution's phase).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollupStatus {
    Active,
    Archived,
}

/// A tenant-scoped configuration describing a cross-repository aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupConfig {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    pub repository_ids: Vec<RepositoryId>,
    pub matchers: Vec<MatcherConfig>,
    pub merge_options: MergeOptions,
    pub schedule: Option<String>,
    pub status: RollupStatus,
    /// Monotonic version used for optimistic concurrency by the Service.
    pub version: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Fluent builder for [`RollupConfig`], mirroring the contract crate's
/// builder style: chained `#[must_use]` setters terminated by `build()`.
#[must_use]
pub struct RollupConfigBuilder {
    tenant_id: TenantId,
    name: String,
    repository_ids: Vec<RepositoryId>,
    matchers: Vec<MatcherConfig>,
    merge_options: MergeOptions,
    schedule: Option<String>,
}

impl RollupConfigBuilder {
    pub fn new(tenant_id: TenantId, name: impl Into<String>) -> Self {
        Self {
            tenant_id,
            name: name.into(),
            repository_ids: Vec::new(),
            matchers: Vec::new(),
            merge_options: MergeOptions::default(),
            schedule: None,
        }
    }

    pub fn repository(mut self, id: RepositoryId) -> Self {
        self.repository_ids.push(id);
        self
    }

    pub fn repositories(mut self, ids: impl IntoIterator<Item = RepositoryId>) -> Self {
        self.repository_ids.extend(ids);
        self
    }

    pub fn matcher(mut self, matcher: MatcherConfig) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn merge_options(mut self, options: MergeOptions) -> Self {
        self.merge_options = options;
        self
    }

    pub fn schedule(mut self, cron: impl Into<String>) -> Self {
        self.schedule = Some(cron.into());
        self
    }

    /// Build the config. Validation (repository/matcher count bounds, etc.)
    /// happens in `rollup-service` on `create`/`update`, not here — the
    /// builder only assembles the value.
    pub fn build(self) -> RollupConfig {
        let now = chrono::Utc::now();
        RollupConfig {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            name: self.name,
            repository_ids: self.repository_ids,
            matchers: self.matchers,
            merge_options: self.merge_options,
            schedule: self.schedule,
            status: RollupStatus::Active,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Phase of a [`RollupExecution`].
///
/// Valid transitions form a single forward path with two escape hatches:
///
/// ```text
/// queued -> fetching -> matching -> merging -> storing -> completed
///                                                      \-> (any) failed
///                                                      \-> (any) cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Queued,
    Fetching,
    Matching,
    Merging,
    Storing,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionPhase {
    /// Returns `true` if no further transition is possible from this phase.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// The phases reachable directly from this one.
    #[must_use]
    pub fn valid_transitions(&self) -> &'static [ExecutionPhase] {
        use ExecutionPhase::{Cancelled, Completed, Failed, Fetching, Matching, Merging, Queued, Storing};
        match self {
            Self::Queued => &[Fetching, Failed, Cancelled],
            Self::Fetching => &[Matching, Failed, Cancelled],
            Self::Matching => &[Merging, Failed, Cancelled],
            Self::Merging => &[Storing, Failed, Cancelled],
            Self::Storing => &[Completed, Failed, Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => &[],
        }
    }

    /// Returns `true` if `self -> next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: ExecutionPhase) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Per-execution counters surfaced to callers via `getExecution`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub repositories_fetched: u32,
    pub nodes_indexed: u64,
    pub equivalence_classes: u64,
    pub merged_nodes: u64,
    pub merged_edges: u64,
    pub ambiguous_matches: u64,
    pub fetch_retries: u32,
}

/// One run of the rollup pipeline for a fixed set of scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupExecution {
    pub id: Uuid,
    pub rollup_id: Uuid,
    pub tenant_id: TenantId,
    pub scan_ids: Vec<ScanId>,
    pub phase: ExecutionPhase,
    pub stats: ExecutionStats,
    pub error: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl RollupExecution {
    #[must_use]
    pub fn new(rollup_id: Uuid, tenant_id: TenantId, scan_ids: Vec<ScanId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rollup_id,
            tenant_id,
            scan_ids,
            phase: ExecutionPhase::Queued,
            stats: ExecutionStats::default(),
            error: None,
            started_at: chrono::Utc::now(),
            finished_at: None,
        }
    }

    /// Attempt a phase transition, returning the previous phase on success.
    ///
    /// # Errors
    ///
    /// Returns the illegal `(from, to)` pair if `next` is not reachable from
    /// the current phase.
    pub fn transition(&mut self, next: ExecutionPhase) -> Result<ExecutionPhase, (ExecutionPhase, ExecutionPhase)> {
        if !self.phase.can_transition_to(next) {
            return Err((self.phase, next));
        }
        let prev = self.phase;
        self.phase = next;
        if next.is_terminal() {
            self.finished_at = Some(chrono::Utc::now());
        }
        Ok(prev)
    }
}

/// One merged node: a canonical representative of an equivalence class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedNode {
    pub canonical_id: String,
    /// `(scan_id, node_id, confidence)` for every representative in this
    /// node's equivalence class.
    pub representatives: Vec<(ScanId, String, u8)>,
    pub r#type: String,
    pub name: String,
    pub merged_metadata: BTreeMap<String, MetadataValue>,
    pub source_count: usize,
}

/// The immutable output of one successful execution's Merge phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedGraph {
    pub execution_id: Uuid,
    pub nodes: Vec<MergedNode>,
    pub edges: Vec<crate::model::Edge>,
}
