// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! Stable, machine-readable error taxonomy for the rollup execution core.
//!
//! Every variant of [`ErrorCode`] carries a `ROLLUP_<CATEGORY>_<NAME>` string
//! code, a default HTTP status, a retryability flag, and a severity, per the
//! error handling design: validation errors are never retryable,
//! infrastructure errors are, and everything in between follows the
//! propagation rules documented on each category.

use serde::{Deserialize, Serialize};

/// Broad category a code belongs to, matching the four-letter prefixes from
/// the external interface contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Resource,
    Execution,
    Matching,
    Merge,
    BlastRadius,
    Limit,
    Permission,
    Infrastructure,
    State,
}

/// Severity used to scale audit-log emission and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Stable error code. `Display` prints the `ROLLUP_...` wire string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // --- VAL: validation, never retried ---
    ValRepositoryCount,
    ValMatcherCount,
    ValInvalidPattern,
    ValInvalidArnPattern,
    ValInvalidSchedule,
    ValDuplicateName,

    // --- RES: resource, not retried except version-conflict / locked ---
    ResNotFound,
    ResVersionConflict,
    ResLocked,

    // --- EXEC: execution, mostly retried ---
    ExecTimeout,
    ExecMatchFailed,
    ExecMergeFailed,
    ExecCancelled,
    ExecInProgress,
    ExecFetchFailed,

    // --- MATCH: matching, not retried ---
    MatchAmbiguous,
    MatchEngineFailed,

    // --- MERGE: merge, not retried ---
    MergeConflict,
    MergeCyclicDependency,
    MergeInvalidEdge,

    // --- BLAST: blast radius, mostly not retried ---
    BlastError,
    BlastInvalidSeed,

    // --- LIMIT: rate/concurrency, not retried (carry retry-after) ---
    LimitRate,
    LimitQueueFull,
    LimitMaxConcurrent,

    // --- PERM: permission ---
    PermDenied,

    // --- INFRA: infrastructure, retried up to maxAttempts ---
    InfraStoreUnavailable,
    InfraGraphProviderUnavailable,
    InfraCacheUnavailable,

    // --- STATE: lifecycle state conflicts ---
    StateArchived,
}

impl ErrorCode {
    /// The stable `ROLLUP_<CATEGORY>_<NAME>` wire string.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValRepositoryCount => "ROLLUP_VAL_REPOSITORY_COUNT",
            Self::ValMatcherCount => "ROLLUP_VAL_MATCHER_COUNT",
            Self::ValInvalidPattern => "ROLLUP_VAL_INVALID_PATTERN",
            Self::ValInvalidArnPattern => "ROLLUP_VAL_INVALID_ARN_PATTERN",
            Self::ValInvalidSchedule => "ROLLUP_VAL_INVALID_SCHEDULE",
            Self::ValDuplicateName => "ROLLUP_VAL_DUPLICATE_NAME",
            Self::ResNotFound => "ROLLUP_RES_NOT_FOUND",
            Self::ResVersionConflict => "ROLLUP_RES_VERSION_CONFLICT",
            Self::ResLocked => "ROLLUP_RES_LOCKED",
            Self::ExecTimeout => "ROLLUP_EXEC_TIMEOUT",
            Self::ExecMatchFailed => "ROLLUP_EXEC_MATCH_FAILED",
            Self::ExecMergeFailed => "ROLLUP_EXEC_MERGE_FAILED",
            Self::ExecCancelled => "ROLLUP_EXEC_CANCELLED",
            Self::ExecInProgress => "ROLLUP_EXEC_IN_PROGRESS",
            Self::ExecFetchFailed => "ROLLUP_EXEC_FETCH_FAILED",
            Self::MatchAmbiguous => "ROLLUP_MATCH_AMBIGUOUS",
            Self::MatchEngineFailed => "ROLLUP_MATCH_ENGINE_FAILED",
            Self::MergeConflict => "ROLLUP_MERGE_CONFLICT",
            Self::MergeCyclicDependency => "ROLLUP_MERGE_CYCLIC_DEPENDENCY",
            Self::MergeInvalidEdge => "ROLLUP_MERGE_INVALID_EDGE",
            Self::BlastError => "ROLLUP_BLAST_ERROR",
            Self::BlastInvalidSeed => "ROLLUP_BLAST_INVALID_SEED",
            Self::LimitRate => "ROLLUP_LIMIT_RATE",
            Self::LimitQueueFull => "ROLLUP_LIMIT_QUEUE_FULL",
            Self::LimitMaxConcurrent => "ROLLUP_LIMIT_MAX_CONCURRENT",
            Self::PermDenied => "ROLLUP_PERM_DENIED",
            Self::InfraStoreUnavailable => "ROLLUP_INFRA_STORE_UNAVAILABLE",
            Self::InfraGraphProviderUnavailable => "ROLLUP_INFRA_GRAPH_PROVIDER_UNAVAILABLE",
            Self::InfraCacheUnavailable => "ROLLUP_INFRA_CACHE_UNAVAILABLE",
            Self::StateArchived => "ROLLUP_STATE_ARCHIVED",
        }
    }

    /// The broad category this code belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValRepositoryCount
            | Self::ValMatcherCount
            | Self::ValInvalidPattern
            | Self::ValInvalidArnPattern
            | Self::ValInvalidSchedule
            | Self::ValDuplicateName => ErrorCategory::Validation,
            Self::ResNotFound | Self::ResVersionConflict | Self::ResLocked => {
                ErrorCategory::Resource
            }
            Self::ExecTimeout
            | Self::ExecMatchFailed
            | Self::ExecMergeFailed
            | Self::ExecCancelled
            | Self::ExecInProgress
            | Self::ExecFetchFailed => ErrorCategory::Execution,
            Self::MatchAmbiguous | Self::MatchEngineFailed => ErrorCategory::Matching,
            Self::MergeConflict | Self::MergeCyclicDependency | Self::MergeInvalidEdge => {
                ErrorCategory::Merge
            }
            Self::BlastError | Self::BlastInvalidSeed => ErrorCategory::BlastRadius,
            Self::LimitRate | Self::LimitQueueFull | Self::LimitMaxConcurrent => {
                ErrorCategory::Limit
            }
            Self::PermDenied => ErrorCategory::Permission,
            Self::InfraStoreUnavailable
            | Self::InfraGraphProviderUnavailable
            | Self::InfraCacheUnavailable => ErrorCategory::Infrastructure,
            Self::StateArchived => ErrorCategory::State,
        }
    }

    /// Default HTTP status an embedding API surface should map this to.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ValRepositoryCount
            | Self::ValMatcherCount
            | Self::ValInvalidPattern
            | Self::ValInvalidArnPattern
            | Self::ValInvalidSchedule
            | Self::ValDuplicateName
            | Self::BlastInvalidSeed => 400,
            Self::PermDenied => 403,
            Self::ResNotFound => 404,
            Self::ResVersionConflict | Self::StateArchived => 409,
            Self::LimitRate | Self::LimitQueueFull | Self::LimitMaxConcurrent => 429,
            Self::ResLocked | Self::ExecInProgress => 423,
            Self::ExecTimeout => 504,
            Self::ExecMatchFailed
            | Self::ExecMergeFailed
            | Self::ExecCancelled
            | Self::ExecFetchFailed
            | Self::MatchAmbiguous
            | Self::MatchEngineFailed
            | Self::MergeConflict
            | Self::MergeCyclicDependency
            | Self::MergeInvalidEdge
            | Self::BlastError => 422,
            Self::InfraStoreUnavailable
            | Self::InfraGraphProviderUnavailable
            | Self::InfraCacheUnavailable => 503,
        }
    }

    /// Whether the executor/service layer should retry an operation that
    /// failed with this code. Validation, matching, and merge errors are
    /// never retried; `RES_VERSION_CONFLICT`/`RES_LOCKED` and infrastructure
    /// errors are; most execution errors are retried except the explicit
    /// exclusions in §7.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::ResVersionConflict
                | Self::ResLocked
                | Self::ExecTimeout
                | Self::ExecFetchFailed
                | Self::InfraStoreUnavailable
                | Self::InfraGraphProviderUnavailable
                | Self::InfraCacheUnavailable
                | Self::BlastError
        )
    }

    /// Default severity for audit/log emission.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self.category() {
            ErrorCategory::Validation | ErrorCategory::Permission | ErrorCategory::State => {
                Severity::Warning
            }
            ErrorCategory::Resource | ErrorCategory::Limit => Severity::Info,
            ErrorCategory::Matching => Severity::Warning,
            ErrorCategory::Execution | ErrorCategory::Merge | ErrorCategory::BlastRadius => {
                Severity::Error
            }
            ErrorCategory::Infrastructure => Severity::Critical,
        }
    }

    /// Every known code, in declaration order. Used to build
    /// [`ErrorCatalog`].
    #[must_use]
    pub fn all() -> &'static [ErrorCode] {
        &[
            Self::ValRepositoryCount,
            Self::ValMatcherCount,
            Self::ValInvalidPattern,
            Self::ValInvalidArnPattern,
            Self::ValInvalidSchedule,
            Self::ValDuplicateName,
            Self::ResNotFound,
            Self::ResVersionConflict,
            Self::ResLocked,
            Self::ExecTimeout,
            Self::ExecMatchFailed,
            Self::ExecMergeFailed,
            Self::ExecCancelled,
            Self::ExecInProgress,
            Self::ExecFetchFailed,
            Self::MatchAmbiguous,
            Self::MatchEngineFailed,
            Self::MergeConflict,
            Self::MergeCyclicDependency,
            Self::MergeInvalidEdge,
            Self::BlastError,
            Self::BlastInvalidSeed,
            Self::LimitRate,
            Self::LimitQueueFull,
            Self::LimitMaxConcurrent,
            Self::PermDenied,
            Self::InfraStoreUnavailable,
            Self::InfraGraphProviderUnavailable,
            Self::InfraCacheUnavailable,
            Self::StateArchived,
        ]
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The main error type threaded through every component.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RollupError {
    pub code: ErrorCode,
    pub message: String,
    /// A `retryAfter` in seconds, present on `LIMIT_*` codes.
    pub retry_after_secs: Option<u64>,
}

impl RollupError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn retryable(&self) -> bool {
        self.code.retryable()
    }
}

/// `Result` alias used throughout the rollup execution core.
pub type RollupResult<T> = Result<T, RollupError>;

/// Static lookup table over [`ErrorCode`], mirroring the contract crate's
/// error catalog.
pub struct ErrorCatalog;

/// Snapshot of one code's metadata, as returned by [`ErrorCatalog::lookup`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub category: ErrorCategory,
    pub http_status: u16,
    pub retryable: bool,
    pub severity: Severity,
}

impl ErrorCatalog {
    /// Look up metadata for `code`.
    #[must_use]
    pub fn lookup(code: ErrorCode) -> ErrorInfo {
        ErrorInfo {
            code: code.code().to_string(),
            category: code.category(),
            http_status: code.http_status(),
            retryable: code.retryable(),
            severity: code.severity(),
        }
    }

    /// Every code's metadata, in declaration order.
    #[must_use]
    pub fn all() -> Vec<ErrorInfo> {
        ErrorCode::all().iter().map(|c| Self::lookup(*c)).collect()
    }

    /// Every code's metadata within one category.
    #[must_use]
    pub fn by_category(category: ErrorCategory) -> Vec<ErrorInfo> {
        Self::all().into_iter().filter(|i| i.category == category).collect()
    }
}
