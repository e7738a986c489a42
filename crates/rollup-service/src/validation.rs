// SPDX-License-Identifier: MIT OR Apache-2.0
//! Config validation run on `create`/`update`: repository/matcher count
//! bounds, pattern compilation, ARN grammar, and cron syntax (§6).

use globset::Glob;
use rollup_core::rollup::{MatcherType, RollupConfig};
use rollup_error::{ErrorCode, RollupError, RollupResult};

/// Bounds on a single rollup's shape, checked on every `create`/`update`.
#[derive(Debug, Clone, Copy)]
pub struct ServiceLimits {
    pub max_repositories_per_rollup: usize,
    pub max_matchers_per_rollup: usize,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self { max_repositories_per_rollup: 200, max_matchers_per_rollup: 20 }
    }
}

/// Runs every rule from the config validation section against `config`.
///
/// # Errors
///
/// Returns the first rule violated, as one of the `VAL_*` codes.
pub fn validate_config(config: &RollupConfig, limits: &ServiceLimits) -> RollupResult<()> {
    let repo_count = config.repository_ids.len();
    if repo_count < 2 || repo_count > limits.max_repositories_per_rollup {
        return Err(RollupError::new(
            ErrorCode::ValRepositoryCount,
            format!(
                "repositoryIds.length must be in [2, {}], got {repo_count}",
                limits.max_repositories_per_rollup
            ),
        ));
    }

    let matcher_count = config.matchers.len();
    if matcher_count < 1 || matcher_count > limits.max_matchers_per_rollup {
        return Err(RollupError::new(
            ErrorCode::ValMatcherCount,
            format!("matchers.length must be in [1, {}], got {matcher_count}", limits.max_matchers_per_rollup),
        ));
    }

    for matcher in &config.matchers {
        let Some(pattern) = matcher.pattern.as_deref() else { continue };
        if Glob::new(pattern).is_err() {
            return Err(RollupError::new(ErrorCode::ValInvalidPattern, format!("matcher pattern `{pattern}` does not compile")));
        }
        if matcher.r#type == MatcherType::Arn && !is_arn_grammar(pattern) {
            return Err(RollupError::new(
                ErrorCode::ValInvalidArnPattern,
                format!("matcher pattern `{pattern}` does not match the ARN grammar"),
            ));
        }
    }

    if let Some(schedule) = config.schedule.as_deref() {
        if !is_valid_cron(schedule) {
            return Err(RollupError::new(ErrorCode::ValInvalidSchedule, format!("schedule `{schedule}` is not a valid 5-field cron expression")));
        }
    }

    Ok(())
}

/// Structural check for `arn:<partition>:<service>:<region>:<account>:<resource>`,
/// the same six-colon-separated shape `rollup-extract`'s ARN extractor
/// parses, except wildcards (`*`) are allowed in any field since this
/// validates a matcher *pattern*, not a literal ARN.
fn is_arn_grammar(pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.splitn(6, ':').collect();
    if parts.len() != 6 || parts[0] != "arn" {
        return false;
    }
    let partition = parts[1];
    let service = parts[2];
    let region = parts[3];
    let account = parts[4];
    let resource = parts[5];

    let field_ok = |f: &str| !f.is_empty() && f.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '*'));

    field_ok(partition)
        && field_ok(service)
        && (region.is_empty() || region.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '*')))
        && (account.is_empty() || account.chars().all(|c| c.is_ascii_digit() || c == '*'))
        && !resource.is_empty()
}

/// Structural check for a standard 5-field cron expression. Does not
/// validate field *ranges* (e.g. that `61` is not a valid minute), only
/// that the expression has five space-separated fields built from the
/// characters cron syntax allows.
fn is_valid_cron(expr: &str) -> bool {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }
    fields.iter().all(|field| !field.is_empty() && field.chars().all(|c| c.is_ascii_digit() || matches!(c, '*' | ',' | '-' | '/')))
}
