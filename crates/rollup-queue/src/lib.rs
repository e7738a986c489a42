// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounded priority execution queue and per-tenant token-bucket rate
//! limiter, the two mutable globals named by the concurrency model besides
//! the Index (§5).

mod rate_limit;

pub use rate_limit::{RateLimiterConfig, TenantRateLimiter};

use std::collections::BTreeMap;

use rollup_core::model::TenantId;
use rollup_error::{ErrorCode, RollupError, RollupResult};
use uuid::Uuid;

/// Priority levels for queued executions. `Critical` is dequeued ahead of
/// everything else; within one level, FIFO order applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum QueuePriority {
    Low,
    Normal,
    High,
    Critical,
}

/// One rollup execution waiting to be picked up by a worker.
#[derive(Clone, Debug)]
pub struct QueuedExecution {
    pub execution_id: Uuid,
    pub rollup_id: Uuid,
    pub tenant_id: TenantId,
    pub priority: QueuePriority,
    /// Assigned at enqueue time; breaks ties among equal priorities.
    sequence: u64,
}

/// Snapshot statistics for an [`ExecutionQueue`].
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub total: usize,
    pub max: usize,
    pub by_priority: BTreeMap<&'static str, usize>,
}

fn priority_label(priority: QueuePriority) -> &'static str {
    match priority {
        QueuePriority::Low => "low",
        QueuePriority::Normal => "normal",
        QueuePriority::High => "high",
        QueuePriority::Critical => "critical",
    }
}

/// A bounded, priority-ordered FIFO-within-priority queue of pending
/// executions. Enqueue fails closed past capacity (§4.9) rather than
/// growing unbounded.
pub struct ExecutionQueue {
    entries: Vec<QueuedExecution>,
    max_size: usize,
    next_sequence: u64,
}

impl ExecutionQueue {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self { entries: Vec::new(), max_size, next_sequence: 0 }
    }

    /// # Errors
    ///
    /// Returns `LIMIT_QUEUE_FULL` once `len() == max_size`.
    pub fn enqueue(
        &mut self,
        execution_id: Uuid,
        rollup_id: Uuid,
        tenant_id: TenantId,
        priority: QueuePriority,
    ) -> RollupResult<()> {
        if self.entries.len() >= self.max_size {
            return Err(RollupError::new(
                ErrorCode::LimitQueueFull,
                format!("execution queue is full (max {})", self.max_size),
            ));
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.push(QueuedExecution { execution_id, rollup_id, tenant_id, priority, sequence });
        Ok(())
    }

    /// Removes and returns the highest-priority entry, FIFO among ties.
    pub fn dequeue(&mut self) -> Option<QueuedExecution> {
        let (idx, _) = self
            .entries
            .iter()
            .enumerate()
            .max_by_key(|(_, e)| (e.priority, std::cmp::Reverse(e.sequence)))?;
        Some(self.entries.remove(idx))
    }

    #[must_use]
    pub fn peek(&self) -> Option<&QueuedExecution> {
        self.entries.iter().max_by_key(|e| (e.priority, std::cmp::Reverse(e.sequence)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_size
    }

    /// Removes a specific queued execution, e.g. on a cancellation request
    /// that arrives before a worker picked it up.
    pub fn remove(&mut self, execution_id: Uuid) -> Option<QueuedExecution> {
        let pos = self.entries.iter().position(|e| e.execution_id == execution_id)?;
        Some(self.entries.remove(pos))
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let mut by_priority = BTreeMap::new();
        for entry in &self.entries {
            *by_priority.entry(priority_label(entry.priority)).or_insert(0usize) += 1;
        }
        QueueStats { total: self.entries.len(), max: self.max_size, by_priority }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(q: &mut ExecutionQueue, priority: QueuePriority) -> Uuid {
        let id = Uuid::new_v4();
        q.enqueue(id, Uuid::new_v4(), Uuid::new_v4(), priority).unwrap();
        id
    }

    #[test]
    fn dequeue_prefers_highest_priority() {
        let mut q = ExecutionQueue::new(10);
        push(&mut q, QueuePriority::Low);
        let critical = push(&mut q, QueuePriority::Critical);
        push(&mut q, QueuePriority::Normal);
        assert_eq!(q.dequeue().unwrap().execution_id, critical);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let mut q = ExecutionQueue::new(10);
        let first = push(&mut q, QueuePriority::Normal);
        let second = push(&mut q, QueuePriority::Normal);
        assert_eq!(q.dequeue().unwrap().execution_id, first);
        assert_eq!(q.dequeue().unwrap().execution_id, second);
    }

    #[test]
    fn enqueue_past_capacity_fails_closed() {
        let mut q = ExecutionQueue::new(1);
        push(&mut q, QueuePriority::Normal);
        let err = q.enqueue(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), QueuePriority::Critical).unwrap_err();
        assert_eq!(err.code, ErrorCode::LimitQueueFull);
    }
}
