//! Invocation budget and the lifetimes derived from it.
//!
//! The budget owns the root cancellation signal; the allocation scope and
//! the task scope are child tokens nested in that order. Cancelling or
//! dropping a parent deterministically cancels every child, never the
//! other way around.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::{Phase, ProbeError};

/// Safety margin against the platform's maximum invocation time
/// (80 s against a 90 s ceiling).
pub const DEFAULT_MARGIN: Duration = Duration::from_secs(80);

/// Root time budget for one invocation. Construction cannot fail.
#[derive(Debug)]
pub struct InvocationBudget {
    root: CancellationToken,
    deadline: Instant,
}

impl InvocationBudget {
    /// The resulting deadline is never later than `parent_deadline`.
    pub fn new(parent_deadline: Option<Instant>, margin: Duration) -> Self {
        let own = Instant::now() + margin;
        let deadline = match parent_deadline {
            Some(parent) => parent.min(own),
            None => own,
        };
        Self {
            root: CancellationToken::new(),
            deadline,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Derive the lifetime governing browser-process startup and the
    /// connection's existence.
    pub fn allocation_scope(&self) -> Scope {
        Scope {
            token: self.root.child_token(),
            deadline: self.deadline,
        }
    }
}

impl Drop for InvocationBudget {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// One bounded lifetime in the budget hierarchy.
#[derive(Debug)]
pub struct Scope {
    token: CancellationToken,
    deadline: Instant,
}

impl Scope {
    /// Derive a child lifetime. Cancelling `self` cancels the child; the
    /// child cannot outlive or cancel its parent.
    pub fn subscope(&self) -> Scope {
        Scope {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive `fut` to completion within this lifetime. Expiry of the
    /// deadline or cancellation from above surfaces as a timeout
    /// attributed to `phase`.
    pub async fn run<T, F>(&self, phase: Phase, fut: F) -> Result<T, ProbeError>
    where
        F: Future<Output = Result<T, ProbeError>>,
    {
        let deadline = time::Instant::from_std(self.deadline);
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ProbeError::timeout(phase)),
            outcome = time::timeout_at(deadline, fut) => match outcome {
                Ok(result) => result,
                Err(_) => Err(ProbeError::timeout(phase)),
            },
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeErrorKind;

    #[tokio::test]
    async fn deadline_clamped_by_parent() {
        let parent = Instant::now() + Duration::from_secs(1);
        let budget = InvocationBudget::new(Some(parent), Duration::from_secs(80));
        assert_eq!(budget.deadline(), parent);
    }

    #[tokio::test]
    async fn cancelling_allocation_cancels_task() {
        let budget = InvocationBudget::new(None, Duration::from_secs(5));
        let alloc = budget.allocation_scope();
        let task = alloc.subscope();
        alloc.cancel();
        assert!(task.is_cancelled());
    }

    #[tokio::test]
    async fn cancelling_task_leaves_allocation_alive() {
        let budget = InvocationBudget::new(None, Duration::from_secs(5));
        let alloc = budget.allocation_scope();
        let task = alloc.subscope();
        task.cancel();
        assert!(!alloc.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_budget_cancels_derived_scopes() {
        let budget = InvocationBudget::new(None, Duration::from_secs(5));
        let alloc = budget.allocation_scope();
        drop(budget);
        assert!(alloc.is_cancelled());
    }

    #[tokio::test]
    async fn expiry_surfaces_as_timeout() {
        let budget = InvocationBudget::new(None, Duration::from_millis(10));
        let scope = budget.allocation_scope();
        let err = scope
            .run(Phase::Navigation, std::future::pending::<Result<(), ProbeError>>())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProbeErrorKind::Timeout);
        assert_eq!(err.phase, Some(Phase::Navigation));
    }

    #[tokio::test]
    async fn cancellation_surfaces_as_timeout() {
        let budget = InvocationBudget::new(None, Duration::from_secs(30));
        let scope = budget.allocation_scope();
        scope.cancel();
        let err = scope
            .run(Phase::Allocation, std::future::pending::<Result<(), ProbeError>>())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProbeErrorKind::Timeout);
    }

    #[tokio::test]
    async fn run_passes_through_inner_result() {
        let budget = InvocationBudget::new(None, Duration::from_secs(5));
        let scope = budget.allocation_scope();
        let value = scope
            .run(Phase::Connection, async { Ok::<_, ProbeError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
