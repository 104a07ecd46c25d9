//! Top-level flow for one invocation: budget, launch plan, allocation,
//! session, action sequence, outcome.
//!
//! Teardown order holds on every exit path: the session is closed before
//! the process is shut down, and both happen before the budget is
//! released.

use std::time::Instant;

use uuid::Uuid;

use crate::actions::{run_sequence, title_sequence};
use crate::allocator::{Allocate, BrowserProcess, ChromiumAllocator};
use crate::budget::{InvocationBudget, Scope};
use crate::config::ProbeConfig;
use crate::error::{ProbeError, ProbeErrorKind};
use crate::launch::LaunchPlan;
use crate::report::{self, Outcome};
use crate::session::PageSession;

/// The single page this probe checks. Deliberately not configurable.
pub const TARGET_URL: &str = "https://www.google.com";

/// Run one probe invocation against a real browser.
pub async fn run(
    cfg: &ProbeConfig,
    upstream_deadline: Option<Instant>,
) -> Result<String, ProbeError> {
    let allocator = ChromiumAllocator::from_config(cfg);
    run_with(cfg, upstream_deadline, &allocator).await
}

/// The same flow with an injectable allocator.
pub async fn run_with<A: Allocate>(
    cfg: &ProbeConfig,
    upstream_deadline: Option<Instant>,
    allocator: &A,
) -> Result<String, ProbeError> {
    let invocation = Uuid::new_v4();
    report::started(&invocation, TARGET_URL);

    let budget = InvocationBudget::new(upstream_deadline, cfg.margin);
    let allocation = budget.allocation_scope();
    let plan = LaunchPlan::for_restricted_env(cfg);

    let result = match allocator.allocate(&allocation, &plan).await {
        Ok(process) => {
            let task = allocation.subscope();
            let driven = drive(&task, &process).await;
            // Session teardown happened inside `drive`; the process goes
            // second, before the budget is released.
            process.shutdown().await;
            driven
        }
        Err(err) => Err(err),
    };

    report::resolve(&invocation, Outcome::from(result))
}

async fn drive(task: &Scope, process: &BrowserProcess) -> Result<String, ProbeError> {
    let session = PageSession::connect(task, process).await?;
    let outcome = run_sequence(task, &session, &title_sequence(TARGET_URL)).await;
    session.close().await;

    let output = outcome?;
    output.title.ok_or_else(|| {
        ProbeError::new(ProbeErrorKind::Internal)
            .with_hint("sequence completed without producing a title")
    })
}
