//! Single-shot headless-Chromium title probe.
//!
//! One invocation launches a sandboxless browser process inside a
//! read-only, time-boxed environment, attaches a DevTools control
//! session, loads one page, reads its title and tears everything down —
//! session before process, both before the budget expires.

pub mod actions;
pub mod allocator;
pub mod budget;
pub mod config;
pub mod error;
pub mod launch;
pub mod metrics;
pub mod probe;
pub mod report;
pub mod session;
pub mod transport;
mod util;

pub use actions::{run_sequence, title_sequence, Action, SequenceOutput};
pub use allocator::{Allocate, BrowserProcess, ChromiumAllocator};
pub use budget::{InvocationBudget, Scope, DEFAULT_MARGIN};
pub use config::ProbeConfig;
pub use error::{Phase, ProbeError, ProbeErrorKind};
pub use launch::{LaunchEntry, LaunchPlan};
pub use probe::{run, run_with, TARGET_URL};
pub use report::Outcome;
pub use session::PageSession;
pub use transport::{CdpTransport, ChromiumTransport, CommandTarget};
