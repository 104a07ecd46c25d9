//! Outcome classification and diagnostic reporting.
//!
//! Log emission here is fire-and-forget observability; it can never
//! change the invocation's result.

use tracing::{error, info};
use uuid::Uuid;

use crate::error::ProbeError;
use crate::metrics;

/// Terminal result of one invocation.
#[derive(Clone, Debug)]
pub enum Outcome {
    Success { title: String },
    Failure { error: ProbeError },
}

impl From<Result<String, ProbeError>> for Outcome {
    fn from(result: Result<String, ProbeError>) -> Self {
        match result {
            Ok(title) => Outcome::Success { title },
            Err(error) => Outcome::Failure { error },
        }
    }
}

pub fn success_message(title: &str) -> String {
    format!("Successfully got title: {title}")
}

pub fn started(invocation: &Uuid, url: &str) {
    info!(target: "cdp-probe", %invocation, url, "invocation started");
}

/// Convert the outcome into the invocation's single result: a confirmation
/// string on success, the classified error otherwise. Never both.
pub fn resolve(invocation: &Uuid, outcome: Outcome) -> Result<String, ProbeError> {
    match outcome {
        Outcome::Success { title } => {
            metrics::record_invocation("success");
            info!(target: "cdp-probe", %invocation, title = %title, "invocation resolved");
            Ok(success_message(&title))
        }
        Outcome::Failure { error } => {
            metrics::record_invocation("failure");
            error!(
                target: "cdp-probe",
                %invocation,
                kind = ?error.kind,
                phase = ?error.phase,
                %error,
                "invocation failed"
            );
            Err(error)
        }
    }
}
