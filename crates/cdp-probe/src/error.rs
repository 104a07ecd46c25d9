//! Error taxonomy surfaced by the probe.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// High-level failure categories for one invocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error, Serialize, Deserialize)]
pub enum ProbeErrorKind {
    #[error("browser process could not be started")]
    Allocation,
    #[error("control session could not be established")]
    Connection,
    #[error("deadline expired")]
    Timeout,
    #[error("remote action failed")]
    Action,
    #[error("internal error")]
    Internal,
}

/// Phase of the invocation an error is attributed to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Phase {
    Allocation,
    Connection,
    Navigation,
    TitleRead,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Allocation => "allocation",
            Phase::Connection => "connection",
            Phase::Navigation => "navigation",
            Phase::TitleRead => "title-read",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enriched error passed back across the invocation boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeError {
    pub kind: ProbeErrorKind,
    pub phase: Option<Phase>,
    pub step: Option<usize>,
    pub hint: Option<String>,
}

impl ProbeError {
    pub fn new(kind: ProbeErrorKind) -> Self {
        Self {
            kind,
            phase: None,
            step: None,
            hint: None,
        }
    }

    pub fn timeout(phase: Phase) -> Self {
        Self::new(ProbeErrorKind::Timeout).with_phase(phase)
    }

    pub fn action(step: usize, cause: ProbeError) -> Self {
        // Scope expiry keeps its own kind; everything else becomes a
        // step-attributed action failure.
        if cause.kind == ProbeErrorKind::Timeout {
            return Self {
                step: Some(step),
                ..cause
            };
        }
        Self {
            kind: ProbeErrorKind::Action,
            phase: cause.phase,
            step: Some(step),
            hint: cause.hint,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Re-attribute a lower-layer failure to the phase it occurred in.
    /// Timeouts are never reclassified.
    pub fn classify(self, phase: Phase) -> Self {
        if self.kind == ProbeErrorKind::Timeout {
            return Self {
                phase: self.phase.or(Some(phase)),
                ..self
            };
        }
        let kind = match phase {
            Phase::Allocation => ProbeErrorKind::Allocation,
            Phase::Connection => ProbeErrorKind::Connection,
            Phase::Navigation | Phase::TitleRead => ProbeErrorKind::Action,
        };
        Self {
            kind,
            phase: Some(phase),
            ..self
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(phase) = self.phase {
            write!(f, " (phase: {phase})")?;
        }
        if let Some(step) = self.step {
            write!(f, " (step {step})")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, ": {hint}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ProbeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_rebinds_kind_to_phase() {
        let err = ProbeError::new(ProbeErrorKind::Internal)
            .with_hint("socket closed")
            .classify(Phase::Connection);
        assert_eq!(err.kind, ProbeErrorKind::Connection);
        assert_eq!(err.phase, Some(Phase::Connection));
        assert_eq!(err.hint.as_deref(), Some("socket closed"));
    }

    #[test]
    fn classify_preserves_timeouts() {
        let err = ProbeError::timeout(Phase::Navigation).classify(Phase::Navigation);
        assert_eq!(err.kind, ProbeErrorKind::Timeout);
    }

    #[test]
    fn action_wrapper_records_step() {
        let cause = ProbeError::new(ProbeErrorKind::Internal).with_hint("no value");
        let err = ProbeError::action(1, cause);
        assert_eq!(err.kind, ProbeErrorKind::Action);
        assert_eq!(err.step, Some(1));
        assert!(err.to_string().contains("step 1"));
    }

    #[test]
    fn action_wrapper_keeps_timeout_kind() {
        let err = ProbeError::action(0, ProbeError::timeout(Phase::Navigation));
        assert_eq!(err.kind, ProbeErrorKind::Timeout);
        assert_eq!(err.step, Some(0));
    }
}
