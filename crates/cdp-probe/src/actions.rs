//! The fixed remote-action sequence executed against a session.

use tracing::debug;

use crate::budget::Scope;
use crate::error::{Phase, ProbeError};
use crate::session::PageSession;

/// One step of the sequence. Stateless descriptor; outputs are delivered
/// through [`SequenceOutput`].
#[derive(Clone, Debug)]
pub enum Action {
    Navigate { url: String },
    ReadTitle,
}

/// The sequence this probe exists to run: load the page, then read its
/// title.
pub fn title_sequence(url: &str) -> Vec<Action> {
    vec![
        Action::Navigate {
            url: url.to_string(),
        },
        Action::ReadTitle,
    ]
}

#[derive(Clone, Debug, Default)]
pub struct SequenceOutput {
    pub title: Option<String>,
}

/// Execute `actions` strictly in order, stopping at the first failure.
/// A failing step surfaces with its zero-based index; expiry of `scope`
/// mid-sequence keeps the timeout classification instead.
pub async fn run_sequence(
    scope: &Scope,
    session: &PageSession,
    actions: &[Action],
) -> Result<SequenceOutput, ProbeError> {
    let mut output = SequenceOutput::default();

    for (step, action) in actions.iter().enumerate() {
        match action {
            Action::Navigate { url } => {
                debug!(target: "cdp-probe", step, url = %url, "navigating");
                scope
                    .run(Phase::Navigation, session.navigate(url))
                    .await
                    .map_err(|err| ProbeError::action(step, err.classify(Phase::Navigation)))?;
            }
            Action::ReadTitle => {
                debug!(target: "cdp-probe", step, "reading document title");
                let title = scope
                    .run(Phase::TitleRead, session.read_title())
                    .await
                    .map_err(|err| ProbeError::action(step, err.classify(Phase::TitleRead)))?;
                output.title = Some(title);
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_sequence_is_navigate_then_read() {
        let actions = title_sequence("https://www.google.com");
        assert_eq!(actions.len(), 2);
        assert!(matches!(&actions[0], Action::Navigate { url } if url.contains("google")));
        assert!(matches!(actions[1], Action::ReadTitle));
    }
}
