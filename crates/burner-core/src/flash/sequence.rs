//! Ordered command execution with mandatory/optional semantics.

use tracing::{debug, info};

use super::FlashError;
use super::plan::Step;
use crate::events::{Event, Observer};
use crate::session::RemoteSession;

/// An optional step that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub command: String,
    pub message: String,
}

/// Run `steps` in order on one session.
///
/// Optional failures are collected and skipped. The first mandatory
/// failure stops the sequence, unless the step accepts a disconnect and the
/// session dropped: the device went down as intended and nothing after it
/// can run, so the sequence ends successfully.
pub fn run_sequence(
    session: &mut dyn RemoteSession,
    steps: &[Step],
    observer: &dyn Observer,
) -> Result<Vec<StepFailure>, FlashError> {
    let host = session.host();
    let mut skipped = Vec::new();

    for step in steps {
        debug!(host = %host, command = %step.command, "Running");
        let err = match session.run_checked(&step.command) {
            Ok(_) => continue,
            Err(e) => e,
        };

        if step.accepts_disconnect && err.is_disconnect() {
            info!(host = %host, command = %step.command, "Connection dropped, device is going down");
            return Ok(skipped);
        }

        observer.on_event(&Event::StepFailed {
            host,
            command: step.command.clone(),
            mandatory: step.is_mandatory(),
            message: err.to_string(),
        });

        if step.is_mandatory() {
            return Err(FlashError::Step {
                command: step.command.clone(),
                message: err.to_string(),
            });
        }
        skipped.push(StepFailure {
            command: step.command.clone(),
            message: err.to_string(),
        });
    }
    Ok(skipped)
}
