//! Response executor.
//!
//! Runs routed handler callbacks strictly one after another, in the order the
//! protocol handler queued them. A failing or panicking callback is logged
//! and the executor moves on to the next. A callback still running when the
//! connection stops is aborted.

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::connection::RunFlag;
use super::registry::RoutedCallback;

pub(crate) async fn run_executor(
    mut callbacks: mpsc::UnboundedReceiver<RoutedCallback>,
    running: RunFlag,
) {
    while running.is_running() {
        let callback = tokio::select! {
            callback = callbacks.recv() => callback,
            _ = running.stopped() => break,
        };
        let Some(callback) = callback else {
            break;
        };

        let label = callback.label().to_string();
        // Own task per callback so a panic unwinds there, not here
        let mut task = tokio::spawn(callback.invoke());
        let outcome = tokio::select! {
            outcome = &mut task => outcome,
            _ = running.stopped() => {
                task.abort();
                warn!(callback = %label, "Callback aborted by shutdown");
                break;
            }
        };
        match outcome {
            Ok(Ok(())) => debug!(callback = %label, "Callback finished"),
            Ok(Err(e)) => error!(callback = %label, error = %e, "Callback failed"),
            Err(e) => error!(callback = %label, error = %e, "Callback panicked"),
        }
    }
    debug!("Response executor stopped");
}
