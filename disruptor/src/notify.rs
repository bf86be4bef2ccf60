use crate::drain::DrainState;

use tracing::{event, Level};

/// Receives a drain's fatal transitions, so an operator can be alerted.
///
/// Sinks are handed to a [`crate::DrainOrchestrator`] explicitly. Delivery is synchronous and
/// best-effort: a sink must not fail the drain.
pub trait DrainNotifier: Send + Sync {
    fn notify(&self, node_name: &str, state: DrainState, message: &str);
}

/// Writes each notification as a `WARN` tracing event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl DrainNotifier for TracingNotifier {
    fn notify(&self, node_name: &str, state: DrainState, message: &str) {
        event!(
            Level::WARN,
            node = node_name,
            state = %state,
            "Drain failed: {}",
            message
        );
    }
}
