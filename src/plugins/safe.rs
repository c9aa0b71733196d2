use anyhow::Result;
use std::panic::{self, AssertUnwindSafe};
use tracing::error;

/// Run a fallible plugin hook, turning errors and panics into `None`.
///
/// Failures are logged and never propagated, so one plugin cannot fail the
/// request for everybody else.
pub fn safe_execute<T, F>(label: &str, op: F) -> Option<T>
where
    F: FnOnce() -> Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            error!("Error processing '{label}': {err:#}");
            None
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Panic processing '{label}': {message}");
            None
        }
    }
}
