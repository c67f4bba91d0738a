//! Observability and telemetry.

mod event_bus;

pub use event_bus::{EventBus, FilteredReceiver};

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

/// Initializes the tracing subscriber.
///
/// Filter is taken from `SCANGATE_LOG` (falling back to `info`, or
/// `debug` when `verbose` is set). Safe to call more than once; only the
/// first call installs the subscriber.
pub fn init(verbose: bool) {
    INIT.get_or_init(|| {
        let default_level = if verbose { "debug" } else { "info" };
        let filter = EnvFilter::try_from_env("SCANGATE_LOG")
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init(false);
        init(true);
    }
}
