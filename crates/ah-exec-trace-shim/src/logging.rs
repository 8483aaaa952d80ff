// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Opt-in diagnostics for the shim.
//!
//! Host programs own their stdout and stderr, so nothing is logged unless
//! `AH_EXECTRACE_LOG` is set. Its value is either a boolean switch (which
//! enables `debug`) or an `EnvFilter` directive such as `trace`.

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGING: OnceCell<()> = OnceCell::new();

/// Install the stderr subscriber once per process, if requested.
pub fn init() {
    LOGGING.get_or_init(|| {
        let directive = std::env::var(crate::ENV_LOG).ok();
        let Some(directive) = directive.as_deref().and_then(filter_directive) else {
            return;
        };
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);
        // The host may already own a global subscriber.
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new(directive))
            .with(layer)
            .try_init();
    });
}

/// Map the value of the log variable to a filter directive.
pub fn filter_directive(value: &str) -> Option<String> {
    let value = value.trim();
    match value.to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => None,
        "1" | "true" | "yes" | "on" => Some("debug".to_string()),
        _ => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switches_and_directives() {
        assert_eq!(filter_directive(""), None);
        assert_eq!(filter_directive("0"), None);
        assert_eq!(filter_directive("Off"), None);
        assert_eq!(filter_directive("1").as_deref(), Some("debug"));
        assert_eq!(filter_directive("TRUE").as_deref(), Some("debug"));
        assert_eq!(filter_directive(" trace ").as_deref(), Some("trace"));
        assert_eq!(
            filter_directive("warn,ah_exec_trace_shim=debug").as_deref(),
            Some("warn,ah_exec_trace_shim=debug")
        );
    }
}
