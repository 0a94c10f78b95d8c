//! Diagnostic logging via `tracing`.
//!
//! Diagnostics go to stderr so they never mix with reply text on stdout.
//! `PALAVER_LOG` takes the usual `EnvFilter` syntax, e.g.
//! `PALAVER_LOG=palaver::core::dispatcher=debug`.

use std::io::IsTerminal;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "PALAVER_LOG";

static INIT: Once = Once::new();

/// Default level when `PALAVER_LOG` is unset: `warn`, or `debug` when
/// verbose output was asked for.
pub fn default_level(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::WARN
    }
}

fn build_filter(level_override: Option<Level>) -> EnvFilter {
    let default = level_override.unwrap_or(Level::WARN);
    EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy()
}

/// Install the global subscriber. Later calls are no-ops, as is a call made
/// after some other subscriber was installed.
pub fn init_tracing(level_override: Option<Level>) {
    INIT.call_once(|| {
        let stderr_is_terminal = std::io::stderr().is_terminal();
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(stderr_is_terminal)
            .with_target(true);

        let _ = tracing_subscriber::registry()
            .with(build_filter(level_override))
            .with(layer)
            .try_init();
    });
}
