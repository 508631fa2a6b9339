//! Tracing setup for the command line.
//!
//! The engine itself only emits `tracing` events; library users install
//! whatever subscriber they like. Messages from `log` tasks use the
//! `taskscript::script` target.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent = 0,
    Quiet = 1,
    Normal = 2,
    Verbose = 3,
}

impl Verbosity {
    /// Default filter directive when `RUST_LOG` is unset
    pub fn directive(self) -> &'static str {
        match self {
            Verbosity::Silent => "off",
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn,taskscript::script=info",
            Verbosity::Verbose => "debug",
        }
    }
}

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` env var, falling back to the verbosity's directive.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=taskscript=debug taskscript deploy.yml
/// ```
pub fn init(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));

    // A subscriber may already be installed, e.g. by an embedding application
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
