//! Tracing subscriber wiring for host applications.
//!
//! Two environment variables are recognised: `CODESCOUT_LOG`
//! (`debug|info|warn|error`) selects the level and `CODESCOUT_ENV`
//! (`development|production`) selects the output format. Neither affects
//! engine semantics.

use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let level = std::env::var("CODESCOUT_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let development = std::env::var("CODESCOUT_ENV")
        .map(|v| v.eq_ignore_ascii_case("development"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if development {
        builder.pretty().try_init()
    } else {
        builder.compact().try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber was already initialised");
    }
}
