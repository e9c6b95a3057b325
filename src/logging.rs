use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

pub const LOG_ENV: &str = "DOCFOLD_LOG";

/// Initialize tracing on stderr.
///
/// `DOCFOLD_LOG` takes the usual `EnvFilter` syntax, e.g.
/// `DOCFOLD_LOG=docfold::merge=debug`. Without it the level is `info`, or
/// `debug` when `verbose` is set. Safe to call more than once.
pub fn init_tracing(verbose: bool) {
    INIT.call_once(|| {
        let fallback = if verbose { "docfold=debug" } else { "docfold=info" };
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(verbose))
            .with(filter)
            .init();
    });
}
