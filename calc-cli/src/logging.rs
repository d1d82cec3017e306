use std::sync::Once;

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Level applied to the driver's own crates when `RUST_LOG` is unset.
pub fn default_level(verbose: bool) -> Level {
    if verbose { Level::DEBUG } else { Level::WARN }
}

pub fn default_directives(verbose: bool) -> String {
    let level = default_level(verbose);
    format!("calc_core={level},calc_cli={level}")
}

/// Installs the stderr subscriber. Later calls are ignored.
pub fn init(verbose: bool) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .init();
    });
}
