//! Log output setup for the command line program.

use std::env;
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// Logs go to stderr so that stdout only carries the invocation result. The
/// level defaults to INFO unless `RUST_LOG` is set.
pub fn init() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();
    let filter_layer = {
        let filter = EnvFilter::from_default_env();
        if env::var("RUST_LOG").is_err() {
            filter.add_directive(LevelFilter::INFO.into())
        } else {
            filter
        }
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
