//! Tracing subscriber setup.
//!
//! Filter comes from `RUST_LOG` when set, otherwise `info` (`debug` with
//! `--verbose`). Logs go to stderr so command output on stdout stays JSON.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
