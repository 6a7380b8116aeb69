use env_logger::{Builder, Env};

/// Filter used when `RUST_LOG` is unset: this crate at `info` (or `debug`
/// when verbose), everything else at `warn`.
fn default_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("warn,{}={level}", env!("CARGO_PKG_NAME"))
}

/// Initializes the global logger.
///
/// Verbose output adds level load summaries and sector and portal counts.
/// `RUST_LOG` overrides the default filter. A second call is a no-op.
pub fn init(verbose: bool) {
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_filter(verbose)));
    let _ = builder.try_init();
}
