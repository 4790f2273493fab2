use env_logger::Env;

/// Defaults to `info`; `RUST_LOG` overrides. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();
}
