use env_logger::Env;

/// Installs the env_logger backend, `info` unless `RUST_LOG` says otherwise.
/// Calling it again is a no-op.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
