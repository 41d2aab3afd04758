use env_logger::Env;
use log::LevelFilter;

/// Initialize the logger with the given [LevelFilter], overridable through
/// `RUST_LOG`
pub fn initialize_logger(filter: LevelFilter) {
    env_logger::Builder::from_env(Env::default().default_filter_or(filter.to_string()))
        .format_target(false)
        .init();
}
