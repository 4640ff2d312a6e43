//! Logging initialization and fatal-error handling

use crate::core::error::Error;

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable.
///
/// # Example
/// ```
/// brickmap::core::logging::init();
/// log::info!("Renderer started");
/// ```
pub fn init() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).try_init();
}

/// Log an unrecoverable error and abort the process.
///
/// Allocation and submission failures in the streaming path end up here.
pub fn fatal(context: &str, err: &Error) -> ! {
    log::error!("{}: {}", context, err);
    log::logger().flush();
    std::process::abort();
}
