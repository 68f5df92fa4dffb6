//! Logging setup
//!
//! Everything in the engine logs through the `log` facade; binaries call
//! [`init`] once to install `env_logger`.

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system.
///
/// `RUST_LOG` wins over `default_level`. Calling this twice is harmless.
pub fn init(default_level: &str) {
    let env = env_logger::Env::default().default_filter_or(default_level);
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}
