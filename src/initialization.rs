//! Process startup: logger and TLS crypto provider.

use std::io::Write;

use colored::Colorize;
use log::LevelFilter;
use rustls::crypto::{ring::default_provider, CryptoProvider};

use crate::error_handling::InitializationError;

/// Initializes the logger with the given level.
///
/// Reads `RUST_LOG` from the environment first, then overrides with the
/// CLI-provided level. Diagnostic output goes to stderr so the single
/// result line on stdout stays parseable by the monitoring supervisor.
///
/// # Errors
///
/// Returns `InitializationError::LoggerError` if a logger was already set.
pub fn init_logger_with(level: LevelFilter) -> Result<(), InitializationError> {
    let mut builder = env_logger::Builder::from_default_env();

    builder.filter_level(level);
    builder.filter_module("reqwest", LevelFilter::Info.min(level));
    builder.filter_module("hyper", LevelFilter::Info.min(level));
    builder.filter_module("rustls", LevelFilter::Info.min(level));
    builder.filter_module("http_check", level);

    builder.format(|buf, record| {
        let level = record.level();
        let colored_level = match level {
            log::Level::Error => level.to_string().red(),
            log::Level::Warn => level.to_string().yellow(),
            log::Level::Info => level.to_string().green(),
            log::Level::Debug => level.to_string().blue(),
            log::Level::Trace => level.to_string().purple(),
        };
        writeln!(buf, "{} [{}] {}", colored_level, record.target(), record.args())
    });

    builder.try_init()?;
    Ok(())
}

/// Installs the rustls crypto provider.
///
/// Must run before any TLS connection is established. The return value is
/// ignored because reinstalling the provider is harmless.
pub fn init_crypto_provider() {
    let _ = CryptoProvider::install_default(default_provider());
}
