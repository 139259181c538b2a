//! Shared helpers for provider adapters.

use nhi_domain::config::LlmConfig;
use nhi_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Read the bearer key from the env var named in the config.
pub fn resolve_api_key(cfg: &LlmConfig) -> Result<String> {
    cfg.resolve_api_key().ok_or_else(|| {
        Error::Auth(format!(
            "environment variable '{}' not set or empty",
            cfg.api_key_env
        ))
    })
}
