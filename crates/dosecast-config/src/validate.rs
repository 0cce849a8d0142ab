//! Validation helpers and parsing utilities for configuration values.

use std::net::IpAddr;
use std::time::Duration;

use url::Url;

use crate::error::{ConfigError, ConfigResult};

/// Parse a TCP port, rejecting zero and values outside `u16`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is not a port number.
pub fn parse_port(field: &'static str, value: &str) -> ConfigResult<u16> {
    let port = value
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::invalid(field, "not_an_integer", Some(value)))?;
    if port == 0 {
        return Err(ConfigError::invalid(field, "zero", Some(value)));
    }
    u16::try_from(port).map_err(|_| ConfigError::invalid(field, "out_of_range", Some(value)))
}

/// Parse an IP address used for the listener.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidBindAddr`] for malformed addresses.
pub fn parse_bind_addr(value: &str) -> ConfigResult<IpAddr> {
    value
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| ConfigError::InvalidBindAddr {
            value: value.to_string(),
        })
}

/// Parse a strictly positive number of seconds.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for zero or non-numeric input.
pub fn parse_positive_secs(field: &'static str, value: &str) -> ConfigResult<Duration> {
    let secs = value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::invalid(field, "not_an_integer", Some(value)))?;
    if secs == 0 {
        return Err(ConfigError::invalid(field, "zero", Some(value)));
    }
    Ok(Duration::from_secs(secs))
}

/// Split a command line on whitespace into a program and its leading arguments.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when no program is named.
pub fn parse_command(field: &'static str, value: &str) -> ConfigResult<(String, Vec<String>)> {
    let mut words = value.split_whitespace().map(str::to_string);
    let program = words
        .next()
        .ok_or_else(|| ConfigError::invalid(field, "empty", Some(value)))?;
    Ok((program, words.collect()))
}

/// Parse a boolean flag using the usual truthy/falsey spellings.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for unrecognised spellings.
pub fn parse_flag(field: &'static str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::invalid(field, "not_a_flag", Some(value))),
    }
}

/// Normalise the public base URL used when building artifact links.
///
/// Empty input keeps links root-relative. Anything else must be an absolute
/// `http`/`https` origin; a trailing slash is dropped.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for relative or non-HTTP URLs.
pub fn parse_public_base_url(field: &'static str, value: &str) -> ConfigResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    let url =
        Url::parse(trimmed).map_err(|_| ConfigError::invalid(field, "not_absolute", Some(value)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(field, "unsupported_scheme", Some(value)));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Normalise an image extension (`.PNG` → `png`).
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for empty or non-alphanumeric extensions.
pub fn parse_extension(field: &'static str, value: &str) -> ConfigResult<String> {
    let ext = value.trim().trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() {
        return Err(ConfigError::invalid(field, "empty", Some(value)));
    }
    if !ext.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(ConfigError::invalid(field, "invalid_characters", Some(value)));
    }
    Ok(ext)
}
