//! Host and port extraction from a URL authority.

use crate::error::{WaitError, WaitResult};

/// Split a `host[:port]` authority string into its parts.
///
/// A missing port or an empty port segment (trailing colon) yields port 0.
/// More than one colon — an IPv6 literal — is rejected outright; IPv6
/// authorities are not supported.
pub fn split_host_port(authority: &str) -> WaitResult<(String, u16)> {
    let mut segments = authority.split(':');
    let host = segments.next().unwrap_or_default();

    match (segments.next(), segments.next()) {
        (None, _) | (Some(""), None) => Ok((host.to_string(), 0)),
        (Some(port), None) => port
            .parse::<u16>()
            .map(|port| (host.to_string(), port))
            .map_err(|e| WaitError::MalformedAddress(format!("invalid port {port:?}: {e}"))),
        (Some(_), Some(_)) => Err(WaitError::MalformedAddress(format!(
            "unsupported authority {authority:?} (IPv6 literals are not supported)"
        ))),
    }
}
