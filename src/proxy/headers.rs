//! Proxy header rewriting
//!
//! Hop-by-hop stripping, `X-Forwarded-For` accumulation and response header copy-back.

use std::net::{IpAddr, SocketAddr};

use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, CONNECTION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE,
    TRANSFER_ENCODING, UPGRADE,
};

use crate::error::{RelayError, Result};

/// Per-connection headers that are never forwarded end-to-end
pub static HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    CONNECTION,
    HeaderName::from_static("keep-alive"),
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    HeaderName::from_static("trailers"),
    TRANSFER_ENCODING,
    UPGRADE,
];

pub static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Remove every hop-by-hop header, all values included
pub fn remove_hop_by_hop_headers(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Extract the client IP from the peer address, dropping the port
///
/// IPv4-mapped IPv6 peers are reported as plain IPv4.
pub fn client_ip(remote_addr: Option<SocketAddr>) -> Result<IpAddr> {
    remote_addr
        .map(|addr| addr.ip().to_canonical())
        .ok_or(RelayError::ClientAddressUnavailable)
}

/// Append the client IP to the forwarding chain, creating the header if absent
pub fn append_forwarded_for(headers: &mut HeaderMap, client_ip: IpAddr) {
    // IP literals are visible ASCII
    let value = HeaderValue::from_str(&client_ip.to_string())
        .expect("IP address is a valid header value");

    if headers.contains_key(&X_FORWARDED_FOR) {
        headers.append(X_FORWARDED_FOR.clone(), value);
    } else {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
}

/// Current forwarding chain values, in order
pub fn forwarded_for(headers: &HeaderMap) -> Vec<&str> {
    headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect()
}

/// Copy every header value from `src` into `dst` without deduplication
pub fn copy_headers(dst: &mut HeaderMap, src: &HeaderMap) {
    for (name, value) in src {
        dst.append(name.clone(), value.clone());
    }
}
