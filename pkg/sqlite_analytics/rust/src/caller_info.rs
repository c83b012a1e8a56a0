// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Host name and primary IP attached to every log entry.
//!
//! Both values are constant for the life of the process, so they are resolved
//! once during initialization rather than on every intercepted call.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};

use log::{debug, warn};

const UNKNOWN_HOSTNAME: &str = "unknown";
const FALLBACK_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerInfo {
    pub hostname: String,
    pub ip: String,
}

impl CallerInfo {
    pub fn new(hostname: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ip: ip.into(),
        }
    }

    /// Query the local network stack for the host name and its address.
    ///
    /// Never fails: an unreadable host name becomes `"unknown"` and an
    /// unresolvable one maps to `127.0.0.1`.
    pub fn resolve() -> Self {
        let hostname = match hostname::get().map(|name| name.into_string()) {
            Ok(Ok(name)) if !name.is_empty() => name,
            Ok(_) => {
                warn!("local host name is empty or not valid UTF-8");
                UNKNOWN_HOSTNAME.to_string()
            }
            Err(e) => {
                warn!("could not read local host name: {e}");
                UNKNOWN_HOSTNAME.to_string()
            }
        };

        let ip = match (hostname.as_str(), 0).to_socket_addrs() {
            Ok(addrs) => primary_ip(addrs),
            Err(e) => {
                debug!("could not resolve {hostname}: {e}");
                FALLBACK_IP
            }
        };

        Self::new(hostname, ip.to_string())
    }
}

/// Pick the address to report for this host: the first IPv4 address, else
/// the first address of any family, else loopback.
fn primary_ip(addrs: impl IntoIterator<Item = SocketAddr>) -> IpAddr {
    let mut first = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return addr.ip();
        }
        first.get_or_insert(addr.ip());
    }
    first.unwrap_or(FALLBACK_IP)
}
