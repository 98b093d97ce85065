//! Local-device address helpers

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// The device's primary outbound IPv4 address, if any.
///
/// Connecting a UDP socket never sends a packet; it only asks the kernel
/// which interface would route there.
pub fn device_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("10.254.254.254:1").ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(addr) if !addr.is_loopback() => Some(addr),
        _ => None,
    }
}

/// Whether a host string names the loopback interface
pub fn is_loopback_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

/// Whether a host string names this device itself
pub fn is_self_host(host: &str, device: Option<Ipv4Addr>) -> bool {
    match (host.parse::<IpAddr>(), device) {
        (Ok(IpAddr::V4(addr)), Some(device)) => addr == device,
        _ => false,
    }
}
