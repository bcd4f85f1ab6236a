//! Worker address detection
//!
//! The address recorded for a session lets a live-tail reader find the
//! worker process still holding the session's write buffer.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use tracing::debug;

/// Probe target for route selection; no packet is sent
const PROBE_TARGET: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 80);

/// Outbound IPv4 address of this host, or loopback when none can be found
pub fn local_worker_address() -> IpAddr {
    match outbound_ipv4() {
        Ok(addr) => addr,
        Err(err) => {
            debug!(error = %err, "Falling back to loopback worker address");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

fn outbound_ipv4() -> std::io::Result<IpAddr> {
    // Connecting a UDP socket only selects a route
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(PROBE_TARGET)?;
    let ip = socket.local_addr()?.ip();

    if ip.is_unspecified() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "no outbound interface",
        ));
    }
    Ok(ip)
}
