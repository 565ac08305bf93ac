//! Public routability check for lookup candidates.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// IPv4 ranges never sent to the geolocation service, as (network, prefix length).
const PRIVATE_V4: [(Ipv4Addr, u8); 5] = [
    (Ipv4Addr::new(127, 0, 0, 0), 8),   // loopback
    (Ipv4Addr::new(100, 64, 0, 0), 10), // carrier-grade NAT
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
];

/// IPv6 ranges never sent to the geolocation service.
const PRIVATE_V6: [(Ipv6Addr, u8); 3] = [
    (Ipv6Addr::LOCALHOST, 128),
    (Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 0), 8), // unique local
    (Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10), // link-local
];

fn v4_contains(network: Ipv4Addr, prefix: u8, addr: Ipv4Addr) -> bool {
    let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
    u32::from(addr) & mask == u32::from(network) & mask
}

fn v6_contains(network: Ipv6Addr, prefix: u8, addr: Ipv6Addr) -> bool {
    let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
    u128::from(addr) & mask == u128::from(network) & mask
}

/// Returns whether `address` is worth asking the geolocation service about.
///
/// v4-mapped IPv6 addresses are judged by their IPv4 form. Loopback, CGNAT,
/// RFC 1918, unique-local and link-local addresses are rejected.
pub fn is_publicly_routable(address: IpAddr) -> bool {
    match address.to_canonical() {
        IpAddr::V4(v4) => !PRIVATE_V4
            .iter()
            .any(|&(network, prefix)| v4_contains(network, prefix, v4)),
        IpAddr::V6(v6) => !PRIVATE_V6
            .iter()
            .any(|&(network, prefix)| v6_contains(network, prefix, v6)),
    }
}
