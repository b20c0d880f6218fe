use serde::{Deserialize, Serialize};

/// An IP address, kept independent of `std::net` so that serialization is
/// stable across platforms and does not depend on the standard library's
/// formatting choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpAddr {
    V4([u8; 4]),
    V6([u8; 16]),
}

impl IpAddr {
    pub fn v4(a: u8, b: u8, c: u8, d: u8) -> Self {
        IpAddr::V4([a, b, c, d])
    }

    /// True for RFC1918 private ranges, loopback and link-local addresses.
    /// These are never served to peer-exchange.
    pub fn is_routable(&self) -> bool {
        match self {
            IpAddr::V4(o) => {
                let is_private = o[0] == 10
                    || (o[0] == 172 && (16..=31).contains(&o[1]))
                    || (o[0] == 192 && o[1] == 168);
                let is_loopback = o[0] == 127;
                let is_link_local = o[0] == 169 && o[1] == 254;
                let is_unspecified = o == &[0, 0, 0, 0];
                !(is_private || is_loopback || is_link_local || is_unspecified)
            }
            IpAddr::V6(o) => {
                let is_loopback = o[..15] == [0u8; 15] && o[15] == 1;
                let is_unspecified = o == &[0u8; 16];
                let is_unique_local = (o[0] & 0xfe) == 0xfc;
                let is_link_local = o[0] == 0xfe && (o[1] & 0xc0) == 0x80;
                !(is_loopback || is_unspecified || is_unique_local || is_link_local)
            }
        }
    }

    /// Subnet key used for Sybil-resistance bucketing: /24 for IPv4, /48 for
    /// IPv6.
    pub fn subnet_key(&self) -> Vec<u8> {
        match self {
            IpAddr::V4(o) => vec![o[0], o[1], o[2]],
            IpAddr::V6(o) => o[..6].to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetAddr {
    pub ip: IpAddr,
    pub port: u16,
}

impl NetAddr {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn is_routable(&self) -> bool {
        self.ip.is_routable()
    }
}
