use std::{fmt, net::Ipv4Addr, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// IPv4 network in CIDR form. The stored address is always the network
/// address (host bits cleared).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4Subnet {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Subnet {
    pub fn new(address: Ipv4Addr, prefix: u8) -> Option<Self> {
        if prefix > 32 {
            return None;
        }
        let network = Ipv4Addr::from(u32::from(address) & mask_bits(prefix));
        Some(Self { network, prefix })
    }

    /// Builds a subnet from a dotted netmask. Non-contiguous masks are rejected.
    pub fn with_netmask(address: Ipv4Addr, netmask: Ipv4Addr) -> Option<Self> {
        let bits = u32::from(netmask);
        let prefix = bits.leading_ones();
        if bits.checked_shl(prefix).unwrap_or(0) != 0 {
            return None;
        }
        Self::new(address, prefix as u8)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        u32::from(address) & mask_bits(self.prefix) == u32::from(self.network)
    }

    /// Usable host addresses. /31 and /32 have no network/broadcast split.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> + use<> {
        let base = u32::from(self.network);
        let size = 1u64 << (32 - u32::from(self.prefix));
        let (first, last) = if self.prefix >= 31 {
            (base as u64, base as u64 + size - 1)
        } else {
            (base as u64 + 1, base as u64 + size - 2)
        };
        (first..=last).map(|value| Ipv4Addr::from(value as u32))
    }
}

fn mask_bits(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl fmt::Display for Ipv4Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ipv4 subnet '{0}'")]
pub struct SubnetParseError(pub String);

impl FromStr for Ipv4Subnet {
    type Err = SubnetParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || SubnetParseError(text.to_string());
        let (address, mask) = text.trim().split_once('/').ok_or_else(invalid)?;
        let address: Ipv4Addr = address.parse().map_err(|_| invalid())?;

        if mask.contains('.') {
            let netmask: Ipv4Addr = mask.parse().map_err(|_| invalid())?;
            return Self::with_netmask(address, netmask).ok_or_else(invalid);
        }

        let prefix: u8 = mask.parse().map_err(|_| invalid())?;
        Self::new(address, prefix).ok_or_else(invalid)
    }
}

impl Serialize for Ipv4Subnet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ipv4Subnet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Target of a network-wide intent: either one address or a whole subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTarget {
    Host(Ipv4Addr),
    Network(Ipv4Subnet),
}

impl ScanTarget {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.contains('/') {
            return text.parse().ok().map(Self::Network);
        }
        text.parse().ok().map(Self::Host)
    }

    /// Addresses to probe, produced lazily.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> + use<> {
        let subnet = match self {
            Self::Host(address) => Ipv4Subnet {
                network: *address,
                prefix: 32,
            },
            Self::Network(subnet) => *subnet,
        };
        subnet.hosts()
    }

    pub fn prefix(&self) -> u8 {
        match self {
            Self::Host(_) => 32,
            Self::Network(subnet) => subnet.prefix(),
        }
    }
}

/// Port numbers conventionally used by the services scenarios refer to by name.
pub fn well_known_port(service: &str) -> Option<u16> {
    match service.trim().to_ascii_lowercase().as_str() {
        "ftp" => Some(21),
        "ssh" => Some(22),
        "telnet" => Some(23),
        "smtp" => Some(25),
        "http" => Some(80),
        "https" => Some(443),
        "smb" => Some(445),
        "mysql" => Some(3306),
        "postgresql" | "postgres" => Some(5432),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid service selection: {0}")]
pub struct ServiceFilterError(pub String);

/// Comma separated selection of services: port numbers (`22`), inclusive
/// ranges (`1-1024`) and service names (`ssh`). Empty selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceFilter {
    names: Vec<String>,
    ranges: Vec<(u16, u16)>,
}

impl ServiceFilter {
    pub fn parse(spec: &str) -> Result<Self, ServiceFilterError> {
        let mut filter = Self::default();
        for token in spec.split(',').map(str::trim).filter(|token| !token.is_empty()) {
            if let Some((low, high)) = token.split_once('-') {
                let (Ok(low), Ok(high)) = (low.trim().parse::<u16>(), high.trim().parse::<u16>())
                else {
                    return Err(ServiceFilterError(format!("invalid port range '{}'", token)));
                };
                if low > high {
                    return Err(ServiceFilterError(format!("empty port range '{}'", token)));
                }
                filter.ranges.push((low, high));
            } else if let Ok(port) = token.parse::<u16>() {
                filter.ranges.push((port, port));
            } else {
                filter.names.push(token.to_ascii_lowercase());
            }
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.ranges.is_empty()
    }

    pub fn matches(&self, name: &str, port: u16) -> bool {
        self.is_empty()
            || self.names.iter().any(|item| item.eq_ignore_ascii_case(name))
            || self.ranges.iter().any(|(low, high)| (*low..=*high).contains(&port))
    }

    /// Port-only rendering for scanners; names map to their well-known port.
    pub fn to_port_list(&self) -> Result<String, ServiceFilterError> {
        let mut parts = Vec::new();
        for name in &self.names {
            let port = well_known_port(name)
                .ok_or_else(|| ServiceFilterError(format!("no well-known port for '{}'", name)))?;
            parts.push(port.to_string());
        }
        for (low, high) in &self.ranges {
            if low == high {
                parts.push(low.to_string());
            } else {
                parts.push(format!("{}-{}", low, high));
            }
        }
        if parts.is_empty() {
            parts.push("1-65535".to_string());
        }
        Ok(parts.join(","))
    }
}
