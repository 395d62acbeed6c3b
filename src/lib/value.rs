// SPDX-License-Identifier: Apache-2.0

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::{ErrorKind, RtconfError};

/// Scalar stored in a leaf. Integers and booleans are kept typed, every
/// other schema type is stored as its validated string form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigValue {
    String(String),
    Integer(u64),
    Bool(bool),
}

impl std::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        if let Self::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        if let Self::Integer(i) = self {
            Some(*i)
        } else {
            None
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum ValueType {
    String,
    U32,
    Bool,
    Ipv4,
    Ipv6,
    Ip,
    /// Address with prefix length, any family
    IpHost,
    Ipv4Host,
    /// Network prefix with host bits cleared
    Ipv4Prefix,
    IpPrefix,
    /// Interface address: `ip-host`, `dhcp` or `dhcpv6`
    Address,
    Mac,
    /// Kernel interface name
    Ifname,
    Enum,
    /// Valueless leaf, presence is the only information
    None,
}

impl Default for ValueType {
    fn default() -> Self {
        Self::String
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::U32 => "u32",
            Self::Bool => "bool",
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
            Self::Ip => "ip",
            Self::IpHost => "ip-host",
            Self::Ipv4Host => "ipv4-host",
            Self::Ipv4Prefix => "ipv4-prefix",
            Self::IpPrefix => "ip-prefix",
            Self::Address => "address",
            Self::Mac => "mac",
            Self::Ifname => "interface name",
            Self::Enum => "enum",
            Self::None => "none",
        };
        write!(f, "{s}")
    }
}

/// Constraints applied on top of the value type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ValueConstraint<'a> {
    pub(crate) range: Option<(u64, u64)>,
    pub(crate) values: &'a [String],
}

impl ValueType {
    pub(crate) fn parse(
        &self,
        raw: &str,
        constraint: &ValueConstraint,
    ) -> Result<ConfigValue, RtconfError> {
        let invalid = || {
            RtconfError::new(
                ErrorKind::SchemaViolation,
                format!("Value '{raw}' is not a valid {self}"),
            )
        };
        match self {
            Self::None => Err(RtconfError::new(
                ErrorKind::SchemaViolation,
                format!("Node does not take a value, got '{raw}'"),
            )),
            Self::String => {
                if raw.contains(['\0']) {
                    Err(invalid())
                } else {
                    Ok(ConfigValue::String(raw.to_string()))
                }
            }
            Self::U32 => {
                let v: u32 = raw.parse().map_err(|_| invalid())?;
                let v = v as u64;
                if let Some((min, max)) = constraint.range {
                    if v < min || v > max {
                        return Err(RtconfError::new(
                            ErrorKind::SchemaViolation,
                            format!(
                                "Value {v} is out of range, \
                                expecting {min}-{max}"
                            ),
                        ));
                    }
                }
                Ok(ConfigValue::Integer(v))
            }
            Self::Bool => match raw {
                "true" => Ok(ConfigValue::Bool(true)),
                "false" => Ok(ConfigValue::Bool(false)),
                _ => Err(invalid()),
            },
            Self::Ipv4 => raw
                .parse::<Ipv4Addr>()
                .map(|_| ConfigValue::String(raw.to_string()))
                .map_err(|_| invalid()),
            Self::Ipv6 => raw
                .parse::<Ipv6Addr>()
                .map(|_| ConfigValue::String(raw.to_string()))
                .map_err(|_| invalid()),
            Self::Ip => raw
                .parse::<IpAddr>()
                .map(|_| ConfigValue::String(raw.to_string()))
                .map_err(|_| invalid()),
            Self::IpHost => parse_ip_prefix(raw)
                .map(|_| ConfigValue::String(raw.to_string()))
                .ok_or_else(invalid),
            Self::Ipv4Host => match parse_ip_prefix(raw) {
                Some((IpAddr::V4(_), _)) => {
                    Ok(ConfigValue::String(raw.to_string()))
                }
                _ => Err(invalid()),
            },
            Self::Ipv4Prefix => match parse_ip_prefix(raw) {
                Some((IpAddr::V4(addr), len)) if is_network(addr, len) => {
                    Ok(ConfigValue::String(raw.to_string()))
                }
                _ => Err(invalid()),
            },
            Self::IpPrefix => match parse_ip_prefix(raw) {
                Some((IpAddr::V4(addr), len)) if is_network(addr, len) => {
                    Ok(ConfigValue::String(raw.to_string()))
                }
                Some((IpAddr::V6(_), _)) => {
                    Ok(ConfigValue::String(raw.to_string()))
                }
                _ => Err(invalid()),
            },
            Self::Address => {
                if raw == "dhcp"
                    || raw == "dhcpv6"
                    || parse_ip_prefix(raw).is_some()
                {
                    Ok(ConfigValue::String(raw.to_string()))
                } else {
                    Err(invalid())
                }
            }
            Self::Mac => {
                if is_mac(raw) {
                    Ok(ConfigValue::String(raw.to_lowercase()))
                } else {
                    Err(invalid())
                }
            }
            Self::Ifname => {
                if is_ifname(raw) {
                    Ok(ConfigValue::String(raw.to_string()))
                } else {
                    Err(invalid())
                }
            }
            Self::Enum => {
                if constraint.values.iter().any(|v| v == raw) {
                    Ok(ConfigValue::String(raw.to_string()))
                } else {
                    Err(RtconfError::new(
                        ErrorKind::SchemaViolation,
                        format!(
                            "Value '{raw}' is not one of: {}",
                            constraint.values.join(", ")
                        ),
                    ))
                }
            }
        }
    }
}

/// Split `address/prefix-length`, checking the prefix length against the
/// address family.
pub fn parse_ip_prefix(raw: &str) -> Option<(IpAddr, u8)> {
    let (addr, len) = raw.split_once('/')?;
    let addr: IpAddr = addr.parse().ok()?;
    let len: u8 = len.parse().ok()?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    if len > max {
        None
    } else {
        Some((addr, len))
    }
}

pub(crate) fn is_network(addr: Ipv4Addr, len: u8) -> bool {
    let mask = ipv4_mask(len);
    u32::from(addr) & !mask == 0
}

pub(crate) fn ipv4_mask(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        u32::MAX << (32 - len as u32)
    }
}

/// Whether `addr` falls inside the IPv4 network `prefix`.
pub fn ipv4_in_prefix(addr: Ipv4Addr, prefix: &str) -> bool {
    match parse_ip_prefix(prefix) {
        Some((IpAddr::V4(net), len)) => {
            let mask = ipv4_mask(len);
            u32::from(addr) & mask == u32::from(net) & mask
        }
        _ => false,
    }
}

fn is_mac(raw: &str) -> bool {
    let octets: Vec<&str> = raw.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}

// IFNAMSIZ is 16 including the trailing NUL
fn is_ifname(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() < 16
        && raw != "."
        && raw != ".."
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}
