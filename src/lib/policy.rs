// SPDX-License-Identifier: Apache-2.0

//! Reusable verification rules shared by handlers. Each rule reads the
//! Session through [ConfigQuery] and the pre-gathered [SystemFacts]; none
//! of them touch the system. On success they return a small handle on the
//! referenced object.

use std::net::IpAddr;

use crate::value::parse_ip_prefix;
use crate::{
    ConfigPath, ConfigQuery, ConfigValue, ErrorKind, RtconfError, SystemFacts,
};

/// Interface types whose devices are created by a handler.
const CREATED_INTERFACE_TYPES: [&str; 3] = ["bonding", "bridge", "dummy"];

pub const MTU_MIN: u32 = 68;
pub const MTU_MAX: u32 = 16000;
pub const IPV6_MTU_MIN: u32 = 1280;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRef {
    pub name: String,
    /// Configuration type (`dummy`, `bridge`, ...) when defined in the
    /// Session, `None` for devices only known to the kernel.
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrfRef {
    pub name: String,
    pub table: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMapRef {
    pub name: String,
    pub rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkiRef {
    pub name: String,
    pub has_private_key: bool,
}

/// Bridge or bond an interface is enslaved to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership {
    pub bridges: Vec<String>,
    pub bonds: Vec<String>,
}

impl Membership {
    pub fn parent(&self) -> Option<&str> {
        self.bridges
            .first()
            .or_else(|| self.bonds.first())
            .map(String::as_str)
    }

    pub fn is_member(&self) -> bool {
        self.parent().is_some()
    }
}

/// Bridges and bonds listing `ifname` as member in the Session.
pub fn interface_membership(query: &ConfigQuery, ifname: &str) -> Membership {
    let mut ret = Membership::default();
    for bridge in query.list_nodes(&["interfaces", "bridge"].into()) {
        let path: ConfigPath =
            ["interfaces", "bridge", bridge.as_str(), "member", "interface", ifname]
                .into();
        if query.exists(&path) {
            ret.bridges.push(bridge);
        }
    }
    for bond in query.list_nodes(&["interfaces", "bonding"].into()) {
        let path: ConfigPath =
            ["interfaces", "bonding", bond.as_str(), "member", "interface"].into();
        if query
            .return_values(&path)
            .iter()
            .any(|v| v.to_string() == ifname)
        {
            ret.bonds.push(bond);
        }
    }
    ret
}

fn config_error(at: &ConfigPath, msg: String) -> RtconfError {
    RtconfError::new_with_path(ErrorKind::ConfigError, &at.to_string(), msg)
}

pub struct PolicyContext<'a> {
    query: &'a ConfigQuery,
    facts: &'a SystemFacts,
}

impl<'a> PolicyContext<'a> {
    pub fn new(query: &'a ConfigQuery, facts: &'a SystemFacts) -> Self {
        Self { query, facts }
    }

    pub fn query(&self) -> &ConfigQuery {
        self.query
    }

    pub fn facts(&self) -> &SystemFacts {
        self.facts
    }

    /// The interface exists on the system, or is created by a handler
    /// ordered before interface consumers (dummy, bridge, bond, VRF).
    pub fn verify_interface_exists(
        &self,
        at: &ConfigPath,
        name: &str,
    ) -> Result<InterfaceRef, RtconfError> {
        for kind in CREATED_INTERFACE_TYPES {
            if self.query.exists(&["interfaces", kind, name].into()) {
                return Ok(InterfaceRef {
                    name: name.to_string(),
                    kind: Some(kind.to_string()),
                });
            }
        }
        if self.query.exists(&["vrf", "name", name].into()) {
            return Ok(InterfaceRef {
                name: name.to_string(),
                kind: Some("vrf".to_string()),
            });
        }
        if self.facts.has_interface(name) {
            return Ok(InterfaceRef {
                name: name.to_string(),
                kind: None,
            });
        }
        Err(config_error(at, format!("Interface \"{name}\" does not exist")))
    }

    pub fn verify_vrf(
        &self,
        at: &ConfigPath,
        name: &str,
    ) -> Result<VrfRef, RtconfError> {
        let base: ConfigPath = ["vrf", "name", name].into();
        if !self.query.exists(&base) {
            return Err(config_error(
                at,
                format!("Invalid VRF \"{name}\", VRF does not exist"),
            ));
        }
        let table = self
            .query
            .return_value(&base.child("table"))
            .and_then(|v| v.as_u64())
            .and_then(|t| u32::try_from(t).ok());
        Ok(VrfRef {
            name: name.to_string(),
            table,
        })
    }

    pub fn verify_route_map(
        &self,
        at: &ConfigPath,
        name: &str,
    ) -> Result<RouteMapRef, RtconfError> {
        let base: ConfigPath = ["policy", "route-map", name].into();
        if !self.query.exists(&base) {
            return Err(config_error(
                at,
                format!("Specified route-map \"{name}\" does not exist"),
            ));
        }
        Ok(RouteMapRef {
            name: name.to_string(),
            rules: self.query.list_nodes(&base.child("rule")),
        })
    }

    fn verify_pki(
        &self,
        at: &ConfigPath,
        section: &str,
        kind: &str,
        name: &str,
    ) -> Result<PkiRef, RtconfError> {
        let base: ConfigPath = ["pki", section, name].into();
        if !self.query.exists(&base) {
            return Err(config_error(
                at,
                format!("{kind} \"{name}\" not found in configuration"),
            ));
        }
        if self.query.return_value(&base.child("certificate")).is_none() {
            return Err(config_error(
                at,
                format!("{kind} \"{name}\" has no certificate data"),
            ));
        }
        Ok(PkiRef {
            name: name.to_string(),
            has_private_key: self
                .query
                .exists(&["pki", section, name, "private", "key"].into()),
        })
    }

    /// Certificate with its private key, as required by services.
    pub fn verify_pki_certificate(
        &self,
        at: &ConfigPath,
        name: &str,
    ) -> Result<PkiRef, RtconfError> {
        let ret = self.verify_pki(at, "certificate", "Certificate", name)?;
        if !ret.has_private_key {
            return Err(config_error(
                at,
                format!("Certificate \"{name}\" has no private key"),
            ));
        }
        Ok(ret)
    }

    pub fn verify_pki_ca_certificate(
        &self,
        at: &ConfigPath,
        name: &str,
    ) -> Result<PkiRef, RtconfError> {
        self.verify_pki(at, "ca", "CA certificate", name)
    }

    /// Validate an interface address and check no other interface of the
    /// Session uses it. Returns `None` for `dhcp` and `dhcpv6`.
    pub fn verify_address(
        &self,
        at: &ConfigPath,
        ifname: &str,
        address: &str,
    ) -> Result<Option<(IpAddr, u8)>, RtconfError> {
        if address == "dhcp" || address == "dhcpv6" {
            return Ok(None);
        }
        let (ip, prefix_len) = parse_ip_prefix(address).ok_or_else(|| {
            config_error(at, format!("Invalid address {address}"))
        })?;
        if ip.is_unspecified() || ip.is_multicast() {
            return Err(config_error(
                at,
                format!("Address {address} cannot be assigned to an interface"),
            ));
        }
        for kind in self.query.list_nodes(&["interfaces"].into()) {
            for other in
                self.query.list_nodes(&["interfaces", kind.as_str()].into())
            {
                if other == ifname {
                    continue;
                }
                let path: ConfigPath =
                    ["interfaces", kind.as_str(), other.as_str(), "address"].into();
                if self
                    .query
                    .return_values(&path)
                    .contains(&ConfigValue::String(address.to_string()))
                {
                    return Err(config_error(
                        at,
                        format!(
                            "Address {address} is already assigned to \
                            interface {other}"
                        ),
                    ));
                }
            }
        }
        Ok(Some((ip, prefix_len)))
    }

    pub fn verify_mtu(
        &self,
        at: &ConfigPath,
        mtu: u32,
        has_ipv6: bool,
    ) -> Result<(), RtconfError> {
        if !(MTU_MIN..=MTU_MAX).contains(&mtu) {
            return Err(config_error(
                at,
                format!("MTU {mtu} is out of range {MTU_MIN}-{MTU_MAX}"),
            ));
        }
        if has_ipv6 && mtu < IPV6_MTU_MIN {
            return Err(config_error(
                at,
                format!(
                    "MTU {mtu} is too small for IPv6, the minimum is \
                    {IPV6_MTU_MIN}"
                ),
            ));
        }
        Ok(())
    }

    /// A bridge or bond member can only belong to one parent and carries
    /// neither addresses nor a VRF of its own.
    pub fn verify_bond_bridge_member(
        &self,
        at: &ConfigPath,
        ifname: &str,
        has_address: bool,
        vrf: Option<&str>,
    ) -> Result<Membership, RtconfError> {
        let membership = interface_membership(self.query, ifname);
        let parents: Vec<&String> = membership
            .bridges
            .iter()
            .chain(membership.bonds.iter())
            .collect();
        if parents.len() > 1 {
            return Err(config_error(
                at,
                format!(
                    "Interface {ifname} is a member of several parents: {}",
                    parents
                        .iter()
                        .map(|p| p.as_str())
                        .collect::<Vec<&str>>()
                        .join(", ")
                ),
            ));
        }
        if let Some(parent) = membership.parent() {
            if has_address {
                return Err(config_error(
                    at,
                    format!(
                        "Cannot assign an address to interface {ifname} as \
                        it is a member of {parent}"
                    ),
                ));
            }
            if let Some(vrf) = vrf {
                return Err(config_error(
                    at,
                    format!(
                        "Interface {ifname} cannot be a member of VRF {vrf} \
                        and {parent} at the same time"
                    ),
                ));
            }
        }
        Ok(membership)
    }
}
