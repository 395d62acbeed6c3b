// SPDX-License-Identifier: Apache-2.0

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{collect_errors, instances, strings};
use crate::policy::interface_membership;
use crate::{
    ConfigDictOptions, ConfigPath, ConfigQuery, ErrorKind, Membership,
    PolicyContext, RtconfError, SystemOps,
};

/// Settings shared by every interface type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BaseInterface {
    pub(crate) address: Vec<String>,
    pub(crate) description: Option<String>,
    #[serde(deserialize_with = "crate::deserializer::presence")]
    pub(crate) disable: bool,
    #[serde(deserialize_with = "crate::deserializer::option_u32_or_string")]
    pub(crate) mtu: Option<u32>,
    pub(crate) mac: Option<String>,
    pub(crate) vrf: Option<String>,
}

impl BaseInterface {
    pub(crate) fn has_ipv6(&self) -> bool {
        self.address
            .iter()
            .any(|a| a == "dhcpv6" || (a.contains(':') && a.contains('/')))
    }
}

#[derive(Debug, Clone)]
pub struct InterfaceView<T> {
    pub(crate) name: String,
    pub(crate) base: BaseInterface,
    pub(crate) specific: T,
    /// Addresses of Effective no longer configured
    pub(crate) address_remove: Vec<String>,
    pub(crate) membership: Membership,
    /// Not present in Effective
    pub(crate) is_new: bool,
    /// Description of Effective deleted from the Session
    pub(crate) description_removed: bool,
    /// MAC address of Effective deleted from the Session
    pub(crate) mac_removed: bool,
}

impl<T> InterfaceView<T> {
    pub(crate) fn path(&self, kind: &str) -> ConfigPath {
        ["interfaces", kind, self.name.as_str()].into()
    }
}

#[derive(Debug, Clone)]
pub struct InterfacesView<T> {
    pub(crate) interfaces: Vec<InterfaceView<T>>,
    /// Interfaces of Effective deleted from the Session
    pub(crate) removed: Vec<String>,
}

pub(crate) fn get_interfaces<T: DeserializeOwned>(
    query: &ConfigQuery,
    kind: &str,
) -> Result<InterfacesView<T>, RtconfError> {
    let base: ConfigPath = ["interfaces", kind].into();
    let dict =
        query.get_config_dict(&base, &ConfigDictOptions::handler_view())?;
    let mut interfaces = Vec::new();
    for (name, value) in instances::<serde_json::Value>(Some(&dict))? {
        let path = base.child(&name);
        let iface: BaseInterface = serde_json::from_value(value.clone())?;
        let effective_addresses =
            strings(query.return_effective_values(&path.child("address")));
        interfaces.push(InterfaceView {
            address_remove: effective_addresses
                .into_iter()
                .filter(|a| !iface.address.contains(a))
                .collect(),
            membership: interface_membership(query, &name),
            is_new: !query.exists_effective(&path),
            description_removed: iface.description.is_none()
                && query.exists_effective(&path.child("description")),
            mac_removed: iface.mac.is_none()
                && query.exists_effective(&path.child("mac")),
            specific: serde_json::from_value(value)?,
            base: iface,
            name,
        });
    }
    let configured = query.list_nodes(&base);
    let removed = query
        .list_effective_nodes(&base)
        .into_iter()
        .filter(|n| !configured.contains(n))
        .collect();
    Ok(InterfacesView {
        interfaces,
        removed,
    })
}

/// Checks common to every interface type.
pub(crate) fn verify_base<T>(
    view: &InterfaceView<T>,
    kind: &str,
    policy: &PolicyContext,
) -> Result<(), RtconfError> {
    let at = view.path(kind);
    let mut errors = Vec::new();
    if let Some(mtu) = view.base.mtu {
        if let Err(e) =
            policy.verify_mtu(&at.child("mtu"), mtu, view.base.has_ipv6())
        {
            errors.push(e);
        }
    }
    for address in view.base.address.iter() {
        if let Err(e) =
            policy.verify_address(&at.child("address"), &view.name, address)
        {
            errors.push(e);
        }
    }
    if let Some(vrf) = view.base.vrf.as_deref() {
        if let Err(e) = policy.verify_vrf(&at.child("vrf"), vrf) {
            errors.push(e);
        }
    }
    if let Err(e) = policy.verify_bond_bridge_member(
        &at,
        &view.name,
        !view.base.address.is_empty(),
        view.base.vrf.as_deref(),
    ) {
        errors.push(e);
    }
    collect_errors(errors)
}

pub(crate) fn link_exists(
    system: &SystemOps,
    name: &str,
) -> Result<bool, RtconfError> {
    Ok(system.run(&["ip", "link", "show", "dev", name])?.code == 0)
}

pub(crate) fn set_admin_state(
    system: &SystemOps,
    name: &str,
    up: bool,
) -> Result<(), RtconfError> {
    system.run_or_raise(&[
        "ip",
        "link",
        "set",
        "dev",
        name,
        if up { "up" } else { "down" },
    ])?;
    Ok(())
}

const PERMANENT_ADDRESS_PREFIX: &str = "Permanent address:";
const ZERO_MAC: &str = "00:00:00:00:00:00";

/// Hardware address burnt into the NIC, `None` for virtual devices.
fn permanent_mac(
    system: &SystemOps,
    name: &str,
) -> Result<Option<String>, RtconfError> {
    let output = system.run(&["ethtool", "-P", name])?;
    if output.code != 0 {
        return Ok(None);
    }
    Ok(output
        .stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix(PERMANENT_ADDRESS_PREFIX))
        .map(|mac| mac.trim().to_lowercase())
        .filter(|mac| !mac.is_empty() && mac != ZERO_MAC))
}

fn restore_permanent_mac(
    system: &SystemOps,
    name: &str,
) -> Result<(), RtconfError> {
    match permanent_mac(system, name)? {
        Some(mac) => {
            system.run_or_raise(&[
                "ip", "link", "set", "dev", name, "address", &mac,
            ])?;
            log::info!("{name}: restored permanent MAC address {mac}");
        }
        None => log::info!(
            "{name}: no permanent MAC address, keeping the current one"
        ),
    }
    Ok(())
}

/// Apply the common settings of an existing interface device.
pub(crate) fn apply_base<T>(
    view: &InterfaceView<T>,
    system: &SystemOps,
) -> Result<(), RtconfError> {
    let name = view.name.as_str();
    if let Some(mac) = view.base.mac.as_deref() {
        system.run_or_raise(&["ip", "link", "set", "dev", name, "address", mac])?;
    } else if view.mac_removed {
        restore_permanent_mac(system, name)?;
    }
    if let Some(mtu) = view.base.mtu {
        system.run_or_raise(&[
            "ip",
            "link",
            "set",
            "dev",
            name,
            "mtu",
            &mtu.to_string(),
        ])?;
    }
    if let Some(desc) = view.base.description.as_deref() {
        system.run_or_raise(&["ip", "link", "set", "dev", name, "alias", desc])?;
    } else if view.description_removed {
        system.run_or_raise(&["ip", "link", "set", "dev", name, "alias", ""])?;
    }

    // Bridge and bond handlers own the master of their members
    if !view.membership.is_member() {
        match view.base.vrf.as_deref() {
            Some(vrf) => {
                if !link_exists(system, vrf)? {
                    let e = RtconfError::new(
                        ErrorKind::ApplyError,
                        format!("VRF {vrf} not found"),
                    );
                    log::error!("{}", e);
                    return Err(e);
                }
                system.run_or_raise(&[
                    "ip", "link", "set", "dev", name, "master", vrf,
                ])?;
            }
            None => {
                system.run_or_raise(&["ip", "link", "set", "dev", name, "nomaster"])?;
            }
        }
    }

    for address in view.address_remove.iter() {
        if address == "dhcp" || address == "dhcpv6" {
            continue;
        }
        // 2: address already gone
        system.run_spec_or_raise(
            &crate::CommandSpec::new(&["ip", "address", "del", address, "dev", name])
                .with_expect(&[0, 2]),
        )?;
    }
    for address in view.base.address.iter() {
        if address == "dhcp" || address == "dhcpv6" {
            log::info!("{name}: {address} address is handled by the DHCP client");
            continue;
        }
        system.run_or_raise(&["ip", "address", "replace", address, "dev", name])?;
    }
    set_admin_state(system, name, !view.base.disable)
}

/// Remove the device of a virtual interface, if present.
pub(crate) fn delete_link(
    system: &SystemOps,
    name: &str,
) -> Result<(), RtconfError> {
    if link_exists(system, name)? {
        system.run_or_raise(&["ip", "link", "delete", "dev", name])?;
        log::info!("Deleted interface {name}");
    }
    Ok(())
}

/// Bring a physical interface back to an unconfigured state.
pub(crate) fn reset_link(
    system: &SystemOps,
    name: &str,
) -> Result<(), RtconfError> {
    if !link_exists(system, name)? {
        log::warn!("Interface {name} no longer exists");
        return Ok(());
    }
    system.run_or_raise(&["ip", "address", "flush", "dev", name])?;
    system.run_or_raise(&["ip", "link", "set", "dev", name, "nomaster"])?;
    set_admin_state(system, name, false)
}

/// Checks of a port listed as member of a bridge or a bond.
pub(crate) fn verify_member(
    policy: &PolicyContext,
    at: &ConfigPath,
    parent: &str,
    member: &str,
) -> Result<(), RtconfError> {
    if member == parent {
        return Err(super::config_error(
            at,
            format!("Interface {parent} cannot be a member of itself"),
        ));
    }
    policy.verify_interface_exists(at, member)?;
    let query = policy.query();
    let mut has_address = false;
    let mut vrf = None;
    for kind in query.list_nodes(&["interfaces"].into()) {
        let path: ConfigPath = ["interfaces", kind.as_str(), member].into();
        if query.exists(&path) {
            has_address |= !query.return_values(&path.child("address")).is_empty();
            vrf = vrf.or_else(|| {
                query.return_value(&path.child("vrf")).map(|v| v.to_string())
            });
        }
    }
    policy.verify_bond_bridge_member(at, member, has_address, vrf.as_deref())?;
    Ok(())
}

/// Release ports which are no longer members of `parent`.
pub(crate) fn release_members(
    system: &SystemOps,
    parent: &str,
    removed: &[String],
) -> Result<(), RtconfError> {
    for member in removed {
        if link_exists(system, member)? {
            log::info!("Releasing {member} from {parent}");
            system.run_or_raise(&["ip", "link", "set", "dev", member, "nomaster"])?;
        }
    }
    Ok(())
}
