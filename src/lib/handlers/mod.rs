// SPDX-License-Identifier: Apache-2.0

mod bonding;
mod bridge;
mod dhcp_server;
mod dns_forwarding;
mod dummy;
mod ethernet;
mod firewall;
mod host_name;
mod interface;
mod route_map;
mod vrf;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    ConfigPath, ConfigQuery, ConfigValue, ErrorKind, HandlerRegistry,
    RtconfError,
};

pub use self::bonding::BondingHandler;
pub use self::bridge::BridgeHandler;
pub use self::dhcp_server::DhcpServerHandler;
pub use self::dns_forwarding::DnsForwardingHandler;
pub use self::dummy::DummyHandler;
pub use self::ethernet::EthernetHandler;
pub use self::firewall::FirewallHandler;
pub use self::host_name::HostNameHandler;
pub use self::route_map::RouteMapHandler;
pub use self::vrf::VrfHandler;

/// Registry holding every handler shipped with this library.
pub fn builtin_registry() -> Result<HandlerRegistry, RtconfError> {
    let mut registry = HandlerRegistry::new();
    registry.register(HostNameHandler)?;
    registry.register(VrfHandler)?;
    registry.register(RouteMapHandler)?;
    registry.register(EthernetHandler)?;
    registry.register(DummyHandler)?;
    registry.register(BondingHandler)?;
    registry.register(BridgeHandler)?;
    registry.register(FirewallHandler)?;
    registry.register(DnsForwardingHandler)?;
    registry.register(DhcpServerHandler)?;
    registry.validate()?;
    Ok(registry)
}

pub(crate) fn config_error(at: &ConfigPath, msg: String) -> RtconfError {
    RtconfError::new_with_path(ErrorKind::ConfigError, &at.to_string(), msg)
}

/// Report every verification error at once.
pub(crate) fn collect_errors(
    mut errors: Vec<RtconfError>,
) -> Result<(), RtconfError> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        n => Err(RtconfError::combined(
            ErrorKind::ConfigError,
            format!("{n} configuration errors"),
            errors,
        )),
    }
}

/// Deserialize each instance of a tag node mapping, keeping their order.
pub(crate) fn instances<T: DeserializeOwned>(
    value: Option<&Value>,
) -> Result<Vec<(String, T)>, RtconfError> {
    let mut ret = Vec::new();
    if let Some(Value::Object(map)) = value {
        for (name, content) in map {
            ret.push((name.clone(), serde_json::from_value(content.clone())?));
        }
    }
    Ok(ret)
}

pub(crate) fn strings(values: Vec<ConfigValue>) -> Vec<String> {
    values.into_iter().map(|v| v.to_string()).collect()
}

/// Every configured interface bound to `vrf`, as `(type, name)`.
pub(crate) fn interfaces_in_vrf(
    query: &ConfigQuery,
    vrf: &str,
) -> Vec<(String, String)> {
    let mut ret = Vec::new();
    for kind in query.list_nodes(&["interfaces"].into()) {
        for name in query.list_nodes(&["interfaces", kind.as_str()].into()) {
            let path: ConfigPath =
                ["interfaces", kind.as_str(), name.as_str(), "vrf"].into();
            if query.return_value(&path).map(|v| v.to_string()).as_deref()
                == Some(vrf)
            {
                ret.push((kind.clone(), name));
            }
        }
    }
    ret
}
