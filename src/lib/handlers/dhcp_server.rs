// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use super::{collect_errors, config_error, instances};
use crate::value::{ipv4_in_prefix, parse_ip_prefix};
use crate::{
    ConfigDictOptions, ConfigPath, ConfigQuery, FileOptions, Handler,
    PolicyContext, Renderer, RtconfError, ServiceAction, SystemOps,
};

pub(crate) const KEA_DHCP4_CONF: &str = "/run/kea/kea-dhcp4.conf";
pub(crate) const KEA_LEASE_FILE: &str = "/config/dhcp/dhcp4-leases.csv";
const KEA_SERVICE: &str = "kea-dhcp4-server";
const DEFAULT_LEASE: u32 = 86400;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DhcpRange {
    #[serde(skip_deserializing)]
    pub(crate) name: String,
    pub(crate) start: Option<String>,
    pub(crate) stop: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticMapping {
    #[serde(skip_deserializing)]
    pub(crate) name: String,
    pub(crate) ip_address: Option<String>,
    pub(crate) mac: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct SubnetConfig {
    default_router: Option<String>,
    domain_name: Option<String>,
    #[serde(deserialize_with = "crate::deserializer::option_u32_or_string")]
    lease: Option<u32>,
    name_server: Vec<String>,
    range: serde_json::Map<String, serde_json::Value>,
    static_mapping: serde_json::Map<String, serde_json::Value>,
    #[serde(deserialize_with = "crate::deserializer::option_u32_or_string")]
    subnet_id: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DhcpSubnet {
    pub(crate) prefix: String,
    pub(crate) subnet_id: Option<u32>,
    pub(crate) default_router: Option<String>,
    pub(crate) domain_name: Option<String>,
    pub(crate) lease: Option<u32>,
    pub(crate) name_server: Vec<String>,
    pub(crate) ranges: Vec<DhcpRange>,
    pub(crate) static_mappings: Vec<StaticMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct SharedNetworkConfig {
    description: Option<String>,
    #[serde(deserialize_with = "crate::deserializer::presence")]
    disable: bool,
    subnet: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SharedNetwork {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) disable: bool,
    pub(crate) subnets: Vec<DhcpSubnet>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct DhcpServerConfig {
    #[serde(deserialize_with = "crate::deserializer::presence")]
    disable: bool,
    listen_interface: Vec<String>,
    shared_network_name: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DhcpServerView {
    /// Whether `service dhcp-server` is configured
    pub(crate) configured: bool,
    pub(crate) disable: bool,
    pub(crate) listen_interface: Vec<String>,
    pub(crate) shared_networks: Vec<SharedNetwork>,
}

impl DhcpServerView {
    fn enabled(&self) -> bool {
        self.configured && !self.disable
    }
}

fn subnet_path(network: &str, prefix: &str) -> ConfigPath {
    [
        "service",
        "dhcp-server",
        "shared-network-name",
        network,
        "subnet",
        prefix,
    ]
    .into()
}

fn parse_ipv4(raw: &str) -> Option<Ipv4Addr> {
    raw.parse().ok()
}

fn ipv4_prefix(raw: &str) -> Option<(u32, u32)> {
    match parse_ip_prefix(raw) {
        Some((IpAddr::V4(addr), len)) => {
            let mask = crate::value::ipv4_mask(len);
            let start = u32::from(addr) & mask;
            Some((start, start | !mask))
        }
        _ => None,
    }
}

fn verify_subnet(
    network: &str,
    subnet: &DhcpSubnet,
    errors: &mut Vec<RtconfError>,
) {
    let at = subnet_path(network, &subnet.prefix);
    if subnet.subnet_id.is_none() {
        errors.push(config_error(
            &at.child("subnet-id"),
            format!("Missing subnet-id in subnet {}", subnet.prefix),
        ));
    }
    if let Some(router) = subnet.default_router.as_deref() {
        if !parse_ipv4(router)
            .map(|a| ipv4_in_prefix(a, &subnet.prefix))
            .unwrap_or(false)
        {
            errors.push(config_error(
                &at.child("default-router"),
                format!(
                    "Default router {router} is not inside subnet {}",
                    subnet.prefix
                ),
            ));
        }
    }
    let mut pools: Vec<(&str, u32, u32)> = Vec::new();
    for range in subnet.ranges.iter() {
        let at = at.child("range").child(&range.name);
        let (start, stop) = match (range.start.as_deref(), range.stop.as_deref())
        {
            (Some(start), Some(stop)) => (start, stop),
            _ => {
                errors.push(config_error(
                    &at,
                    format!(
                        "Range {} needs both start and stop addresses",
                        range.name
                    ),
                ));
                continue;
            }
        };
        let mut valid = true;
        for (what, addr) in [("start", start), ("stop", stop)] {
            if !parse_ipv4(addr)
                .map(|a| ipv4_in_prefix(a, &subnet.prefix))
                .unwrap_or(false)
            {
                valid = false;
                errors.push(config_error(
                    &at.child(what),
                    format!(
                        "Range {} {what} address {addr} is not inside \
                        subnet {}",
                        range.name, subnet.prefix
                    ),
                ));
            }
        }
        if !valid {
            continue;
        }
        let (first, last) = match (parse_ipv4(start), parse_ipv4(stop)) {
            (Some(a), Some(b)) => (u32::from(a), u32::from(b)),
            _ => continue,
        };
        if first > last {
            errors.push(config_error(
                &at,
                format!(
                    "Range {} start address {start} is greater than stop \
                    address {stop}",
                    range.name
                ),
            ));
            continue;
        }
        for (other, o_first, o_last) in pools.iter() {
            if first <= *o_last && *o_first <= last {
                errors.push(config_error(
                    &at,
                    format!("Range {} overlaps range {other}", range.name),
                ));
            }
        }
        pools.push((range.name.as_str(), first, last));
    }
    let mut macs: HashMap<&str, &str> = HashMap::new();
    for mapping in subnet.static_mappings.iter() {
        let at = at.child("static-mapping").child(&mapping.name);
        match mapping.ip_address.as_deref() {
            None => errors.push(config_error(
                &at,
                format!("Static mapping {} needs an ip-address", mapping.name),
            )),
            Some(ip) => {
                if !parse_ipv4(ip)
                    .map(|a| ipv4_in_prefix(a, &subnet.prefix))
                    .unwrap_or(false)
                {
                    errors.push(config_error(
                        &at.child("ip-address"),
                        format!(
                            "Static mapping {} address {ip} is not inside \
                            subnet {}",
                            mapping.name, subnet.prefix
                        ),
                    ));
                }
            }
        }
        match mapping.mac.as_deref() {
            None => errors.push(config_error(
                &at,
                format!("Static mapping {} needs a mac", mapping.name),
            )),
            Some(mac) => {
                if let Some(other) = macs.insert(mac, mapping.name.as_str()) {
                    errors.push(config_error(
                        &at.child("mac"),
                        format!(
                            "MAC address {mac} is used by static mappings \
                            {other} and {}",
                            mapping.name
                        ),
                    ));
                }
            }
        }
    }
}

fn kea_subnet(subnet: &DhcpSubnet) -> serde_json::Value {
    let mut options = Vec::new();
    if let Some(router) = subnet.default_router.as_deref() {
        options.push(serde_json::json!({"name": "routers", "data": router}));
    }
    if !subnet.name_server.is_empty() {
        options.push(serde_json::json!({
            "name": "domain-name-servers",
            "data": subnet.name_server.join(", "),
        }));
    }
    if let Some(domain) = subnet.domain_name.as_deref() {
        options.push(serde_json::json!({"name": "domain-name", "data": domain}));
    }
    let pools: Vec<String> = subnet
        .ranges
        .iter()
        .filter_map(|r| match (r.start.as_deref(), r.stop.as_deref()) {
            (Some(start), Some(stop)) => Some(format!("{start} - {stop}")),
            _ => None,
        })
        .collect();
    serde_json::json!({
        "id": subnet.subnet_id,
        "prefix": subnet.prefix,
        "lease": subnet.lease.unwrap_or(DEFAULT_LEASE),
        "options": options,
        "pools": pools,
        "reservations": subnet.static_mappings,
    })
}

/// DHCPv4 server served by Kea.
#[derive(Debug, Default)]
pub struct DhcpServerHandler;

impl Handler for DhcpServerHandler {
    type View = DhcpServerView;

    fn name(&self) -> &'static str {
        "service_dhcp_server"
    }

    fn config_roots(&self) -> Vec<ConfigPath> {
        vec![["service", "dhcp-server"].into()]
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[
            "interfaces_ethernet",
            "interfaces_dummy",
            "interfaces_bonding",
            "interfaces_bridge",
        ]
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["systemctl"]
    }

    fn get_config(
        &self,
        query: &ConfigQuery,
    ) -> Result<Self::View, RtconfError> {
        let base: ConfigPath = ["service", "dhcp-server"].into();
        if !query.exists(&base) {
            return Ok(DhcpServerView::default());
        }
        let dict =
            query.get_config_dict(&base, &ConfigDictOptions::handler_view())?;
        let conf: DhcpServerConfig = serde_json::from_value(dict)?;
        let mut shared_networks = Vec::new();
        for (name, network) in instances::<SharedNetworkConfig>(Some(
            &serde_json::Value::Object(conf.shared_network_name),
        ))? {
            let mut subnets = Vec::new();
            for (prefix, subnet) in instances::<SubnetConfig>(Some(
                &serde_json::Value::Object(network.subnet),
            ))? {
                let mut ranges = Vec::new();
                for (range_name, mut range) in instances::<DhcpRange>(Some(
                    &serde_json::Value::Object(subnet.range),
                ))? {
                    range.name = range_name;
                    ranges.push(range);
                }
                let mut static_mappings = Vec::new();
                for (map_name, mut mapping) in instances::<StaticMapping>(
                    Some(&serde_json::Value::Object(subnet.static_mapping)),
                )? {
                    mapping.name = map_name;
                    static_mappings.push(mapping);
                }
                subnets.push(DhcpSubnet {
                    prefix,
                    subnet_id: subnet.subnet_id,
                    default_router: subnet.default_router,
                    domain_name: subnet.domain_name,
                    lease: subnet.lease,
                    name_server: subnet.name_server,
                    ranges,
                    static_mappings,
                });
            }
            shared_networks.push(SharedNetwork {
                name,
                description: network.description,
                disable: network.disable,
                subnets,
            });
        }
        Ok(DhcpServerView {
            configured: true,
            disable: conf.disable,
            listen_interface: conf.listen_interface,
            shared_networks,
        })
    }

    fn verify(
        &self,
        view: &Self::View,
        policy: &PolicyContext,
    ) -> Result<(), RtconfError> {
        if !view.enabled() {
            return Ok(());
        }
        let base: ConfigPath = ["service", "dhcp-server"].into();
        let mut errors = Vec::new();
        if view.shared_networks.is_empty() {
            errors.push(config_error(
                &base,
                "No DHCP shared networks configured. At least one DHCP \
                shared network must be configured"
                    .to_string(),
            ));
        }
        for ifname in view.listen_interface.iter() {
            if let Err(e) = policy
                .verify_interface_exists(&base.child("listen-interface"), ifname)
            {
                errors.push(e);
            }
        }
        let mut subnet_ids: HashMap<u32, &str> = HashMap::new();
        let mut prefixes: Vec<(&str, u32, u32)> = Vec::new();
        for network in view.shared_networks.iter() {
            if network.subnets.is_empty() {
                errors.push(config_error(
                    &base.child("shared-network-name").child(&network.name),
                    format!(
                        "No DHCP subnet configured in shared network {}",
                        network.name
                    ),
                ));
            }
            for subnet in network.subnets.iter() {
                verify_subnet(&network.name, subnet, &mut errors);
                let at = subnet_path(&network.name, &subnet.prefix);
                if let Some(id) = subnet.subnet_id {
                    if let Some(other) =
                        subnet_ids.insert(id, subnet.prefix.as_str())
                    {
                        errors.push(config_error(
                            &at.child("subnet-id"),
                            format!(
                                "Subnet-id {id} is not unique, it is \
                                already used by subnet {other}"
                            ),
                        ));
                    }
                }
                if let Some((first, last)) = ipv4_prefix(&subnet.prefix) {
                    for (other, o_first, o_last) in prefixes.iter() {
                        if first <= *o_last && *o_first <= last {
                            errors.push(config_error(
                                &at,
                                format!(
                                    "Conflicting subnets: {} overlaps {other}",
                                    subnet.prefix
                                ),
                            ));
                        }
                    }
                    prefixes.push((subnet.prefix.as_str(), first, last));
                }
            }
        }
        collect_errors(errors)
    }

    fn generate(
        &self,
        view: &Self::View,
        renderer: &Renderer,
    ) -> Result<(), RtconfError> {
        if !view.enabled() {
            // Lease files are kept
            renderer.remove(KEA_DHCP4_CONF)?;
            return Ok(());
        }
        let networks: Vec<serde_json::Value> = view
            .shared_networks
            .iter()
            .filter(|n| !n.disable)
            .map(|n| {
                serde_json::json!({
                    "name": n.name,
                    "subnets": n.subnets.iter().map(kea_subnet).collect::<Vec<_>>(),
                })
            })
            .collect();
        renderer.render(
            KEA_DHCP4_CONF,
            "dhcp-server/kea-dhcp4",
            &serde_json::json!({
                "interfaces": view.listen_interface,
                "lease_file": KEA_LEASE_FILE,
                "shared_networks": networks,
            }),
            &FileOptions::new().with_mode(0o640),
        )
    }

    fn apply(
        &self,
        view: &Self::View,
        system: &SystemOps,
    ) -> Result<(), RtconfError> {
        if view.enabled() {
            system.service(KEA_SERVICE, ServiceAction::Restart)
        } else {
            system.service(KEA_SERVICE, ServiceAction::Stop)
        }
    }
}
