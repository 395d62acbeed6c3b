// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use super::{collect_errors, config_error, instances};
use crate::{
    CommandSpec, ConfigDictOptions, ConfigPath, ConfigQuery, FileOptions,
    Handler, PolicyContext, Renderer, RtconfError, SystemOps,
};

pub(crate) const NFTABLES_CONF: &str = "/run/rtconf/nftables.conf";
pub(crate) const NFT_TABLE: &str = "rtconf_filter";
const BASE_CHAINS: [&str; 3] = ["forward", "input", "output"];
const NAMED_CHAIN_PREFIX: &str = "NAME_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    pub(crate) address: Option<String>,
    pub(crate) port: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InterfaceMatch {
    pub(crate) name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FirewallRule {
    #[serde(skip)]
    pub(crate) id: u32,
    pub(crate) action: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) destination: Endpoint,
    #[serde(deserialize_with = "crate::deserializer::presence")]
    pub(crate) disable: bool,
    pub(crate) inbound_interface: InterfaceMatch,
    pub(crate) jump_target: Option<String>,
    #[serde(deserialize_with = "crate::deserializer::presence")]
    pub(crate) log: bool,
    pub(crate) outbound_interface: InterfaceMatch,
    pub(crate) protocol: Option<String>,
    pub(crate) source: Endpoint,
    pub(crate) state: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct ChainConfig {
    default_action: Option<String>,
    description: Option<String>,
    rule: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirewallChain {
    /// Netfilter hook of a base chain, `None` for a named chain
    pub(crate) hook: Option<String>,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) default_action: String,
    pub(crate) rules: Vec<FirewallRule>,
}

impl FirewallChain {
    fn path(&self) -> ConfigPath {
        match self.hook.as_deref() {
            Some(hook) => ["firewall", "ipv4", hook, "filter"].into(),
            None => ["firewall", "ipv4", "name", self.name.as_str()].into(),
        }
    }

    fn nft_name(&self) -> String {
        match self.hook.as_deref() {
            Some(hook) => hook.to_string(),
            None => format!("{NAMED_CHAIN_PREFIX}{}", self.name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirewallView {
    pub(crate) chains: Vec<FirewallChain>,
}

#[derive(Debug, Serialize)]
struct NftChain {
    name: String,
    hook: Option<String>,
    description: Option<String>,
    rules: Vec<String>,
    default_rule: String,
}

fn port_set(ports: &str) -> String {
    let ports: Vec<&str> = ports.split(',').map(str::trim).collect();
    format!("{{ {} }}", ports.join(", "))
}

fn takes_ports(protocol: Option<&str>) -> bool {
    matches!(protocol, Some("tcp") | Some("udp") | Some("tcp_udp"))
}

fn verdict(rule: &FirewallRule) -> String {
    match (rule.action.as_deref(), rule.jump_target.as_deref()) {
        (Some("jump"), Some(target)) => {
            format!("jump {NAMED_CHAIN_PREFIX}{target}")
        }
        (Some(action), _) => action.to_string(),
        (None, _) => "accept".to_string(),
    }
}

/// nftables statement of one rule.
pub(crate) fn nft_rule(chain: &str, rule: &FirewallRule) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(name) = rule.inbound_interface.name.as_deref() {
        parts.push(format!("iifname \"{name}\""));
    }
    if let Some(name) = rule.outbound_interface.name.as_deref() {
        parts.push(format!("oifname \"{name}\""));
    }
    if let Some(addr) = rule.source.address.as_deref() {
        parts.push(format!("ip saddr {addr}"));
    }
    if let Some(addr) = rule.destination.address.as_deref() {
        parts.push(format!("ip daddr {addr}"));
    }
    let l4 = match rule.protocol.as_deref() {
        Some("tcp_udp") => {
            parts.push("meta l4proto { tcp, udp }".to_string());
            Some("th")
        }
        Some(proto @ ("tcp" | "udp")) => {
            parts.push(format!("meta l4proto {proto}"));
            Some(proto)
        }
        Some("icmp") => {
            parts.push("meta l4proto icmp".to_string());
            None
        }
        _ => None,
    };
    if let Some(l4) = l4 {
        if let Some(port) = rule.source.port.as_deref() {
            parts.push(format!("{l4} sport {}", port_set(port)));
        }
        if let Some(port) = rule.destination.port.as_deref() {
            parts.push(format!("{l4} dport {}", port_set(port)));
        }
    }
    if !rule.state.is_empty() {
        parts.push(format!("ct state {{ {} }}", rule.state.join(", ")));
    }
    parts.push("counter".to_string());
    if rule.log {
        parts.push(format!("log prefix \"[{chain}-{}]\"", rule.id));
    }
    parts.push(verdict(rule));
    match rule.description.as_deref() {
        Some(desc) => parts.push(format!("comment \"{}\"", desc.replace('"', "'"))),
        None => parts.push(format!("comment \"{chain}-{}\"", rule.id)),
    }
    parts.join(" ")
}

fn chain_rules(
    value: Option<&serde_json::Value>,
) -> Result<Option<ChainConfig>, RtconfError> {
    match value {
        Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
        None => Ok(None),
    }
}

fn build_chain(
    hook: Option<&str>,
    name: &str,
    conf: ChainConfig,
) -> Result<FirewallChain, RtconfError> {
    let mut rules = Vec::new();
    for (id, mut rule) in instances::<FirewallRule>(Some(
        &serde_json::Value::Object(conf.rule),
    ))? {
        rule.id = id.parse().unwrap_or_default();
        rules.push(rule);
    }
    rules.sort_by_key(|r| r.id);
    Ok(FirewallChain {
        hook: hook.map(str::to_string),
        name: name.to_string(),
        description: conf.description,
        default_action: conf
            .default_action
            .unwrap_or_else(|| "accept".to_string()),
        rules,
    })
}

/// IPv4 filter rules loaded into a dedicated nftables table.
#[derive(Debug, Default)]
pub struct FirewallHandler;

impl Handler for FirewallHandler {
    type View = FirewallView;

    fn name(&self) -> &'static str {
        "firewall"
    }

    fn config_roots(&self) -> Vec<ConfigPath> {
        vec![["firewall"].into()]
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
        &["nft"]
    }

    fn get_config(
        &self,
        query: &ConfigQuery,
    ) -> Result<Self::View, RtconfError> {
        let base: ConfigPath = ["firewall", "ipv4"].into();
        let mut chains = Vec::new();
        if !query.exists(&base) {
            return Ok(FirewallView { chains });
        }
        let dict =
            query.get_config_dict(&base, &ConfigDictOptions::handler_view())?;
        for hook in BASE_CHAINS {
            if !query.exists(&base.child(hook).child("filter")) {
                continue;
            }
            let filter = dict.get(hook).and_then(|h| h.get("filter"));
            if let Some(conf) = chain_rules(filter)? {
                chains.push(build_chain(Some(hook), hook, conf)?);
            }
        }
        for (name, conf) in instances::<ChainConfig>(dict.get("name"))? {
            chains.push(build_chain(None, &name, conf)?);
        }
        Ok(FirewallView { chains })
    }

    fn verify(
        &self,
        view: &Self::View,
        policy: &PolicyContext,
    ) -> Result<(), RtconfError> {
        let mut errors = Vec::new();
        let named: Vec<&str> = view
            .chains
            .iter()
            .filter(|c| c.hook.is_none())
            .map(|c| c.name.as_str())
            .collect();
        for chain in view.chains.iter() {
            for rule in chain.rules.iter() {
                let at = chain.path().child("rule").child(&rule.id.to_string());
                match rule.action.as_deref() {
                    None => errors.push(config_error(
                        &at,
                        format!(
                            "Firewall rule {} of {} has no action defined",
                            rule.id,
                            chain.nft_name()
                        ),
                    )),
                    Some("jump") => match rule.jump_target.as_deref() {
                        None => errors.push(config_error(
                            &at,
                            "Action is set to jump, but no jump-target \
                            is specified"
                                .to_string(),
                        )),
                        Some(target) if !named.contains(&target) => {
                            errors.push(config_error(
                                &at.child("jump-target"),
                                format!(
                                    "Invalid jump-target. Firewall name \
                                    {target} does not exist on the system"
                                ),
                            ))
                        }
                        Some(target) if chain.hook.is_none()
                            && target == chain.name =>
                        {
                            errors.push(config_error(
                                &at.child("jump-target"),
                                format!("Chain {target} cannot jump to itself"),
                            ))
                        }
                        _ => (),
                    },
                    Some(_) if rule.jump_target.is_some() => {
                        errors.push(config_error(
                            &at,
                            "jump-target is only valid with action jump"
                                .to_string(),
                        ))
                    }
                    _ => (),
                }
                if (rule.source.port.is_some()
                    || rule.destination.port.is_some())
                    && !takes_ports(rule.protocol.as_deref())
                {
                    errors.push(config_error(
                        &at,
                        "Protocol must be tcp, udp or tcp_udp when \
                        specifying a port"
                            .to_string(),
                    ));
                }
                for (side, iface) in [
                    ("inbound-interface", &rule.inbound_interface),
                    ("outbound-interface", &rule.outbound_interface),
                ] {
                    if let Some(name) = iface.name.as_deref() {
                        if let Err(e) = policy.verify_interface_exists(
                            &at.child(side).child("name"),
                            name,
                        ) {
                            errors.push(e);
                        }
                    }
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
        if view.chains.is_empty() {
            renderer.remove(NFTABLES_CONF)?;
            return Ok(());
        }
        let chains: Vec<NftChain> = view
            .chains
            .iter()
            .map(|chain| {
                let name = chain.nft_name();
                NftChain {
                    rules: chain
                        .rules
                        .iter()
                        .filter(|r| !r.disable)
                        .map(|r| nft_rule(&name, r))
                        .collect(),
                    default_rule: format!(
                        "counter {} comment \"{name} default-action\"",
                        chain.default_action
                    ),
                    hook: chain.hook.clone(),
                    description: chain.description.clone(),
                    name,
                }
            })
            .collect();
        renderer.render(
            NFTABLES_CONF,
            "firewall/nftables",
            &serde_json::json!({ "table": NFT_TABLE, "chains": chains }),
            &FileOptions::new().with_mode(0o600),
        )
    }

    fn apply(
        &self,
        view: &Self::View,
        system: &SystemOps,
    ) -> Result<(), RtconfError> {
        if view.chains.is_empty() {
            // 1: table already absent
            system.run_spec_or_raise(
                &CommandSpec::new(&["nft", "delete", "table", "ip", NFT_TABLE])
                    .with_expect(&[0, 1]),
            )?;
            log::info!("Firewall table {NFT_TABLE} removed");
            return Ok(());
        }
        let path = system.path(NFTABLES_CONF);
        system.run_or_raise(&["nft", "-f", &path.display().to_string()])?;
        Ok(())
    }
}
