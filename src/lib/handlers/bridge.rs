// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use serde::Deserialize;

use super::interface::{
    apply_base, delete_link, get_interfaces, link_exists, release_members,
    set_admin_state, verify_base, verify_member, InterfacesView,
};
use super::collect_errors;
use crate::{
    ConfigPath, ConfigQuery, Handler, PolicyContext, Renderer, RtconfError,
    SystemOps,
};

const KIND: &str = "bridge";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgePort {
    #[serde(deserialize_with = "crate::deserializer::option_u32_or_string")]
    pub(crate) cost: Option<u32>,
    #[serde(deserialize_with = "crate::deserializer::option_u32_or_string")]
    pub(crate) priority: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeMembers {
    pub(crate) interface: BTreeMap<String, BridgePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    #[serde(deserialize_with = "crate::deserializer::option_u32_or_string")]
    pub(crate) aging: Option<u32>,
    #[serde(deserialize_with = "crate::deserializer::presence")]
    pub(crate) stp: bool,
    pub(crate) member: BridgeMembers,
}

#[derive(Debug, Clone)]
pub struct BridgeView {
    pub(crate) bridges: InterfacesView<BridgeConfig>,
    /// Per bridge, ports of Effective no longer listed
    pub(crate) member_remove: Vec<Vec<String>>,
}

#[derive(Debug, Default)]
pub struct BridgeHandler;

impl Handler for BridgeHandler {
    type View = BridgeView;

    fn name(&self) -> &'static str {
        "interfaces_bridge"
    }

    fn config_roots(&self) -> Vec<ConfigPath> {
        vec![["interfaces", KIND].into()]
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[
            "vrf",
            "interfaces_dummy",
            "interfaces_bonding",
            "interfaces_ethernet",
        ]
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["ip", "bridge"]
    }

    fn get_config(
        &self,
        query: &ConfigQuery,
    ) -> Result<Self::View, RtconfError> {
        let bridges: InterfacesView<BridgeConfig> =
            get_interfaces(query, KIND)?;
        let member_remove = bridges
            .interfaces
            .iter()
            .map(|br| {
                query
                    .list_effective_nodes(
                        &br.path(KIND).child("member").child("interface"),
                    )
                    .into_iter()
                    .filter(|m| !br.specific.member.interface.contains_key(m))
                    .collect()
            })
            .collect();
        Ok(BridgeView {
            bridges,
            member_remove,
        })
    }

    fn verify(
        &self,
        view: &Self::View,
        policy: &PolicyContext,
    ) -> Result<(), RtconfError> {
        let mut errors = Vec::new();
        for br in view.bridges.interfaces.iter() {
            if let Err(e) = verify_base(br, KIND, policy) {
                errors.push(e);
            }
            let base = br.path(KIND).child("member").child("interface");
            for member in br.specific.member.interface.keys() {
                if let Err(e) = verify_member(
                    policy,
                    &base.child(member),
                    &br.name,
                    member,
                ) {
                    errors.push(e);
                }
            }
        }
        collect_errors(errors)
    }

    fn generate(
        &self,
        _view: &Self::View,
        _renderer: &Renderer,
    ) -> Result<(), RtconfError> {
        Ok(())
    }

    fn apply(
        &self,
        view: &Self::View,
        system: &SystemOps,
    ) -> Result<(), RtconfError> {
        for name in view.bridges.removed.iter() {
            delete_link(system, name)?;
        }
        for (br, member_remove) in view
            .bridges
            .interfaces
            .iter()
            .zip(view.member_remove.iter())
        {
            let name = br.name.as_str();
            if !link_exists(system, name)? {
                system.run_or_raise(&[
                    "ip", "link", "add", "dev", name, "type", "bridge",
                ])?;
            }
            let stp = if br.specific.stp { "1" } else { "0" };
            // ageing_time is in centiseconds
            let aging = (br.specific.aging.unwrap_or(300) * 100).to_string();
            system.run_or_raise(&[
                "ip",
                "link",
                "set",
                "dev",
                name,
                "type",
                "bridge",
                "stp_state",
                stp,
                "ageing_time",
                &aging,
            ])?;
            release_members(system, name, member_remove)?;
            for (member, port) in br.specific.member.interface.iter() {
                system.run_or_raise(&[
                    "ip", "link", "set", "dev", member, "master", name,
                ])?;
                let mut argv = vec!["bridge", "link", "set", "dev", member.as_str()];
                let cost = port.cost.map(|c| c.to_string());
                let priority = port.priority.map(|p| p.to_string());
                if let Some(cost) = cost.as_deref() {
                    argv.extend(["cost", cost]);
                }
                if let Some(priority) = priority.as_deref() {
                    argv.extend(["priority", priority]);
                }
                if argv.len() > 5 {
                    system.run_or_raise(&argv)?;
                }
                set_admin_state(system, member, true)?;
            }
            apply_base(br, system)?;
        }
        Ok(())
    }
}
