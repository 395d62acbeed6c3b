// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use super::collect_errors;
use super::interface::{
    apply_base, get_interfaces, reset_link, verify_base, InterfacesView,
};
use crate::{
    ConfigPath, ConfigQuery, FileOptions, Handler, PolicyContext, Renderer,
    RtconfError, ServiceAction, SystemOps,
};

const KIND: &str = "ethernet";
const FRR_SERVICE: &str = "frr";
pub(crate) const INTERFACE_POLICY_CONF: &str = "/run/rtconf/frr/interface-policy.frr";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EthernetPolicy {
    pub(crate) route_map: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EthernetConfig {
    pub(crate) policy: EthernetPolicy,
}

#[derive(Debug, Clone)]
pub struct EthernetView {
    pub(crate) ports: InterfacesView<EthernetConfig>,
    /// Route-map bindings changed, FRR has to reload them
    pub(crate) bindings_changed: bool,
}

#[derive(Debug, Serialize)]
struct RouteMapBinding<'a> {
    interface: &'a str,
    route_map: &'a str,
}

/// Physical ethernet ports. They are never created nor deleted, a port
/// removed from the configuration is flushed and set down.
#[derive(Debug, Default)]
pub struct EthernetHandler;

impl Handler for EthernetHandler {
    type View = EthernetView;

    fn name(&self) -> &'static str {
        "interfaces_ethernet"
    }

    fn config_roots(&self) -> Vec<ConfigPath> {
        vec![["interfaces", KIND].into()]
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["vrf", "policy"]
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["ip"]
    }

    fn get_config(
        &self,
        query: &ConfigQuery,
    ) -> Result<Self::View, RtconfError> {
        let ports: InterfacesView<EthernetConfig> =
            get_interfaces(query, KIND)?;
        let base: ConfigPath = ["interfaces", KIND].into();
        let route_map = |effective: bool, name: &str| {
            let path = base.child(name).child("policy").child("route-map");
            if effective {
                query.return_effective_value(&path)
            } else {
                query.return_value(&path)
            }
        };
        let mut names = query.list_nodes(&base);
        names.extend(query.list_effective_nodes(&base));
        let bindings_changed = names
            .iter()
            .any(|n| route_map(true, n) != route_map(false, n));
        Ok(EthernetView {
            ports,
            bindings_changed,
        })
    }

    fn verify(
        &self,
        view: &Self::View,
        policy: &PolicyContext,
    ) -> Result<(), RtconfError> {
        let mut errors = Vec::new();
        for iface in view.ports.interfaces.iter() {
            let at = iface.path(KIND);
            if let Err(e) = policy.verify_interface_exists(&at, &iface.name) {
                errors.push(e);
                continue;
            }
            if let Err(e) = verify_base(iface, KIND, policy) {
                errors.push(e);
            }
            if let Some(route_map) = iface.specific.policy.route_map.as_deref()
            {
                if let Err(e) = policy.verify_route_map(
                    &at.child("policy").child("route-map"),
                    route_map,
                ) {
                    errors.push(e);
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
        let bindings: Vec<RouteMapBinding> = view
            .ports
            .interfaces
            .iter()
            .filter_map(|i| {
                i.specific.policy.route_map.as_deref().map(|r| {
                    RouteMapBinding {
                        interface: i.name.as_str(),
                        route_map: r,
                    }
                })
            })
            .collect();
        if bindings.is_empty() {
            renderer.remove(INTERFACE_POLICY_CONF)?;
            return Ok(());
        }
        renderer.render(
            INTERFACE_POLICY_CONF,
            "frr/interface-policy",
            &serde_json::json!({ "bindings": bindings }),
            &FileOptions::new(),
        )
    }

    fn apply(
        &self,
        view: &Self::View,
        system: &SystemOps,
    ) -> Result<(), RtconfError> {
        for name in view.ports.removed.iter() {
            reset_link(system, name)?;
        }
        for iface in view.ports.interfaces.iter() {
            apply_base(iface, system)?;
        }
        if view.bindings_changed {
            system.service(FRR_SERVICE, ServiceAction::ReloadOrRestart)?;
        }
        Ok(())
    }
}
