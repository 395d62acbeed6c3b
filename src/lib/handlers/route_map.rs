// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use super::{collect_errors, config_error, instances};
use crate::{
    ConfigDictOptions, ConfigPath, ConfigQuery, FileOptions, Handler,
    PolicyContext, Renderer, RtconfError, ServiceAction, SystemOps,
};

pub(crate) const POLICY_CONF: &str = "/run/rtconf/frr/policy.frr";
const FRR_SERVICE: &str = "frr";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleMatch {
    pub(crate) interface: Option<String>,
    #[serde(deserialize_with = "crate::deserializer::option_u32_or_string")]
    pub(crate) metric: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    #[serde(deserialize_with = "crate::deserializer::option_u32_or_string")]
    pub(crate) local_preference: Option<u32>,
    #[serde(deserialize_with = "crate::deserializer::option_u32_or_string")]
    pub(crate) metric: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    #[serde(skip_deserializing)]
    pub(crate) id: u32,
    pub(crate) action: Option<String>,
    pub(crate) description: Option<String>,
    #[serde(rename = "match")]
    pub(crate) matches: RuleMatch,
    pub(crate) set: RuleSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct RouteMapConfig {
    description: Option<String>,
    rule: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteMap {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteMapView {
    pub(crate) route_maps: Vec<RouteMap>,
}

/// Route-maps, rendered as an FRR configuration fragment.
#[derive(Debug, Default)]
pub struct RouteMapHandler;

impl Handler for RouteMapHandler {
    type View = RouteMapView;

    fn name(&self) -> &'static str {
        "policy"
    }

    fn config_roots(&self) -> Vec<ConfigPath> {
        vec![["policy"].into()]
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["systemctl"]
    }

    fn get_config(
        &self,
        query: &ConfigQuery,
    ) -> Result<Self::View, RtconfError> {
        let dict = query.get_config_dict(
            &["policy"].into(),
            &ConfigDictOptions::handler_view(),
        )?;
        let mut route_maps = Vec::new();
        for (name, conf) in
            instances::<RouteMapConfig>(dict.get("route_map"))?
        {
            let mut rules = Vec::new();
            for (id, mut rule) in instances::<Rule>(Some(
                &serde_json::Value::Object(conf.rule),
            ))? {
                rule.id = id.parse().unwrap_or_default();
                rules.push(rule);
            }
            rules.sort_by_key(|r| r.id);
            route_maps.push(RouteMap {
                name,
                description: conf.description,
                rules,
            });
        }
        Ok(RouteMapView { route_maps })
    }

    fn verify(
        &self,
        view: &Self::View,
        policy: &PolicyContext,
    ) -> Result<(), RtconfError> {
        let mut errors = Vec::new();
        for route_map in view.route_maps.iter() {
            for rule in route_map.rules.iter() {
                let id = rule.id.to_string();
                let at: ConfigPath = [
                    "policy",
                    "route-map",
                    route_map.name.as_str(),
                    "rule",
                    id.as_str(),
                ]
                .into();
                if rule.action.is_none() {
                    errors.push(config_error(
                        &at,
                        format!(
                            "Action not set for route-map {} rule {id}",
                            route_map.name
                        ),
                    ));
                }
                if let Some(iface) = rule.matches.interface.as_deref() {
                    if let Err(e) = policy.verify_interface_exists(
                        &at.child("match").child("interface"),
                        iface,
                    ) {
                        errors.push(e);
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
        if view.route_maps.is_empty() {
            renderer.remove(POLICY_CONF)?;
            return Ok(());
        }
        renderer.render(POLICY_CONF, "frr/policy", view, &FileOptions::new())
    }

    fn apply(
        &self,
        _view: &Self::View,
        system: &SystemOps,
    ) -> Result<(), RtconfError> {
        system.service(FRR_SERVICE, ServiceAction::ReloadOrRestart)
    }
}
