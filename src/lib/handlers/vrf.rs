// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::interface::{delete_link, link_exists, set_admin_state};
use super::{collect_errors, config_error, instances, interfaces_in_vrf};
use crate::{
    ConfigDictOptions, ConfigPath, ConfigQuery, FileOptions, Handler,
    PolicyContext, Renderer, RtconfError, SystemOps,
};

pub(crate) const RT_TABLES_CONF: &str =
    "/etc/iproute2/rt_tables.d/rtconf-vrf.conf";
const RESERVED_NAMES: [&str; 2] = ["default", "main"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VrfConfig {
    #[serde(skip)]
    pub(crate) name: String,
    #[serde(deserialize_with = "crate::deserializer::option_u32_or_string")]
    pub(crate) table: Option<u32>,
    pub(crate) description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedVrf {
    pub(crate) name: String,
    /// Session interfaces still bound to this VRF, as `(type, name)`
    pub(crate) members: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct VrfView {
    pub(crate) bind_to_all: bool,
    pub(crate) vrfs: Vec<VrfConfig>,
    pub(crate) removed: Vec<RemovedVrf>,
    /// Table of each VRF in Effective
    pub(crate) old_tables: HashMap<String, u32>,
}

#[derive(Debug, Default)]
pub struct VrfHandler;

impl Handler for VrfHandler {
    type View = VrfView;

    fn name(&self) -> &'static str {
        "vrf"
    }

    fn config_roots(&self) -> Vec<ConfigPath> {
        vec![["vrf"].into()]
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["ip"]
    }

    fn get_config(
        &self,
        query: &ConfigQuery,
    ) -> Result<Self::View, RtconfError> {
        let base: ConfigPath = ["vrf"].into();
        let dict =
            query.get_config_dict(&base, &ConfigDictOptions::handler_view())?;
        let mut vrfs = Vec::new();
        for (name, mut vrf) in instances::<VrfConfig>(dict.get("name"))? {
            vrf.name = name;
            vrfs.push(vrf);
        }
        let names = base.child("name");
        let configured = query.list_nodes(&names);
        let mut removed = Vec::new();
        let mut old_tables = HashMap::new();
        for name in query.list_effective_nodes(&names) {
            if let Some(table) = query
                .return_effective_value(&names.child(&name).child("table"))
                .and_then(|v| v.as_u64())
                .and_then(|t| u32::try_from(t).ok())
            {
                old_tables.insert(name.clone(), table);
            }
            if !configured.contains(&name) {
                removed.push(RemovedVrf {
                    members: interfaces_in_vrf(query, &name),
                    name,
                });
            }
        }
        Ok(VrfView {
            bind_to_all: query.exists(&base.child("bind-to-all")),
            vrfs,
            removed,
            old_tables,
        })
    }

    fn verify(
        &self,
        view: &Self::View,
        _policy: &PolicyContext,
    ) -> Result<(), RtconfError> {
        let mut errors = Vec::new();
        for vrf in view.removed.iter() {
            if !vrf.members.is_empty() {
                errors.push(config_error(
                    &["vrf", "name", vrf.name.as_str()].into(),
                    format!(
                        "Can not remove VRF {}, it still has member interfaces",
                        vrf.name
                    ),
                ));
            }
        }
        let mut tables: HashMap<u32, &str> = HashMap::new();
        for vrf in view.vrfs.iter() {
            let at: ConfigPath = ["vrf", "name", vrf.name.as_str()].into();
            if RESERVED_NAMES.contains(&vrf.name.as_str()) {
                errors.push(config_error(
                    &at,
                    format!("VRF name \"{}\" is reserved", vrf.name),
                ));
            }
            let table = match vrf.table {
                Some(t) => t,
                None => {
                    errors.push(config_error(
                        &at,
                        format!("VRF \"{}\" table id is mandatory", vrf.name),
                    ));
                    continue;
                }
            };
            if let Some(old) = view.old_tables.get(&vrf.name) {
                if *old != table {
                    errors.push(config_error(
                        &at.child("table"),
                        format!(
                            "VRF \"{}\" table id modification not allowed",
                            vrf.name
                        ),
                    ));
                }
            }
            if let Some(other) = tables.insert(table, vrf.name.as_str()) {
                errors.push(config_error(
                    &at.child("table"),
                    format!(
                        "VRF \"{}\" table id {table} is not unique, it is \
                        already used by VRF \"{other}\"",
                        vrf.name
                    ),
                ));
            }
        }
        collect_errors(errors)
    }

    fn generate(
        &self,
        view: &Self::View,
        renderer: &Renderer,
    ) -> Result<(), RtconfError> {
        if view.vrfs.is_empty() {
            renderer.remove(RT_TABLES_CONF)?;
            return Ok(());
        }
        let vrfs: Vec<serde_json::Value> = view
            .vrfs
            .iter()
            .map(|v| serde_json::json!({"name": v.name, "table": v.table}))
            .collect();
        renderer.render(
            RT_TABLES_CONF,
            "vrf/rt_tables",
            &serde_json::json!({ "vrfs": vrfs }),
            &FileOptions::new(),
        )
    }

    fn apply(
        &self,
        view: &Self::View,
        system: &SystemOps,
    ) -> Result<(), RtconfError> {
        let bind = if view.bind_to_all { "1" } else { "0" };
        for key in ["net.ipv4.tcp_l3mdev_accept", "net.ipv4.udp_l3mdev_accept"]
        {
            system.sysctl_write(key, bind)?;
        }
        for vrf in view.removed.iter() {
            delete_link(system, &vrf.name)?;
        }
        for vrf in view.vrfs.iter() {
            let name = vrf.name.as_str();
            if !link_exists(system, name)? {
                let table = vrf.table.unwrap_or_default().to_string();
                system.run_or_raise(&[
                    "ip", "link", "add", "dev", name, "type", "vrf", "table",
                    &table,
                ])?;
            }
            if let Some(desc) = vrf.description.as_deref() {
                system.run_or_raise(&[
                    "ip", "link", "set", "dev", name, "alias", desc,
                ])?;
            }
            set_admin_state(system, name, true)?;
        }
        Ok(())
    }
}
