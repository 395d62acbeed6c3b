// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;

use super::collect_errors;
use super::interface::{
    apply_base, delete_link, get_interfaces, link_exists, verify_base,
    InterfacesView,
};
use crate::{
    ConfigPath, ConfigQuery, Handler, PolicyContext, Renderer, RtconfError,
    SystemOps,
};

const KIND: &str = "dummy";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DummyConfig {}

#[derive(Debug, Default)]
pub struct DummyHandler;

impl Handler for DummyHandler {
    type View = InterfacesView<DummyConfig>;

    fn name(&self) -> &'static str {
        "interfaces_dummy"
    }

    fn config_roots(&self) -> Vec<ConfigPath> {
        vec![["interfaces", KIND].into()]
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["vrf"]
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["ip"]
    }

    fn get_config(
        &self,
        query: &ConfigQuery,
    ) -> Result<Self::View, RtconfError> {
        get_interfaces(query, KIND)
    }

    fn verify(
        &self,
        view: &Self::View,
        policy: &PolicyContext,
    ) -> Result<(), RtconfError> {
        collect_errors(
            view.interfaces
                .iter()
                .filter_map(|i| verify_base(i, KIND, policy).err())
                .collect(),
        )
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
        for name in view.removed.iter() {
            delete_link(system, name)?;
        }
        for iface in view.interfaces.iter() {
            if !link_exists(system, &iface.name)? {
                system.run_or_raise(&[
                    "ip", "link", "add", "dev", &iface.name, "type", "dummy",
                ])?;
            }
            apply_base(iface, system)?;
        }
        Ok(())
    }
}
