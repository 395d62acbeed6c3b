// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;

use super::interface::{
    apply_base, delete_link, get_interfaces, link_exists, release_members,
    set_admin_state, verify_base, verify_member, InterfacesView,
};
use super::{collect_errors, strings};
use crate::{
    ConfigPath, ConfigQuery, Handler, PolicyContext, Renderer, RtconfError,
    SystemOps,
};

const KIND: &str = "bonding";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BondMembers {
    pub(crate) interface: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BondConfig {
    pub(crate) mode: String,
    pub(crate) member: BondMembers,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondState {
    /// Members of Effective no longer listed
    pub(crate) member_remove: Vec<String>,
    /// The bond exists with another mode, which needs the bond down
    pub(crate) mode_changed: bool,
}

#[derive(Debug, Clone)]
pub struct BondingView {
    pub(crate) bonds: InterfacesView<BondConfig>,
    pub(crate) state: Vec<BondState>,
}

/// Kernel names of the bonding modes.
fn kernel_mode(mode: &str) -> &str {
    match mode {
        "transmit-load-balance" => "balance-tlb",
        "adaptive-load-balance" => "balance-alb",
        m => m,
    }
}

#[derive(Debug, Default)]
pub struct BondingHandler;

impl Handler for BondingHandler {
    type View = BondingView;

    fn name(&self) -> &'static str {
        "interfaces_bonding"
    }

    fn config_roots(&self) -> Vec<ConfigPath> {
        vec![["interfaces", KIND].into()]
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["vrf", "interfaces_ethernet"]
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["ip"]
    }

    fn get_config(
        &self,
        query: &ConfigQuery,
    ) -> Result<Self::View, RtconfError> {
        let bonds: InterfacesView<BondConfig> = get_interfaces(query, KIND)?;
        let mut state = Vec::new();
        for bond in bonds.interfaces.iter() {
            let path = bond.path(KIND);
            let old_members = strings(query.return_effective_values(
                &path.child("member").child("interface"),
            ));
            let old_mode = query
                .return_effective_value(&path.child("mode"))
                .map(|v| v.to_string());
            state.push(BondState {
                member_remove: old_members
                    .into_iter()
                    .filter(|m| !bond.specific.member.interface.contains(m))
                    .collect(),
                mode_changed: !bond.is_new
                    && old_mode.is_some()
                    && old_mode.as_deref() != Some(bond.specific.mode.as_str()),
            });
        }
        Ok(BondingView { bonds, state })
    }

    fn verify(
        &self,
        view: &Self::View,
        policy: &PolicyContext,
    ) -> Result<(), RtconfError> {
        let mut errors = Vec::new();
        for bond in view.bonds.interfaces.iter() {
            if let Err(e) = verify_base(bond, KIND, policy) {
                errors.push(e);
            }
            let at = bond.path(KIND).child("member").child("interface");
            for member in bond.specific.member.interface.iter() {
                if let Err(e) = verify_member(policy, &at, &bond.name, member) {
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
        for name in view.bonds.removed.iter() {
            delete_link(system, name)?;
        }
        for (bond, state) in view.bonds.interfaces.iter().zip(view.state.iter())
        {
            let name = bond.name.as_str();
            let mode = kernel_mode(&bond.specific.mode);
            if !link_exists(system, name)? {
                system.run_or_raise(&[
                    "ip", "link", "add", "dev", name, "type", "bond", "mode",
                    mode,
                ])?;
            } else if state.mode_changed {
                set_admin_state(system, name, false)?;
                system.run_or_raise(&[
                    "ip", "link", "set", "dev", name, "type", "bond", "mode",
                    mode,
                ])?;
            }
            release_members(system, name, &state.member_remove)?;
            for member in bond.specific.member.interface.iter() {
                // A port must be down to be enslaved
                set_admin_state(system, member, false)?;
                system.run_or_raise(&[
                    "ip", "link", "set", "dev", member, "master", name,
                ])?;
                set_admin_state(system, member, true)?;
            }
            apply_base(bond, system)?;
        }
        Ok(())
    }
}
