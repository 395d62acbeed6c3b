// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use super::{collect_errors, config_error, strings};
use crate::{
    ConfigDictOptions, ConfigDiff, ConfigPath, ConfigQuery, FileOptions,
    Handler, PolicyContext, Renderer, RtconfError, ServiceAction, SystemOps,
};

pub(crate) const RECURSOR_CONF: &str = "/run/pdns-recursor/recursor.conf";
const RECURSOR_SERVICE: &str = "pdns-recursor";

fn base_path() -> ConfigPath {
    ["service", "dns", "forwarding"].into()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsForwardingConfig {
    pub(crate) allow_from: Vec<String>,
    #[serde(deserialize_with = "crate::deserializer::option_u32_or_string")]
    pub(crate) cache_size: Option<u32>,
    pub(crate) dnssec: String,
    pub(crate) listen_address: Vec<String>,
    pub(crate) name_server: Vec<String>,
    #[serde(deserialize_with = "crate::deserializer::option_u32_or_string")]
    pub(crate) negative_ttl: Option<u32>,
    #[serde(deserialize_with = "crate::deserializer::option_u32_or_string")]
    pub(crate) port: Option<u32>,
    #[serde(deserialize_with = "crate::deserializer::presence")]
    pub(crate) system: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsForwardingView {
    /// `None` once the service is removed from the configuration
    pub(crate) config: Option<DnsForwardingConfig>,
    /// Service present in the running configuration
    pub(crate) was_configured: bool,
    pub(crate) system_name_servers: Vec<String>,
}

impl DnsForwardingView {
    /// Upstream servers, the configured ones first.
    pub(crate) fn forwarders(&self) -> Vec<String> {
        let mut ret = Vec::new();
        if let Some(conf) = self.config.as_ref() {
            ret.extend(conf.name_server.iter().cloned());
            if conf.system {
                for ns in self.system_name_servers.iter() {
                    if !ret.contains(ns) {
                        ret.push(ns.clone());
                    }
                }
            }
        }
        ret
    }
}

/// Caching DNS forwarder served by the PowerDNS recursor.
#[derive(Debug, Default)]
pub struct DnsForwardingHandler;

impl Handler for DnsForwardingHandler {
    type View = DnsForwardingView;

    fn name(&self) -> &'static str {
        "service_dns_forwarding"
    }

    fn config_roots(&self) -> Vec<ConfigPath> {
        // Forwarders follow the system name servers
        vec![base_path(), ["system", "name-server"].into()]
    }

    // Name server changes only matter while the service is configured.
    fn is_affected(&self, diff: &ConfigDiff) -> bool {
        let base = base_path();
        diff.node_changed(&base)
            || (diff.node_changed(&["system", "name-server"].into())
                && (diff.left().exists(&base) || diff.right().exists(&base)))
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["system_host_name"]
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["systemctl"]
    }

    fn get_config(
        &self,
        query: &ConfigQuery,
    ) -> Result<Self::View, RtconfError> {
        let base = base_path();
        let system_name_servers = strings(
            query.return_values(&["system", "name-server"].into()),
        );
        let was_configured = query.exists_effective(&base);
        if !query.exists(&base) {
            return Ok(DnsForwardingView {
                config: None,
                was_configured,
                system_name_servers,
            });
        }
        let dict =
            query.get_config_dict(&base, &ConfigDictOptions::handler_view())?;
        Ok(DnsForwardingView {
            config: Some(serde_json::from_value(dict)?),
            was_configured,
            system_name_servers,
        })
    }

    fn verify(
        &self,
        view: &Self::View,
        _policy: &PolicyContext,
    ) -> Result<(), RtconfError> {
        let conf = match view.config.as_ref() {
            Some(c) => c,
            None => return Ok(()),
        };
        let at = base_path();
        let mut errors = Vec::new();
        if conf.allow_from.is_empty() {
            errors.push(config_error(
                &at.child("allow-from"),
                "DNS forwarding requires an allow-from network".to_string(),
            ));
        }
        if conf.listen_address.is_empty() {
            errors.push(config_error(
                &at.child("listen-address"),
                "DNS forwarding requires a listen-address".to_string(),
            ));
        }
        if conf.system && view.system_name_servers.is_empty() {
            errors.push(config_error(
                &at.child("system"),
                "DNS forwarding \"system\" is set, but no system \
                name-server is configured"
                    .to_string(),
            ));
        }
        collect_errors(errors)
    }

    fn generate(
        &self,
        view: &Self::View,
        renderer: &Renderer,
    ) -> Result<(), RtconfError> {
        let conf = match view.config.as_ref() {
            Some(c) => c,
            None => {
                renderer.remove(RECURSOR_CONF)?;
                return Ok(());
            }
        };
        renderer.render(
            RECURSOR_CONF,
            "dns-forwarding/recursor.conf",
            &serde_json::json!({
                "config": conf,
                "forwarders": view.forwarders(),
            }),
            &FileOptions::new().with_mode(0o644),
        )
    }

    fn apply(
        &self,
        view: &Self::View,
        system: &SystemOps,
    ) -> Result<(), RtconfError> {
        if view.config.is_some() {
            system.service(RECURSOR_SERVICE, ServiceAction::ReloadOrRestart)
        } else if view.was_configured {
            system.service(RECURSOR_SERVICE, ServiceAction::Stop)
        } else {
            Ok(())
        }
    }
}
