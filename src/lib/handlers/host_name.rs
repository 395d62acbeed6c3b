// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use super::{collect_errors, config_error, instances};
use crate::{
    ConfigDictOptions, ConfigPath, ConfigQuery, FileOptions, Handler,
    PolicyContext, Renderer, RtconfError, SystemOps,
};

pub(crate) const HOSTNAME_FILE: &str = "/etc/hostname";
pub(crate) const HOSTS_FILE: &str = "/etc/hosts";
pub(crate) const RESOLV_CONF: &str = "/etc/resolv.conf";

const HOST_NAME_MAX_LEN: usize = 63;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticHost {
    #[serde(skip_deserializing)]
    pub(crate) name: String,
    pub(crate) inet: Vec<String>,
    pub(crate) alias: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct StaticHostMapping {
    host_name: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct SystemConfig {
    host_name: String,
    domain_name: Option<String>,
    domain_search: Vec<String>,
    name_server: Vec<String>,
    static_host_mapping: StaticHostMapping,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostNameView {
    pub(crate) host_name: String,
    pub(crate) domain_name: Option<String>,
    pub(crate) domain_search: Vec<String>,
    pub(crate) name_servers: Vec<String>,
    pub(crate) static_hosts: Vec<StaticHost>,
}

impl HostNameView {
    pub(crate) fn fqdn(&self) -> String {
        match self.domain_name.as_deref() {
            Some(domain) => format!("{}.{domain}", self.host_name),
            None => self.host_name.clone(),
        }
    }
}

/// RFC 1123 label: letters, digits and inner hyphens.
pub(crate) fn is_valid_host_label(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= HOST_NAME_MAX_LEN
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_valid_domain(name: &str) -> bool {
    name.len() <= 253 && name.split('.').all(is_valid_host_label)
}

/// Host name, domain, resolver and static host entries of `system`.
#[derive(Debug, Default)]
pub struct HostNameHandler;

impl Handler for HostNameHandler {
    type View = HostNameView;

    fn name(&self) -> &'static str {
        "system_host_name"
    }

    fn config_roots(&self) -> Vec<ConfigPath> {
        [
            "host-name",
            "domain-name",
            "domain-search",
            "name-server",
            "static-host-mapping",
        ]
        .iter()
        .map(|n| ["system", *n].into())
        .collect()
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["hostname"]
    }

    fn get_config(
        &self,
        query: &ConfigQuery,
    ) -> Result<Self::View, RtconfError> {
        let dict = query.get_config_dict(
            &["system"].into(),
            &ConfigDictOptions::handler_view(),
        )?;
        let conf: SystemConfig = serde_json::from_value(dict)?;
        let mut static_hosts = Vec::new();
        for (name, mut host) in instances::<StaticHost>(Some(
            &serde_json::Value::Object(conf.static_host_mapping.host_name),
        ))? {
            host.name = name;
            static_hosts.push(host);
        }
        Ok(HostNameView {
            host_name: conf.host_name,
            domain_name: conf.domain_name,
            domain_search: conf.domain_search,
            name_servers: conf.name_server,
            static_hosts,
        })
    }

    fn verify(
        &self,
        view: &Self::View,
        _policy: &PolicyContext,
    ) -> Result<(), RtconfError> {
        let mut errors = Vec::new();
        if !is_valid_host_label(&view.host_name) {
            errors.push(config_error(
                &["system", "host-name"].into(),
                format!(
                    "Invalid host name \"{}\", it must be 1 to \
                    {HOST_NAME_MAX_LEN} letters, digits or inner hyphens",
                    view.host_name
                ),
            ));
        }
        if let Some(domain) = view.domain_name.as_deref() {
            if !is_valid_domain(domain) {
                errors.push(config_error(
                    &["system", "domain-name"].into(),
                    format!("Invalid domain name \"{domain}\""),
                ));
            }
        }
        for domain in view.domain_search.iter() {
            if !is_valid_domain(domain) {
                errors.push(config_error(
                    &["system", "domain-search"].into(),
                    format!("Invalid search domain \"{domain}\""),
                ));
            }
        }
        for host in view.static_hosts.iter() {
            let at: ConfigPath = [
                "system",
                "static-host-mapping",
                "host-name",
                host.name.as_str(),
            ]
            .into();
            if host.inet.is_empty() {
                errors.push(config_error(
                    &at,
                    format!("IP address required for static mapping {}", host.name),
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
        let opts = FileOptions::new().with_mode(0o644);
        let data = serde_json::json!({
            "host_name": view.host_name,
            "fqdn": view.fqdn(),
            "domain_name": view.domain_name,
            "domain_search": view.domain_search,
            "name_servers": view.name_servers,
            "static_hosts": view.static_hosts,
        });
        renderer.render(HOSTNAME_FILE, "hostname", &data, &opts)?;
        renderer.render(HOSTS_FILE, "hosts", &data, &opts)?;
        renderer.render(RESOLV_CONF, "resolv.conf", &data, &opts)
    }

    fn apply(
        &self,
        view: &Self::View,
        system: &SystemOps,
    ) -> Result<(), RtconfError> {
        system.run_or_raise(&["hostname", &view.host_name])?;
        log::info!("Host name set to {}", view.host_name);
        Ok(())
    }
}
