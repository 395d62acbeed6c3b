// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::file::{remove_file, rooted, write_atomic, FileOptions};
use crate::{ErrorKind, RtconfError, TemplateSet};

const BUILTIN_TEMPLATES: [(&str, &str); 10] = [
    ("header", include_str!("templates/header.tmpl")),
    ("hostname", include_str!("templates/hostname.tmpl")),
    ("hosts", include_str!("templates/hosts.tmpl")),
    ("resolv.conf", include_str!("templates/resolv.conf.tmpl")),
    ("vrf/rt_tables", include_str!("templates/vrf-rt-tables.tmpl")),
    ("frr/policy", include_str!("templates/frr-policy.tmpl")),
    (
        "frr/interface-policy",
        include_str!("templates/frr-interface-policy.tmpl"),
    ),
    ("firewall/nftables", include_str!("templates/nftables.tmpl")),
    (
        "dns-forwarding/recursor.conf",
        include_str!("templates/recursor.conf.tmpl"),
    ),
    ("dhcp-server/kea-dhcp4", include_str!("templates/kea-dhcp4.conf.tmpl")),
];

/// Turns handler views into files through the template set. Every path
/// is resolved below the system root.
#[derive(Debug, Clone)]
pub struct Renderer {
    templates: TemplateSet,
    root: PathBuf,
}

impl Renderer {
    pub fn new(templates: TemplateSet, system_root: &Path) -> Self {
        Self {
            templates,
            root: system_root.to_path_buf(),
        }
    }

    /// Renderer holding the templates shipped with this library.
    pub fn builtin(system_root: &Path) -> Result<Self, RtconfError> {
        let mut templates = TemplateSet::new();
        for (id, src) in BUILTIN_TEMPLATES {
            templates.add(id, src)?;
        }
        Ok(Self::new(templates, system_root))
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    pub fn system_root(&self) -> &Path {
        self.root.as_path()
    }

    /// Location of `dest` on this system.
    pub fn path(&self, dest: &str) -> PathBuf {
        rooted(&self.root, Path::new(dest))
    }

    pub fn render_to_string<T: Serialize>(
        &self,
        template_id: &str,
        view: &T,
    ) -> Result<String, RtconfError> {
        let view = serde_json::to_value(view).map_err(|e| {
            RtconfError::new(
                ErrorKind::RenderError,
                format!("Template {template_id}: invalid view: {e}"),
            )
        })?;
        self.templates.render(template_id, &view)
    }

    /// Render `template_id` with `view` and atomically replace `dest`.
    pub fn render<T: Serialize>(
        &self,
        dest: &str,
        template_id: &str,
        view: &T,
        opts: &FileOptions,
    ) -> Result<(), RtconfError> {
        self.render_with_filter(dest, template_id, view, opts, |s| s)
    }

    /// Like [Renderer::render()] with a transformation applied to the
    /// rendered text before it is written.
    pub fn render_with_filter<T, F>(
        &self,
        dest: &str,
        template_id: &str,
        view: &T,
        opts: &FileOptions,
        post_filter: F,
    ) -> Result<(), RtconfError>
    where
        T: Serialize,
        F: Fn(String) -> String,
    {
        let content = post_filter(self.render_to_string(template_id, view)?);
        let path = self.path(dest);
        write_atomic(&path, content.as_bytes(), opts)?;
        log::info!("Generated {} from template {template_id}", path.display());
        Ok(())
    }

    /// Remove a previously generated file, a missing file is fine.
    pub fn remove(&self, dest: &str) -> Result<bool, RtconfError> {
        remove_file(&self.path(dest))
    }
}
