// SPDX-License-Identifier: Apache-2.0

use std::io::Read;

use rtconf::EngineConfig;

use crate::error::{CliError, EX_DATAERR};

pub(crate) const DEFAULT_CONFIG_PATH: &str = "/etc/rtconf/rtconf.conf";

/// Engine settings from the TOML file at `path`, defaults when the file
/// does not exist.
pub(crate) fn load_config(path: &str) -> Result<EngineConfig, CliError> {
    let path = std::path::Path::new(path);
    if !path.exists() {
        log::debug!("{} not found, using default settings", path.display());
        return Ok(EngineConfig::default());
    }
    let mut fd = std::fs::File::open(path)?;
    let mut content = String::new();
    fd.read_to_string(&mut content)?;
    match toml::from_str::<EngineConfig>(&content) {
        Ok(c) => {
            log::info!("Configuration loaded:\n{content}");
            Ok(c)
        }
        Err(e) => Err(CliError {
            code: EX_DATAERR,
            error_msg: format!(
                "Failed to read configuration from {}: {e}",
                path.display()
            ),
        }),
    }
}
