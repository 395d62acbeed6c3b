// SPDX-License-Identifier: Apache-2.0

use rtconf::{to_text, ConfigPath, ConfigTree, Engine, Schema};
use serde_json::{Map, Value};

use crate::candidate::{open_candidate, CANDIDATE_KEY};
use crate::error::CliError;

// Rebuild a tree holding only the node at `path` and its ancestors.
fn subtree(
    schema: &Schema,
    tree: &ConfigTree,
    path: &ConfigPath,
) -> Result<ConfigTree, CliError> {
    let node = tree.node(path).ok_or_else(|| {
        CliError::from(format!("Configuration path [{path}] does not exist"))
    })?;
    let mut value = node.to_json();
    for name in path.iter().rev() {
        let mut map = Map::new();
        map.insert(name.clone(), value);
        value = Value::Object(map);
    }
    Ok(ConfigTree::from_json(schema, &value)?)
}

pub(crate) fn show(
    engine: &mut Engine,
    matches: &clap::ArgMatches,
) -> Result<String, CliError> {
    let tree = match matches.value_of(CANDIDATE_KEY) {
        Some(candidate) => {
            open_candidate(engine, candidate)?;
            engine.store().snapshot()
        }
        None => engine.store().running(),
    };
    let schema = engine.store().schema().clone();
    let mut tree = if matches.is_present("SHOW_SECRETS") {
        tree.as_ref().clone()
    } else {
        tree.redacted(&schema)
    };
    if let Some(words) = matches.values_of("PATH") {
        let words: Vec<&str> = words.collect();
        tree = subtree(&schema, &tree, &words.as_slice().into())?;
    }

    Ok(if matches.is_present("JSON") {
        serde_json::to_string_pretty(&tree.to_json())?
    } else if matches.is_present("YAML") {
        serde_yaml::to_string(&tree.to_json())?
    } else if matches.is_present("COMMANDS") {
        tree.to_commands()
    } else {
        to_text(&tree)
    })
}
