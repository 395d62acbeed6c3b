// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use rtconf::{from_text, to_text, ConfigDiff, ConfigPath, Engine};

use crate::error::CliError;

pub(crate) const CANDIDATE_KEY: &str = "CANDIDATE";

/// Load the candidate file as the Session. A missing file starts the
/// Session from Running.
pub(crate) fn open_candidate(
    engine: &mut Engine,
    path: &str,
) -> Result<(), CliError> {
    if Path::new(path).exists() {
        engine.store_mut().load_session(Path::new(path))?;
    } else {
        log::info!(
            "Candidate {path} does not exist, starting from the running \
            configuration"
        );
        engine.store_mut().begin_session();
    }
    Ok(())
}

fn write_candidate(engine: &Engine, path: &str) -> Result<(), CliError> {
    let tmp_path = format!("{path}.{}.tmp", uuid::Uuid::new_v4());
    std::fs::write(&tmp_path, to_text(engine.store().snapshot().as_ref()))?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        del_file(&tmp_path);
        return Err(e.into());
    }
    log::debug!("Candidate written to {path}");
    Ok(())
}

pub(crate) fn del_file(file_path: &str) {
    if let Err(e) = std::fs::remove_file(file_path) {
        eprintln!("Failed to delete file {}: {}", file_path, e);
    }
}

// The last word is a value when the whole command does not name a node:
// `system host-name r1` against `vrf bind-to-all`.
fn split_words(
    engine: &Engine,
    words: &[&str],
) -> (ConfigPath, Option<String>) {
    let full: ConfigPath = words.into();
    if words.len() < 2 || engine.store().schema().resolve(&full).is_ok() {
        return (full, None);
    }
    match words.split_last() {
        Some((value, path)) => (path.into(), Some(value.to_string())),
        None => (full, None),
    }
}

fn required_words<'a>(
    matches: &'a clap::ArgMatches,
) -> Result<Vec<&'a str>, CliError> {
    match matches.values_of("PATH") {
        Some(words) => Ok(words.collect()),
        None => Err(CliError::usage("Configuration path required".to_string())),
    }
}

fn candidate_path(matches: &clap::ArgMatches) -> Result<&str, CliError> {
    matches.value_of(CANDIDATE_KEY).ok_or_else(|| {
        CliError::usage("Candidate file required (--candidate)".to_string())
    })
}

pub(crate) fn set(
    engine: &mut Engine,
    matches: &clap::ArgMatches,
) -> Result<String, CliError> {
    let candidate = candidate_path(matches)?;
    let words = required_words(matches)?;
    open_candidate(engine, candidate)?;
    let (path, value) = split_words(engine, &words);
    engine.store_mut().set(&path, value.as_deref())?;
    write_candidate(engine, candidate)?;
    Ok(String::new())
}

pub(crate) fn delete(
    engine: &mut Engine,
    matches: &clap::ArgMatches,
) -> Result<String, CliError> {
    let candidate = candidate_path(matches)?;
    let words = required_words(matches)?;
    open_candidate(engine, candidate)?;
    match split_words(engine, &words) {
        (path, Some(value)) => {
            engine.store_mut().delete_value(&path, &value)?
        }
        (path, None) => engine.store_mut().delete(&path)?,
    }
    write_candidate(engine, candidate)?;
    Ok(String::new())
}

/// Commands turning Running into the candidate.
pub(crate) fn compare(
    engine: &mut Engine,
    matches: &clap::ArgMatches,
) -> Result<String, CliError> {
    let candidate = candidate_path(matches)?;
    open_candidate(engine, candidate)?;
    let diff =
        ConfigDiff::new(engine.store().running(), engine.store().snapshot());
    if diff.is_empty() {
        return Ok("No changes between running and candidate".to_string());
    }
    let mut lines = Vec::new();
    for line in diff.deleted().to_commands().lines() {
        lines.push(format!(
            "delete{}",
            line.strip_prefix("set").unwrap_or(line)
        ));
    }
    for line in diff.added().to_commands().lines() {
        lines.push(line.to_string());
    }
    Ok(lines.join("\n"))
}

/// Replace the candidate with the content of a configuration file.
pub(crate) fn load(
    engine: &mut Engine,
    matches: &clap::ArgMatches,
) -> Result<String, CliError> {
    let candidate = candidate_path(matches)?;
    let file_path = matches
        .value_of("FILE")
        .ok_or_else(|| CliError::usage("Configuration file required".to_string()))?;
    let content = std::fs::read_to_string(file_path)?;
    let tree = from_text(engine.store().schema(), &content)?;
    engine.store_mut().replace_session(tree);
    write_candidate(engine, candidate)?;
    Ok(format!("Loaded {file_path} into candidate {candidate}"))
}

pub(crate) fn load_revision(
    engine: &mut Engine,
    matches: &clap::ArgMatches,
) -> Result<String, CliError> {
    let candidate = candidate_path(matches)?;
    let index: usize = matches.value_of_t("REVISION")?;
    engine.load_revision(index)?;
    write_candidate(engine, candidate)?;
    Ok(format!(
        "Loaded revision {index} into candidate {candidate}, \
        use compare to review it and commit to apply it"
    ))
}
