// SPDX-License-Identifier: Apache-2.0

use rtconf::{CommitOptions, CommitReport, Engine, DEFAULT_CONFIRM_MINUTES};

use crate::candidate::{del_file, open_candidate, CANDIDATE_KEY};
use crate::error::CliError;

const DEFAULT_COMMIT_USER: &str = "root";

fn commit_user() -> String {
    std::env::var("SUDO_USER")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| DEFAULT_COMMIT_USER.to_string())
}

fn commit_options(matches: &clap::ArgMatches) -> CommitOptions {
    let mut opts = CommitOptions::new().with_user(&commit_user());
    if let Some(comment) = matches.value_of("COMMENT") {
        opts = opts.with_comment(comment);
    }
    if matches.is_present("DRY_RUN") {
        opts = opts.dry_run();
    }
    opts
}

// Ctrl-C stops the in-flight commit between handlers.
fn set_ctrl_c_action(engine: &Engine) -> Result<(), CliError> {
    let token = engine.cancel_token().clone();
    ctrlc::set_handler(move || {
        eprintln!("Interrupted, cancelling the commit");
        token.cancel();
    })?;
    Ok(())
}

fn report_to_string(report: &CommitReport) -> String {
    if !report.changed {
        "No configuration changes to commit".to_string()
    } else if report.dry_run {
        format!("Dry run, affected: {}", report.handlers.join(" "))
    } else {
        format!("Committed: {}", report.handlers.join(" "))
    }
}

pub(crate) fn commit(
    engine: &mut Engine,
    matches: &clap::ArgMatches,
) -> Result<String, CliError> {
    let candidate = matches.value_of(CANDIDATE_KEY).ok_or_else(|| {
        CliError::usage("Candidate file required (--candidate)".to_string())
    })?;
    open_candidate(engine, candidate)?;
    set_ctrl_c_action(engine)?;
    let report = engine.commit(&commit_options(matches))?;
    if report.changed && !report.dry_run {
        engine.save()?;
        del_file(candidate);
    }
    Ok(report_to_string(&report))
}

// The saved configuration is only updated once the commit is confirmed.
pub(crate) fn commit_confirm(
    engine: &mut Engine,
    matches: &clap::ArgMatches,
) -> Result<String, CliError> {
    let candidate = matches.value_of(CANDIDATE_KEY).ok_or_else(|| {
        CliError::usage("Candidate file required (--candidate)".to_string())
    })?;
    let minutes: u32 = match matches.value_of("MINUTES") {
        Some(_) => matches.value_of_t("MINUTES")?,
        None => DEFAULT_CONFIRM_MINUTES,
    };
    open_candidate(engine, candidate)?;
    set_ctrl_c_action(engine)?;
    let report = engine.commit_confirm(minutes, &commit_options(matches))?;
    if !report.changed || report.dry_run {
        return Ok(report_to_string(&report));
    }
    del_file(candidate);
    Ok(format!(
        "{}\n{minutes} minutes to confirm before the previous configuration \
        is restored",
        report_to_string(&report)
    ))
}

pub(crate) fn confirm(
    engine: &mut Engine,
    _matches: &clap::ArgMatches,
) -> Result<String, CliError> {
    Ok(if engine.confirm()? {
        engine.save()?;
        "Commit confirmed, revert timer stopped".to_string()
    } else {
        "No confirm pending".to_string()
    })
}

pub(crate) fn revert(
    engine: &mut Engine,
    _matches: &clap::ArgMatches,
) -> Result<String, CliError> {
    Ok(match engine.revert()? {
        Some(report) => {
            engine.save()?;
            format!("Reverted unconfirmed commit\n{}", report_to_string(&report))
        }
        None => "No confirm pending".to_string(),
    })
}

pub(crate) fn rollback(
    engine: &mut Engine,
    matches: &clap::ArgMatches,
) -> Result<String, CliError> {
    let index: usize = matches.value_of_t("REVISION")?;
    set_ctrl_c_action(engine)?;
    let report = engine.rollback(index, &commit_options(matches))?;
    if report.changed && !report.dry_run {
        engine.save()?;
    }
    Ok(report_to_string(&report))
}

pub(crate) fn save(
    engine: &mut Engine,
    matches: &clap::ArgMatches,
) -> Result<String, CliError> {
    match matches.value_of("FILE") {
        Some(file_path) => {
            engine.store().save(std::path::Path::new(file_path))?;
            Ok(format!("Saved running configuration to {file_path}"))
        }
        None => {
            engine.save()?;
            Ok(format!(
                "Saved running configuration to {}",
                engine.config().config_file.display()
            ))
        }
    }
}

pub(crate) fn log(
    engine: &mut Engine,
    matches: &clap::ArgMatches,
) -> Result<String, CliError> {
    if let Some(index) = matches.value_of("COMPARE") {
        let index: usize = index.parse().map_err(|e| {
            CliError::usage(format!("Invalid revision index {index}: {e}"))
        })?;
        return Ok(engine.compare_revision(index)?);
    }
    let entries = engine.log()?;
    Ok(if matches.is_present("JSON") {
        serde_json::to_string_pretty(&entries)?
    } else {
        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let mut line = format!(
                    "{index}   {} by {} via revision {}",
                    entry.timestamp, entry.user, entry.revision
                );
                if !entry.comment.is_empty() {
                    line.push_str(&format!("\n    {}", entry.comment));
                }
                line
            })
            .collect::<Vec<String>>()
            .join("\n")
    })
}
