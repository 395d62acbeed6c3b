// SPDX-License-Identifier: Apache-2.0

mod candidate;
mod commit;
mod config;
mod error;
mod show;

use env_logger::Builder;
use log::LevelFilter;
use rtconf::Engine;

use crate::config::{load_config, DEFAULT_CONFIG_PATH};
use crate::error::{CliError, DEFAULT_ERROR_CODE};

const APP_NAME: &str = "rtconfctl";

const SUB_CMD_SHOW: &str = "show";
const SUB_CMD_SET: &str = "set";
const SUB_CMD_DELETE: &str = "delete";
const SUB_CMD_COMPARE: &str = "compare";
const SUB_CMD_COMMIT: &str = "commit";
const SUB_CMD_COMMIT_CONFIRM: &str = "commit-confirm";
const SUB_CMD_CONFIRM: &str = "confirm";
const SUB_CMD_REVERT: &str = "revert";
const SUB_CMD_SAVE: &str = "save";
const SUB_CMD_LOAD: &str = "load";
const SUB_CMD_LOG: &str = "log";
const SUB_CMD_ROLLBACK: &str = "rollback";
const SUB_CMD_LOAD_REVISION: &str = "load-revision";
const SUB_CMD_VERSION: &str = "version";

const DEFAULT_CANDIDATE_PATH: &str = "/run/rtconf/candidate.conf";

fn candidate_arg() -> clap::Arg<'static> {
    clap::Arg::new(candidate::CANDIDATE_KEY)
        .long("candidate")
        .takes_value(true)
        .default_value(DEFAULT_CANDIDATE_PATH)
        .help("Candidate configuration file holding uncommitted changes")
}

fn path_arg(required: bool) -> clap::Arg<'static> {
    clap::Arg::new("PATH")
        .index(1)
        .required(required)
        .multiple_values(true)
        .help("Configuration path, optionally followed by a value")
}

fn commit_args(cmd: clap::Command<'static>) -> clap::Command<'static> {
    cmd.arg(
        clap::Arg::new("COMMENT")
            .short('m')
            .long("comment")
            .takes_value(true)
            .help("Comment stored in the commit log"),
    )
    .arg(
        clap::Arg::new("DRY_RUN")
            .long("dry-run")
            .takes_value(false)
            .help("Verify and render without touching the system"),
    )
}

fn main() {
    let matches = clap::Command::new(APP_NAME)
        .version(clap::crate_version!())
        .about("Command line of rtconf")
        .subcommand_required(true)
        .arg(
            clap::Arg::new("verbose")
                .short('v')
                .multiple_occurrences(true)
                .help("Set verbose level")
                .global(true),
        )
        .arg(
            clap::Arg::new("quiet")
                .short('q')
                .help("Disable logging")
                .global(true),
        )
        .arg(
            clap::Arg::new("CONFIG")
                .short('c')
                .long("config")
                .takes_value(true)
                .default_value(DEFAULT_CONFIG_PATH)
                .help("Engine settings file")
                .global(true),
        )
        .subcommand(
            clap::Command::new(SUB_CMD_SHOW)
                .about("Show the running or candidate configuration")
                .arg(path_arg(false))
                .arg(
                    clap::Arg::new(candidate::CANDIDATE_KEY)
                        .long("candidate")
                        .takes_value(true)
                        .help("Show this candidate instead of running"),
                )
                .arg(
                    clap::Arg::new("JSON")
                        .long("json")
                        .takes_value(false)
                        .conflicts_with_all(&["YAML", "COMMANDS"])
                        .help("Show configuration in json format"),
                )
                .arg(
                    clap::Arg::new("YAML")
                        .long("yaml")
                        .takes_value(false)
                        .conflicts_with("COMMANDS")
                        .help("Show configuration in yaml format"),
                )
                .arg(
                    clap::Arg::new("COMMANDS")
                        .long("commands")
                        .takes_value(false)
                        .help("Show configuration as set commands"),
                )
                .arg(
                    clap::Arg::new("SHOW_SECRETS")
                        .short('s')
                        .long("show-secrets")
                        .takes_value(false)
                        .help("Show secrets(hide by default)"),
                ),
        )
        .subcommand(
            clap::Command::new(SUB_CMD_SET)
                .about("Set a node or value in the candidate")
                .arg(path_arg(true))
                .arg(candidate_arg()),
        )
        .subcommand(
            clap::Command::new(SUB_CMD_DELETE)
                .about("Delete a node or value from the candidate")
                .arg(path_arg(true))
                .arg(candidate_arg()),
        )
        .subcommand(
            clap::Command::new(SUB_CMD_COMPARE)
                .about("Show commands turning running into the candidate")
                .arg(candidate_arg()),
        )
        .subcommand(commit_args(
            clap::Command::new(SUB_CMD_COMMIT)
                .about("Commit the candidate to the system")
                .arg(candidate_arg()),
        ))
        .subcommand(commit_args(
            clap::Command::new(SUB_CMD_COMMIT_CONFIRM)
                .about(
                    "Commit the candidate, restoring the previous \
                    configuration unless confirmed in time",
                )
                .arg(
                    clap::Arg::new("MINUTES")
                        .index(1)
                        .help("Minutes to confirm the commit, 10 by default"),
                )
                .arg(candidate_arg()),
        ))
        .subcommand(
            clap::Command::new(SUB_CMD_CONFIRM)
                .about("Keep the changes of a pending commit-confirm"),
        )
        .subcommand(
            clap::Command::new(SUB_CMD_REVERT)
                .about("Restore the configuration preceding a pending commit-confirm"),
        )
        .subcommand(
            clap::Command::new(SUB_CMD_SAVE)
                .about("Save the running configuration")
                .arg(
                    clap::Arg::new("FILE")
                        .index(1)
                        .help("Destination, the configured file by default"),
                ),
        )
        .subcommand(
            clap::Command::new(SUB_CMD_LOAD)
                .about("Replace the candidate with a configuration file")
                .arg(
                    clap::Arg::new("FILE")
                        .index(1)
                        .required(true)
                        .help("Configuration file in text form"),
                )
                .arg(candidate_arg()),
        )
        .subcommand(
            clap::Command::new(SUB_CMD_LOG)
                .about("Show the commit log")
                .arg(
                    clap::Arg::new("COMPARE")
                        .long("compare")
                        .takes_value(true)
                        .help("Compare archived revision with running"),
                )
                .arg(
                    clap::Arg::new("JSON")
                        .long("json")
                        .takes_value(false)
                        .help("Show commit log in json format"),
                ),
        )
        .subcommand(commit_args(
            clap::Command::new(SUB_CMD_ROLLBACK)
                .about("Commit an archived revision")
                .arg(
                    clap::Arg::new("REVISION")
                        .index(1)
                        .required(true)
                        .help("Revision index, 0 being the newest"),
                ),
        ))
        .subcommand(
            clap::Command::new(SUB_CMD_LOAD_REVISION)
                .about("Load an archived revision into the candidate")
                .arg(
                    clap::Arg::new("REVISION")
                        .index(1)
                        .required(true)
                        .help("Revision index, 0 being the newest"),
                )
                .arg(candidate_arg()),
        )
        .subcommand(
            clap::Command::new(SUB_CMD_VERSION).about("Show version"),
        )
        .get_matches();

    let (log_module_filters, log_level) =
        match matches.occurrences_of("verbose") {
            0 => (vec!["rtconf", "rtconfctl"], LevelFilter::Info),
            1 => (vec!["rtconf", "rtconfctl"], LevelFilter::Debug),
            _ => (vec![""], LevelFilter::Debug),
        };

    if !matches.is_present("quiet") {
        let mut log_builder = Builder::new();
        for log_module_filter in log_module_filters {
            if !log_module_filter.is_empty() {
                log_builder.filter(Some(log_module_filter), log_level);
            } else {
                log_builder.filter(None, log_level);
            }
        }
        log_builder.init();
    }

    if matches.subcommand_matches(SUB_CMD_VERSION).is_some() {
        print_string_and_exit(format!("{} {}", APP_NAME, clap::crate_version!()));
    }

    let config_path = matches.value_of("CONFIG").unwrap_or(DEFAULT_CONFIG_PATH);
    let mut engine = match open_engine(config_path) {
        Ok(e) => e,
        Err(e) => print_error_and_exit(e),
    };

    let result = match matches.subcommand() {
        Some((SUB_CMD_SHOW, m)) => show::show(&mut engine, m),
        Some((SUB_CMD_SET, m)) => candidate::set(&mut engine, m),
        Some((SUB_CMD_DELETE, m)) => candidate::delete(&mut engine, m),
        Some((SUB_CMD_COMPARE, m)) => candidate::compare(&mut engine, m),
        Some((SUB_CMD_LOAD, m)) => candidate::load(&mut engine, m),
        Some((SUB_CMD_COMMIT, m)) => commit::commit(&mut engine, m),
        Some((SUB_CMD_COMMIT_CONFIRM, m)) => {
            commit::commit_confirm(&mut engine, m)
        }
        Some((SUB_CMD_CONFIRM, m)) => commit::confirm(&mut engine, m),
        Some((SUB_CMD_REVERT, m)) => commit::revert(&mut engine, m),
        Some((SUB_CMD_ROLLBACK, m)) => commit::rollback(&mut engine, m),
        Some((SUB_CMD_LOAD_REVISION, m)) => {
            candidate::load_revision(&mut engine, m)
        }
        Some((SUB_CMD_SAVE, m)) => commit::save(&mut engine, m),
        Some((SUB_CMD_LOG, m)) => commit::log(&mut engine, m),
        _ => Err(CliError::usage("Unknown sub-command".to_string())),
    };
    print_result_and_exit(result);
}

fn open_engine(config_path: &str) -> Result<Engine, CliError> {
    let mut engine = Engine::new(load_config(config_path)?)?;
    engine.open()?;
    Ok(engine)
}

fn print_result_and_exit(result: Result<String, CliError>) {
    match result {
        Ok(s) => print_string_and_exit(s),
        Err(e) => print_error_and_exit(e),
    }
}

fn print_error_and_exit(e: CliError) -> ! {
    eprintln!("{e}");
    std::process::exit(if e.code == 0 { DEFAULT_ERROR_CODE } else { e.code });
}

fn print_string_and_exit(s: String) -> ! {
    if !s.is_empty() {
        println!("{s}");
    }
    std::process::exit(0);
}
