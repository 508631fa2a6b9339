//! Main CLI application

use crate::config::{parse_script_file, yaml_to_json};
use crate::logging::{self, Verbosity};
use crate::runner::Engine;
use anyhow::{bail, Context as _};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// CLI application
pub struct App {
    /// Script to run
    script_path: PathBuf,
    /// Initial variables
    vars: Map<String, Value>,
    verbosity: Verbosity,
}

impl App {
    /// Create the app from parsed arguments
    pub fn from_matches(matches: &ArgMatches) -> anyhow::Result<Self> {
        let script_path = matches
            .get_one::<PathBuf>("script")
            .cloned()
            .context("no script given")?;

        let mut vars = Map::new();

        if let Some(path) = matches.get_one::<PathBuf>("vars-file") {
            let source = parse_script_file(path)
                .with_context(|| format!("failed to read variables from {}", path.display()))?;
            match source {
                Value::Object(map) => vars.extend(map),
                Value::Null => {}
                _ => bail!("variables file {} must contain an object", path.display()),
            }
        }

        if let Some(assignments) = matches.get_many::<String>("var") {
            for assignment in assignments {
                let (key, value) = parse_assignment(assignment)?;
                vars.insert(key, value);
            }
        }

        Ok(App {
            script_path,
            vars,
            verbosity: get_verbosity(matches),
        })
    }

    /// Run the script and print its result
    pub fn run(self) -> anyhow::Result<()> {
        logging::init(self.verbosity);

        let source = parse_script_file(&self.script_path)
            .with_context(|| format!("failed to load script {}", self.script_path.display()))?;

        let engine = Engine::new();
        let mut scope = engine.new_scope().with_vars(self.vars);
        let result = engine.execute(source, Some(&mut scope))?;

        if !result.is_null() && self.verbosity > Verbosity::Silent {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Ok(())
    }
}

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("taskscript")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run declarative YAML/JSON task scripts")
        .arg(
            Arg::new("script")
                .value_name("SCRIPT")
                .help("Path to the script file (YAML or JSON)")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("var")
                .short('e')
                .long("var")
                .value_name("KEY=VALUE")
                .help("Set a variable; the value is parsed as YAML")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("vars-file")
                .long("vars-file")
                .value_name("FILE")
                .help("Load variables from a YAML or JSON file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print errors")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output")
                .action(ArgAction::SetTrue),
        )
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// Parse a `KEY=VALUE` assignment; the value is read as a YAML scalar or collection
fn parse_assignment(assignment: &str) -> anyhow::Result<(String, Value)> {
    let Some((key, raw)) = assignment.split_once('=') else {
        bail!("invalid variable '{}', expected KEY=VALUE", assignment);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("invalid variable '{}', the name is empty", assignment);
    }

    let value = if raw.is_empty() {
        Value::String(String::new())
    } else {
        serde_yaml::from_str::<serde_yaml::Value>(raw)
            .ok()
            .and_then(|yaml| yaml_to_json(yaml).ok())
            .unwrap_or_else(|| Value::String(raw.to_string()))
    };

    Ok((key.to_string(), value))
}

/// Run the CLI application with command line arguments
pub fn run() -> anyhow::Result<()> {
    let matches = build_command().get_matches();
    App::from_matches(&matches)?.run()
}
