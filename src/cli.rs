use std::{env, path::PathBuf};

use anyhow::{Result, anyhow};

use crate::config::ModelBackend;

const USAGE: &str =
    "usage: dojo [--config <path>] [--backend emulation|simulation] [--list-actions] [<scenario>]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub backend: Option<ModelBackend>,
    pub list_actions: bool,
    pub scenario_path: Option<PathBuf>,
}

pub fn args_from_env() -> Result<CliArgs> {
    parse_args(env::args().skip(1))
}

pub fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut args = args.into_iter();
    let mut config_path = None;
    let mut backend = None;
    let mut list_actions = false;
    let mut scenario_path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("missing value for --config. {USAGE}"))?;
                config_path = Some(PathBuf::from(value));
            }
            "--backend" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("missing value for --backend. {USAGE}"))?;
                backend = Some(match value.as_str() {
                    "emulation" => ModelBackend::Emulation,
                    "simulation" => ModelBackend::Simulation,
                    other => return Err(anyhow!("unknown backend '{other}'. {USAGE}")),
                });
            }
            "--list-actions" => list_actions = true,
            flag if flag.starts_with("--") => {
                return Err(anyhow!("unknown argument: {flag}. {USAGE}"));
            }
            path => {
                if scenario_path.is_some() {
                    return Err(anyhow!("expected at most one scenario path. {USAGE}"));
                }
                scenario_path = Some(PathBuf::from(path));
            }
        }
    }

    if scenario_path.is_none() && !list_actions {
        return Err(anyhow!("nothing to do: pass a scenario or --list-actions. {USAGE}"));
    }

    Ok(CliArgs {
        config_path: config_path.unwrap_or_else(|| PathBuf::from("./dojo.jsonc")),
        backend,
        list_actions,
        scenario_path,
    })
}
