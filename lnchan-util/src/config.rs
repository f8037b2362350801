use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lnchan::config::EngineConfig;
use log::{debug, info};
use toml::value::{Table, Value};

use crate::env_var::apply_env_overrides;

pub const DEFAULT_DIR: &str = ".lnchan";
pub const CONFIG_FILE: &str = "lnchan.toml";

/// `~/.lnchan`, or `.lnchan` in the working directory if there is no home
pub fn default_datadir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(DEFAULT_DIR),
        None => PathBuf::from(DEFAULT_DIR),
    }
}

/// Parse an engine configuration file.  Missing keys take their defaults.
pub fn parse_engine_config(contents: &str) -> Result<EngineConfig> {
    let config: EngineConfig = toml::from_str(contents)?;
    Ok(config)
}

/// Load `<datadir>/lnchan.toml` if present, then apply `LNCHAN_*`
/// environment overrides
pub fn load_engine_config(datadir: &Path) -> Result<EngineConfig> {
    let path = datadir.join(CONFIG_FILE);
    let config = if path.exists() {
        let contents =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        info!("using config {}", path.display());
        parse_engine_config(&contents).with_context(|| format!("parsing {}", path.display()))?
    } else {
        debug!("no config at {}, using defaults", path.display());
        EngineConfig::default()
    };
    Ok(apply_env_overrides(config)?.sanitized())
}

/// Turn a toml file of `key = value` lines into `--key=value` arguments, so
/// that a file can stand in for command line flags
pub fn toml_to_args(path: &Path) -> Result<Vec<String>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let table: Table =
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(table
        .into_iter()
        .flat_map(|(k, value)| convert_toml_value(k, value))
        .map(|(k, v)| format!("--{}={}", k, v))
        .collect())
}

fn convert_toml_value(key: String, value: Value) -> Vec<(String, String)> {
    match value {
        Value::String(s) => vec![(key, s)],
        Value::Integer(v) => vec![(key, v.to_string())],
        Value::Float(v) => vec![(key, v.to_string())],
        Value::Boolean(v) => vec![(key, v.to_string())],
        Value::Datetime(v) => vec![(key, v.to_string())],
        Value::Array(a) =>
            a.into_iter().flat_map(|v| convert_toml_value(key.clone(), v)).collect::<Vec<_>>(),
        Value::Table(_) => vec![],
    }
}

/// Expand `--config FILE` and `--config=FILE` in place.  Later arguments
/// override earlier ones, so flags after the file win.
pub fn expand_config_args(args: &[String]) -> Result<Vec<String>> {
    let mut res = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(path) = arg.strip_prefix("--config=") {
            res.extend(toml_to_args(Path::new(path))?);
        } else if arg == "--config" {
            match iter.next() {
                Some(path) => res.extend(toml_to_args(Path::new(path))?),
                // let clap report it
                None => res.push(arg.clone()),
            }
        } else {
            res.push(arg.clone());
        }
    }
    Ok(res)
}
