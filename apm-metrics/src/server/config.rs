//! Command line and file configuration for the server binary.

use std::collections::HashMap;
use std::path::Path;

use clap::Parser;
use serde_yaml::Value;

use crate::error::{Error, Result};

/// CLI arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "apm-metrics")]
#[command(about = "Caches a Prometheus text endpoint and serves range queries over it")]
pub struct CliArgs {
    /// Path to a YAML file holding the flat plugin settings (url, refresh, ...)
    #[arg(short, long, env = "APM_METRICS_CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(short, long, default_value = "9091", env = "APM_METRICS_PORT")]
    pub port: u16,

    /// Setting in key=value form, overriding the file. May be repeated.
    #[arg(short = 's', long = "set", value_parser = parse_setting)]
    pub settings: Vec<(String, String)>,
}

impl CliArgs {
    /// Merges the settings file, if any, with `--set` overrides.
    pub fn settings_map(&self) -> Result<HashMap<String, String>> {
        let mut settings = match &self.config {
            Some(path) => load_settings(path)?,
            None => HashMap::new(),
        };
        settings.extend(self.settings.iter().cloned());
        Ok(settings)
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 9091 }
    }
}

impl From<&CliArgs> for ServerConfig {
    fn from(args: &CliArgs) -> Self {
        Self { port: args.port }
    }
}

fn parse_setting(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid setting {:?}, expected key=value", raw))?;
    if key.is_empty() {
        return Err(format!("invalid setting {:?}, empty key", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Load settings from a YAML file of scalar values.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let contents = std::fs::read_to_string(path.as_ref())
        .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
    parse_settings_yaml(&contents)
}

fn parse_settings_yaml(contents: &str) -> Result<HashMap<String, String>> {
    let raw: HashMap<String, Value> = serde_yaml::from_str(contents)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

    raw.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                _ => {
                    return Err(Error::Config(format!(
                        "setting {:?} must be a scalar value",
                        key
                    )));
                }
            };
            Ok((key, value))
        })
        .collect()
}
