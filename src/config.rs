use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_yaml;
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::model::HighlightColor;

#[derive(Parser, Debug)]
#[command(name = "marginalia")]
#[command(about = "Stores web page highlights and restores them into documents", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Restore stored highlights into an HTML file
    Render {
        #[arg(long)]
        url: String,
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print stored highlights as JSON
    List {
        #[arg(long)]
        url: Option<String>,
    },
    /// Delete a highlight by id
    Delete { id: String },
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".marginalia")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    #[serde(default = "default_port")]
    port: i32,
    #[serde(default = "default_store")]
    store: String,
    #[serde(default)]
    pub default_color: HighlightColor,
}

impl Default for App {
    fn default() -> Self {
        App {
            port: default_port(),
            store: default_store(),
            default_color: HighlightColor::default(),
        }
    }
}

fn default_port() -> i32 {
    7420
}

fn default_store() -> String {
    "store".to_string()
}

impl App {
    pub fn get_port(&self) -> i32 {
        self.port
    }

    pub fn get_store(&self) -> &str {
        &self.store
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: App,
}

impl Config {
    /// Loads the YAML config at `path`. A missing file yields the defaults.
    pub fn new(path: &str) -> Result<Self> {
        if !std::path::Path::new(path).exists() {
            tracing::info!(path, "no config file found, using defaults");
            return Ok(Config::default());
        }
        Config::load_config(path)
    }

    fn load_config(path: &str) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)?;
        Config::from_yaml(&yaml_str)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Config> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                // ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!("environment variable '{}' not found", var_name);
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let cfg = Config::from_yaml("app: {}").unwrap();
        assert_eq!(cfg.app.get_port(), 7420);
        assert_eq!(cfg.app.get_store(), "store");
        assert_eq!(cfg.app.default_color, HighlightColor::Yellow);
    }

    #[test]
    fn test_config_env_substitution_with_default() {
        let yaml = "app:\n  port: ${MARGINALIA_TEST_UNSET_PORT:-9001}\n  store: notes\n  default_color: pink\n";
        let cfg = Config::from_yaml(yaml).unwrap();
        assert_eq!(cfg.app.get_port(), 9001);
        assert_eq!(cfg.app.get_store(), "notes");
        assert_eq!(cfg.app.default_color, HighlightColor::Pink);
    }

    #[test]
    fn test_cli_parses_render() {
        let cli = Cli::parse_from([
            "marginalia",
            "-c",
            "/tmp/c.yaml",
            "render",
            "--url",
            "https://e.com",
            "-i",
            "page.html",
        ]);
        assert_eq!(cli.config_path.as_deref(), Some("/tmp/c.yaml"));
        assert!(matches!(cli.command, Some(Command::Render { ref url, .. }) if url == "https://e.com"));
    }
}
