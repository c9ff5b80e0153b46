use crate::app::cli::Cli;
use crate::app::matcher::parse_patterns;
use crate::app::models::RuntimeConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_ROOT: &str = "/srv/http";
const DEFAULT_PORT: u16 = 8043;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    path: Option<PathBuf>,
    port: Option<u16>,
    env_include: Option<Vec<String>>,
    env_exclude: Option<Vec<String>>,
    allow_missing_env: Option<bool>,
    log_level: Option<String>,
    context: Option<String>,
    fallback: Option<String>,
    enable_health: Option<bool>,
    https_promote: Option<bool>,
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("envfs").join("config.toml"))
}

/// Reads `path`; a missing file is only an error when it was asked for
/// explicitly.
fn load_config_file(path: &Path, required: bool) -> Result<FileConfig> {
    if !required && !path.exists() {
        return Ok(FileConfig::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {:?}", path))?;

    toml::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
}

/// Config-file entries first, then CLI entries, deduplicated in order.
fn merge_vecs(file_vec: Option<Vec<String>>, cli_vec: Vec<String>) -> Vec<String> {
    let mut combined: Vec<String> = file_vec
        .unwrap_or_default()
        .iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
    combined.extend(cli_vec);
    let mut seen = std::collections::HashSet::new();
    combined.retain(|item| seen.insert(item.clone()));
    combined
}

/// `/doc/`, `doc/` and `doc` all name the same prefix; an empty one is none.
fn normalize_context(context: Option<String>) -> Option<String> {
    context
        .map(|c| c.trim_matches('/').to_string())
        .filter(|c| !c.is_empty())
}

fn merge(cli: Cli, file: FileConfig) -> RuntimeConfig {
    RuntimeConfig {
        root: cli
            .path
            .or(file.path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT)),
        port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
        include: merge_vecs(
            file.env_include,
            parse_patterns(cli.env_include.as_deref().unwrap_or_default()),
        ),
        exclude: merge_vecs(
            file.env_exclude,
            parse_patterns(cli.env_exclude.as_deref().unwrap_or_default()),
        ),
        allow_missing_env: cli
            .allow_missing_env
            .or(file.allow_missing_env)
            .unwrap_or(false),
        log_level: cli
            .log_level
            .or(file.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        context: normalize_context(cli.context.or(file.context)),
        fallback: cli.fallback.or(file.fallback).filter(|path| !path.is_empty()),
        enable_health: cli.enable_health || file.enable_health.unwrap_or(false),
        https_promote: cli.https_promote || file.https_promote.unwrap_or(false),
        check_only: cli.check_only,
        render: cli.render,
    }
}

pub fn resolve_config(cli: Cli) -> Result<RuntimeConfig> {
    let file = match cli.config.clone() {
        Some(path) => load_config_file(&path, true)?,
        None => match default_config_path() {
            Some(path) => load_config_file(&path, false)?,
            None => FileConfig::default(),
        },
    };

    Ok(merge(cli, file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("envfs").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = merge(cli(&[]), FileConfig::default());
        assert_eq!(config.root, PathBuf::from("/srv/http"));
        assert_eq!(config.port, 8043);
        assert!(config.include.is_empty());
        assert!(config.exclude.is_empty());
        assert!(!config.allow_missing_env);
        assert_eq!(config.log_level, "info");
        assert!(config.context.is_none());
        assert!(config.fallback.is_none());
        assert!(!config.enable_health);
        assert!(!config.https_promote);
        assert!(!config.check_only);
        assert!(config.render.is_none());
    }

    #[test]
    fn test_cli_patterns_are_split() {
        let config = merge(
            cli(&["--env-include", "src, public,,", "--env-exclude", "node_modules"]),
            FileConfig::default(),
        );
        assert_eq!(config.include, vec!["src", "public"]);
        assert_eq!(config.exclude, vec!["node_modules"]);
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
path = "/var/www"
port = 9000
env_include = ["src", "docs/v*"]
env_exclude = ["vendor"]
allow_missing_env = true
log_level = "debug"
"#,
        )
        .unwrap();

        let file = load_config_file(&path, true).unwrap();
        let config = merge(
            cli(&["--port", "8080", "--env-include", "src,public"]),
            file,
        );
        assert_eq!(config.root, PathBuf::from("/var/www"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.include, vec!["src", "docs/v*", "public"]);
        assert_eq!(config.exclude, vec!["vendor"]);
        assert!(config.allow_missing_env);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert_eq!(load_config_file(&path, false).unwrap(), FileConfig::default());
        assert!(load_config_file(&path, true).is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "prot = 80\n").unwrap();
        assert!(load_config_file(&path, true).is_err());
    }

    #[test]
    fn test_resolve_with_explicit_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("envfs.toml");
        fs::write(&path, "env_exclude = [\"node_modules\"]\n").unwrap();
        let config = resolve_config(cli(&[
            "--config",
            path.to_str().unwrap(),
            "--check-only",
            "--allow-missing-env",
        ]))
        .unwrap();
        assert_eq!(config.exclude, vec!["node_modules"]);
        assert!(config.check_only);
        assert!(config.allow_missing_env);
    }

    #[test]
    fn test_cli_can_disable_allow_missing_env() {
        let file = FileConfig {
            allow_missing_env: Some(true),
            ..FileConfig::default()
        };
        let config = merge(cli(&["--allow-missing-env=false"]), file.clone());
        assert!(!config.allow_missing_env);

        let config = merge(cli(&[]), file);
        assert!(config.allow_missing_env);

        let config = merge(cli(&["--allow-missing-env"]), FileConfig::default());
        assert!(config.allow_missing_env);
    }

    #[test]
    fn test_serving_options() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "context = \"/doc/\"\nfallback = \"/index.html\"\nenable_health = true\n",
        )
        .unwrap();

        let file = load_config_file(&path, true).unwrap();
        let config = merge(cli(&["--https-promote"]), file.clone());
        assert_eq!(config.context.as_deref(), Some("doc"));
        assert_eq!(config.fallback.as_deref(), Some("/index.html"));
        assert!(config.enable_health);
        assert!(config.https_promote);

        let config = merge(cli(&["--context", "/", "--fallback", "index.html"]), file);
        assert!(config.context.is_none());
        assert_eq!(config.fallback.as_deref(), Some("index.html"));
    }
}
