//! Config resolution: CLI → env → XDG → defaults.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::bench::BenchConfig;
use crate::validate::{validate, ValidationError};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "SPLAT_BENCH_CONFIG";

/// Directory name under the XDG config dir.
const CONFIG_DIR_NAME: &str = "splat_bench";

/// Config file name inside the XDG directory.
const CONFIG_FILE_NAME: &str = "config.json";

/// Where the effective config came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ConfigSource {
    Cli(PathBuf),
    Env(PathBuf),
    Xdg(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Cli(p) | ConfigSource::Env(p) | ConfigSource::Xdg(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }
}

/// A loaded, validated config and its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub source: ConfigSource,
    pub config: BenchConfig,
}

/// Resolve the effective config.
///
/// Explicit paths (CLI flag or env var) must exist and parse. The XDG file is
/// optional; when absent the built-in defaults are used.
pub fn resolve_config(cli_path: Option<&Path>) -> Result<ResolvedConfig, ValidationError> {
    let resolved = load_unvalidated(cli_path)?;
    validate(&resolved.config).into_result()?;
    Ok(resolved)
}

/// Locate and parse the effective config without semantic validation,
/// for reporting every problem at once.
pub fn load_unvalidated(cli_path: Option<&Path>) -> Result<ResolvedConfig, ValidationError> {
    let env_path = std::env::var_os(CONFIG_ENV_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    locate_and_parse(cli_path, env_path, default_config_path())
}

fn resolve_with(
    cli_path: Option<&Path>,
    env_path: Option<PathBuf>,
    xdg_path: Option<PathBuf>,
) -> Result<ResolvedConfig, ValidationError> {
    let resolved = locate_and_parse(cli_path, env_path, xdg_path)?;
    validate(&resolved.config).into_result()?;
    Ok(resolved)
}

fn locate_and_parse(
    cli_path: Option<&Path>,
    env_path: Option<PathBuf>,
    xdg_path: Option<PathBuf>,
) -> Result<ResolvedConfig, ValidationError> {
    let source = if let Some(path) = cli_path {
        ConfigSource::Cli(path.to_path_buf())
    } else if let Some(path) = env_path {
        ConfigSource::Env(path)
    } else {
        match xdg_path {
            Some(path) if path.is_file() => ConfigSource::Xdg(path),
            _ => ConfigSource::Defaults,
        }
    };

    let config = match source.path() {
        Some(path) => BenchConfig::from_file(path)?,
        None => BenchConfig::default(),
    };
    Ok(ResolvedConfig { source, config })
}

/// Default per-user config file location.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
