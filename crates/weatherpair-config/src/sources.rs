// Configuration source loading.
//
// Priority order:
// 1. Environment variables (WEATHERPAIR_* prefix, plus DATABASE_PATH)
// 2. Config file path from WEATHERPAIR_CONFIG
// 3. Inline config content from WEATHERPAIR_CONFIG_CONTENT
// 4. Default config files (./config.toml, ./.weatherpair.toml)
// 5. Built-in defaults

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::*;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const DEFAULT_CONFIG_FILES: &[&str] = &["./config.toml", "./.weatherpair.toml"];

/// Load configuration using the process environment and files.
pub fn load_config() -> Result<RuntimeConfig> {
    let env_source = StdEnvSource;
    let mut config = RuntimeConfig::default();

    if let Some(file_config) = load_from_file(&env_source)? {
        config.merge(file_config);
    }

    env_overrides::apply_env_overrides(&mut config, &env_source)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file<E: EnvSource>(env: &E) -> Result<Option<RuntimeConfig>> {
    if let Some(path) = env.get("CONFIG") {
        return parse_file(Path::new(&path)).map(Some);
    }

    if let Some(content) = env.get("CONFIG_CONTENT") {
        let config: RuntimeConfig = toml::from_str(&content).with_context(|| {
            format!("Failed to parse inline config from {}CONFIG_CONTENT", ENV_PREFIX)
        })?;
        return Ok(Some(config));
    }

    for path in DEFAULT_CONFIG_FILES {
        let path = Path::new(path);
        if path.exists() {
            return parse_file(path).map(Some);
        }
    }

    Ok(None)
}

fn parse_file(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from a specific file path (for CLI --config flag).
/// Returns error if file doesn't exist or can't be parsed.
///
/// Not validated: the CLI applies its own overrides first.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let file_config = parse_file(path.as_ref())?;

    let mut config = RuntimeConfig::default();
    config.merge(file_config);

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    Ok(config)
}

/// Load configuration with graceful fallback to defaults.
///
/// Not validated, like [`load_from_file_path`].
pub fn load_or_default() -> Result<RuntimeConfig> {
    let env_source = StdEnvSource;
    let mut config = RuntimeConfig::default();

    match load_from_file(&env_source) {
        Ok(Some(file_config)) => config.merge(file_config),
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unreadable config file; using defaults");
        }
    }

    env_overrides::apply_env_overrides(&mut config, &env_source)?;
    Ok(config)
}

pub fn load_with_env<E: EnvSource>(inline_config: Option<&str>, env: &E) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    if let Some(inline) = inline_config {
        let file_config: RuntimeConfig =
            toml::from_str(inline).context("Failed to parse inline config content")?;
        config.merge(file_config);
    }

    env_overrides::apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}
