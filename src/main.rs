use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use weatherpair_config::{RuntimeConfig, StorageBackend};

/// Pairs readings from two weather sensors and stores them as aligned rows
#[derive(Parser)]
#[command(name = "weatherpair")]
#[command(version)]
#[command(about = "Pairs readings from two weather sensors into aligned SQLite rows", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP listen port (overrides config file)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// SQLite database file (sqlite backend only)
    #[arg(short, long, value_name = "PATH")]
    database: Option<PathBuf>,

    /// Seconds to wait for the partner sensor before writing alone
    #[arg(short = 'w', long, value_name = "SECS")]
    pair_window: Option<u64>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    prepare_database_dir(&config)?;

    weatherpair_server::run_with_config(config).await
}

/// Files and environment first, then CLI flags, then a single validation.
fn load_config(cli: &Cli) -> Result<RuntimeConfig> {
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        RuntimeConfig::load_or_default().context("Failed to load configuration")?
    };

    // CLI flags have the highest priority
    apply_cli_overrides(&mut config, cli)?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) -> Result<()> {
    if let Some(port) = cli.port {
        let host = config
            .server
            .listen_addr
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or("0.0.0.0");
        config.server.listen_addr = format!("{}:{}", host, port);
    }

    if let Some(database) = &cli.database {
        if config.storage.backend != StorageBackend::Sqlite {
            anyhow::bail!(
                "--database flag only works with the sqlite backend, but backend is '{}'.\n\
                Either remove --database or set storage.backend = \"sqlite\".",
                config.storage.backend
            );
        }
        config.storage.sqlite.path = database.to_string_lossy().to_string();
    }

    if let Some(secs) = cli.pair_window {
        config.sync.pair_window_secs = secs;
    }

    if let Some(level) = &cli.log_level {
        config.server.log_level = level.clone();
    }

    Ok(())
}

/// Create the database's parent directory so SQLite can create the file.
fn prepare_database_dir(config: &RuntimeConfig) -> Result<()> {
    if config.storage.backend != StorageBackend::Sqlite {
        return Ok(());
    }

    let parent = Path::new(&config.storage.sqlite.path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = parent {
        if !dir.exists() {
            std::fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create database directory: {}", dir.display())
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cli_overrides_take_priority() {
        let cli = Cli::parse_from([
            "weatherpair",
            "--port",
            "8080",
            "--database",
            "/tmp/weather.db",
            "--pair-window",
            "30",
            "-v",
            "debug",
        ]);
        let mut config = RuntimeConfig::default();
        apply_cli_overrides(&mut config, &cli).unwrap();

        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.storage.sqlite.path, "/tmp/weather.db");
        assert_eq!(config.sync.pair_window_secs, 30);
        assert_eq!(config.server.log_level, "debug");
    }

    #[test]
    fn port_override_keeps_host() {
        let cli = Cli::parse_from(["weatherpair", "-p", "9000"]);
        let mut config = RuntimeConfig::default();
        config.server.listen_addr = "127.0.0.1:5000".to_string();
        apply_cli_overrides(&mut config, &cli).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:9000");
    }

    #[test]
    fn cli_flag_fixes_invalid_file_value() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sync]\npair_window_secs = 0").unwrap();
        let path = file.path().to_str().unwrap();

        let cli = Cli::parse_from(["weatherpair", "--config", path, "--pair-window", "5"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.sync.pair_window_secs, 5);

        // Without the flag the file value is still rejected.
        let cli = Cli::parse_from(["weatherpair", "--config", path]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn database_flag_requires_sqlite_backend() {
        let cli = Cli::parse_from(["weatherpair", "--database", "x.db"]);
        let mut config = RuntimeConfig::default();
        config.storage.backend = StorageBackend::Memory;
        assert!(apply_cli_overrides(&mut config, &cli).is_err());
    }
}
