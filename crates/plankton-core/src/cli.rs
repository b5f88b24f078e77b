//! Shared CLI helpers for workspace tools.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{Error, Result};

pub fn setup_cli_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logger: {e}")))?;

    Ok(())
}

/// Load a config file, picking the format from the extension.
///
/// `.yaml`/`.yml` are read with serde_yaml, `.toml` with toml.
pub fn load_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    if !path.is_file() {
        return Err(Error::NotFound(format!("config file {}", path.display())));
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config {}: {e}", path.display())))?;

    match extension(path).as_deref() {
        Some("toml") => toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display()))),
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display()))),
        _ => Err(Error::Config(format!(
            "Unsupported config format for {}, expected .yaml, .yml or .toml",
            path.display()
        ))),
    }
}

/// Write `value` as YAML, failing if `path` already exists.
pub fn write_yaml_snapshot<T>(value: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    let yaml = serde_yaml::to_string(value)?;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => Error::AlreadyExists(path.display().to_string()),
            _ => Error::Io(e),
        })?;
    std::io::Write::write_all(&mut file, yaml.as_bytes())?;
    Ok(())
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use tempfile::TempDir;

    #[test]
    fn test_load_yaml_and_toml_agree() {
        let dir = TempDir::new().unwrap();
        let config = TrainingConfig::default();

        let yaml_path = dir.path().join("config.yaml");
        fs::write(&yaml_path, serde_yaml::to_string(&config).unwrap()).unwrap();
        let toml_path = dir.path().join("config.toml");
        fs::write(&toml_path, toml::to_string(&config).unwrap()).unwrap();

        let from_yaml: TrainingConfig = load_config(&yaml_path).unwrap();
        let from_toml: TrainingConfig = load_config(&toml_path).unwrap();
        assert_eq!(from_yaml, config);
        assert_eq!(from_toml, config);
    }

    #[test]
    fn test_missing_config_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result: Result<TrainingConfig> = load_config(&dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        fs::write(&path, "seed = 1").unwrap();
        let result: Result<TrainingConfig> = load_config(&path);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_snapshot_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        write_yaml_snapshot(&TrainingConfig::default(), &path).unwrap();

        let err = write_yaml_snapshot(&TrainingConfig::default(), &path).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }
}
