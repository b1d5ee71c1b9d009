//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::MockConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// One immutable per-load snapshot: the validated document, the folder it
/// was loaded from, and every path a reload should watch. Replaced wholesale
/// on every reload; never mutated in place.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub document: MockConfig,
    pub base_dir: PathBuf,
    pub watch_paths: Vec<PathBuf>,
}

impl ConfigSnapshot {
    /// Resolve a document-relative path against the config folder.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.base_dir.join(relative)
    }
}

/// Load and validate a configuration document from a JSON file.
pub fn load_config(path: &Path) -> Result<ConfigSnapshot, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let document: MockConfig = serde_json::from_str(&content).map_err(ConfigError::Parse)?;

    validate_config(&document).map_err(ConfigError::Validation)?;

    let base_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let watch_paths = collect_watch_paths(path, &base_dir, &document);

    Ok(ConfigSnapshot {
        document,
        base_dir,
        watch_paths,
    })
}

/// The watch set: the config file, its folder, and every referenced
/// static/handler/asset/socket-handler path. Recomputed on every load, so
/// newly referenced files become watched after a reload.
fn collect_watch_paths(config_path: &Path, base_dir: &Path, document: &MockConfig) -> Vec<PathBuf> {
    let mut paths = vec![config_path.to_path_buf(), base_dir.to_path_buf()];
    let mut push = |candidate: PathBuf| {
        if !paths.contains(&candidate) {
            paths.push(candidate);
        }
    };

    for route in &document.http {
        if let Some(static_path) = &route.static_path {
            push(base_dir.join(static_path));
        }
        if let Some(handler) = &route.handler {
            push(base_dir.join(handler));
        }
        for asset in &route.assets {
            push(base_dir.join(asset));
        }
    }
    for route in &document.socket {
        push(base_dir.join(&route.handler));
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_builds_a_snapshot_with_watch_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("items.yaml"), "- id: 1\n").unwrap();
        std::fs::write(dir.path().join("h.rhai"), "fn get(req) { 1 }\n").unwrap();
        let config_path = dir.path().join("mock.json");
        std::fs::write(
            &config_path,
            r#"{
                "http": [
                    {"path": "/items/:id", "matchType": "params", "static": "items.yaml",
                     "contentType": "application/json", "index": true},
                    {"path": "/calc", "method": "GET", "handler": "h.rhai",
                     "assets": ["extra.txt"]}
                ]
            }"#,
        )
        .unwrap();

        let snapshot = load_config(&config_path).unwrap();
        assert_eq!(snapshot.base_dir, dir.path());
        assert!(snapshot.watch_paths.contains(&config_path));
        assert!(snapshot.watch_paths.contains(&dir.path().to_path_buf()));
        assert!(snapshot.watch_paths.contains(&dir.path().join("items.yaml")));
        assert!(snapshot.watch_paths.contains(&dir.path().join("h.rhai")));
        assert!(snapshot.watch_paths.contains(&dir.path().join("extra.txt")));
    }

    #[test]
    fn invalid_documents_fail_with_positions() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("mock.json");
        std::fs::write(
            &config_path,
            r#"{"http": [{"path": "/x", "method": "GET"}]}"#,
        )
        .unwrap();

        match load_config(&config_path) {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors[0].to_string().contains("http route[0]"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("mock.json");
        std::fs::write(&config_path, "{not json").unwrap();
        assert!(matches!(
            load_config(&config_path),
            Err(ConfigError::Parse(_))
        ));
    }
}
