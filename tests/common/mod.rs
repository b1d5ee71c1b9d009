//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use mimicd::config::load_config;
use mimicd::http::ServerInstance;
use mimicd::routing::compile;

/// A throwaway config folder for one test.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Write a file under the fixture folder, creating parent directories.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Write the configuration document and return its path.
    pub fn config(&self, document: serde_json::Value) -> PathBuf {
        self.write("mock.json", &document.to_string())
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Compile the config at `config_path` and serve it on an ephemeral port.
pub async fn start_server(config_path: &Path) -> (ServerInstance, SocketAddr) {
    let snapshot = load_config(config_path).unwrap();
    let table = compile(&snapshot).unwrap();
    let instance = ServerInstance::serve("127.0.0.1:0", table).await.unwrap();
    let addr = instance.local_addr();
    (instance, addr)
}

pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}
