//! Reload supervision.
//!
//! # Responsibilities
//! - Load + validate + compile + bind, as one fail-fast start step
//! - Watch every path the current snapshot references
//! - On a watch trigger, close the running instance and start again
//!
//! # Design Decisions
//! - Close-then-recreate: a short unavailability window is accepted in
//!   exchange for never having two listeners on one address
//! - A reload that fails to compile is exactly a startup failure; the
//!   process exits rather than limping on a stale instance
//! - Watch events are debounced briefly, since editors fire bursts

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::config::watcher::ConfigWatcher;
use crate::config::{load_config, ConfigError};
use crate::http::ServerInstance;
use crate::routing::{compile, CompileError};

/// Fatal failure bringing an instance up. Reload failures are the same
/// thing: there is no fallback instance.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("route compilation failed: {0}")]
    Compile(#[from] CompileError),
    #[error("listener error: {0}")]
    Bind(#[from] std::io::Error),
    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupervisorState {
    Stopped,
    Starting,
    Running,
}

enum WatchOutcome {
    Changed,
    InstanceExited(Result<(), std::io::Error>),
}

/// Owns the one live server instance and replaces it on watch triggers.
pub struct Supervisor {
    address: String,
    config_path: PathBuf,
    watch: bool,
}

impl Supervisor {
    pub fn new(address: String, config_path: PathBuf, watch: bool) -> Self {
        Self {
            address,
            config_path,
            watch,
        }
    }

    /// Run until the instance exits (shutdown signal) or a start fails.
    pub async fn run(&self) -> Result<(), StartupError> {
        let mut state = SupervisorState::Stopped;
        loop {
            self.transition(&mut state, SupervisorState::Starting);
            let snapshot = load_config(&self.config_path)?;
            let table = compile(&snapshot)?;
            let mut instance = ServerInstance::serve(&self.address, table).await?;
            self.transition(&mut state, SupervisorState::Running);

            if !self.watch {
                return instance.wait().await.map_err(StartupError::Bind);
            }

            let (watcher, mut changes) = ConfigWatcher::new(snapshot.watch_paths.clone());
            let watch_guard = watcher.run()?;

            let outcome = tokio::select! {
                changed = changes.recv() => match changed {
                    Some(()) => WatchOutcome::Changed,
                    None => WatchOutcome::InstanceExited(Ok(())),
                },
                result = instance.wait() => WatchOutcome::InstanceExited(result),
            };

            match outcome {
                WatchOutcome::Changed => {
                    // Let the burst settle, then drain whatever queued up.
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    while changes.try_recv().is_ok() {}

                    tracing::info!("watched input changed, reloading");
                    instance.shutdown().await;
                    drop(watch_guard);
                    self.transition(&mut state, SupervisorState::Stopped);
                }
                WatchOutcome::InstanceExited(result) => {
                    return result.map_err(StartupError::Bind);
                }
            }
        }
    }

    fn transition(&self, state: &mut SupervisorState, next: SupervisorState) {
        tracing::debug!(from = ?state, to = ?next, "supervisor state change");
        *state = next;
    }
}
