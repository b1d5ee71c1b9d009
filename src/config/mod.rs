//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config document (JSON)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, position-tagged errors)
//!     → ConfigSnapshot (validated, immutable, with its watch-path set)
//!     → handed to the route compiler
//!
//! On watch trigger:
//!     watcher.rs detects change under any watched path
//!     → supervisor tears the instance down
//!     → loader.rs loads a fresh snapshot (new watch set included)
//!     → a new instance is compiled from scratch
//! ```
//!
//! # Design Decisions
//! - A snapshot is immutable once loaded; changes require a full reload
//! - Validation separates syntactic (serde) from semantic checks
//! - Filesystem-dependent checks (paths exist, collections are arrays) are
//!   the route compiler's preflight, not validation's

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError, ConfigSnapshot};
pub use schema::{Direction, MatchType, MockConfig, RouteConfig, SocketRouteConfig};
pub use validation::{validate_config, ValidationError};
