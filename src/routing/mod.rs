//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup and on every reload):
//!     ConfigSnapshot
//!     → compiler.rs (preflight checks, payload resolution, index builds,
//!       script loading)
//!     → pattern.rs (compile matchers, once)
//!     → Freeze as one DispatchTable
//!
//! Incoming Request (method, path):
//!     → DispatchTable::find (in-order scan, first match wins)
//!     → Return: matched endpoint + extracted params, or explicit no-match
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime (indexes excepted,
//!   behind their own locks)
//! - Registration order follows configuration array order; dispatch scans
//!   in that order, first match wins
//! - Any preflight violation aborts the entire load with a diagnostic naming
//!   the offending route's position; no partial startup

pub mod compiler;
pub mod pattern;

pub use compiler::{compile, Action, CompileError, DispatchTable, Endpoint};
pub use pattern::{PathParams, PathPattern};
