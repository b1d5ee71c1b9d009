//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (supervisor.rs):
//!     Load config → Validate → Compile dispatch table → Bind listener
//!
//! Watch trigger (supervisor.rs):
//!     Change under any watched path
//!     → close current listener (best-effort, no draining)
//!     → synchronously rerun startup with a fresh snapshot
//!
//! Shutdown (shutdown.rs):
//!     Broadcast signal → listener stops accepting → task exits
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, at first start and on reload
//!   alike; there is no fallback to the previous instance
//! - Exactly one live instance at a time; the previous one is released
//!   before the next is created
//! - The watch set is recomputed from every freshly loaded snapshot

pub mod shutdown;
pub mod supervisor;

pub use shutdown::Shutdown;
pub use supervisor::{StartupError, Supervisor};
