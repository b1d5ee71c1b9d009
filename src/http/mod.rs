//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request
//!     → catch-all axum handler (server.rs)
//!     → DispatchTable::find (routing)
//!     → Action execution: frozen payload | script | mount | index CRUD
//!     → Response with configured headers/content type
//!
//! WebSocket upgrade (/ws, only when socket routes exist):
//!     → per-connection loop (server.rs)
//!     → SocketRouter::dispatch per inbound envelope
//! ```
//!
//! # Design Decisions
//! - One catch-all route; matching is the dispatch table's job, not axum's
//! - Permissive CORS and request tracing on every route
//! - A ServerInstance owns its dispatch table (indexes, script cache)
//!   exclusively and releases everything when it is shut down

pub mod server;

pub use server::ServerInstance;
