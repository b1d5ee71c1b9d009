//! mimicd — a declarative mock/fixture server.
//!
//! An operator supplies a JSON configuration document describing HTTP
//! endpoints and inbound messaging event handlers; mimicd compiles the
//! document into a live dispatch table without the operator writing server
//! code.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────┐
//!                  │                     MIMICD                       │
//!                  │                                                  │
//!   config.json ───┼─▶ config ──▶ routing ──────▶ DispatchTable       │
//!                  │   (load,     (compile)        │                  │
//!                  │   validate)     │             │                  │
//!                  │                 ▼             ▼                  │
//!                  │      ┌─────────────────┐   ┌──────┐              │
//!                  │      │ payload │ store │   │ http │◀── requests  │
//!                  │      │ script  │socket │   │server│──▶ responses │
//!                  │      └─────────────────┘   └──────┘              │
//!                  │                                                  │
//!                  │   lifecycle: supervisor watches every referenced │
//!                  │   file and swaps the whole instance on change    │
//!                  └──────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod payload;
pub mod routing;
pub mod store;

// User-supplied handlers & messaging
pub mod script;
pub mod socket;

// Cross-cutting concerns
pub mod lifecycle;
