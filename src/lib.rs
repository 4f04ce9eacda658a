//! # regmirror
//!
//! A persistent Modbus TCP register server:
//! - Four independently addressed register spaces served from one in-memory map
//! - Every accepted write mirrored into a SQLite table; the map hydrates from
//!   that table at startup and keeps serving when the table is unreachable
//! - Single-threaded, readiness-driven connection multiplexing - one thread of
//!   control owns the map and every socket, so the map needs no locks
//! - A wide-value codec (floats in four word orders, 32/64-bit integers,
//!   base-10000 chunked decimals) shared with the CLI tooling
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Connection Multiplexer                     │
//! │          (readiness loop over all client sockets)            │
//! └────────────┬───────────────────────────────┬────────────────┘
//!              │ raw request                   │ on accepted write
//!              ▼                               ▼
//!       ┌─────────────┐               ┌─────────────────┐
//!       │  protocol   │               │ Write Reflector  │
//!       │  library    │               │ (request bytes → │
//!       │ (rmodbus)   │               │  mutated cells)  │
//!       └──────┬──────┘               └────────┬────────┘
//!              │ reads/applies                 │ mirrors
//!              ▼                               ▼
//!       ┌─────────────────────────────────────────────┐
//!       │               Register Store                 │
//!       │   in-memory map  ←hydrate/persist→  SQLite   │
//!       └─────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod store;
pub mod reflect;
pub mod server;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RegMirrorError, Result};
pub use config::{Config, SpaceConfig};
pub use engine::{Engine, EngineHandle};
pub use store::{CellValue, RegisterSpace};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of regmirror
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
