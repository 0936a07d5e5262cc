//! # Wordtagger Architecture
//!
//! Wordtagger is a **UI-agnostic tagging store**: entries (words, phrases,
//! names) carry typed tags, live in layers, and are persisted as plain JSON
//! files under a storage root the user picks. The CLI in `main.rs` is one
//! client; nothing below the API knows about terminals.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI (args.rs + main.rs)                                    │
//! │  - Parses arguments, prints messages, owns exit codes       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  API (api.rs)                                               │
//! │  - Owns the in-memory library, event bus and scheduler      │
//! │  - Publishes a change event after every mutation            │
//! │  - Root switching, reload, clear, status                    │
//! └─────────────────────────────────────────────────────────────┘
//!                  │                               │
//!                  ▼                               ▼
//! ┌──────────────────────────────┐  ┌──────────────────────────────┐
//! │  Commands (commands/*.rs)    │  │  Sync (sync.rs)              │
//! │  - Pure logic on `Library`   │  │  - Debounced background save │
//! │  - Merge / reject duplicates │  │  - One save at a time        │
//! │  - Cascades and repair       │  │  - Quiet while loading       │
//! └──────────────────────────────┘  └──────────────────────────────┘
//!                                                  │
//!                                                  ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage (store/)                                           │
//! │  - `Persistence` trait                                      │
//! │  - `FsGateway` (atomic JSON files, backups, access tokens)  │
//! │  - `MemBackend` (testing)                                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//!
//! A mutation takes the library write lock, runs a command, and publishes
//! [`events::StoreEvent::Changed`] before releasing the lock, so observers see
//! events in mutation order. The sync scheduler is just another observer: it
//! coalesces bursts of changes into a single save once things go quiet.
//!
//! Lock order is always gateway, then library. The scheduler holds the
//! gateway while it snapshots the library, which is what keeps a snapshot
//! from one root out of another root's files.
//!
//! ## Testing Strategy
//!
//! 1. **Commands**: the bulk of the unit tests, on plain `Library` values.
//! 2. **Sync and API**: driven through [`store::mem_backend::MemBackend`],
//!    which records every operation and can slow down or fail saves.
//! 3. **Storage**: `FsGateway` against temp dirs, plus `tests/` integration
//!    tests for rotation and corruption.
//! 4. **CLI**: `assert_cmd` runs of the binary with an isolated config dir.
//!
//! ## Module Overview
//!
//! - [`api`]: The store facade
//! - [`commands`]: Business logic on the in-memory library
//! - [`store`]: Persistence trait, file gateway, access tokens
//! - [`sync`]: Debounced save scheduler
//! - [`events`]: Change notifications
//! - [`search`]: Ranked search and tag suggestions
//! - [`tag_line`]: The `entry kind:value ...` command line
//! - [`tags`]: Tag kind registry and key validation
//! - [`model`]: Entities and on-disk records
//! - [`config`]: Application settings
//! - [`init`]: Startup wiring for the CLI
//! - [`logging`]: Tracing setup
//! - [`error`]: Error types

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod init;
pub mod logging;
pub mod model;
pub mod search;
pub mod store;
pub mod sync;
pub mod tag_line;
pub mod tags;
