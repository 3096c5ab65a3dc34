//! Session & authentication state engine for the latchkey SDK.
//!
//! The engine tracks a user's progress through the multi-step sign-in
//! flow, owns the access/refresh token lifecycle, persists session state
//! across reloads, and reconciles state after external redirects. It
//! talks to the platform only through the [`service::AuthService`] trait;
//! HTTP transport lives in `latchkey-client`.
//!
//! Layering, leaves first: [`claims`] (stateless token decode),
//! [`store`] (persistence with change notifications), [`lifecycle`]
//! (deduplicated refresh), [`machine`] (pure reducer), [`engine`]
//! (orchestration and effects), [`recovery`] (page-load reconciliation),
//! [`sync`] (cross-tab propagation).

pub mod claims;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod machine;
pub mod recovery;
pub mod service;
pub mod store;
pub mod sync;

pub use config::EngineConfig;
pub use engine::{EngineError, SessionEngine};
pub use lifecycle::TokenManager;
pub use machine::Event;
pub use recovery::{RecoveryOutcome, recover};
pub use service::AuthService;
pub use store::{FileBackend, MemoryBackend, Origin, Scope, Slot, StorageBackend, Store};
pub use sync::CrossTabSync;

pub use latchkey_types as types;
