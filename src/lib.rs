//! Retrospective-board state engine.
//!
//! Maintains shared team note collections and a per-user private overlay of
//! the same shape, keeps both durable across reloads, and reconciles
//! concurrent edits from multiple clients against one shared key/value store
//! by periodic polling. The UI layer consumes [`engine::Session`] as plain
//! method calls; the storage and identity boundaries are traits the host
//! implements.

pub mod boards;
pub mod engine;
pub mod export;
pub mod identity;
pub mod overlay;
pub mod storage;
pub mod types;

pub use engine::{run_poller, Session, POLL_PERIOD};
pub use identity::IdentityResolver;
pub use storage::{PrivateStore, SharedStore, SharedTier, StorageError};
pub use types::{Board, Card, CardCollection, Column};
