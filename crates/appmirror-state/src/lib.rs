//! appmirror-state: entity store for AppMirror.
//!
//! Holds the three record types of the simulator: devices, builds and
//! sessions. Records are JSON-serialized into [redb](https://docs.rs/redb)
//! tables on the in-memory backend, so nothing survives a restart.
//!
//! # Consistency
//!
//! Every mutation is a single redb write transaction and redb admits one
//! writer at a time, so a read-modify-write through
//! [`StateStore::update_session`] can never lose a concurrent update.
//! Reads run in read transactions and always see whole records.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and is handed to every component that needs it.

pub mod error;
pub mod ids;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use ids::{IdGenerator, SequentialIds, UuidGenerator};
pub use store::StateStore;
pub use types::*;
