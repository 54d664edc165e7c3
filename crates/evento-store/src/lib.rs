// evento-store: multi-namespace append-only message storage.
//
// One SQLite database per namespace plus a registry database mapping
// namespace ids to token hashes and database locations.  The engine owns
// message storage; the registry owns namespace metadata.

pub mod engine;
pub mod error;
pub mod registry;
pub mod token;

pub use engine::{
    CategorySummary, ImportedMessage, Message, MessageStore, NewMessage, StreamSummary,
};
pub use error::{StoreError, StoreResult};
pub use registry::{NamespaceRecord, NamespaceRegistry};
