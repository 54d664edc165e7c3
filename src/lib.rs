// eventodb: the client-facing facade.
//
// Re-exports the wire types and the client kit so host applications depend
// on one crate.  The server lives in `services/server`; the storage engine
// in `crates/evento-store`.

pub use evento_client::{
    ClientDb, ClientError, ClientResult, Consumer, ConsumerConfig, EventoClient, HandlerError,
    HubConfig, HubState, MessageHandler, OutboxRow, OutboxWorker, StagedEvent, Subscription,
    SubscriptionHub,
};
pub use evento_protocol as protocol;
