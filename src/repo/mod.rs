//! Persistence layer: one module per entity, raw `sqlx::query` + manual row
//! mapping rather than the compile-time `query!`/`query_as!` macros (those
//! need a reachable database or an offline query cache at build time, which
//! this workspace doesn't assume). Mirrors the host's `internal_transfer::db`
//! module, which took the same approach for the same reason.

pub mod channel;
pub mod directive;
pub mod fulfillment;
pub mod idempotency;
pub mod order;
pub mod refs;
pub mod session;

pub use channel::ChannelRepo;
pub use directive::DirectiveRepo;
pub use fulfillment::FulfillmentRepo;
pub use idempotency::IdempotencyRepo;
pub use order::OrderRepo;
pub use refs::RefRepo;
pub use session::SessionRepo;
