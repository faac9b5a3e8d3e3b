//! Core domain entities.

pub mod channel;
pub mod directive;
pub mod fulfillment;
pub mod idempotency;
pub mod order;
pub mod refs;
pub mod session;

pub use channel::Channel;
pub use directive::{Directive, DirectiveStatus};
pub use idempotency::{IdempotencyKey, IdempotencyStatus};
pub use order::{Order, OrderEvent, OrderItem, OrderStatus};
pub use refs::{Ref, RefSequence, RefType, TargetKind};
pub use session::{CheckEntry, Issue, LineItem, Session, SessionState};
