//! The four write engines: every mutation to a session or order funnels
//! through exactly one of these, each under its own row-locked transaction.

pub mod commit;
pub mod modify;
pub mod resolve;
pub mod write_back;

pub use commit::commit;
pub use modify::modify_session;
pub use resolve::resolve;
pub use write_back::apply_check_result;
