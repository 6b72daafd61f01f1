//! Everything that talks to a target MySQL server.

pub mod discovery;
pub mod ident;
pub mod link;
pub mod mutation;
pub mod query;
pub mod value;

pub use link::{ConnectionProfile, LinkManager, LiveLink, new_link};
pub use mutation::MutationOutcome;
pub use query::QueryOutcome;
