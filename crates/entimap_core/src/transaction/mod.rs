//! Commit boundaries and ambient transactions.
//!
//! A session never decides on its own where its validated changes go. It
//! hands them to a [`CommitBoundary`]:
//! - [`Autonomous`]: every session commit is applied to the repository
//!   immediately
//! - [`AmbientTransaction`]: session commits are enlisted and applied when
//!   the outer unit of work commits

mod ambient;
mod boundary;

pub use ambient::AmbientTransaction;
pub use boundary::{Autonomous, CommitBoundary, PendingFlush, SessionTicket};
