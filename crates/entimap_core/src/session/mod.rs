//! Sessions: identity-mapped units of work.

mod aggregate;
mod staging;
mod tracked;
mod unit_of_work;

pub use aggregate::Aggregate;
pub use staging::StagingSummary;
pub use unit_of_work::Session;
