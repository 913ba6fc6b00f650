//! Record kinds mirrored from the remote analytics platform.
//!
//! Each kind keeps the fields cachedb reasons about as typed members and
//! everything else in `extra`, so unknown remote fields round-trip.

mod card;
mod dataflow;
mod dataset;
mod group;
mod user;

pub use card::{Card, CardRepository};
pub use dataflow::{Dataflow, DataflowRepository};
pub use dataset::{Dataset, DatasetRepository};
pub use group::{Group, GroupRepository};
pub use user::{User, UserRepository};
