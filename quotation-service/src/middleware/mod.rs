pub mod actor;
pub mod metrics;

pub use actor::{Actor, ActorRole};
