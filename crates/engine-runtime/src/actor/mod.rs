pub mod actor;
pub mod messages;
pub mod spawn;
pub mod tracker;

pub use actor::{Actor, ActorContext, ActorRef};
pub use tracker::{ProgressTracker, TrackerHandle};
