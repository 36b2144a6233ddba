//! Look-ahead planning: reading-speed adaptation and prefetch scheduling.

pub mod plan;
pub mod planner;

pub use plan::{PrefetchPriority, PrefetchTask, plan_window};
pub use planner::ReadingPlanner;
