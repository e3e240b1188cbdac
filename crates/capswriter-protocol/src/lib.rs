pub mod commit;
pub mod config;
pub mod frame;
pub mod queue_counters;
pub mod shortcut;
pub mod task;

pub use commit::*;
pub use config::*;
pub use frame::*;
pub use queue_counters::*;
pub use shortcut::*;
pub use task::*;
