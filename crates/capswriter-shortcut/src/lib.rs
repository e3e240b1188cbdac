pub mod alias;
pub mod combo;
pub mod engine;
pub mod events;
pub mod guard;
pub mod release_tail;
pub mod task;

pub use engine::ShortcutEngine;
pub use events::{EngineEvent, KeyEvent};
pub use release_tail::{CaptureSilenceSource, ReleaseTailOutcome, SilenceSource};
pub use task::{ShortcutTask, TaskAction};
