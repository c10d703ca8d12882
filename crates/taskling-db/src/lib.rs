pub mod session_store;
pub mod task_store;

pub use session_store::{SessionRecord, SessionStore};
pub use task_store::{CompleteOutcome, Task, TaskStore};
