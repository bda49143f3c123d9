//! Typed job and task manifests, and the loader that produces them.
pub mod job;
pub mod loader;
pub mod task;

pub use job::{BoundCommand, Command, Job};
pub use loader::{load_job, load_task};
pub use task::{Run, Task};
