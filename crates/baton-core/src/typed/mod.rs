//! Typed tasks and their type-erased form used inside a chain.

pub(crate) mod step;
pub mod task;

pub use self::task::Task;
