//! ChainBuilder - 型付きでチェーンを組み立てる
//!
//! `ChainBuilder<T>` の `T` は「次のタスクが受け取る型」です。
//! `then(Task<T, O, R>)` は `ChainBuilder<O>` を返すので、入出力の型が
//! 合わないチェーンはコンパイルできません。
//!
//! ```ignore
//! let handle = ChainBuilder::with_input(5)
//!     .then(validate)   // Task<i32, i32, ()>
//!     .then(upload)     // Task<i32, Receipt, UploadId>
//!     .start();
//! ```

use std::marker::PhantomData;

use super::completion::{Completion, CompletionHandle};
use super::executor::{Chain, SuspendedChain};
use crate::domain::ChainId;
use crate::typed::Task;
use crate::typed::step::{DynStep, Payload, TypedStep};

/// Assembles a chain whose next task must accept a `T`.
#[must_use = "a chain does nothing until it is started"]
pub struct ChainBuilder<T> {
    input: Payload,
    steps: Vec<Box<dyn DynStep>>,
    _next: PhantomData<fn() -> T>,
}

impl ChainBuilder<()> {
    /// A chain whose first task takes no input.
    pub fn new() -> Self {
        Self::with_input(())
    }
}

impl Default for ChainBuilder<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> ChainBuilder<T> {
    /// A chain whose first task receives `input`.
    pub fn with_input(input: T) -> Self {
        Self {
            input: Box::new(input),
            steps: Vec::new(),
            _next: PhantomData,
        }
    }

    /// Append a task. Its input type must be the previous task's output.
    pub fn then<O, R>(mut self, task: Task<T, O, R>) -> ChainBuilder<O>
    where
        O: Send + 'static,
        R: Send + 'static,
    {
        self.steps.push(Box::new(TypedStep::new(task)));
        ChainBuilder {
            input: self.input,
            steps: self.steps,
            _next: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Create the chain without running anything.
    ///
    /// The chain starts when the returned `SuspendedChain` is resumed.
    pub fn build(self) -> (SuspendedChain, CompletionHandle) {
        let id = ChainId::generate();
        let (completion, handle) = Completion::channel(id);
        let chain = Chain::new(id, self.steps, self.input, completion);
        (SuspendedChain::new(chain), handle)
    }

    /// Start the chain on the calling thread.
    ///
    /// Returns as soon as the chain finishes or first suspends onto another
    /// context.
    pub fn start(self) -> CompletionHandle {
        let (chain, handle) = self.build();
        chain.resume();
        handle
    }
}

impl<T> std::fmt::Debug for ChainBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<&str> = self.steps.iter().map(|step| step.label()).collect();
        f.debug_struct("ChainBuilder")
            .field("steps", &labels)
            .finish()
    }
}
