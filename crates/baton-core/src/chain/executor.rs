//! Chain executor - チェーンの状態機械
//!
//! チェーンは以下のループを回します：
//!
//! 1. 次のステップのコンテキストを確認する
//! 2. 今のスレッドが対象外なら、自分自身（SuspendedChain）を
//!    `move_to_target_context` に渡して戻る
//! 3. 対象内ならステップを実行し、カーソルを進める（または戻す）
//!
//! チェーンはどの瞬間も「実行中のスレッド」か「1 つのキュー」のどちらか
//! 一方にしか存在しません。所有権の移動がそのまま排他制御になります。

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::completion::Completion;
use crate::domain::{ChainId, ChainOutcome, ChainState};
use crate::ports::ExecutionContext;
use crate::typed::step::{DynStep, ErasedResult, Payload};

/// In-flight chain. Only ever reachable through a `SuspendedChain` or the
/// stack of the thread currently running it.
pub(crate) struct Chain {
    id: ChainId,
    steps: Vec<Box<dyn DynStep>>,
    cursor: usize,
    state: ChainState,
    /// `carry[i]` is the input of step `i`; `carry[steps.len()]` is the final
    /// output.
    carry: Vec<Option<Payload>>,
    /// `undo[i]` is filled once step `i` succeeded.
    undo: Vec<Option<Payload>>,
    completion: Option<Completion>,
}

impl Chain {
    pub(crate) fn new(
        id: ChainId,
        steps: Vec<Box<dyn DynStep>>,
        input: Payload,
        completion: Completion,
    ) -> Self {
        let len = steps.len();
        let mut carry: Vec<Option<Payload>> =
            std::iter::repeat_with(|| None).take(len + 1).collect();
        carry[0] = Some(input);
        Self {
            id,
            steps,
            cursor: 0,
            state: ChainState::Advancing,
            carry,
            undo: std::iter::repeat_with(|| None).take(len).collect(),
            completion: Some(completion),
        }
    }

    /// Drive the chain until it finishes or has to change thread.
    fn run(mut self: Box<Self>) {
        loop {
            let state = self.state;
            match state {
                ChainState::Advancing => {
                    if self.cursor == self.steps.len() {
                        self.finish(ChainOutcome::Succeeded);
                        return;
                    }
                    let context = Arc::clone(self.steps[self.cursor].context());
                    if !context.is_in_target_context() {
                        self.suspend(context);
                        return;
                    }
                    self.advance();
                }
                ChainState::Unwinding => {
                    if self.cursor == 0 {
                        self.finish(ChainOutcome::RolledBack);
                        return;
                    }
                    let context = Arc::clone(self.steps[self.cursor - 1].context());
                    if !context.is_in_target_context() {
                        self.suspend(context);
                        return;
                    }
                    self.unwind();
                }
                ChainState::Finished(_) => return,
            }
        }
    }

    fn suspend(self: Box<Self>, context: Arc<dyn ExecutionContext>) {
        debug!(
            chain = %self.id,
            step = self.cursor,
            state = ?self.state,
            context = context.name(),
            "moving chain to target context"
        );
        context.move_to_target_context(SuspendedChain(self));
    }

    fn advance(&mut self) {
        let index = self.cursor;
        let Some(input) = self.carry[index].take() else {
            // Unreachable: the builder seeds slot 0 and every success fills
            // the next slot before the cursor moves.
            self.fail(index, "missing step input".to_string());
            return;
        };

        let step = &self.steps[index];
        debug!(chain = %self.id, step = index, task = step.label(), "executing task");
        match step.execute_dyn(input) {
            ErasedResult::Success { next, undo } => {
                self.carry[index + 1] = Some(next);
                self.undo[index] = Some(undo);
                self.cursor += 1;
            }
            ErasedResult::Failure { reason } => self.fail(index, reason),
        }
    }

    fn fail(&mut self, index: usize, reason: String) {
        warn!(
            chain = %self.id,
            step = index,
            task = self.steps[index].label(),
            reason = %reason,
            "task failed, rolling back"
        );
        self.state = ChainState::Unwinding;
    }

    fn unwind(&mut self) {
        let index = self.cursor - 1;
        let step = &self.steps[index];
        debug!(chain = %self.id, step = index, task = step.label(), "rolling back task");
        if let Some(undo) = self.undo[index].take() {
            step.rollback_dyn(undo);
        }
        self.cursor = index;
    }

    fn finish(&mut self, outcome: ChainOutcome) {
        self.state = ChainState::Finished(outcome);
        // Undo values of a successful chain are no longer owed to anyone.
        self.undo.clear();
        self.carry.clear();

        match outcome {
            ChainOutcome::Succeeded => {
                info!(chain = %self.id, steps = self.steps.len(), "chain succeeded")
            }
            ChainOutcome::RolledBack => info!(chain = %self.id, "chain rolled back"),
        }
        if let Some(completion) = self.completion.take() {
            completion.fulfill(outcome);
        }
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            warn!(
                chain = %self.id,
                step = self.cursor,
                state = ?self.state,
                "chain dropped before finishing"
            );
        }
    }
}

/// A chain waiting to be resumed.
///
/// Execution contexts receive one of these in `move_to_target_context` and
/// must call `resume` on a thread that satisfies them. Dropping it abandons
/// the chain.
pub struct SuspendedChain(Box<Chain>);

impl SuspendedChain {
    pub(crate) fn new(chain: Chain) -> Self {
        Self(Box::new(chain))
    }

    pub fn id(&self) -> ChainId {
        self.0.id
    }

    /// Continue from where the chain stopped.
    pub fn resume(self) {
        self.0.run();
    }
}

impl std::fmt::Debug for SuspendedChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuspendedChain")
            .field("id", &self.0.id)
            .field("cursor", &self.0.cursor)
            .field("state", &self.0.state)
            .field("steps", &self.0.steps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainBuilder;
    use crate::domain::{ChainError, StepResult};
    use crate::impls::{CallingContext, PrimaryContext, WorkerContext};
    use crate::pool::{PoolConfig, WorkerPool};
    use crate::typed::Task;
    use rstest::rstest;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::{self, ThreadId};

    type Journal = Arc<Mutex<Vec<String>>>;

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    fn pool(threads: usize) -> Arc<WorkerPool> {
        WorkerPool::start(PoolConfig {
            threads: Some(threads),
            ..PoolConfig::default()
        })
        .unwrap()
    }

    /// Adds one to its input, or fails when `fail` is set.
    fn recorded(
        context: Arc<dyn ExecutionContext>,
        name: &'static str,
        fail: bool,
        journal: &Journal,
    ) -> Task<u32, u32, u32> {
        let exec_journal = Arc::clone(journal);
        let undo_journal = Arc::clone(journal);
        Task::with_context(
            context,
            move |x: u32| {
                exec_journal.lock().unwrap().push(format!("exec {name}"));
                if fail {
                    StepResult::failure(format!("{name} refused {x}"))
                } else {
                    StepResult::success(x + 1, x)
                }
            },
            move |x: u32| undo_journal.lock().unwrap().push(format!("undo {name} {x}")),
        )
        .named(name)
    }

    #[test]
    fn all_successful_tasks_never_roll_back() {
        let journal = journal();
        let calling: Arc<dyn ExecutionContext> = Arc::new(CallingContext);

        let handle = ChainBuilder::with_input(0_u32)
            .then(recorded(Arc::clone(&calling), "a", false, &journal))
            .then(recorded(Arc::clone(&calling), "b", false, &journal))
            .then(recorded(Arc::clone(&calling), "c", false, &journal))
            .start();

        assert_eq!(handle.wait(), Ok(ChainOutcome::Succeeded));
        assert_eq!(entries(&journal), vec!["exec a", "exec b", "exec c"]);
    }

    #[rstest]
    #[case::first(1)]
    #[case::second(2)]
    #[case::third(3)]
    #[case::last(4)]
    fn failure_rolls_back_predecessors_in_reverse(#[case] failing: usize) {
        let journal = journal();
        let calling: Arc<dyn ExecutionContext> = Arc::new(CallingContext);
        let names = ["t1", "t2", "t3", "t4"];

        let mut builder = ChainBuilder::with_input(0_u32);
        for (position, &name) in names.iter().enumerate() {
            builder = builder.then(recorded(
                Arc::clone(&calling),
                name,
                position + 1 == failing,
                &journal,
            ));
        }
        let outcome = builder.start().wait();

        let mut expected: Vec<String> = names[..failing]
            .iter()
            .map(|name| format!("exec {name}"))
            .collect();
        for position in (0..failing - 1).rev() {
            expected.push(format!("undo {} {}", names[position], position));
        }
        assert_eq!(outcome, Ok(ChainOutcome::RolledBack));
        assert_eq!(entries(&journal), expected);
    }

    #[rstest]
    #[case::positive(5, ChainOutcome::Succeeded, &["exec a", "exec b", "exec c"])]
    #[case::negative(-1, ChainOutcome::RolledBack, &["exec a", "exec b", "undo a"])]
    fn calling_worker_calling_scenario(
        #[case] input: i32,
        #[case] expected: ChainOutcome,
        #[case] journal_expected: &[&str],
    ) {
        let pool = pool(2);
        let journal = journal();
        let log = |entry: &'static str| {
            let journal = Arc::clone(&journal);
            move || journal.lock().unwrap().push(entry.to_string())
        };

        let task_a = Task::new(
            CallingContext,
            {
                let log = log("exec a");
                move |x: i32| {
                    log();
                    StepResult::success(x, ())
                }
            },
            {
                let log = log("undo a");
                move |()| log()
            },
        );
        let task_b = Task::new(
            WorkerContext::new(Arc::clone(&pool)),
            {
                let log = log("exec b");
                move |x: i32| {
                    log();
                    if x > 0 {
                        StepResult::success(x, ())
                    } else {
                        StepResult::failure("input must be positive")
                    }
                }
            },
            {
                let log = log("undo b");
                move |()| log()
            },
        );
        let task_c = Task::new(
            CallingContext,
            {
                let log = log("exec c");
                move |x: i32| {
                    log();
                    StepResult::success(x, ())
                }
            },
            {
                let log = log("undo c");
                move |()| log()
            },
        );

        let outcome = ChainBuilder::with_input(input)
            .then(task_a)
            .then(task_b)
            .then(task_c)
            .start()
            .wait();

        assert_eq!(outcome, Ok(expected));
        assert_eq!(entries(&journal), journal_expected);
        pool.shutdown();
    }

    #[test]
    fn tasks_run_on_their_declared_context() {
        let pool = pool(2);
        let seen: Arc<Mutex<Vec<(&'static str, ThreadId)>>> = Arc::new(Mutex::new(Vec::new()));
        let observe = |tag: &'static str| {
            let seen = Arc::clone(&seen);
            move |()| {
                seen.lock().unwrap().push((tag, thread::current().id()));
                StepResult::done(())
            }
        };

        let handle = ChainBuilder::new()
            .then(Task::forward_only(CallingContext, observe("calling-1")))
            .then(Task::forward_only(
                WorkerContext::new(Arc::clone(&pool)),
                observe("worker"),
            ))
            .then(Task::forward_only(CallingContext, observe("calling-2")))
            .start();
        assert_eq!(handle.wait(), Ok(ChainOutcome::Succeeded));

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen[0], ("calling-1", thread::current().id()));
        assert_eq!(seen[1].0, "worker");
        assert!(pool.is_worker_thread(seen[1].1));
        // No implicit hop back: the calling task follows the worker.
        assert_eq!(seen[2], ("calling-2", seen[1].1));
        pool.shutdown();
    }

    #[test]
    fn rollback_runs_on_the_task_context() {
        let pool = pool(1);
        let undo_thread = Arc::new(Mutex::new(None));

        let reserve = Task::new(
            WorkerContext::new(Arc::clone(&pool)),
            |()| StepResult::success((), "reservation"),
            {
                let undo_thread = Arc::clone(&undo_thread);
                move |_: &str| *undo_thread.lock().unwrap() = Some(thread::current().id())
            },
        );
        let confirm = Task::forward_only(PrimaryContext::new(Arc::clone(&pool)), |()| {
            StepResult::<(), ()>::failure("confirmation rejected")
        });

        let mut handle = ChainBuilder::new().then(reserve).then(confirm).start();
        pool.wait_idle();
        assert_eq!(handle.try_outcome(), Ok(None));

        // confirm fails here, on the primary thread; the undo hops back.
        assert_eq!(pool.drain_primary_queue(), 1);
        assert_eq!(handle.wait(), Ok(ChainOutcome::RolledBack));

        let undo_thread = undo_thread.lock().unwrap().expect("rollback ran");
        assert!(pool.is_worker_thread(undo_thread));
        pool.shutdown();
    }

    #[test]
    fn steps_of_one_chain_never_overlap() {
        let pool = pool(4);
        let mut handles = Vec::new();
        let overlaps = Arc::new(AtomicUsize::new(0));

        for _ in 0..16 {
            let inside = Arc::new(AtomicUsize::new(0));
            let guarded = |context: Arc<dyn ExecutionContext>, fail: bool| {
                let exec_inside = Arc::clone(&inside);
                let undo_inside = Arc::clone(&inside);
                let exec_overlaps = Arc::clone(&overlaps);
                let undo_overlaps = Arc::clone(&overlaps);
                Task::with_context(
                    context,
                    move |x: u32| {
                        if exec_inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            exec_overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(std::time::Duration::from_millis(1));
                        exec_inside.fetch_sub(1, Ordering::SeqCst);
                        if fail {
                            StepResult::failure("last step fails")
                        } else {
                            StepResult::success(x + 1, x)
                        }
                    },
                    move |_: u32| {
                        if undo_inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            undo_overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(std::time::Duration::from_millis(1));
                        undo_inside.fetch_sub(1, Ordering::SeqCst);
                    },
                )
            };
            let worker: Arc<dyn ExecutionContext> =
                Arc::new(WorkerContext::new(Arc::clone(&pool)));
            let calling: Arc<dyn ExecutionContext> = Arc::new(CallingContext);

            handles.push(
                ChainBuilder::with_input(0_u32)
                    .then(guarded(Arc::clone(&worker), false))
                    .then(guarded(Arc::clone(&calling), false))
                    .then(guarded(Arc::clone(&worker), false))
                    .then(guarded(Arc::clone(&worker), true))
                    .start(),
            );
        }

        for handle in handles {
            assert_eq!(handle.wait(), Ok(ChainOutcome::RolledBack));
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        pool.shutdown();
    }

    #[test]
    fn empty_chain_succeeds_immediately() {
        let mut handle = ChainBuilder::new().start();
        assert_eq!(handle.try_outcome(), Ok(Some(ChainOutcome::Succeeded)));
    }

    #[test]
    fn tasks_can_be_reused_across_chains() {
        let journal = journal();
        let task = recorded(Arc::new(CallingContext), "shared", false, &journal);

        let first = ChainBuilder::with_input(1_u32)
            .then(task.clone())
            .then(task.clone())
            .start();
        let second = ChainBuilder::with_input(10_u32).then(task).start();

        assert_eq!(first.wait(), Ok(ChainOutcome::Succeeded));
        assert_eq!(second.wait(), Ok(ChainOutcome::Succeeded));
        assert_eq!(entries(&journal).len(), 3);
    }

    #[test]
    fn primary_tasks_wait_for_a_drain() {
        let pool = pool(1);
        let ran_on = Arc::new(Mutex::new(None));

        let mut handle = ChainBuilder::new()
            .then(Task::forward_only(
                WorkerContext::new(Arc::clone(&pool)),
                |()| StepResult::done(21_u32),
            ))
            .then(Task::forward_only(PrimaryContext::new(Arc::clone(&pool)), {
                let ran_on = Arc::clone(&ran_on);
                move |x: u32| {
                    *ran_on.lock().unwrap() = Some(thread::current().id());
                    StepResult::done(x * 2)
                }
            }))
            .start();

        pool.wait_idle();
        assert_eq!(handle.try_outcome(), Ok(None));
        assert_eq!(pool.pending_primary_count(), 1);

        assert_eq!(pool.drain_primary_queue(), 1);
        assert_eq!(handle.try_outcome(), Ok(Some(ChainOutcome::Succeeded)));
        assert_eq!(*ran_on.lock().unwrap(), Some(thread::current().id()));
        pool.shutdown();
    }

    #[test]
    fn shutdown_finishes_suspended_chains() {
        let pool = pool(1);
        let (chain, handle) = ChainBuilder::new()
            .then(Task::forward_only(PrimaryContext::new(Arc::clone(&pool)), |()| {
                StepResult::done(())
            }))
            .build();

        // Resumed from a worker, so the primary step gets queued.
        pool.spawn(move || chain.resume());
        pool.wait_idle();
        assert_eq!(pool.pending_primary_count(), 1);

        pool.shutdown();
        assert_eq!(handle.wait(), Ok(ChainOutcome::Succeeded));
    }

    #[test]
    fn dropped_chain_is_reported_as_abandoned() {
        let (chain, handle) = ChainBuilder::new()
            .then(Task::forward_only(CallingContext, |()| StepResult::done(())))
            .build();
        let id = chain.id();
        assert_eq!(handle.chain_id(), id);

        drop(chain);
        assert_eq!(handle.wait(), Err(ChainError::Abandoned(id)));
    }

    struct Nowhere;

    impl ExecutionContext for Nowhere {
        fn name(&self) -> &'static str {
            "nowhere"
        }

        fn is_in_target_context(&self) -> bool {
            false
        }

        fn move_to_target_context(&self, chain: SuspendedChain) {
            drop(chain);
        }
    }

    #[test]
    fn context_that_drops_the_chain_abandons_it() {
        let handle = ChainBuilder::new()
            .then(Task::forward_only(Nowhere, |()| StepResult::done(())))
            .start();
        assert!(matches!(handle.wait(), Err(ChainError::Abandoned(_))));
    }

    #[tokio::test]
    async fn outcome_can_be_awaited() {
        let pool = pool(2);
        let handle = ChainBuilder::with_input(20_u32)
            .then(Task::forward_only(
                WorkerContext::new(Arc::clone(&pool)),
                |x: u32| StepResult::done(x + 1),
            ))
            .start();

        assert_eq!(handle.await, Ok(ChainOutcome::Succeeded));
        pool.shutdown();
    }
}
