//! Fixed-size worker pool with a background queue and a primary queue.

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, info, warn};

use super::{ItemHandle, PoolConfig, WorkItem};
use crate::app::status::PoolStats;
use crate::domain::PoolError;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// What the current thread is doing on behalf of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// One of the pool's background threads.
    Worker,

    /// A thread draining queues so that nothing is left behind
    /// (shutdown, or a primary drain under `force_primary`). It stands in
    /// for both kinds of context.
    Both,
}

thread_local! {
    static ACTING_FOR: Cell<Option<(u64, Role)>> = const { Cell::new(None) };
}

/// Sets `ACTING_FOR` for the current thread and restores the previous value.
struct RoleGuard {
    previous: Option<(u64, Role)>,
}

impl RoleGuard {
    fn enter(pool: u64, role: Role) -> Self {
        let previous = ACTING_FOR.with(|cell| cell.replace(Some((pool, role))));
        Self { previous }
    }
}

impl Drop for RoleGuard {
    fn drop(&mut self) {
        ACTING_FOR.with(|cell| cell.set(self.previous));
    }
}

fn current_role(pool: u64) -> Option<Role> {
    ACTING_FOR
        .with(Cell::get)
        .and_then(|(id, role)| (id == pool).then_some(role))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct BackgroundQueue {
    items: VecDeque<Arc<WorkItem>>,
    /// Workers currently running an item.
    active: usize,
    /// A shutdown is in progress. Workers exit once this is set and `items`
    /// is empty.
    stopping: bool,
    /// Shutdown has completed: new items run inline.
    finished: bool,
}

struct PrimaryQueue {
    items: VecDeque<Arc<WorkItem>>,
    finished: bool,
}

/// State shared between the pool handle and its worker threads.
struct Shared {
    id: u64,
    config: PoolConfig,

    background: Mutex<BackgroundQueue>,
    /// Signalled when an item is queued or stopping is set.
    work_available: Condvar,
    /// Signalled when the background queue is empty and no worker is active.
    idle: Condvar,
    /// Signalled once `finished` is set.
    shut_down: Condvar,

    primary: Mutex<PrimaryQueue>,
    primary_thread: Mutex<Option<ThreadId>>,

    // Mirrors of the queue state, readable without taking a lock.
    background_len: AtomicUsize,
    primary_len: AtomicUsize,
    active: AtomicUsize,
    processed: AtomicU64,
    high_water: AtomicUsize,
}

impl Shared {
    fn process(&self, item: Arc<WorkItem>) {
        if item.process() {
            self.processed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn note_backlog(&self, len: usize) {
        self.high_water.fetch_max(len, Ordering::Relaxed);
        if self.config.backlog_warning_threshold == Some(len) {
            warn!(
                pool = self.id,
                pending = len,
                "background backlog reached warning threshold"
            );
        }
    }

    /// Pop one queued item, background first.
    fn pop_any(&self) -> Option<Arc<WorkItem>> {
        {
            let mut queue = lock(&self.background);
            if let Some(item) = queue.items.pop_front() {
                self.background_len.store(queue.items.len(), Ordering::Relaxed);
                return Some(item);
            }
        }
        let mut queue = lock(&self.primary);
        let item = queue.items.pop_front();
        self.primary_len.store(queue.items.len(), Ordering::Relaxed);
        item
    }
}

struct WorkerThread {
    id: ThreadId,
    name: String,
    handle: Option<JoinHandle<()>>,
}

/// Worker pool
///
/// - N background threads share one FIFO queue.
/// - A second FIFO queue holds items for the primary thread, which drains it
///   explicitly (typically once per tick) with `drain_primary_queue`.
/// - Queues are unbounded. `PoolConfig::backlog_warning_threshold` only warns.
///
/// # Shutdown
/// `shutdown()` never discards work: items often represent owed cleanup or
/// rollback. Workers finish the background queue, then the calling thread
/// drains whatever is left in both queues, standing in for every context of
/// this pool while it does so. After shutdown, `submit` runs items inline.
///
/// A pool is usually owned by a `Runtime` and shared as `Arc<WorkerPool>`.
pub struct WorkerPool {
    shared: Arc<Shared>,
    threads: Mutex<Vec<WorkerThread>>,
}

impl WorkerPool {
    /// Start a pool. The calling thread becomes the primary thread.
    pub fn start(config: PoolConfig) -> Result<Arc<Self>, PoolError> {
        config.validate()?;
        let threads = config.resolved_threads();
        let shared = Arc::new(Shared {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            config,
            background: Mutex::new(BackgroundQueue {
                items: VecDeque::new(),
                active: 0,
                stopping: false,
                finished: false,
            }),
            work_available: Condvar::new(),
            idle: Condvar::new(),
            shut_down: Condvar::new(),
            primary: Mutex::new(PrimaryQueue {
                items: VecDeque::new(),
                finished: false,
            }),
            primary_thread: Mutex::new(Some(thread::current().id())),
            background_len: AtomicUsize::new(0),
            primary_len: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            processed: AtomicU64::new(0),
            high_water: AtomicUsize::new(0),
        });

        let pool = Arc::new(Self {
            shared,
            threads: Mutex::new(Vec::with_capacity(threads)),
        });

        // On error the pool is dropped here, which stops the threads
        // that did start.
        for index in 0..threads {
            pool.spawn_worker(index)?;
        }

        info!(pool = pool.shared.id, threads, "thread pool initialized");
        Ok(pool)
    }

    fn spawn_worker(&self, index: usize) -> Result<(), PoolError> {
        let name = format!("{}{}", self.shared.config.thread_name_prefix, index);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(shared))
            .map_err(|source| PoolError::Spawn {
                name: name.clone(),
                source,
            })?;

        lock(&self.threads).push(WorkerThread {
            id: handle.thread().id(),
            name,
            handle: Some(handle),
        });
        Ok(())
    }

    /// Enqueue a unit of work. Always succeeds.
    ///
    /// Primary-only items (and every item under `force_primary`) go to the
    /// primary queue; everything else wakes one background worker.
    pub fn submit(&self, item: Arc<WorkItem>) {
        if item.is_primary_only() || self.shared.config.force_primary {
            let mut queue = lock(&self.shared.primary);
            if queue.finished {
                drop(queue);
                self.run_inline(item);
                return;
            }
            queue.items.push_back(item);
            self.shared
                .primary_len
                .store(queue.items.len(), Ordering::Relaxed);
        } else {
            let mut queue = lock(&self.shared.background);
            if queue.finished {
                drop(queue);
                self.run_inline(item);
                return;
            }
            queue.items.push_back(item);
            let len = queue.items.len();
            self.shared.background_len.store(len, Ordering::Relaxed);
            drop(queue);

            self.shared.note_backlog(len);
            self.shared.work_available.notify_one();
        }
    }

    /// Convenience for `submit(WorkItem::background(job))`.
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) -> Arc<WorkItem> {
        let item = WorkItem::background(job);
        self.submit(Arc::clone(&item));
        item
    }

    /// Convenience for `submit(WorkItem::primary(job))`.
    pub fn spawn_primary(&self, job: impl FnOnce() + Send + 'static) -> Arc<WorkItem> {
        let item = WorkItem::primary(job);
        self.submit(Arc::clone(&item));
        item
    }

    /// Run `job` on a worker and get a handle to wait for it.
    ///
    /// A caller that already acts as a worker of this pool runs the job
    /// right away; the returned handle is then already complete.
    pub fn call_in_worker(&self, job: impl FnOnce() + Send + 'static) -> ItemHandle {
        let (item, handle) = ItemHandle::track(job);
        if self.is_worker_context() {
            self.shared.process(item);
        } else {
            self.submit(item);
        }
        handle
    }

    /// Like `call_in_worker`, but always queues a new item, even from a worker.
    pub fn force_call_in_worker(&self, job: impl FnOnce() + Send + 'static) -> ItemHandle {
        let (item, handle) = ItemHandle::track(job);
        self.submit(item);
        handle
    }

    fn run_inline(&self, item: Arc<WorkItem>) {
        debug!(pool = self.shared.id, item = %item.id(), "pool is shut down, running item inline");
        let _role = RoleGuard::enter(self.shared.id, Role::Both);
        self.shared.process(item);
    }

    /// Run every item that was in the primary queue when the call started.
    ///
    /// Items submitted while draining wait for the next call, so a chain that
    /// keeps hopping cannot starve the caller's loop. Returns the number of
    /// items run.
    pub fn drain_primary_queue(&self) -> usize {
        let batch = {
            let mut queue = lock(&self.shared.primary);
            let batch = std::mem::take(&mut queue.items);
            self.shared.primary_len.store(0, Ordering::Relaxed);
            batch
        };
        if batch.is_empty() {
            return 0;
        }

        let _role = self
            .shared
            .config
            .force_primary
            .then(|| RoleGuard::enter(self.shared.id, Role::Both));
        let count = batch.len();
        for item in batch {
            self.shared.process(item);
        }
        count
    }

    /// Run the oldest primary item, if any. Returns whether one ran.
    pub fn drain_one_primary_item(&self) -> bool {
        let item = {
            let mut queue = lock(&self.shared.primary);
            let item = queue.items.pop_front();
            self.shared
                .primary_len
                .store(queue.items.len(), Ordering::Relaxed);
            item
        };
        let Some(item) = item else {
            return false;
        };

        let _role = self
            .shared
            .config
            .force_primary
            .then(|| RoleGuard::enter(self.shared.id, Role::Both));
        self.shared.process(item);
        true
    }

    /// Block until the background queue is empty and no worker is busy.
    pub fn wait_idle(&self) {
        let mut queue = lock(&self.shared.background);
        while !queue.items.is_empty() || queue.active > 0 {
            queue = self
                .shared
                .idle
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stop the pool: finish every queued item, then join the workers.
    ///
    /// Safe to call more than once, and from several threads at once: a call
    /// made while another thread is shutting down blocks until that shutdown
    /// has finished. Calling it from one of this pool's own workers is
    /// allowed; that thread is simply not joined.
    pub fn shutdown(&self) {
        {
            let mut queue = lock(&self.shared.background);
            if queue.finished {
                return;
            }
            if queue.stopping {
                // The thread running the shutdown may be waiting to join us,
                // or be draining through us.
                if current_role(self.shared.id).is_some() {
                    return;
                }
                while !queue.finished {
                    queue = self
                        .shared
                        .shut_down
                        .wait(queue)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                return;
            }
            queue.stopping = true;
        }
        self.shared.work_available.notify_all();

        let current = thread::current().id();
        let workers = std::mem::take(&mut *lock(&self.threads));
        for mut worker in workers {
            if worker.id == current {
                continue;
            }
            if let Some(handle) = worker.handle.take()
                && handle.join().is_err()
            {
                warn!(worker = %worker.name, "worker thread exited by panic");
            }
        }

        // Whatever the workers left (and whatever those items queue in turn)
        // runs here.
        let _role = RoleGuard::enter(self.shared.id, Role::Both);
        loop {
            while let Some(item) = self.shared.pop_any() {
                self.shared.process(item);
            }

            let mut background = lock(&self.shared.background);
            let mut primary = lock(&self.shared.primary);
            if background.items.is_empty() && primary.items.is_empty() {
                background.finished = true;
                primary.finished = true;
                break;
            }
        }
        self.shared.idle.notify_all();
        self.shared.shut_down.notify_all();

        info!(pool = self.shared.id, "thread pool shut down");
    }

    /// Is the calling thread acting as a worker of this pool?
    pub fn is_worker_context(&self) -> bool {
        current_role(self.shared.id).is_some()
    }

    /// Is the calling thread acting as this pool's primary thread?
    pub fn is_primary_context(&self) -> bool {
        let role = current_role(self.shared.id);
        if role == Some(Role::Both) {
            return true;
        }
        if role == Some(Role::Worker) {
            return false;
        }
        *lock(&self.shared.primary_thread) == Some(thread::current().id())
    }

    /// Is `thread_id` one of this pool's background threads?
    pub fn is_worker_thread(&self, thread_id: ThreadId) -> bool {
        lock(&self.threads).iter().any(|worker| worker.id == thread_id)
    }

    /// Make the calling thread the primary thread.
    pub fn bind_primary_thread(&self) {
        *lock(&self.shared.primary_thread) = Some(thread::current().id());
    }

    pub fn primary_thread(&self) -> Option<ThreadId> {
        *lock(&self.shared.primary_thread)
    }

    pub fn pending_background_count(&self) -> usize {
        self.shared.background_len.load(Ordering::Relaxed)
    }

    pub fn pending_primary_count(&self) -> usize {
        self.shared.primary_len.load(Ordering::Relaxed)
    }

    pub fn active_workers(&self) -> usize {
        self.shared.active.load(Ordering::Relaxed)
    }

    pub fn thread_count(&self) -> usize {
        lock(&self.threads).len()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            threads: self.thread_count(),
            pending_background: self.pending_background_count(),
            pending_primary: self.pending_primary_count(),
            active_workers: self.active_workers(),
            processed: self.shared.processed.load(Ordering::Relaxed),
            backlog_high_water: self.shared.high_water.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("id", &self.shared.id)
            .field("stats", &self.stats())
            .finish()
    }
}

fn worker_loop(shared: Arc<Shared>) {
    let _role = RoleGuard::enter(shared.id, Role::Worker);
    loop {
        let item = {
            let mut queue = lock(&shared.background);
            loop {
                if let Some(item) = queue.items.pop_front() {
                    queue.active += 1;
                    shared.background_len.store(queue.items.len(), Ordering::Relaxed);
                    shared.active.store(queue.active, Ordering::Relaxed);
                    break item;
                }
                if queue.stopping {
                    let current = thread::current();
                    debug!(worker = current.name().unwrap_or("?"), "thread worker terminated");
                    return;
                }
                queue = shared
                    .work_available
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        // Released here, outside the lock.
        shared.process(item);

        let mut queue = lock(&shared.background);
        queue.active -= 1;
        shared.active.store(queue.active, Ordering::Relaxed);
        if queue.items.is_empty() && queue.active == 0 {
            shared.idle.notify_all();
        }
    }
}
