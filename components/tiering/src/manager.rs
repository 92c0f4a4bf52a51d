//! Background optimization manager
//!
//! Counts calls per function name. When a function crosses the hot
//! threshold a job is admitted exactly once and queued for a fixed pool of
//! worker threads. Workers take a slot from the admission gate, run the
//! pattern optimizer off the interpreter thread, and publish the result
//! into the name and index maps, first writer wins.
//!
//! Once a function is published or has failed its calls are no longer
//! counted, and a failed function is never retried during the run. A job
//! that times out waiting for a gate slot is cancelled and its marker
//! cleared, so the next call past the threshold admits it again.

use bytecode_system::{BytecodeModule, CompiledFunction, OptimizationOutcome, PatternOptimizer};
use crossbeam::channel::{self, Receiver, Sender};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use interpreter::CallProfiler;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::config::OptimizerConfig;
use crate::error::OptimizerError;
use crate::gate::AdmissionGate;
use crate::stats::{FunctionState, OptimizerStats, StatsCounters};

/// One admitted optimization
#[derive(Debug, Clone, PartialEq, Eq)]
struct Job {
    name: String,
    index: usize,
}

#[derive(Debug, Default)]
struct Activity {
    /// Admitted jobs not yet finished
    pending: usize,
    /// Worker threads still running their loop
    live_workers: usize,
}

/// State shared between the manager and its workers
struct Shared {
    module: Arc<BytecodeModule>,
    config: OptimizerConfig,
    enabled: AtomicBool,
    shut_down: AtomicBool,
    counters: DashMap<String, AtomicU64>,
    /// In-progress markers: name -> function index
    in_flight: DashMap<String, usize>,
    failed: DashMap<String, ()>,
    by_name: DashMap<String, Arc<CompiledFunction>>,
    by_index: DashMap<usize, Arc<CompiledFunction>>,
    gate: AdmissionGate,
    stats: StatsCounters,
    activity: Mutex<Activity>,
    activity_changed: Condvar,
}

impl Shared {
    fn bump(&self, name: &str) -> u64 {
        if let Some(counter) = self.counters.get(name) {
            return counter.fetch_add(1, Ordering::Relaxed) + 1;
        }
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed)
            + 1
    }

    fn is_settled(&self, name: &str) -> bool {
        self.by_name.contains_key(name) || self.failed.contains_key(name)
    }

    /// Install the in-progress marker; false if another caller owns it
    fn try_admit(&self, name: &str, index: usize) -> bool {
        if self.is_settled(name) {
            return false;
        }
        match self.in_flight.entry(name.to_string()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                slot.insert(index);
            }
        }
        // a job may have settled between the first check and the marker
        if self.is_settled(name) {
            self.in_flight.remove(name);
            return false;
        }
        true
    }

    fn process(&self, job: Job) {
        if self.shut_down.load(Ordering::Acquire) {
            self.cancel(&job, "optimizer shut down");
            return;
        }
        let Some(_permit) = self.gate.acquire_timeout(self.config.admission_timeout) else {
            let reason = if self.gate.is_closed() {
                "optimizer shut down"
            } else {
                "admission timeout"
            };
            self.cancel(&job, reason);
            return;
        };

        let Some(function) = self.module.function(job.index) else {
            error!(function = %job.name, index = job.index, "function index not in module");
            self.fail(&job);
            return;
        };
        let started = Instant::now();
        match PatternOptimizer::new(&self.module).optimize(function) {
            Ok(outcome) if outcome.changed() => self.publish(&job, outcome, started.elapsed()),
            Ok(_) => {
                debug!(function = %job.name, "no rewrite applies");
                self.fail(&job);
            }
            Err(err) => {
                error!(function = %job.name, error = %err, "optimization failed");
                self.fail(&job);
            }
        }
    }

    fn publish(&self, job: &Job, outcome: OptimizationOutcome, elapsed: Duration) {
        let rewrites = outcome.rewrites;
        let optimized = Arc::new(outcome.function);
        let first = match self.by_name.entry(job.name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&optimized));
                true
            }
            Entry::Occupied(_) => false,
        };
        if first {
            self.by_index.entry(job.index).or_insert(optimized);
            self.stats.completed.fetch_add(1, Ordering::Relaxed);
            self.stats
                .total_rewrites
                .fetch_add(rewrites as u64, Ordering::Relaxed);
            info!(
                function = %job.name,
                index = job.index,
                rewrites,
                elapsed_us = elapsed.as_micros() as u64,
                "published optimized function"
            );
        } else {
            debug!(function = %job.name, "discarded late optimization");
        }
        // publication precedes marker removal so the name is never seen as cold
        self.in_flight.remove(&job.name);
    }

    fn fail(&self, job: &Job) {
        self.failed.insert(job.name.clone(), ());
        self.stats.failed.fetch_add(1, Ordering::Relaxed);
        self.in_flight.remove(&job.name);
    }

    fn cancel(&self, job: &Job, reason: &str) {
        self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
        self.in_flight.remove(&job.name);
        warn!(function = %job.name, reason, "optimization job cancelled");
    }

    fn job_admitted(&self) {
        self.activity.lock().pending += 1;
    }

    fn job_finished(&self) {
        let mut activity = self.activity.lock();
        activity.pending = activity.pending.saturating_sub(1);
        drop(activity);
        self.activity_changed.notify_all();
    }

    fn worker_exited(&self) {
        let mut activity = self.activity.lock();
        activity.live_workers = activity.live_workers.saturating_sub(1);
        drop(activity);
        self.activity_changed.notify_all();
    }

    /// Wait until `done` holds or the timeout expires
    fn wait_for(&self, timeout: Duration, done: impl Fn(&Activity) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut activity = self.activity.lock();
        while !done(&activity) {
            if self
                .activity_changed
                .wait_until(&mut activity, deadline)
                .timed_out()
            {
                return done(&activity);
            }
        }
        true
    }

    fn state_of(&self, name: &str) -> FunctionState {
        if self.by_name.contains_key(name) {
            FunctionState::Optimized
        } else if self.in_flight.contains_key(name) {
            FunctionState::InFlight
        } else if self.failed.contains_key(name) {
            FunctionState::Failed
        } else {
            FunctionState::Cold
        }
    }
}

fn worker_loop(shared: Arc<Shared>, receiver: Receiver<Job>) {
    trace!("optimizer worker started");
    while let Ok(job) = receiver.recv() {
        shared.process(job);
        shared.job_finished();
    }
    shared.worker_exited();
    trace!("optimizer worker exiting");
}

/// Profiler and background optimizer for one module
///
/// Install it on a VM as its `CallProfiler`. Dropping the manager shuts it
/// down.
///
/// # Example
///
/// ```
/// use bytecode_system::ModuleBuilder;
/// use std::sync::Arc;
/// use tiering::{OptimizationManager, OptimizerConfig};
///
/// let module = Arc::new(ModuleBuilder::new().build());
/// let manager = OptimizationManager::new(module, OptimizerConfig::default()).unwrap();
/// assert!(manager.is_optimization_enabled());
/// manager.shutdown();
/// assert!(!manager.is_optimization_enabled());
/// ```
pub struct OptimizationManager {
    shared: Arc<Shared>,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl OptimizationManager {
    /// Start the worker pool for `module`
    pub fn new(module: Arc<BytecodeModule>, config: OptimizerConfig) -> Result<Self, OptimizerError> {
        let worker_count = config.worker_threads.max(1);
        let shared = Arc::new(Shared {
            enabled: AtomicBool::new(config.enabled),
            shut_down: AtomicBool::new(false),
            counters: DashMap::new(),
            in_flight: DashMap::new(),
            failed: DashMap::new(),
            by_name: DashMap::new(),
            by_index: DashMap::new(),
            gate: AdmissionGate::new(config.max_concurrent_jobs),
            stats: StatsCounters::default(),
            activity: Mutex::new(Activity::default()),
            activity_changed: Condvar::new(),
            module,
            config,
        });

        let (sender, receiver) = channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let worker_shared = Arc::clone(&shared);
            let worker_receiver = receiver.clone();
            shared.activity.lock().live_workers += 1;
            let spawned = thread::Builder::new()
                .name(format!("tier-opt-{index}"))
                .spawn(move || worker_loop(worker_shared, worker_receiver));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    // dropping the sender below stops the workers already running
                    shared.worker_exited();
                    shared.gate.close();
                    return Err(OptimizerError::WorkerSpawn { index, source });
                }
            }
        }

        debug!(
            workers = worker_count,
            gate = shared.gate.capacity(),
            threshold = shared.config.hot_threshold,
            "optimizer started"
        );

        Ok(Self {
            shared,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    /// The module being profiled
    pub fn module(&self) -> &Arc<BytecodeModule> {
        &self.shared.module
    }

    /// Active configuration
    pub fn config(&self) -> &OptimizerConfig {
        &self.shared.config
    }

    /// Resume accepting call notifications (no effect after shutdown)
    pub fn enable(&self) {
        if !self.shared.shut_down.load(Ordering::Acquire) {
            self.shared.enabled.store(true, Ordering::Release);
        }
    }

    /// Stop accepting call notifications
    ///
    /// Jobs already admitted still run. Published functions stay visible.
    pub fn disable(&self) {
        self.shared.enabled.store(false, Ordering::Release);
    }

    /// Whether call notifications are being counted
    pub fn is_optimization_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire) && !self.shared.shut_down.load(Ordering::Acquire)
    }

    /// Whether `shutdown` has run
    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::Acquire)
    }

    /// Stop admission, cancel queued jobs and wait for the workers
    ///
    /// Waits at most the configured shutdown timeout; workers still busy
    /// after that are detached. Calling it again does nothing.
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.enabled.store(false, Ordering::Release);
        self.shared.gate.close();
        // closing the queue lets workers drain what is left as cancellations
        drop(self.sender.lock().take());

        let drained = self
            .shared
            .wait_for(self.shared.config.shutdown_timeout, |a| a.live_workers == 0);

        let handles = std::mem::take(&mut *self.workers.lock());
        let mut detached = 0;
        for handle in handles {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                detached += 1;
            }
        }

        if drained {
            info!(stats = %self.stats(), "optimizer shut down");
        } else {
            warn!(detached, "optimizer workers did not exit before the shutdown timeout");
        }
    }

    /// Snapshot of the job counters
    pub fn stats(&self) -> OptimizerStats {
        self.shared.stats.snapshot()
    }

    /// Calls recorded for a function name
    ///
    /// Counting stops once the function is published or has failed.
    pub fn call_count(&self, name: &str) -> u64 {
        self.shared
            .counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Tiering state of a function name
    pub fn function_state(&self, name: &str) -> FunctionState {
        self.shared.state_of(name)
    }

    /// Published optimized version of a function, by name
    pub fn optimized(&self, name: &str) -> Option<Arc<CompiledFunction>> {
        self.shared.by_name.get(name).map(|f| Arc::clone(f.value()))
    }

    /// Number of published functions
    pub fn optimized_count(&self) -> usize {
        self.shared.by_name.len()
    }

    /// Gate bounding how many jobs optimize at once
    pub fn gate(&self) -> &AdmissionGate {
        &self.shared.gate
    }

    /// Number of worker threads started
    pub fn worker_count(&self) -> usize {
        self.shared.config.worker_threads.max(1)
    }

    /// Block until no admitted job is pending, or the timeout expires
    ///
    /// Returns whether the optimizer went idle.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.shared.wait_for(timeout, |a| a.pending == 0)
    }

    fn submit(&self, job: Job) {
        self.shared.stats.admitted.fetch_add(1, Ordering::Relaxed);
        self.shared.job_admitted();
        debug!(function = %job.name, index = job.index, "admitted optimization job");

        let sender = self.sender.lock();
        let rejected = match sender.as_ref() {
            Some(tx) => tx.send(job).err().map(|e| e.into_inner()),
            None => Some(job),
        };
        drop(sender);

        if let Some(job) = rejected {
            self.shared.cancel(&job, "optimizer shut down");
            self.shared.job_finished();
        }
    }
}

impl CallProfiler for OptimizationManager {
    fn record_call(&self, function_index: usize, function: &CompiledFunction) {
        let shared = &self.shared;
        if !shared.enabled.load(Ordering::Acquire) {
            return;
        }
        // published or failed: nothing left to count for this name
        if shared.is_settled(&function.name) {
            return;
        }
        let count = shared.bump(&function.name);
        if count < shared.config.hot_threshold {
            return;
        }
        if shared.try_admit(&function.name, function_index) {
            self.submit(Job {
                name: function.name.clone(),
                index: function_index,
            });
        }
    }

    fn optimized_function(&self, function_index: usize) -> Option<Arc<CompiledFunction>> {
        self.shared
            .by_index
            .get(&function_index)
            .map(|f| Arc::clone(f.value()))
    }
}

impl fmt::Debug for OptimizationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizationManager")
            .field("config", &self.shared.config)
            .field("enabled", &self.is_optimization_enabled())
            .field("stats", &self.stats())
            .field("optimized", &self.optimized_count())
            .finish()
    }
}

impl Drop for OptimizationManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
