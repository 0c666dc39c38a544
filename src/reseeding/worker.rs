//! The background reseeder worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::Duration;

use crate::rng::EntropyRng;
use crate::seed::SeedSource;

/// Worker scheduling priority. Advisory: recorded and reported, applied
/// where the platform allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Default scheduling.
    Normal,
    /// Prefer the reseeder when generators are starved.
    High,
}

/// Tuning for reseed retries.
#[derive(Debug, Clone)]
pub struct ReseederConfig {
    /// First delay after a failed seed fetch.
    pub backoff_start: Duration,
    /// Upper bound on the delay between retries.
    pub backoff_cap: Duration,
    /// Seed fetch attempts per request before the generator is marked
    /// reseed-failed.
    pub max_attempts: u32,
}

impl Default for ReseederConfig {
    fn default() -> Self {
        Self {
            backoff_start: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(10),
            max_attempts: 4,
        }
    }
}

struct LoopState {
    registered: Vec<Weak<dyn EntropyRng>>,
    pending: Vec<Weak<dyn EntropyRng>>,
    stopped: bool,
}

pub(crate) struct LoopInner {
    source: Box<dyn SeedSource>,
    config: ReseederConfig,
    high_priority: AtomicBool,
    state: Mutex<LoopState>,
    wake: Condvar,
}

/// Background worker that reseeds registered generators when their entropy
/// runs out.
///
/// One loop serves one [`SeedSource`] and any number of generators. The
/// loop holds only weak references, so dropping a generator deregisters
/// it; generators hold a backlink through which exhausted entropy counters
/// nudge the worker. Dropping (or [`stop`](Self::stop)ping) the loop lets
/// the worker finish any in-flight reseed and exit; debits recorded after
/// that are no-ops.
pub struct ReseederLoop {
    inner: Arc<LoopInner>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ReseederLoop {
    /// Spawns a reseeder over the given source with default retry tuning.
    pub fn new(source: impl SeedSource + 'static) -> Self {
        Self::with_config(source, ReseederConfig::default())
    }

    /// Spawns a reseeder with explicit retry tuning.
    pub fn with_config(source: impl SeedSource + 'static, config: ReseederConfig) -> Self {
        let inner = Arc::new(LoopInner {
            source: Box::new(source),
            config,
            high_priority: AtomicBool::new(false),
            state: Mutex::new(LoopState {
                registered: Vec::new(),
                pending: Vec::new(),
                stopped: false,
            }),
            wake: Condvar::new(),
        });
        let worker_inner = Arc::clone(&inner);
        let worker = thread::Builder::new()
            .name("entrand-reseeder".into())
            .spawn(move || run(worker_inner))
            .expect("failed to spawn reseeder thread");
        Self {
            inner,
            worker: Some(worker),
        }
    }

    /// Registers a generator for background reseeding.
    ///
    /// Installs the backlink on the generator, deregistering it from any
    /// previous loop.
    pub fn add(&self, prng: &Arc<dyn EntropyRng>) {
        register(&self.inner, prng);
    }

    /// Deregisters a generator. A reseed already in flight for it still
    /// completes.
    pub fn remove(&self, prng: &Arc<dyn EntropyRng>) {
        prng.set_reseeder(None);
    }

    /// True if the generator is currently registered with this loop.
    pub fn contains(&self, prng: &Arc<dyn EntropyRng>) -> bool {
        let target = Arc::downgrade(prng);
        let state = self.inner.state.lock().unwrap();
        state.registered.iter().any(|w| w.ptr_eq(&target))
    }

    /// A clonable handle for registering generators without holding the
    /// loop itself. Handles lapse when the loop is dropped.
    pub fn handle(&self) -> ReseederHandle {
        ReseederHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Adjusts the worker priority.
    pub fn set_priority(&self, priority: Priority) {
        self.inner
            .high_priority
            .store(priority == Priority::High, Ordering::Release);
        tracing::debug!(?priority, "reseeder priority changed");
    }

    /// Current worker priority.
    pub fn priority(&self) -> Priority {
        if self.inner.high_priority.load(Ordering::Acquire) {
            Priority::High
        } else {
            Priority::Normal
        }
    }

    /// Stops the worker, blocking until any in-flight reseed finishes.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.stopped = true;
            state.registered.clear();
            state.pending.clear();
        }
        self.inner.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            tracing::debug!("reseeder stopped");
        }
    }
}

impl Drop for ReseederLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Clonable registration handle to a [`ReseederLoop`].
#[derive(Clone)]
pub struct ReseederHandle {
    inner: Weak<LoopInner>,
}

impl ReseederHandle {
    /// Registers a generator; returns false if the loop is gone.
    pub fn register(&self, prng: &Arc<dyn EntropyRng>) -> bool {
        match self.inner.upgrade() {
            Some(inner) => {
                register(&inner, prng);
                true
            }
            None => false,
        }
    }
}

/// Backlink from a generator to its reseeder loop.
///
/// Installed by [`ReseederLoop::add`]; exhausted entropy counters use it
/// to queue the generator for reseeding. Holds only weak references in
/// both directions, so neither side keeps the other alive.
pub struct ReseederLink {
    loop_inner: Weak<LoopInner>,
    target: Weak<dyn EntropyRng>,
}

impl ReseederLink {
    /// Queues the target for reseeding. Idempotent while the request is
    /// already pending; a no-op once the loop is stopped or gone.
    pub(crate) fn nudge(&self) {
        let Some(inner) = self.loop_inner.upgrade() else {
            return;
        };
        let mut state = inner.state.lock().unwrap();
        if state.stopped {
            return;
        }
        if !state.registered.iter().any(|w| w.ptr_eq(&self.target)) {
            return;
        }
        if !state.pending.iter().any(|w| w.ptr_eq(&self.target)) {
            state.pending.push(self.target.clone());
            inner.wake.notify_all();
        }
    }

    /// Removes the target from the loop's tables.
    pub(crate) fn detach(&self) {
        if let Some(inner) = self.loop_inner.upgrade() {
            let mut state = inner.state.lock().unwrap();
            state.registered.retain(|w| !w.ptr_eq(&self.target));
            state.pending.retain(|w| !w.ptr_eq(&self.target));
        }
    }

    /// True if both links point at the same loop.
    pub(crate) fn same_loop(&self, other: &ReseederLink) -> bool {
        Weak::ptr_eq(&self.loop_inner, &other.loop_inner)
    }
}

/// Installs the backlink on the generator and records its registration.
fn register(inner: &Arc<LoopInner>, prng: &Arc<dyn EntropyRng>) {
    prng.set_reseeder(Some(ReseederLink {
        loop_inner: Arc::downgrade(inner),
        target: Arc::downgrade(prng),
    }));
    let target = Arc::downgrade(prng);
    let mut state = inner.state.lock().unwrap();
    state.registered.retain(|w| w.strong_count() > 0);
    if !state.registered.iter().any(|w| w.ptr_eq(&target)) {
        state.registered.push(target);
    }
}

impl LoopInner {
    /// Sleeps for `duration` unless stopped first; returns true if the
    /// loop was stopped.
    fn interruptible_sleep(&self, duration: Duration) -> bool {
        let state = self.state.lock().unwrap();
        let (state, _) = self
            .wake
            .wait_timeout_while(state, duration, |s| !s.stopped)
            .unwrap();
        state.stopped
    }

    /// Fetches a fresh seed and applies it, retrying fetch failures with
    /// exponential backoff. Marks the generator reseed-failed after the
    /// configured attempts.
    fn reseed(&self, prng: &dyn EntropyRng) {
        let length = prng.new_seed_length();
        let mut backoff = self.config.backoff_start;
        for attempt in 1..=self.config.max_attempts {
            match self.source.generate(length) {
                Ok(seed) => match prng.set_seed(&seed) {
                    Ok(()) => {
                        prng.set_reseed_failed(false);
                        tracing::debug!(length, "reseeded generator");
                        return;
                    }
                    Err(error) => {
                        // A length the generator itself asked for was
                        // rejected; retrying cannot help.
                        tracing::warn!(%error, length, "generator rejected reseed");
                        prng.set_reseed_failed(true);
                        return;
                    }
                },
                Err(error) => {
                    tracing::warn!(%error, attempt, "seed source failed");
                    if attempt < self.config.max_attempts {
                        if self.interruptible_sleep(backoff) {
                            return;
                        }
                        backoff = (backoff * 2).min(self.config.backoff_cap);
                    }
                }
            }
        }
        prng.set_reseed_failed(true);
        tracing::error!(
            attempts = self.config.max_attempts,
            "giving up on reseed request"
        );
    }
}

fn run(inner: Arc<LoopInner>) {
    tracing::debug!("reseeder started");
    loop {
        let batch = {
            let mut state = inner.state.lock().unwrap();
            loop {
                if state.stopped {
                    return;
                }
                state.registered.retain(|w| w.strong_count() > 0);
                if !state.pending.is_empty() {
                    break std::mem::take(&mut state.pending);
                }
                state = inner.wake.wait(state).unwrap();
            }
        };
        for weak in batch {
            // Honor deregistration and shutdown up to the moment the seed
            // fetch begins; after that the reseed runs to completion.
            let proceed = {
                let state = inner.state.lock().unwrap();
                !state.stopped && state.registered.iter().any(|w| w.ptr_eq(&weak))
            };
            if !proceed {
                continue;
            }
            if let Some(prng) = weak.upgrade() {
                inner.reseed(&*prng);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{RandomExt, SplitMixRng};
    use crate::seed::{SeedError, SeedSource};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct CountingSource(AtomicUsize);

    impl CountingSource {
        fn new() -> Self {
            Self(AtomicUsize::new(0))
        }
    }

    impl SeedSource for CountingSource {
        fn generate(&self, length: usize) -> Result<Vec<u8>, SeedError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            Ok((0..length).map(|i| (n + i) as u8).collect())
        }
    }

    struct FailingSource;

    impl SeedSource for FailingSource {
        fn generate(&self, _length: usize) -> Result<Vec<u8>, SeedError> {
            Err(SeedError::Unavailable {
                reason: "no entropy today".into(),
            })
        }
    }

    fn fast_config() -> ReseederConfig {
        ReseederConfig {
            backoff_start: Duration::from_millis(5),
            backoff_cap: Duration::from_millis(20),
            max_attempts: 3,
        }
    }

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_reseeds_after_exhaustion() {
        let reseeder = ReseederLoop::new(CountingSource::new());
        let rng: Arc<dyn EntropyRng> = Arc::new(SplitMixRng::from_seed(&[0u8; 8]).unwrap());
        reseeder.add(&rng);
        let initial_seed = rng.seed().unwrap();

        // One full draw empties the 64-bit budget and nudges the loop.
        rng.next_u64();
        let reseeded = wait_until(Duration::from_millis(1_000), || {
            rng.seed().unwrap() != initial_seed
        });
        assert!(reseeded, "seed did not change within 1s");
        assert!(rng.entropy_bits() > 0);
        assert!(!rng.reseed_failed());
    }

    #[test]
    fn test_no_reseed_while_entropy_remains() {
        let reseeder = ReseederLoop::new(CountingSource::new());
        let rng: Arc<dyn EntropyRng> = Arc::new(SplitMixRng::from_seed(&[1u8; 8]).unwrap());
        reseeder.add(&rng);
        let initial_seed = rng.seed().unwrap();

        rng.next_u32();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(rng.seed().unwrap(), initial_seed);
    }

    #[test]
    fn test_deregistered_generator_is_left_alone() {
        let reseeder = ReseederLoop::new(CountingSource::new());
        let rng: Arc<dyn EntropyRng> = Arc::new(SplitMixRng::from_seed(&[2u8; 8]).unwrap());
        reseeder.add(&rng);
        assert!(reseeder.contains(&rng));
        reseeder.remove(&rng);
        assert!(!reseeder.contains(&rng));

        let initial_seed = rng.seed().unwrap();
        rng.next_u64();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(rng.seed().unwrap(), initial_seed);
    }

    #[test]
    fn test_reregistration_moves_between_loops() {
        let first = ReseederLoop::new(CountingSource::new());
        let second = ReseederLoop::new(CountingSource::new());
        let rng: Arc<dyn EntropyRng> = Arc::new(SplitMixRng::from_seed(&[3u8; 8]).unwrap());
        first.add(&rng);
        second.add(&rng);
        assert!(!first.contains(&rng));
        assert!(second.contains(&rng));
    }

    #[test]
    fn test_persistent_failure_sets_flag() {
        let reseeder = ReseederLoop::with_config(FailingSource, fast_config());
        let rng: Arc<dyn EntropyRng> = Arc::new(SplitMixRng::from_seed(&[4u8; 8]).unwrap());
        reseeder.add(&rng);
        rng.next_u64();

        let flagged = wait_until(Duration::from_millis(2_000), || rng.reseed_failed());
        assert!(flagged, "reseed-failed flag was not set");
        // Output keeps flowing regardless.
        rng.next_u64();
    }

    #[test]
    fn test_flag_clears_on_later_success() {
        let reseeder = ReseederLoop::with_config(CountingSource::new(), fast_config());
        let rng: Arc<dyn EntropyRng> = Arc::new(SplitMixRng::from_seed(&[5u8; 8]).unwrap());
        rng.set_reseed_failed(true);
        reseeder.add(&rng);
        rng.next_u64();
        let cleared = wait_until(Duration::from_millis(1_000), || !rng.reseed_failed());
        assert!(cleared);
    }

    #[test]
    fn test_stop_quiesces_links() {
        let reseeder = ReseederLoop::new(CountingSource::new());
        let rng: Arc<dyn EntropyRng> = Arc::new(SplitMixRng::from_seed(&[6u8; 8]).unwrap());
        reseeder.add(&rng);
        reseeder.stop();

        let initial_seed = rng.seed().unwrap();
        rng.next_u64();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(rng.seed().unwrap(), initial_seed);
    }

    #[test]
    fn test_dropped_generator_is_purged() {
        let reseeder = ReseederLoop::new(CountingSource::new());
        {
            let rng: Arc<dyn EntropyRng> = Arc::new(SplitMixRng::from_seed(&[7u8; 8]).unwrap());
            reseeder.add(&rng);
        }
        // The weak registration lapses; nothing to assert beyond the loop
        // surviving its next wakeup.
        let rng: Arc<dyn EntropyRng> = Arc::new(SplitMixRng::from_seed(&[8u8; 8]).unwrap());
        reseeder.add(&rng);
        rng.next_u64();
        assert!(wait_until(Duration::from_millis(1_000), || {
            rng.entropy_bits() > 0
        }));
    }

    #[test]
    fn test_priority_is_recorded() {
        let reseeder = ReseederLoop::new(CountingSource::new());
        assert_eq!(reseeder.priority(), Priority::Normal);
        reseeder.set_priority(Priority::High);
        assert_eq!(reseeder.priority(), Priority::High);
    }

    #[test]
    fn test_handle_outlives_check() {
        let reseeder = ReseederLoop::new(CountingSource::new());
        let handle = reseeder.handle();
        let rng: Arc<dyn EntropyRng> = Arc::new(SplitMixRng::from_seed(&[9u8; 8]).unwrap());
        assert!(handle.register(&rng));
        drop(reseeder);
        let other: Arc<dyn EntropyRng> = Arc::new(SplitMixRng::from_seed(&[10u8; 8]).unwrap());
        assert!(!handle.register(&other));
    }
}
