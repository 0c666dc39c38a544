//! Per-thread generator instantiation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::rng::{EntropyRng, RngError};

use super::worker::{ReseederHandle, ReseederLink, ReseederLoop};

type Supplier = dyn Fn() -> Arc<dyn EntropyRng> + Send + Sync;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    // Per-thread instances, keyed by the owning wrapper's id. The map dies
    // with the thread, dropping the instances and lapsing any weak
    // reseeder registrations they held.
    static INSTANCES: RefCell<HashMap<u64, Arc<dyn EntropyRng>>> = RefCell::new(HashMap::new());
}

/// Calls the supplier on first access from each thread and caches the
/// result for that thread.
struct PerThread {
    id: u64,
    supplier: Arc<Supplier>,
}

impl PerThread {
    fn new(supplier: Arc<Supplier>) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            supplier,
        }
    }

    fn current(&self) -> Arc<dyn EntropyRng> {
        INSTANCES.with(|instances| {
            instances
                .borrow_mut()
                .entry(self.id)
                .or_insert_with(|| {
                    tracing::debug!(id = self.id, "creating per-thread generator");
                    (self.supplier)()
                })
                .clone()
        })
    }
}

/// A generator with one independent instance per calling thread.
///
/// The supplier runs on first access from each thread; afterwards every
/// call on that thread uses the same instance, so threads share nothing
/// and no output lock is contended across threads. [`set_seed`] is a
/// no-op: per-thread reseeding belongs to the reseeder (see
/// [`ReseedingThreadLocalRng`]).
///
/// [`set_seed`]: EntropyRng::set_seed
pub struct ThreadLocalRng {
    cells: PerThread,
}

impl ThreadLocalRng {
    /// Creates a per-thread generator from a supplier.
    pub fn new(supplier: impl Fn() -> Arc<dyn EntropyRng> + Send + Sync + 'static) -> Self {
        Self {
            cells: PerThread::new(Arc::new(supplier)),
        }
    }
}

impl EntropyRng for ThreadLocalRng {
    fn next_bits(&self, bits: u32) -> u32 {
        self.cells.current().next_bits(bits)
    }

    fn next_u64_raw(&self) -> u64 {
        self.cells.current().next_u64_raw()
    }

    fn next_f64_raw(&self) -> f64 {
        self.cells.current().next_f64_raw()
    }

    fn fill_bytes_raw(&self, dest: &mut [u8]) {
        self.cells.current().fill_bytes_raw(dest);
    }

    fn debit(&self, bits: i64) {
        self.cells.current().debit(bits);
    }

    fn entropy_bits(&self) -> i64 {
        self.cells.current().entropy_bits()
    }

    fn take_stashed_gaussian(&self) -> Option<f64> {
        self.cells.current().take_stashed_gaussian()
    }

    fn stash_gaussian(&self, value: f64) {
        self.cells.current().stash_gaussian(value);
    }

    fn set_seed(&self, _seed: &[u8]) -> Result<(), RngError> {
        // Reseeding a single thread's instance from outside would break
        // thread independence; the reseeder handles per-thread reseeds.
        Ok(())
    }

    fn set_seed_u64(&self, _value: u64) -> Result<(), RngError> {
        Ok(())
    }

    fn seed(&self) -> Result<Vec<u8>, RngError> {
        self.cells.current().seed()
    }

    fn new_seed_length(&self) -> usize {
        self.cells.current().new_seed_length()
    }

    fn set_reseeder(&self, link: Option<ReseederLink>) {
        if link.is_some() {
            tracing::warn!(
                "ThreadLocalRng ignores reseeder registration; use ReseedingThreadLocalRng"
            );
        }
    }

    fn reseed_failed(&self) -> bool {
        self.cells.current().reseed_failed()
    }

    fn set_reseed_failed(&self, failed: bool) {
        self.cells.current().set_reseed_failed(failed);
    }

    fn dump(&self) -> String {
        format!(
            "ThreadLocalRng {{ id: {}, current: {} }}",
            self.cells.id,
            self.cells.current().dump()
        )
    }
}

/// A per-thread generator whose instances are registered with a
/// [`ReseederLoop`] as they are created.
///
/// Each thread's instance is reseeded independently when its own entropy
/// runs out. Thread exit drops the instance, which lapses its weak
/// registration with the loop.
pub struct ReseedingThreadLocalRng {
    cells: PerThread,
}

impl ReseedingThreadLocalRng {
    /// Creates a per-thread generator whose instances register with the
    /// given loop.
    pub fn new(
        supplier: impl Fn() -> Arc<dyn EntropyRng> + Send + Sync + 'static,
        reseeder: &ReseederLoop,
    ) -> Self {
        Self::with_handle(supplier, reseeder.handle())
    }

    /// As [`new`](Self::new), but from a detached handle.
    pub fn with_handle(
        supplier: impl Fn() -> Arc<dyn EntropyRng> + Send + Sync + 'static,
        handle: ReseederHandle,
    ) -> Self {
        let registering = move || {
            let rng = supplier();
            if !handle.register(&rng) {
                tracing::warn!("reseeder loop is gone; per-thread generator left unregistered");
            }
            rng
        };
        Self {
            cells: PerThread::new(Arc::new(registering)),
        }
    }
}

impl EntropyRng for ReseedingThreadLocalRng {
    fn next_bits(&self, bits: u32) -> u32 {
        self.cells.current().next_bits(bits)
    }

    fn next_u64_raw(&self) -> u64 {
        self.cells.current().next_u64_raw()
    }

    fn next_f64_raw(&self) -> f64 {
        self.cells.current().next_f64_raw()
    }

    fn fill_bytes_raw(&self, dest: &mut [u8]) {
        self.cells.current().fill_bytes_raw(dest);
    }

    fn debit(&self, bits: i64) {
        self.cells.current().debit(bits);
    }

    fn entropy_bits(&self) -> i64 {
        self.cells.current().entropy_bits()
    }

    fn take_stashed_gaussian(&self) -> Option<f64> {
        self.cells.current().take_stashed_gaussian()
    }

    fn stash_gaussian(&self, value: f64) {
        self.cells.current().stash_gaussian(value);
    }

    fn set_seed(&self, _seed: &[u8]) -> Result<(), RngError> {
        Ok(())
    }

    fn set_seed_u64(&self, _value: u64) -> Result<(), RngError> {
        Ok(())
    }

    fn seed(&self) -> Result<Vec<u8>, RngError> {
        self.cells.current().seed()
    }

    fn new_seed_length(&self) -> usize {
        self.cells.current().new_seed_length()
    }

    fn set_reseeder(&self, link: Option<ReseederLink>) {
        if link.is_some() {
            tracing::warn!(
                "ReseedingThreadLocalRng instances register themselves; ignoring explicit link"
            );
        }
    }

    fn reseed_failed(&self) -> bool {
        self.cells.current().reseed_failed()
    }

    fn set_reseed_failed(&self, failed: bool) {
        self.cells.current().set_reseed_failed(failed);
    }

    fn dump(&self) -> String {
        format!(
            "ReseedingThreadLocalRng {{ id: {}, current: {} }}",
            self.cells.id,
            self.cells.current().dump()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{RandomExt, SplitMixRng};
    use crate::seed::{SeedError, SeedSource};
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    struct CountingSource(AtomicUsize);

    impl SeedSource for CountingSource {
        fn generate(&self, length: usize) -> Result<Vec<u8>, SeedError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            Ok((0..length).map(|i| (n * 13 + i) as u8).collect())
        }
    }

    fn supplier() -> impl Fn() -> Arc<dyn EntropyRng> + Send + Sync + 'static {
        let counter = AtomicUsize::new(1);
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) as u64;
            Arc::new(SplitMixRng::from_seed(&n.to_le_bytes()).unwrap())
        }
    }

    #[test]
    fn test_same_instance_within_a_thread() {
        let rng = ThreadLocalRng::new(supplier());
        let seed = rng.seed().unwrap();
        rng.next_u64();
        assert_eq!(rng.seed().unwrap(), seed);
    }

    #[test]
    fn test_distinct_instances_across_threads() {
        let rng = Arc::new(ThreadLocalRng::new(supplier()));
        let here = rng.seed().unwrap();
        let there = {
            let rng = Arc::clone(&rng);
            std::thread::spawn(move || rng.seed().unwrap())
                .join()
                .unwrap()
        };
        assert_ne!(here, there);
    }

    #[test]
    fn test_set_seed_is_a_no_op() {
        let rng = ThreadLocalRng::new(supplier());
        let seed = rng.seed().unwrap();
        rng.set_seed(&[0xFF; 8]).unwrap();
        assert_eq!(rng.seed().unwrap(), seed);
    }

    #[test]
    fn test_two_wrappers_do_not_collide() {
        let a = ThreadLocalRng::new(supplier());
        let b = ThreadLocalRng::new(supplier());
        assert_ne!(a.seed().unwrap(), b.seed().unwrap());
    }

    #[test]
    fn test_output_flows_through_current_instance() {
        let rng = ThreadLocalRng::new(supplier());
        let before = rng.entropy_bits();
        rng.next_u32();
        assert_eq!(rng.entropy_bits(), before - 32);
    }

    #[test]
    fn test_reseeding_variant_registers_and_reseeds() {
        let reseeder = ReseederLoop::new(CountingSource(AtomicUsize::new(0)));
        let rng = ReseedingThreadLocalRng::new(supplier(), &reseeder);
        let initial_seed = rng.seed().unwrap();

        rng.next_u64();
        let start = Instant::now();
        let mut reseeded = false;
        while start.elapsed() < Duration::from_millis(1_000) {
            if rng.seed().unwrap() != initial_seed {
                reseeded = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(reseeded, "per-thread instance was not reseeded");
    }

    #[test]
    fn test_reseeding_variant_after_loop_death() {
        let reseeder = ReseederLoop::new(CountingSource(AtomicUsize::new(0)));
        let handle = reseeder.handle();
        drop(reseeder);
        let rng = ReseedingThreadLocalRng::with_handle(supplier(), handle);
        // Instances still work, just without background reseeding.
        rng.next_u64();
        assert!(rng.seed().is_ok());
    }
}
