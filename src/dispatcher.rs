use {super::*, std::ops::Range};

/// Owns the single current-job slot and the generation counter that tells
/// workers when their snapshot is stale. Publishing bumps the generation
/// before the new job lands in the slot, so a worker that still sees its
/// own generation is guaranteed to be holding the current job.
pub struct Dispatcher {
    workers: usize,
    generation: AtomicU64,
    slot: Mutex<Option<Arc<Job>>>,
    published: Condvar,
    lanes: Vec<Lane>,
}

// One cache line per worker so extranonce2 draws never contend.
#[repr(align(64))]
#[derive(Default)]
struct Lane {
    extranonce2: AtomicU64,
}

impl Dispatcher {
    pub fn new(workers: usize) -> Self {
        assert!(workers > 0, "dispatcher needs at least one worker");

        Self {
            workers,
            generation: AtomicU64::new(0),
            slot: Mutex::new(None),
            published: Condvar::new(),
            lanes: (0..workers).map(|_| Lane::default()).collect(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Publishes a new current job, invalidating all in-flight work. Worker
    /// extranonce2 counters restart at zero; their nonce ranges are
    /// per-worker constants, so repartitioning is implicit.
    pub fn publish(&self, job: Job) {
        let mut slot = self.slot.lock();

        self.generation.fetch_add(1, Ordering::AcqRel);

        for lane in &self.lanes {
            lane.extranonce2.store(0, Ordering::Relaxed);
        }

        *slot = Some(Arc::new(job));
        self.published.notify_all();
    }

    /// Drops the current job without a replacement, e.g. after a pool
    /// disconnect when the session's extranonce1 no longer applies.
    pub fn clear(&self) {
        let mut slot = self.slot.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *slot = None;
    }

    pub fn current(&self) -> Option<(u64, Arc<Job>)> {
        let slot = self.slot.lock();
        slot.as_ref()
            .map(|job| (self.generation.load(Ordering::Acquire), job.clone()))
    }

    /// Parks until a job is available, up to `wait`. Workers call this only
    /// when idle; while mining they poll `generation` instead.
    pub fn wait_for_job(&self, wait: Duration) -> Option<(u64, Arc<Job>)> {
        let mut slot = self.slot.lock();

        if slot.is_none() {
            self.published.wait_for(&mut slot, wait);
        }

        slot.as_ref()
            .map(|job| (self.generation.load(Ordering::Acquire), job.clone()))
    }

    /// The half-open nonce range assigned to `worker`: the u32 space split
    /// evenly, with the last worker absorbing the division remainder.
    pub fn nonce_range(&self, worker: usize) -> Range<u64> {
        assert!(worker < self.workers, "worker index out of range");

        let span = (1u64 << 32) / self.workers as u64;
        let start = worker as u64 * span;

        let end = if worker + 1 == self.workers {
            1u64 << 32
        } else {
            start + span
        };

        start..end
    }

    /// The next extranonce2 for `worker`: monotonic within a job, exactly
    /// `size` little-endian bytes.
    pub fn next_extranonce2(&self, worker: usize, size: usize) -> Extranonce {
        let counter = self.lanes[worker].extranonce2.fetch_add(1, Ordering::Relaxed);
        Extranonce::from_counter(counter, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> Job {
        let notify = Notify {
            job_id: id.into(),
            prevhash: "0000000000000000000000000000000000000000000000000000000000000000"
                .parse()
                .unwrap(),
            coinb1: "01".into(),
            coinb2: "02".into(),
            merkle_branches: Vec::new(),
            version: Version(block::Version::TWO),
            nbits: "1d00ffff".parse().unwrap(),
            ntime: "504e86b9".parse().unwrap(),
            clean_jobs: false,
        };

        Job::assemble(notify, &Extranonce::default(), 4, Difficulty::default()).unwrap()
    }

    #[test]
    fn nonce_ranges_partition_the_u32_space() {
        for workers in [1, 2, 3, 7, 8, 16] {
            let dispatcher = Dispatcher::new(workers);

            let ranges: Vec<_> = (0..workers).map(|i| dispatcher.nonce_range(i)).collect();

            assert_eq!(ranges[0].start, 0);
            assert_eq!(ranges[workers - 1].end, 1u64 << 32);

            for pair in ranges.windows(2) {
                assert_eq!(pair[0].end, pair[1].start, "{workers} workers");
                assert!(!pair[0].is_empty());
            }

            let total: u64 = ranges.iter().map(|r| r.end - r.start).sum();
            assert_eq!(total, 1u64 << 32);
        }
    }

    #[test]
    fn publish_bumps_generation() {
        let dispatcher = Dispatcher::new(2);
        assert_eq!(dispatcher.generation(), 0);
        assert!(dispatcher.current().is_none());

        dispatcher.publish(job("a"));
        let (generation, current) = dispatcher.current().unwrap();
        assert_eq!(generation, 1);
        assert_eq!(current.job_id, "a".into());

        dispatcher.publish(job("b"));
        let (generation, current) = dispatcher.current().unwrap();
        assert_eq!(generation, 2);
        assert_eq!(current.job_id, "b".into());
    }

    #[test]
    fn clear_empties_the_slot_and_invalidates() {
        let dispatcher = Dispatcher::new(1);
        dispatcher.publish(job("a"));

        let generation = dispatcher.generation();
        dispatcher.clear();

        assert!(dispatcher.current().is_none());
        assert!(dispatcher.generation() > generation);
    }

    #[test]
    fn extranonce2_is_monotonic_per_worker_and_resets_on_publish() {
        let dispatcher = Dispatcher::new(2);
        dispatcher.publish(job("a"));

        assert_eq!(dispatcher.next_extranonce2(0, 4).to_hex(), "00000000");
        assert_eq!(dispatcher.next_extranonce2(0, 4).to_hex(), "01000000");
        assert_eq!(dispatcher.next_extranonce2(1, 4).to_hex(), "00000000");

        dispatcher.publish(job("b"));
        assert_eq!(dispatcher.next_extranonce2(0, 4).to_hex(), "00000000");
    }

    #[test]
    fn wait_for_job_times_out_when_idle() {
        let dispatcher = Dispatcher::new(1);
        assert!(dispatcher.wait_for_job(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn wait_for_job_wakes_on_publish() {
        let dispatcher = Arc::new(Dispatcher::new(1));

        let waiter = {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || dispatcher.wait_for_job(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        dispatcher.publish(job("a"));

        let (generation, current) = waiter.join().unwrap().unwrap();
        assert_eq!(generation, 1);
        assert_eq!(current.job_id, "a".into());
    }
}
