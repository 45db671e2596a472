use super::*;

// Each worker bumps its own shard so the hash counters never bounce a
// cache line between cores; readers sum on demand.
#[repr(align(64))]
#[derive(Default)]
struct Shard {
    hashes: AtomicU64,
}

pub struct Metrics {
    shards: Vec<Shard>,
    shares_found: AtomicU64,
    shares_accepted: AtomicU64,
    shares_rejected_stale: AtomicU64,
    shares_rejected_other: AtomicU64,
    whale_events: AtomicU64,
    difficulty: AtomicU64,
    kernel_variant: kernel::Variant,
    started: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snapshot {
    pub hashes_total: u64,
    pub shares_found: u64,
    pub shares_accepted: u64,
    pub shares_rejected_stale: u64,
    pub shares_rejected_other: u64,
    pub current_difficulty: f64,
    pub kernel_variant: kernel::Variant,
    pub whale_events_total: u64,
}

impl Metrics {
    pub fn new(workers: usize, kernel_variant: kernel::Variant) -> Self {
        Self {
            shards: (0..workers.max(1)).map(|_| Shard::default()).collect(),
            shares_found: AtomicU64::new(0),
            shares_accepted: AtomicU64::new(0),
            shares_rejected_stale: AtomicU64::new(0),
            shares_rejected_other: AtomicU64::new(0),
            whale_events: AtomicU64::new(0),
            difficulty: AtomicU64::new(1f64.to_bits()),
            kernel_variant,
            started: Instant::now(),
        }
    }

    pub fn add_hashes(&self, worker: usize, count: u64) {
        self.shards[worker].hashes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn hashes_total(&self) -> u64 {
        self.shards
            .iter()
            .map(|shard| shard.hashes.load(Ordering::Relaxed))
            .sum()
    }

    pub fn record_share_found(&self) {
        self.shares_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_share_accepted(&self) {
        self.shares_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_share_rejected_stale(&self) {
        self.shares_rejected_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_share_rejected_other(&self) {
        self.shares_rejected_other.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_whale_event(&self) {
        self.whale_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_difficulty(&self, difficulty: Difficulty) {
        self.difficulty
            .store(difficulty.as_f64().to_bits(), Ordering::Relaxed);
    }

    pub fn difficulty(&self) -> f64 {
        f64::from_bits(self.difficulty.load(Ordering::Relaxed))
    }

    pub fn kernel_variant(&self) -> kernel::Variant {
        self.kernel_variant
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            hashes_total: self.hashes_total(),
            shares_found: self.shares_found.load(Ordering::Relaxed),
            shares_accepted: self.shares_accepted.load(Ordering::Relaxed),
            shares_rejected_stale: self.shares_rejected_stale.load(Ordering::Relaxed),
            shares_rejected_other: self.shares_rejected_other.load(Ordering::Relaxed),
            current_difficulty: self.difficulty(),
            kernel_variant: self.kernel_variant,
            whale_events_total: self.whale_events.load(Ordering::Relaxed),
        }
    }
}

pub async fn status_line(metrics: Arc<Metrics>, cancel: CancellationToken) {
    let frames = ["⣷", "⣯", "⣟", "⡿", "⢿", "⣻", "⣽", "⣾"];
    let mut idx = 0;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut prev_time = Instant::now();
    let mut prev_total = metrics.hashes_total();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        let total = metrics.hashes_total();
        let snapshot = metrics.snapshot();

        let hash_rate = HashRate::from_hashes(
            total.saturating_sub(prev_total),
            now.duration_since(prev_time),
        );

        let spinner = frames[idx % frames.len()];
        idx = idx.wrapping_add(1);

        let line = format!(
            " {spinner}  {hash_rate}  diff={}  shares={}/{} (stale {})  whales={}  up={:.0}s",
            snapshot.current_difficulty,
            snapshot.shares_accepted,
            snapshot.shares_found,
            snapshot.shares_rejected_stale,
            snapshot.whale_events_total,
            metrics.uptime().as_secs_f64(),
        );

        let mut out = io::stdout();
        let _ = write!(out, "\r\x1b[2K{line}");
        let _ = out.flush();

        prev_time = now;
        prev_total = total;
    }
}
