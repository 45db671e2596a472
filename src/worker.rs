use super::*;

const IDLE_WAIT: Duration = Duration::from_millis(100);

/// A CPU-bound mining thread. Never blocks on I/O: between 16-wide batches
/// it polls the dispatcher generation, and only parks when there is no job
/// at all.
pub struct Worker {
    pub index: usize,
    pub dispatcher: Arc<Dispatcher>,
    pub shares: Arc<ShareQueue>,
    pub metrics: Arc<Metrics>,
    pub kernel: Kernel,
    pub cancel: CancellationToken,
}

impl Worker {
    pub fn spawn(self) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name(format!("worker-{}", self.index))
            .spawn(move || self.run())
            .expect("failed to spawn worker thread")
    }

    pub fn run(self) {
        while !self.cancel.is_cancelled() {
            let Some((generation, job)) = self.dispatcher.wait_for_job(IDLE_WAIT) else {
                continue;
            };

            self.mine(generation, &job);
        }
    }

    /// Mines `job` until its generation goes stale or shutdown: sweep the
    /// assigned nonce range under one extranonce2, then roll to the next
    /// extranonce2 and sweep again.
    fn mine(&self, generation: u64, job: &Job) {
        let range = self.dispatcher.nonce_range(self.index);

        loop {
            let extranonce2 = self
                .dispatcher
                .next_extranonce2(self.index, job.extranonce2_size);

            let merkle_root = job.merkle_root(&extranonce2);
            let header = job.header(&merkle_root);

            let mut digests = [[0u8; 32]; kernel::BATCH];
            let mut nonce = range.start;

            while nonce < range.end {
                if self.cancel.is_cancelled() || self.dispatcher.generation() != generation {
                    return;
                }

                let take = (range.end - nonce).min(kernel::BATCH as u64) as usize;
                let last = range.end - 1;
                let nonces: [u32; kernel::BATCH] =
                    std::array::from_fn(|lane| (nonce + lane as u64).min(last) as u32);

                self.kernel.sha256d_batch(&header, &nonces, &mut digests);
                self.metrics.add_hashes(self.index, take as u64);

                for lane in 0..take {
                    if difficulty::meets(&digests[lane], &job.target) {
                        self.metrics.record_share_found();

                        debug!(
                            job_id = %job.job_id,
                            nonce = %Nonce::from(nonces[lane]),
                            extranonce2 = %extranonce2,
                            "share candidate found",
                        );

                        self.shares.push(ShareCandidate {
                            job_id: job.job_id.clone(),
                            extranonce2: extranonce2.clone(),
                            ntime: job.ntime,
                            nonce: nonces[lane].into(),
                            digest: digests[lane],
                        });
                    }
                }

                nonce += take as u64;
            }

            if self.cancel.is_cancelled() || self.dispatcher.generation() != generation {
                return;
            }
        }
    }
}
