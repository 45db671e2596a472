use super::*;

/// A share found by a worker, waiting to be serialized into
/// `mining.submit`. Consumed exactly once by the Stratum client.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareCandidate {
    pub job_id: JobId,
    pub extranonce2: Extranonce,
    pub ntime: Ntime,
    pub nonce: Nonce,
    pub digest: [u8; 32],
}

/// Bounded multi-producer, single-consumer queue from workers to the
/// Stratum client. Overflow drops the oldest candidate: by the time the
/// queue is that deep, those shares are stale anyway.
pub struct ShareQueue {
    candidates: Mutex<VecDeque<ShareCandidate>>,
    capacity: usize,
    wakeup: tokio::sync::Notify,
}

impl ShareQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "share queue capacity must be positive");

        Self {
            candidates: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            wakeup: tokio::sync::Notify::new(),
        }
    }

    pub fn push(&self, candidate: ShareCandidate) {
        {
            let mut candidates = self.candidates.lock();
            if candidates.len() == self.capacity {
                candidates.pop_front();
            }
            candidates.push_back(candidate);
        }

        self.wakeup.notify_one();
    }

    pub fn pop(&self) -> Option<ShareCandidate> {
        self.candidates.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.candidates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.lock().is_empty()
    }

    /// Awaits the next candidate. Single consumer; the notified future is
    /// armed before the queue check so a push between the two is not lost.
    pub async fn recv(&self) -> ShareCandidate {
        loop {
            let notified = self.wakeup.notified();

            if let Some(candidate) = self.pop() {
                return candidate;
            }

            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(nonce: u32) -> ShareCandidate {
        ShareCandidate {
            job_id: "bf".into(),
            extranonce2: Extranonce::from_counter(0, 4),
            ntime: Ntime(0),
            nonce: nonce.into(),
            digest: [0; 32],
        }
    }

    #[test]
    fn fifo_order() {
        let queue = ShareQueue::new(4);
        queue.push(candidate(1));
        queue.push(candidate(2));

        assert_eq!(queue.pop().unwrap().nonce, 1.into());
        assert_eq!(queue.pop().unwrap().nonce, 2.into());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn overflow_drops_the_oldest() {
        let queue = ShareQueue::new(2);
        queue.push(candidate(1));
        queue.push(candidate(2));
        queue.push(candidate(3));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().nonce, 2.into());
        assert_eq!(queue.pop().unwrap().nonce, 3.into());
    }

    #[tokio::test]
    async fn recv_sees_pushes_from_threads() {
        let queue = Arc::new(ShareQueue::new(8));

        let pusher = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                queue.push(candidate(7));
            })
        };

        let received = queue.recv().await;
        assert_eq!(received.nonce, 7.into());

        pusher.join().unwrap();
    }
}
