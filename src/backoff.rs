use super::*;

/// Reconnect pacing shared by the Stratum client and the P2P listener:
/// exponential growth capped at thirty seconds, jittered uniformly between
/// half and the full delay so a pool or node restart does not get a
/// synchronized reconnect herd.
pub(crate) struct Backoff {
    attempt: u32,
}

impl Backoff {
    pub(crate) const BASE: Duration = Duration::from_secs(1);
    pub(crate) const CAP: Duration = Duration::from_secs(30);

    pub(crate) fn new() -> Self {
        Self { attempt: 0 }
    }

    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let full = Self::CAP.min(Self::BASE * 2u32.saturating_pow(self.attempt).min(64));
        self.attempt = self.attempt.saturating_add(1);

        let millis = full.as_millis() as u64;
        Duration::from_millis(millis / 2 + rand::rng().random_range(0..=millis / 2))
    }
}
