use super::*;

const SI_PREFIXES: &[(&str, f64)] = &[
    ("", 1.0),
    ("K", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct HashRate(pub f64);

impl HashRate {
    pub const ZERO: Self = Self(0.0);

    pub fn from_hashes(hashes: u64, window: Duration) -> Self {
        if window.is_zero() {
            return Self::ZERO;
        }

        Self(hashes as f64 / window.as_secs_f64())
    }

    pub fn mega(self) -> f64 {
        self.0 / 1e6
    }
}

impl Display for HashRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let value = self.0.max(0.0);

        let (prefix, scale) = SI_PREFIXES
            .iter()
            .rev()
            .find(|(_, scale)| value >= *scale)
            .unwrap_or(&SI_PREFIXES[0]);

        write!(f, "{:.2} {prefix}H/s", value / scale)
    }
}
