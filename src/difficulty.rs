use {super::*, primitive_types::U256};

lazy_static! {
    /// The canonical difficulty-1 target, 0x00000000ffff0000...0000.
    pub static ref DIFFICULTY_1_TARGET: U256 = U256::from_big_endian(&Target::MAX.to_be_bytes());
}

/// Pool difficulty as announced by `mining.set_difficulty`. On the wire it
/// is an integer or a float; internally it is the divisor applied to the
/// difficulty-1 target.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Difficulty(f64);

impl Difficulty {
    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// The 256-bit share target for this difficulty:
    /// floor(DIFFICULTY_1_TARGET / d), computed in fixed point so
    /// fractional difficulties divide exactly enough.
    pub fn target(self) -> U256 {
        const SCALE: u64 = 1_000_000_000;

        let numerator = DIFFICULTY_1_TARGET.saturating_mul(U256::from(SCALE));
        let denominator = (self.0 * SCALE as f64).round() as u64;

        if denominator == 0 {
            U256::MAX
        } else {
            numerator / U256::from(denominator)
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty(1.0)
    }
}

impl Display for Difficulty {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0 < 1.0 {
            write!(f, "{}", self.0)
        } else {
            write!(f, "{}", self.0.floor() as u64)
        }
    }
}

impl Serialize for Difficulty {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        if self.0 < 1.0 {
            ser.serialize_f64(self.0)
        } else {
            ser.serialize_u64(self.0.floor() as u64)
        }
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Int(u64),
            Float(f64),
        }

        match Wire::deserialize(de)? {
            Wire::Int(u) => {
                if u == 0 {
                    return Err(de::Error::custom("difficulty must be > 0"));
                }
                Ok(Difficulty(u as f64))
            }
            Wire::Float(x) => {
                if !x.is_finite() || x <= 0.0 {
                    return Err(de::Error::custom("difficulty must be finite and > 0"));
                }
                Ok(Difficulty(x))
            }
        }
    }
}

impl From<f64> for Difficulty {
    fn from(difficulty: f64) -> Self {
        assert!(
            difficulty.is_finite() && difficulty > 0.0,
            "difficulty must be finite and > 0"
        );
        Difficulty(difficulty)
    }
}

impl From<u64> for Difficulty {
    fn from(difficulty: u64) -> Self {
        assert!(difficulty > 0, "difficulty must be > 0");
        Difficulty(difficulty as f64)
    }
}

/// A digest meets a target iff its byte-reversed form, read as a big-endian
/// 256-bit integer, is less than or equal to the target. Reading the digest
/// little-endian is the same comparison without the reversal.
pub fn meets(digest: &[u8; 32], target: &U256) -> bool {
    U256::from_little_endian(digest) <= *target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_1_is_the_canonical_target() {
        assert_eq!(Difficulty::from(1u64).target(), *DIFFICULTY_1_TARGET);

        let bytes = DIFFICULTY_1_TARGET.to_big_endian();
        assert_eq!(&bytes[..6], &[0, 0, 0, 0, 0xff, 0xff]);
        assert_eq!(&bytes[6..], &[0; 26]);
    }

    #[test]
    fn higher_difficulty_means_lower_target() {
        let one = Difficulty::from(1u64).target();
        let two = Difficulty::from(2u64).target();
        let many = Difficulty::from(65536u64).target();

        assert!(two < one);
        assert!(many < two);
        assert_eq!(two, one / U256::from(2u64));
    }

    #[test]
    fn fractional_difficulty_raises_target() {
        let eighth = Difficulty::from(0.125).target();
        assert_eq!(eighth, *DIFFICULTY_1_TARGET * U256::from(8u64));
    }

    #[test]
    fn deserialize_int_or_float() {
        let a: Difficulty = serde_json::from_str("2").unwrap();
        let b: Difficulty = serde_json::from_str("2.0").unwrap();
        let c: Difficulty = serde_json::from_str("0.125").unwrap();

        assert_eq!(a.as_f64(), 2.0);
        assert_eq!(b.as_f64(), 2.0);
        assert_eq!(c.as_f64(), 0.125);

        assert!(serde_json::from_str::<Difficulty>("0").is_err());
        assert!(serde_json::from_str::<Difficulty>("-1.0").is_err());
    }

    #[test]
    fn serialize_int_above_one_float_below() {
        assert_eq!(serde_json::to_string(&Difficulty::from(42u64)).unwrap(), "42");
        assert!(
            serde_json::to_string(&Difficulty::from(0.5))
                .unwrap()
                .contains('.')
        );
    }

    #[test]
    fn digest_comparison_is_little_endian() {
        // Digest with a single high bit in its last byte reads as a huge
        // little-endian integer.
        let mut digest = [0u8; 32];
        digest[31] = 0x80;
        assert!(!meets(&digest, &DIFFICULTY_1_TARGET));

        // All-zero digest meets any target.
        assert!(meets(&[0u8; 32], &Difficulty::from(u64::MAX).target()));
    }

    #[test]
    fn boundary_digest_exactly_on_target() {
        let target = Difficulty::from(1u64).target();
        let mut digest = target.to_little_endian();
        assert!(meets(&digest, &target));

        // One above the target fails. The low little-endian byte of the
        // diff-1 target is zero, so incrementing the first byte is +1.
        digest[0] += 1;
        let above = U256::from_little_endian(&digest);
        assert!(above > target);
        assert!(!meets(&digest, &target));
    }
}
