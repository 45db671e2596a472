use super::*;

pub mod scalar;

#[cfg(target_arch = "x86_64")]
mod avx2;
#[cfg(target_arch = "x86_64")]
mod avx512;

/// Nonces hashed per kernel invocation. Workers check for job staleness
/// between batches, so this also bounds how long a stale batch can run.
pub const BATCH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Scalar,
    W8,
    W16,
}

impl Display for Variant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Scalar => write!(f, "scalar"),
            Variant::W8 => write!(f, "w8"),
            Variant::W16 => write!(f, "w16"),
        }
    }
}

type BatchFn = fn(&[u8; 80], &[u32; BATCH], &mut [[u8; 32]; BATCH]);

/// A bound SHA-256d batch kernel. Capability detection happens once, at
/// bind time; the hot loop goes through a plain function pointer.
#[derive(Clone, Copy)]
pub struct Kernel {
    variant: Variant,
    batch: BatchFn,
}

impl Kernel {
    /// Binds the widest implementation the host supports.
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx512f") {
                return Self {
                    variant: Variant::W16,
                    batch: avx512::batch,
                };
            }

            if is_x86_feature_detected!("avx2") {
                return Self {
                    variant: Variant::W8,
                    batch: avx2::batch,
                };
            }
        }

        Self::scalar()
    }

    pub fn scalar() -> Self {
        Self {
            variant: Variant::Scalar,
            batch: scalar::batch,
        }
    }

    /// Binds a specific variant, or `None` if the host cannot run it.
    pub fn with_variant(variant: Variant) -> Option<Self> {
        match variant {
            Variant::Scalar => Some(Self::scalar()),
            #[cfg(target_arch = "x86_64")]
            Variant::W8 if is_x86_feature_detected!("avx2") => Some(Self {
                variant,
                batch: avx2::batch,
            }),
            #[cfg(target_arch = "x86_64")]
            Variant::W16 if is_x86_feature_detected!("avx512f") => Some(Self {
                variant,
                batch: avx512::batch,
            }),
            _ => None,
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// SHA-256d of the 80-byte header template under each of the 16 nonces,
    /// into caller-supplied buffers.
    pub fn sha256d_batch(
        &self,
        header: &[u8; 80],
        nonces: &[u32; BATCH],
        digests: &mut [[u8; 32]; BATCH],
    ) {
        (self.batch)(header, nonces, digests)
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel").field("variant", &self.variant).finish()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        bitcoin::hashes::{sha256, sha256d},
    };

    fn available_kernels() -> Vec<Kernel> {
        [Variant::Scalar, Variant::W8, Variant::W16]
            .into_iter()
            .filter_map(Kernel::with_variant)
            .collect()
    }

    #[test]
    fn zero_header_known_answer() {
        let header = [0u8; 80];

        // First round of the double hash over 80 zero bytes.
        assert_eq!(
            hex::encode(sha256::Hash::hash(&header).as_byte_array()),
            "5b6fb58e61fa475939767d68a446f97f1bff02c0e5935a3ea8bb51e6515783d8",
        );

        let expected = *sha256d::Hash::hash(&header).as_byte_array();
        assert_eq!(
            hex::encode(expected),
            "4be7570e8f70eb093640c8468274ba759745a7aa2b7d25ab1e0421b259845014",
        );

        let nonces = [0u32; BATCH];

        for kernel in available_kernels() {
            let mut digests = [[0u8; 32]; BATCH];
            kernel.sha256d_batch(&header, &nonces, &mut digests);
            for digest in digests {
                assert_eq!(digest, expected, "variant {}", kernel.variant());
            }
        }
    }

    #[test]
    fn genesis_block_known_answer() {
        // The Bitcoin genesis header: version 1, zero prevhash, the genesis
        // coinbase merkle root, 2009-01-03, nbits 1d00ffff.
        let mut header = [0u8; 80];
        header[..4].copy_from_slice(&1u32.to_le_bytes());
        let merkle_root =
            hex::decode("3ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a")
                .unwrap();
        header[36..68].copy_from_slice(&merkle_root);
        header[68..72].copy_from_slice(&1231006505u32.to_le_bytes());
        header[72..76].copy_from_slice(&0x1d00ffffu32.to_le_bytes());

        let nonce = 2083236893;

        for kernel in available_kernels() {
            let mut digests = [[0u8; 32]; BATCH];
            kernel.sha256d_batch(&header, &[nonce; BATCH], &mut digests);

            let mut reversed = digests[0];
            reversed.reverse();

            assert_eq!(
                hex::encode(reversed),
                "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
                "variant {}",
                kernel.variant()
            );
        }
    }

    #[test]
    fn variants_agree_on_random_headers() {
        let mut rng = rand::rng();
        let kernels = available_kernels();

        for _ in 0..32 {
            let mut header = [0u8; 80];
            rng.fill(&mut header[..]);

            let nonces: [u32; BATCH] = std::array::from_fn(|_| rng.random());

            let mut expected = [[0u8; 32]; BATCH];
            Kernel::scalar().sha256d_batch(&header, &nonces, &mut expected);

            for (digest, nonce) in expected.iter().zip(nonces) {
                assert_eq!(*digest, scalar::sha256d(&header, nonce));
            }

            for kernel in &kernels {
                let mut digests = [[0u8; 32]; BATCH];
                kernel.sha256d_batch(&header, &nonces, &mut digests);
                assert_eq!(digests, expected, "variant {}", kernel.variant());
            }
        }
    }

    #[test]
    fn distinct_nonces_distinct_digests() {
        let header = [0u8; 80];
        let nonces: [u32; BATCH] = std::array::from_fn(|i| i as u32);

        let mut digests = [[0u8; 32]; BATCH];
        Kernel::detect().sha256d_batch(&header, &nonces, &mut digests);

        for i in 0..BATCH {
            for j in i + 1..BATCH {
                assert_ne!(digests[i], digests[j]);
            }
        }
    }
}
