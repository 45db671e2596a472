use super::*;

/// An immutable snapshot of pool-supplied work, assembled from a
/// `mining.notify` plus the session's extranonce assignment and difficulty
/// at publish time. Never mutated; superseded wholesale by the next publish.
#[derive(Debug)]
pub struct Job {
    pub job_id: JobId,
    pub prevhash: PrevHash,
    coinbase_prefix: Vec<u8>,
    coinb2: Vec<u8>,
    pub merkle_branches: Vec<stratum::MerkleNode>,
    pub version: Version,
    pub nbits: Nbits,
    pub ntime: Ntime,
    pub clean_jobs: bool,
    pub extranonce2_size: usize,
    pub target: U256,
}

impl Job {
    /// Decodes the notify's hex fields up front so workers never see a
    /// malformed job; a failure here drops the job but keeps the session.
    pub fn assemble(
        notify: Notify,
        extranonce1: &Extranonce,
        extranonce2_size: usize,
        difficulty: Difficulty,
    ) -> Result<Self> {
        ensure!(
            (1..=8).contains(&extranonce2_size),
            "extranonce2 size {extranonce2_size} out of range"
        );

        let coinb1 = anyhow::Context::context(hex::decode(&notify.coinb1), "coinb1 is not hex")?;
        let coinb2 = anyhow::Context::context(hex::decode(&notify.coinb2), "coinb2 is not hex")?;

        let mut coinbase_prefix = coinb1;
        coinbase_prefix.extend_from_slice(extranonce1.as_bytes());

        Ok(Self {
            job_id: notify.job_id,
            prevhash: notify.prevhash,
            coinbase_prefix,
            coinb2,
            merkle_branches: notify.merkle_branches,
            version: notify.version,
            nbits: notify.nbits,
            ntime: notify.ntime,
            clean_jobs: notify.clean_jobs,
            extranonce2_size,
            target: difficulty.target(),
        })
    }

    /// coinbase1 ∥ extranonce1 ∥ extranonce2 ∥ coinbase2
    pub fn coinbase(&self, extranonce2: &Extranonce) -> Vec<u8> {
        let mut coinbase = Vec::with_capacity(
            self.coinbase_prefix.len() + extranonce2.len() + self.coinb2.len(),
        );
        coinbase.extend_from_slice(&self.coinbase_prefix);
        coinbase.extend_from_slice(extranonce2.as_bytes());
        coinbase.extend_from_slice(&self.coinb2);
        coinbase
    }

    pub fn merkle_root(&self, extranonce2: &Extranonce) -> stratum::MerkleNode {
        stratum::merkle_root(&self.coinbase(extranonce2), &self.merkle_branches)
    }

    /// The 80-byte header template: version, prevhash, merkle root, ntime,
    /// nbits, all little-endian where multi-byte, and a zero nonce field
    /// for the kernel to patch.
    pub fn header(&self, merkle_root: &stratum::MerkleNode) -> [u8; 80] {
        let mut header = [0u8; 80];
        header[..4].copy_from_slice(&self.version.to_consensus().to_le_bytes());
        header[4..36].copy_from_slice(self.prevhash.as_bytes());
        header[36..68].copy_from_slice(merkle_root.as_byte_array());
        header[68..72].copy_from_slice(&u32::from(self.ntime).to_le_bytes());
        header[72..76].copy_from_slice(&self.nbits.to_consensus().to_le_bytes());
        header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_notify() -> Notify {
        Notify {
            job_id: "bf".into(),
            prevhash: "4d16b6f85af6e2198f44ae2a6de67f78487ae5611b77c6c0440b921e00000000"
                .parse()
                .unwrap(),
            coinb1: "0100000001".into(),
            coinb2: "ffffffff00".into(),
            merkle_branches: Vec::new(),
            version: Version(block::Version::TWO),
            nbits: "1c2ac4af".parse().unwrap(),
            ntime: "504e86b9".parse().unwrap(),
            clean_jobs: false,
        }
    }

    #[test]
    fn coinbase_concatenation_order() {
        let job = Job::assemble(
            sample_notify(),
            &"08000002".parse().unwrap(),
            4,
            Difficulty::default(),
        )
        .unwrap();

        let extranonce2 = Extranonce::from_counter(1, 4);
        assert_eq!(
            hex::encode(job.coinbase(&extranonce2)),
            "01000000010800000201000000ffffffff00"
        );
    }

    #[test]
    fn empty_branch_merkle_root_is_coinbase_hash() {
        let job = Job::assemble(
            sample_notify(),
            &"08000002".parse().unwrap(),
            4,
            Difficulty::default(),
        )
        .unwrap();

        let extranonce2 = Extranonce::from_counter(0, 4);
        assert_eq!(
            job.merkle_root(&extranonce2).to_raw_hash(),
            sha256d::Hash::hash(&job.coinbase(&extranonce2))
        );
    }

    #[test]
    fn header_field_layout() {
        let job = Job::assemble(
            sample_notify(),
            &"08000002".parse().unwrap(),
            4,
            Difficulty::default(),
        )
        .unwrap();

        let merkle_root = job.merkle_root(&Extranonce::from_counter(0, 4));
        let header = job.header(&merkle_root);

        assert_eq!(header[..4], [2, 0, 0, 0]);
        assert_eq!(&header[4..36], job.prevhash.as_bytes());
        assert_eq!(&header[36..68], merkle_root.as_byte_array());
        assert_eq!(header[68..72], 0x504e86b9u32.to_le_bytes());
        assert_eq!(header[72..76], 0x1c2ac4afu32.to_le_bytes());
        assert_eq!(header[76..], [0, 0, 0, 0]);
    }

    #[test]
    fn rejects_non_hex_coinbase() {
        let mut notify = sample_notify();
        notify.coinb1 = "zz".into();

        assert!(
            Job::assemble(notify, &Extranonce::default(), 4, Difficulty::default()).is_err()
        );
    }

    #[test]
    fn rejects_out_of_range_extranonce2_size() {
        for size in [0, 9] {
            assert!(
                Job::assemble(
                    sample_notify(),
                    &Extranonce::default(),
                    size,
                    Difficulty::default()
                )
                .is_err()
            );
        }
    }
}
