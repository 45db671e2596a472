use super::*;

/// A merkle branch node as sent in `mining.notify`: 32 bytes of internal
/// (unreversed) hash order, hex on the wire.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct MerkleNode(sha256d::Hash);

impl MerkleNode {
    pub fn as_byte_array(&self) -> &[u8; 32] {
        self.0.as_byte_array()
    }

    pub fn from_byte_array(bytes: [u8; 32]) -> Self {
        Self(sha256d::Hash::from_byte_array(bytes))
    }

    pub fn to_raw_hash(self) -> sha256d::Hash {
        self.0
    }
}

impl fmt::Display for MerkleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_byte_array()))
    }
}

impl FromStr for MerkleNode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ensure!(s.len() == 64, "merkle node hex must be 64 chars");
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(sha256d::Hash::from_byte_array(bytes)))
    }
}

impl From<sha256d::Hash> for MerkleNode {
    fn from(hash: sha256d::Hash) -> Self {
        Self(hash)
    }
}

/// Folds the assembled coinbase and the merkle branches into the block
/// merkle root: start from the coinbase hash, then repeatedly double-hash
/// the running root concatenated with the next branch.
pub fn merkle_root(coinbase: &[u8], merkle_branches: &[MerkleNode]) -> MerkleNode {
    let mut merkle_root = sha256d::Hash::hash(coinbase);

    for branch in merkle_branches {
        let mut concat = [0u8; 64];
        concat[..32].copy_from_slice(merkle_root.as_byte_array());
        concat[32..].copy_from_slice(branch.as_byte_array());
        merkle_root = sha256d::Hash::hash(&concat);
    }

    MerkleNode(merkle_root)
}
