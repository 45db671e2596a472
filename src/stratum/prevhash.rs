use super::*;

/// The previous-block hash from `mining.notify`. Stratum transmits it in a
/// word-swapped form: the displayed big-endian hash split into eight u32
/// words, words in reverse order, bytes within each word untouched. Stored
/// here in internal (header) byte order, which is the wire bytes with each
/// four-byte word reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeFromStr, SerializeDisplay)]
pub struct PrevHash([u8; 32]);

impl PrevHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_internal(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The hash as block explorers display it (big-endian hex).
    pub fn to_display_hex(&self) -> String {
        let mut bytes = self.0;
        bytes.reverse();
        hex::encode(bytes)
    }
}

fn swap_words(bytes: &mut [u8; 32]) {
    for word in bytes.chunks_exact_mut(4) {
        word.reverse();
    }
}

impl FromStr for PrevHash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(ParseError::Invalid {
                message: format!("prevhash hex must be 64 chars, got {}", s.len()),
            });
        }

        let mut bytes = [0u8; 32];
        snafu::ResultExt::context(
            hex::decode_to_slice(s, &mut bytes),
            ParseHexSnafu { input: s.to_string() },
        )?;

        swap_words(&mut bytes);

        Ok(Self(bytes))
    }
}

impl fmt::Display for PrevHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = self.0;
        swap_words(&mut bytes);
        f.write_str(&hex::encode(bytes))
    }
}
