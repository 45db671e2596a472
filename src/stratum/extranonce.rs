use super::*;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extranonce(Vec<u8>);

impl Extranonce {
    /// Encodes a counter value as exactly `size` little-endian bytes,
    /// wrapping modulo 2^(8 * size).
    pub fn from_counter(value: u64, size: usize) -> Self {
        let le = value.to_le_bytes();
        let mut bytes = vec![0u8; size];
        let take = size.min(le.len());
        bytes[..take].copy_from_slice(&le[..take]);
        Self(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self(hex::decode(s)?))
    }
}

impl Serialize for Extranonce {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Extranonce {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let s = String::deserialize(de)?;
        Self::from_hex(&s).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

impl fmt::Display for Extranonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Extranonce {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_hex_roundtrip() {
        let extranonce: Extranonce = serde_json::from_str(r#""08000002""#).unwrap();
        assert_eq!(extranonce.len(), 4);
        assert_eq!(extranonce.as_bytes(), [0x08, 0x00, 0x00, 0x02]);
        assert_eq!(serde_json::to_string(&extranonce).unwrap(), r#""08000002""#);
    }

    #[test]
    fn rejects_odd_length_hex() {
        assert!("abc".parse::<Extranonce>().is_err());
    }

    #[test]
    fn rejects_non_hex() {
        assert!("zz".parse::<Extranonce>().is_err());
    }

    #[test]
    fn counter_is_little_endian_and_sized() {
        assert_eq!(Extranonce::from_counter(0, 4).to_hex(), "00000000");
        assert_eq!(Extranonce::from_counter(1, 4).to_hex(), "01000000");
        assert_eq!(Extranonce::from_counter(0x0102, 2).to_hex(), "0201");
        assert_eq!(Extranonce::from_counter(0xdeadbeef, 8).to_hex(), "efbeadde00000000");
    }

    #[test]
    fn counter_wraps_at_width() {
        // A one-byte extranonce2 cycles through 256 values.
        assert_eq!(Extranonce::from_counter(0x1ff, 1).to_hex(), "ff");
        assert_eq!(Extranonce::from_counter(0x100, 1).to_hex(), "00");
    }
}
