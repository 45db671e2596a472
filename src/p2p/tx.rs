use super::*;

/// A transaction whose outputs sum past the whale threshold of 1 BTC.
#[derive(Debug, Clone, PartialEq)]
pub struct Whale {
    pub amount: Amount,
    pub txid: String,
}

impl Display for Whale {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} btc in {}", self.amount.to_btc(), self.txid)
    }
}

/// Sums the output values of a raw transaction, legacy or BIP-144 witness
/// serialization. Only the fields up to the last output are touched; every
/// read is bounds-checked against the payload.
pub fn total_output_value(raw: &[u8]) -> Result<u64, CodecError> {
    let mut reader = ByteReader::new(raw);

    reader.skip(4)?; // version

    let mut input_count = reader.read_varint()?;
    if input_count == 0 {
        // Witness serialization: a zero marker, then the flag, then the
        // real input count.
        let flag = reader.read_u8()?;
        if flag == 0 {
            return Err(CodecError::Invalid {
                message: "witness flag must be nonzero".into(),
            });
        }
        input_count = reader.read_varint()?;
    }

    for _ in 0..input_count {
        reader.skip(36)?; // previous output
        let script_len = reader.read_varint()?;
        reader.skip(usize::try_from(script_len).map_err(|_| CodecError::Invalid {
            message: format!("script length {script_len} does not fit"),
        })?)?;
        reader.skip(4)?; // sequence
    }

    let output_count = reader.read_varint()?;
    let mut total: u64 = 0;

    for _ in 0..output_count {
        let value = reader.read_i64_le()?;

        let value = u64::try_from(value).map_err(|_| CodecError::Invalid {
            message: format!("negative output value {value}"),
        })?;

        total = total.checked_add(value).ok_or_else(|| CodecError::Invalid {
            message: "output values overflow".into(),
        })?;

        let script_len = reader.read_varint()?;
        reader.skip(usize::try_from(script_len).map_err(|_| CodecError::Invalid {
            message: format!("script length {script_len} does not fit"),
        })?)?;
    }

    Ok(total)
}

/// Evaluates the whale criterion: strictly more than 1 BTC across all
/// outputs. The id is the byte-reversed double SHA-256 of the bytes as
/// received, which for witness serializations is the wtxid.
pub fn evaluate(raw: &[u8]) -> Result<Option<Whale>, CodecError> {
    let total = total_output_value(raw)?;

    if total <= COIN_VALUE {
        return Ok(None);
    }

    let mut txid = *sha256d::Hash::hash(raw).as_byte_array();
    txid.reverse();

    Ok(Some(Whale {
        amount: Amount::from_sat(total),
        txid: hex::encode(txid),
    }))
}
