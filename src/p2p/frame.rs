use {super::*, snafu::ensure};

/// Bitcoin mainnet message start.
pub const MAGIC: u32 = 0xd9b4bef9;

/// Frames declaring a larger payload are dropped and the connection closed.
pub const MAX_PAYLOAD: usize = 32 * 1024 * 1024;

const HEADER_LEN: usize = 24;
const COMMAND_LEN: usize = 12;

#[derive(Debug, Snafu)]
pub enum FrameError {
    #[snafu(display("io error: {source}"))]
    Io { source: io::Error },

    #[snafu(display("bad magic {magic:#010x}"))]
    BadMagic { magic: u32 },

    #[snafu(display("command is not NUL-padded ascii"))]
    BadCommand,

    #[snafu(display("oversize payload: {length} bytes"))]
    OversizePayload { length: usize },

    #[snafu(display("checksum mismatch for `{command}`"))]
    BadChecksum { command: String },
}

/// One wire message: magic ∥ command(12, NUL-padded) ∥ length ∥
/// checksum(4) ∥ payload, integers little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(command: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            command: command.into(),
            payload,
        }
    }

    /// First four bytes of the payload's double SHA-256. Computed for every
    /// outbound message, `pong` and `getdata` included.
    pub fn checksum(payload: &[u8]) -> [u8; 4] {
        let hash = sha256d::Hash::hash(payload);
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&hash.as_byte_array()[..4]);
        checksum
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());

        bytes.extend_from_slice(&MAGIC.to_le_bytes());

        let mut command = [0u8; COMMAND_LEN];
        command[..self.command.len()].copy_from_slice(self.command.as_bytes());
        bytes.extend_from_slice(&command);

        bytes.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&Self::checksum(&self.payload));
        bytes.extend_from_slice(&self.payload);

        bytes
    }

    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), FrameError> {
        snafu::ResultExt::context(writer.write_all(&self.encode()).await, IoSnafu)?;
        snafu::ResultExt::context(writer.flush().await, IoSnafu)
    }

    /// Reads and validates one frame. The payload is only allocated after
    /// the declared length clears the cap.
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, FrameError> {
        let mut header = [0u8; HEADER_LEN];
        snafu::ResultExt::context(reader.read_exact(&mut header).await, IoSnafu)?;

        let magic = LittleEndian::read_u32(&header[..4]);
        ensure!(magic == MAGIC, BadMagicSnafu { magic });

        let command_bytes = &header[4..16];
        let end = command_bytes
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(COMMAND_LEN);
        ensure!(
            command_bytes[end..].iter().all(|byte| *byte == 0),
            BadCommandSnafu
        );
        let command = std::str::from_utf8(&command_bytes[..end])
            .ok()
            .filter(|command| command.bytes().all(|byte| byte.is_ascii_graphic()))
            .ok_or(FrameError::BadCommand)?
            .to_string();

        let length = LittleEndian::read_u32(&header[16..20]) as usize;
        ensure!(length <= MAX_PAYLOAD, OversizePayloadSnafu { length });

        let mut declared_checksum = [0u8; 4];
        declared_checksum.copy_from_slice(&header[20..24]);

        let mut payload = vec![0u8; length];
        snafu::ResultExt::context(reader.read_exact(&mut payload).await, IoSnafu)?;

        ensure!(
            Self::checksum(&payload) == declared_checksum,
            BadChecksumSnafu { command }
        );

        Ok(Self { command, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_checksum_is_the_verack_constant() {
        assert_eq!(Frame::checksum(&[]), [0x5d, 0xf6, 0xe0, 0xe2]);
    }

    #[test]
    fn encode_layout() {
        let frame = Frame::new("ping", 0xdeadbeefcafebabeu64.to_le_bytes().to_vec());
        let bytes = frame.encode();

        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[..4], [0xf9, 0xbe, 0xb4, 0xd9]);
        assert_eq!(&bytes[4..8], b"ping");
        assert_eq!(bytes[8..16], [0; 8]);
        assert_eq!(bytes[16..20], 8u32.to_le_bytes());
        assert_eq!(bytes[20..24], Frame::checksum(&frame.payload));
        assert_eq!(bytes[24..], frame.payload[..]);
    }

    #[tokio::test]
    async fn read_roundtrips_encode() {
        let frame = Frame::new("inv", vec![1, 2, 3, 4]);

        let bytes = frame.encode();
        let decoded = Frame::read(&mut bytes.as_slice()).await.unwrap();

        assert_eq!(decoded, frame);
    }

    #[tokio::test]
    async fn rejects_bad_magic() {
        let mut bytes = Frame::new("verack", Vec::new()).encode();
        bytes[0] = 0x00;

        assert!(matches!(
            Frame::read(&mut bytes.as_slice()).await,
            Err(FrameError::BadMagic { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_bad_checksum() {
        let mut bytes = Frame::new("ping", vec![0; 8]).encode();
        bytes[20] ^= 0xff;

        assert!(matches!(
            Frame::read(&mut bytes.as_slice()).await,
            Err(FrameError::BadChecksum { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_oversize_payload_before_reading_it() {
        let mut header = Vec::new();
        header.extend_from_slice(&MAGIC.to_le_bytes());
        header.extend_from_slice(b"tx\0\0\0\0\0\0\0\0\0\0");
        header.extend_from_slice(&(MAX_PAYLOAD as u32 + 1).to_le_bytes());
        header.extend_from_slice(&[0; 4]);

        assert!(matches!(
            Frame::read(&mut header.as_slice()).await,
            Err(FrameError::OversizePayload { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_non_nul_padded_command() {
        let mut bytes = Frame::new("ping", vec![0; 8]).encode();
        // NUL in the middle of the field followed by junk.
        bytes[9] = 0;
        bytes[10] = b'x';

        assert!(matches!(
            Frame::read(&mut bytes.as_slice()).await,
            Err(FrameError::BadCommand)
        ));
    }
}
